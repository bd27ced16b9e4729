//! HTTP API for analyst panels
//!
//! | route | purpose |
//! |---|---|
//! | `GET /health` | liveness and runtime info |
//! | `GET /api/analysts` | analyst catalog |
//! | `POST /api/analysis` | fan out tickers x analysts and aggregate |
//! | `POST /api/round-table` | debate rounds toward consensus |
//! | `GET /api/runs/{id}/progress` | progress snapshot of a live run |
//! | `GET /api/runs/{id}/events` | progress as server-sent events |
//! | `DELETE /api/runs/{id}` | cancel a live run |

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{AppState, build_runtime};

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health_check))
        .route("/api/analysts", get(routes::list_analysts))
        .route("/api/analysis", post(routes::run_analysis))
        .route("/api/round-table", post(routes::run_round_table))
        .route("/api/runs/{id}/progress", get(routes::run_progress))
        .route("/api/runs/{id}/events", get(routes::run_events))
        .route("/api/runs/{id}", delete(routes::cancel_run))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped
pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, "Analyst panel API listening");
    axum::serve(listener, app).await
}
