//! API handlers

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream};
use panel_core::AnalystRegistry;
use panel_engine::{AnalysisRequest, RoundTableResponse, TickerAnalysesResponse};
use serde_json::{Value, json};
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use uuid::Uuid;

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "service": "analyst-panel",
        "runtime": state.runtime_name,
        "active_runs": state.registry().len(),
    }))
}

pub async fn list_analysts() -> Json<Value> {
    Json(json!({ "analysts": AnalystRegistry::global().all() }))
}

pub async fn run_analysis(
    State(state): State<AppState>,
    body: Result<Json<AnalysisRequest>, JsonRejection>,
) -> ApiResult<Json<TickerAnalysesResponse>> {
    let Json(request) = body?;
    let response = state.orchestrator.analyze(&request).await?;
    Ok(Json(response))
}

pub async fn run_round_table(
    State(state): State<AppState>,
    body: Result<Json<AnalysisRequest>, JsonRejection>,
) -> ApiResult<Json<RoundTableResponse>> {
    let Json(request) = body?;
    let response = state.orchestrator.round_table(&request).await?;
    Ok(Json(response))
}

pub async fn run_progress(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let progress = state
        .registry()
        .progress(&run_id)
        .ok_or(ApiError::RunNotFound(run_id))?;
    Ok(Json(json!({ "run_id": run_id, "progress": progress })))
}

/// Stream progress updates until the run finishes
pub async fn run_events(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let receiver = state
        .registry()
        .subscribe(&run_id)
        .ok_or(ApiError::RunNotFound(run_id))?;
    debug!(%run_id, "Progress subscriber attached");

    let events = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(update) => match Event::default().event("progress").json_data(&update) {
                    Ok(event) => return Some((Ok(event), receiver)),
                    Err(_) => continue,
                },
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Progress subscriber lagged");
                }
                // Tracker dropped: the run is over
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

pub async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if !state.registry().cancel(&run_id) {
        return Err(ApiError::RunNotFound(run_id));
    }
    info!(%run_id, "Run cancelled by client");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "run_id": run_id, "status": "cancelling" })),
    ))
}
