//! Analysis orchestration for analyst panels
//!
//! Turns a (tickers x analysts) request into a complete set of normalized
//! signals:
//!
//! - [`TaskScheduler`] fans tasks out to an [`panel_core::AgentRuntime`]
//!   under a concurrency cap, a per-task timeout and a run deadline
//! - [`ProgressTracker`] mirrors task status for polling and streaming
//! - [`ResultAggregator`] merges results per ticker and computes the overall signal
//! - [`FallbackGenerator`] backfills tasks the deadline cut off
//! - [`RoundTableCoordinator`] runs bounded debate rounds toward consensus
//! - [`AnalysisOrchestrator`] ties these together per request
//!
//! # Example
//!
//! ```no_run
//! use panel_engine::{AnalysisOrchestrator, AnalysisRequest, EngineConfig};
//! # use std::sync::Arc;
//! # async fn example(runtime: Arc<dyn panel_core::AgentRuntime>) -> panel_core::Result<()> {
//! let orchestrator = AnalysisOrchestrator::new(runtime, EngineConfig::default());
//! let response = orchestrator
//!     .analyze(&AnalysisRequest::new("AAPL, MSFT", ["warren_buffett_agent", "wsb_agent"]))
//!     .await?;
//! println!("{}", serde_json::to_string_pretty(&response.overall).unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod config;
pub mod error;
pub mod fallback;
pub mod orchestrator;
pub mod progress;
pub mod registry;
pub mod response;
pub mod round_table;
pub mod run;
pub mod scheduler;
pub mod task;

pub use aggregate::{Consensus, ResultAggregator, consensus};
pub use config::{EngineConfig, EngineConfigBuilder, RoundTableConfig};
pub use error::{EngineError, Result};
pub use fallback::FallbackGenerator;
pub use orchestrator::AnalysisOrchestrator;
pub use progress::{ProgressEntry, ProgressSnapshot, ProgressTracker, ProgressUpdate};
pub use registry::{RunEntry, RunGuard, RunKind, RunRegistry};
pub use response::{
    AnalystSignal, ConsensusRound, DebateSummary, RenderedSignal, RoundTableOutcome,
    RoundTableResponse, TickerAnalysesResponse, TickerMap,
};
pub use round_table::{RoundTableCoordinator, RoundTableState};
pub use run::{AnalysisRequest, AnalysisRun, AnalysisWindow, RunSpec};
pub use scheduler::{DispatchReport, SchedulerSettings, TaskScheduler};
pub use task::{AnalysisTask, TaskKey, TaskStatus};
