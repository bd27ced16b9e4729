//! The AgentRuntime capability

use crate::{Context, Result, Signal, Ticker};
use async_trait::async_trait;

/// Produces a signal for one (ticker, analyst) pair
///
/// Implementations are opaque to the orchestrator: an LLM call, a rule
/// engine, anything that answers with a [`Signal`] or fails. Latency is
/// bounded by the caller, not by the runtime.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Analyze a ticker as the given analyst
    ///
    /// `context` carries the analysis window and, in round-table rounds,
    /// the round number and the peers' previous statements.
    async fn analyze(&self, ticker: &Ticker, analyst_id: &str, context: &Context)
    -> Result<Signal>;

    /// Runtime name for logs
    fn name(&self) -> &str {
        "agent-runtime"
    }
}
