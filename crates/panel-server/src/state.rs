//! Shared handler state and runtime wiring

use panel_agents::{
    AgentsError, LlmRuntime, MarketDataConfig, OpenAIProvider, RuleBasedRuntime, YahooMarketData,
};
use panel_core::AgentRuntime;
use panel_engine::{AnalysisOrchestrator, EngineConfig, RunRegistry};
use panel_utils::RuntimeKind;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AnalysisOrchestrator>,
    pub started_at: Instant,
    pub runtime_name: String,
}

impl AppState {
    pub fn new(runtime: Arc<dyn AgentRuntime>, config: EngineConfig) -> Self {
        let runtime_name = runtime.name().to_string();
        Self {
            orchestrator: Arc::new(AnalysisOrchestrator::new(runtime, config)),
            started_at: Instant::now(),
            runtime_name,
        }
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        self.orchestrator.registry()
    }
}

/// Build the agent runtime selected in the process configuration
///
/// Both runtimes read Yahoo market data; the LLM runtime also needs
/// `OPENAI_API_KEY`.
pub fn build_runtime(kind: RuntimeKind) -> Result<Arc<dyn AgentRuntime>, AgentsError> {
    let market_config = MarketDataConfig::from_env()?;
    let history_days = market_config.history_days;
    let market = Arc::new(YahooMarketData::new(market_config)?);

    let runtime: Arc<dyn AgentRuntime> = match kind {
        RuntimeKind::Rules => {
            Arc::new(RuleBasedRuntime::new(market).with_history_days(history_days))
        }
        RuntimeKind::Llm => {
            let provider = Arc::new(OpenAIProvider::from_env()?);
            let runtime = LlmRuntime::new(provider, market)?
                .with_env()
                .with_history_days(history_days);
            info!(model = runtime.model(), "Using LLM personas");
            Arc::new(runtime)
        }
    };
    Ok(runtime)
}
