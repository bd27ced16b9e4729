//! Request-level entry points: validate, fan out, aggregate

use crate::aggregate::ResultAggregator;
use crate::config::EngineConfig;
use crate::fallback::FallbackGenerator;
use crate::registry::{RunGuard, RunKind, RunRegistry};
use crate::response::{RoundTableResponse, TickerAnalysesResponse};
use crate::round_table::RoundTableCoordinator;
use crate::run::{AnalysisRequest, AnalysisRun};
use crate::scheduler::{SchedulerSettings, TaskScheduler};
use panel_core::{AgentRuntime, Error, Result, ValidationError};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Runs analysis and round-table requests against an [`AgentRuntime`]
///
/// Validation failures and cancellation are the only errors; agent failures
/// and missed deadlines are absorbed into the response.
pub struct AnalysisOrchestrator {
    config: EngineConfig,
    scheduler: TaskScheduler,
    aggregator: ResultAggregator,
    registry: Arc<RunRegistry>,
}

impl AnalysisOrchestrator {
    pub fn new(runtime: Arc<dyn AgentRuntime>, config: EngineConfig) -> Self {
        let scheduler = TaskScheduler::new(runtime, SchedulerSettings::from(&config));
        Self {
            aggregator: ResultAggregator::new(config.signal_labels),
            config,
            scheduler,
            registry: Arc::new(RunRegistry::new()),
        }
    }

    /// Share a registry with other components (e.g. the HTTP layer)
    pub fn with_registry(mut self, registry: Arc<RunRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    /// Fan a request out and aggregate the results
    #[instrument(skip(self, request), fields(tickers = %request.tickers))]
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<TickerAnalysesResponse> {
        let spec = request.validate()?;
        let guard = RunGuard::register(
            &self.registry,
            request.run_id.unwrap_or_else(Uuid::new_v4),
            RunKind::Analysis,
        )?;

        info!(
            run_id = %guard.id(),
            tickers = ?spec.tickers.symbols(),
            analysts = ?spec.analysts,
            "Starting analysis run"
        );

        let mut run = AnalysisRun::new(guard.id(), spec, self.config.run_deadline)
            .with_labels(self.config.signal_labels);
        let context = run.context();
        let report = self
            .scheduler
            .dispatch(&mut run, &context, guard.tracker(), guard.cancel_token())
            .await;

        if report.cancelled {
            info!(run_id = %guard.id(), "Analysis run cancelled");
            return Err(Error::Cancelled);
        }

        let response = if report.deadline_elapsed {
            FallbackGenerator.fallback(&mut run, &self.aggregator, guard.tracker())
        } else {
            self.aggregator.aggregate(&run, false)
        };
        Ok(response)
    }

    /// Run the round-table protocol for a request
    #[instrument(skip(self, request), fields(tickers = %request.tickers))]
    pub async fn round_table(&self, request: &AnalysisRequest) -> Result<RoundTableResponse> {
        let spec = request.validate()?;

        // Clients may shorten the debate but never lengthen it
        let mut config = self.config.round_table;
        if let Some(rounds) = request.max_rounds.filter(|r| *r > 0) {
            if rounds > config.max_rounds {
                return Err(ValidationError::TooManyRounds {
                    limit: config.max_rounds,
                    found: rounds,
                }
                .into());
            }
            config.max_rounds = rounds;
        }

        let guard = RunGuard::register(
            &self.registry,
            request.run_id.unwrap_or_else(Uuid::new_v4),
            RunKind::RoundTable,
        )?;

        info!(
            run_id = %guard.id(),
            tickers = ?spec.tickers.symbols(),
            analysts = ?spec.analysts,
            max_rounds = config.max_rounds,
            "Starting round table"
        );

        let opening = AnalysisRun::new(guard.id(), spec, self.config.run_deadline)
            .with_labels(self.config.signal_labels);
        let coordinator =
            RoundTableCoordinator::new(self.scheduler.clone(), self.aggregator, config);
        coordinator
            .run(opening, guard.tracker(), guard.cancel_token())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::FALLBACK_REASONING;
    use async_trait::async_trait;
    use panel_core::{Context, MockAgentRuntime, Signal, SignalLabels, Ticker};
    use std::time::Duration;

    fn orchestrator(runtime: impl AgentRuntime + 'static) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(Arc::new(runtime), EngineConfig::default())
    }

    #[tokio::test]
    async fn test_single_analyst_scenario() {
        let mut mock = MockAgentRuntime::new();
        mock.expect_analyze()
            .times(1)
            .returning(|_, _, _| Ok(Signal::buy(85, "durable moat")));

        let response = orchestrator(mock)
            .analyze(&AnalysisRequest::new("AAPL", ["warren_buffett_agent"]))
            .await
            .unwrap();

        assert_eq!(response.ticker_analyses.len(), 1);
        let entries = response.ticker_analyses.get("AAPL").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].agent_name, "warren_buffett_agent");
        assert_eq!(response.overall.get("AAPL"), Some(&entries[0].signal));
        assert_eq!(entries[0].signal.signal, "买入");
        assert!(!response.partial);
    }

    #[tokio::test]
    async fn test_agents_receive_configured_language() {
        let mut mock = MockAgentRuntime::new();
        mock.expect_analyze()
            .withf(|_, _, ctx| ctx.language() == Some("en"))
            .times(2)
            .returning(|_, _, _| Ok(Signal::buy(70, "moat")));
        let config = EngineConfig::builder()
            .signal_labels(SignalLabels::English)
            .build()
            .unwrap();

        let response = AnalysisOrchestrator::new(Arc::new(mock), config)
            .analyze(&AnalysisRequest::new("AAPL MSFT", ["warren_buffett_agent"]))
            .await
            .unwrap();
        assert_eq!(response.overall.get("MSFT").unwrap().signal, "Buy");
    }

    #[tokio::test]
    async fn test_validation_rejected_before_dispatch() {
        let mut mock = MockAgentRuntime::new();
        mock.expect_analyze().never();
        let orchestrator = orchestrator(mock);

        let err = orchestrator
            .analyze(&AnalysisRequest::new("AAPL MSFT GOOG TSLA", ["wsb_agent"]))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = orchestrator
            .analyze(&AnalysisRequest::new("AAPL", ["not_an_agent"]))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(orchestrator.registry().is_empty());
    }

    #[tokio::test]
    async fn test_total_failure_still_complete_shaped() {
        let mut mock = MockAgentRuntime::new();
        mock.expect_analyze()
            .returning(|_, analyst, _| Err(Error::agent_failure(analyst, "upstream 503")));

        let response = orchestrator(mock)
            .analyze(&AnalysisRequest::new("AAPL, MSFT", ["wsb_agent", "ben_graham_agent"]))
            .await
            .unwrap();

        for ticker in ["AAPL", "MSFT"] {
            let entries = response.ticker_analyses.get(ticker).unwrap();
            assert_eq!(entries.len(), 2);
            assert!(entries.iter().all(|e| e.signal.confidence == 0));
        }
        assert_eq!(
            response.ticker_analyses.get("AAPL").unwrap()[0].signal.reasoning,
            "wsb_agent failed: upstream 503"
        );
    }

    struct SlowFor(&'static str);

    #[async_trait]
    impl AgentRuntime for SlowFor {
        async fn analyze(
            &self,
            _ticker: &Ticker,
            analyst_id: &str,
            _context: &Context,
        ) -> Result<Signal> {
            if analyst_id == self.0 {
                tokio::time::sleep(Duration::from_secs(600)).await;
            }
            Ok(Signal::sell(65, "priced for perfection"))
        }
    }

    struct Sluggish(Duration);

    #[async_trait]
    impl AgentRuntime for Sluggish {
        async fn analyze(
            &self,
            _ticker: &Ticker,
            _analyst_id: &str,
            _context: &Context,
        ) -> Result<Signal> {
            tokio::time::sleep(self.0).await;
            Ok(Signal::sell(65, "priced for perfection"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_deadline_falls_back() {
        // One worker, 90s per call, 150s budget: one of four tasks finishes
        let config = EngineConfig::builder()
            .max_concurrency(1)
            .task_timeout(Duration::from_secs(100))
            .run_deadline(Duration::from_secs(150))
            .signal_labels(SignalLabels::English)
            .build()
            .unwrap();
        let orchestrator =
            AnalysisOrchestrator::new(Arc::new(Sluggish(Duration::from_secs(90))), config);

        let response = orchestrator
            .analyze(&AnalysisRequest::new("AAPL MSFT", ["ben_graham_agent", "wsb_agent"]))
            .await
            .unwrap();

        assert!(response.partial);
        let entries: Vec<_> = response
            .ticker_analyses
            .iter()
            .flat_map(|(_, entries)| entries.iter())
            .collect();
        assert_eq!(entries.len(), 4);
        let real = entries.iter().filter(|e| e.signal.signal == "Sell").count();
        let fallback = entries
            .iter()
            .filter(|e| e.signal.confidence == 50 && e.signal.reasoning == FALLBACK_REASONING)
            .count();
        assert_eq!(real, 1);
        assert_eq!(fallback, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_through_registry() {
        let orchestrator = Arc::new(orchestrator(SlowFor("wsb_agent")));
        let run_id = Uuid::new_v4();
        let request = AnalysisRequest {
            run_id: Some(run_id),
            ..AnalysisRequest::new("AAPL", ["wsb_agent"])
        };

        let running = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.analyze(&request).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(orchestrator.registry().progress(&run_id).is_some());
        assert!(orchestrator.registry().cancel(&run_id));

        let result = running.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(orchestrator.registry().is_empty());
    }

    #[tokio::test]
    async fn test_round_table_request_override() {
        let mut mock = MockAgentRuntime::new();
        mock.expect_analyze().returning(|_, analyst, ctx| {
            let confidence = if ctx.round() % 2 == 0 { 90 } else { 30 };
            Ok(if analyst == "wsb_agent" {
                Signal::sell(confidence, "froth")
            } else {
                Signal::buy(confidence, "value")
            })
        });

        let request = AnalysisRequest {
            max_rounds: Some(2),
            ..AnalysisRequest::new("AAPL", ["warren_buffett_agent", "wsb_agent"])
        };
        let response = orchestrator(mock).round_table(&request).await.unwrap();

        assert!(!response.converged);
        assert_eq!(response.rounds_completed, 2);
        assert_eq!(response.rounds.len(), 3);
    }

    #[tokio::test]
    async fn test_round_table_rejects_rounds_above_limit() {
        let mut mock = MockAgentRuntime::new();
        mock.expect_analyze().never();
        let orchestrator = orchestrator(mock);

        let request = AnalysisRequest {
            max_rounds: Some(u32::MAX),
            ..AnalysisRequest::new("AAPL", ["warren_buffett_agent", "wsb_agent"])
        };
        let err = orchestrator.round_table(&request).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Validation(ValidationError::TooManyRounds {
                limit: 3,
                found: u32::MAX
            })
        ));
        assert!(orchestrator.registry().is_empty());
    }
}
