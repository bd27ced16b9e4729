//! Backfilling runs that missed their deadline

use crate::aggregate::ResultAggregator;
use crate::progress::ProgressTracker;
use crate::response::TickerAnalysesResponse;
use crate::run::AnalysisRun;
use panel_core::Signal;
use tracing::info;

pub const FALLBACK_CONFIDENCE: u8 = 50;
pub const FALLBACK_REASONING: &str = "fallback: analysis did not complete in time";

/// Synthesizes neutral results for tasks the deadline cut off
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackGenerator;

impl FallbackGenerator {
    /// The substitute signal for an unfinished task
    pub fn fallback_signal() -> Signal {
        Signal::neutral(FALLBACK_CONFIDENCE, FALLBACK_REASONING)
    }

    /// Mark every non-terminal task `TimedOut` with the fallback signal
    ///
    /// Completed tasks keep their results. Returns the number of tasks
    /// backfilled.
    pub fn backfill(run: &mut AnalysisRun, tracker: &ProgressTracker) -> usize {
        let unfinished = run.unfinished();
        for key in &unfinished {
            if let Some(task) = run.task_mut(key) {
                if task.time_out("run deadline elapsed", Some(Self::fallback_signal())) {
                    tracker.update(key, 100, "fallback", &task.status);
                }
            }
        }

        if !unfinished.is_empty() {
            info!(
                run_id = %run.id,
                round = run.round,
                backfilled = unfinished.len(),
                "Backfilled unfinished tasks with fallback signals"
            );
        }
        unfinished.len()
    }

    /// Backfill and aggregate; the response is always complete-shaped
    pub fn fallback(
        &self,
        run: &mut AnalysisRun,
        aggregator: &ResultAggregator,
        tracker: &ProgressTracker,
    ) -> TickerAnalysesResponse {
        Self::backfill(run, tracker);
        aggregator.aggregate(run, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::AnalysisRequest;
    use crate::task::{TaskKey, TaskStatus};
    use panel_core::{SignalLabels, Ticker};
    use std::time::Duration;
    use uuid::Uuid;

    fn key(ticker: &str, analyst: &str) -> TaskKey {
        TaskKey::new(Ticker::parse(ticker).unwrap(), analyst)
    }

    #[test]
    fn test_two_of_four_unfinished() {
        let spec = AnalysisRequest::new("AAPL MSFT", ["warren_buffett_agent", "wsb_agent"])
            .validate()
            .unwrap();
        let mut run = AnalysisRun::new(Uuid::new_v4(), spec, Duration::from_secs(1));
        let tracker = ProgressTracker::new();
        tracker.begin_round(0, run.keys());

        for ticker in ["AAPL", "MSFT"] {
            let task = run.task_mut(&key(ticker, "warren_buffett_agent")).unwrap();
            task.start();
            task.succeed(Signal::buy(80, "moat"));
        }
        // One running, one never started
        run.task_mut(&key("AAPL", "wsb_agent")).unwrap().start();

        let response = FallbackGenerator.fallback(
            &mut run,
            &ResultAggregator::new(SignalLabels::English),
            &tracker,
        );

        assert!(response.partial);
        assert!(run.all_terminal());
        for ticker in ["AAPL", "MSFT"] {
            let entries = response.ticker_analyses.get(ticker).unwrap();
            assert_eq!(entries.len(), 2);
            assert_eq!(entries[0].signal.signal, "Buy");
            assert_eq!(entries[0].signal.confidence, 80);
            assert_eq!(entries[1].signal.signal, "Neutral");
            assert_eq!(entries[1].signal.confidence, 50);
            assert_eq!(entries[1].signal.reasoning, FALLBACK_REASONING);
        }

        let status = &run.task(&key("MSFT", "wsb_agent")).unwrap().status;
        assert!(matches!(status, TaskStatus::TimedOut { .. }));
        assert_eq!(tracker.snapshot()["wsb_agent"]["MSFT"].message, "fallback");
    }

    #[test]
    fn test_backfill_is_noop_when_complete() {
        let spec = AnalysisRequest::new("AAPL", ["wsb_agent"]).validate().unwrap();
        let mut run = AnalysisRun::new(Uuid::new_v4(), spec, Duration::from_secs(1));
        let task = run.task_mut(&key("AAPL", "wsb_agent")).unwrap();
        task.start();
        task.fail("boom");

        assert_eq!(FallbackGenerator::backfill(&mut run, &ProgressTracker::new()), 0);
        assert_eq!(
            run.task(&key("AAPL", "wsb_agent")).unwrap().status,
            TaskStatus::Failed {
                cause: "boom".to_string()
            }
        );
    }
}
