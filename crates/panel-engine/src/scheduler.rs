//! Bounded fan-out of analysis tasks to an agent runtime
//!
//! Workers acquire a semaphore permit, invoke the runtime under a per-task
//! timeout and report back over a channel. The control loop is the only
//! writer of the run's task map and the progress table; it stops when every
//! worker has reported or when the run deadline elapses, whichever is first.
//! A worker that panics never reports; its task is failed once the channel
//! closes.

use crate::config::EngineConfig;
use crate::progress::ProgressTracker;
use crate::run::AnalysisRun;
use crate::task::{TaskKey, TaskStatus};
use panel_core::{AgentRuntime, Context, Error, Signal};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cause recorded for tasks abandoned by cancellation
pub const CANCELLED_CAUSE: &str = "cancelled";

/// Cause recorded for tasks whose runtime call panicked
pub const PANICKED_CAUSE: &str = "runtime panicked";

/// Scheduler limits
#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub max_concurrency: usize,
    pub task_timeout: Duration,
    pub run_deadline: Duration,
}

impl SchedulerSettings {
    /// Worker pool size for a run with `task_count` tasks
    pub fn concurrency_for(&self, task_count: usize) -> usize {
        self.max_concurrency.min(task_count).max(1)
    }
}

impl From<&EngineConfig> for SchedulerSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency,
            task_timeout: config.task_timeout,
            run_deadline: config.run_deadline,
        }
    }
}

/// How a dispatch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    /// The run deadline fired with tasks still unfinished
    pub deadline_elapsed: bool,
    /// The cancellation token fired during the dispatch
    pub cancelled: bool,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
}

#[derive(Debug)]
enum Outcome {
    Succeeded(Signal),
    Failed(String),
    TimedOut(String),
}

#[derive(Debug)]
enum TaskEvent {
    Started(TaskKey),
    Finished(TaskKey, Outcome),
}

/// Dispatches a run's tasks to an [`AgentRuntime`]
#[derive(Clone)]
pub struct TaskScheduler {
    runtime: Arc<dyn AgentRuntime>,
    settings: SchedulerSettings,
}

impl TaskScheduler {
    pub fn new(runtime: Arc<dyn AgentRuntime>, settings: SchedulerSettings) -> Self {
        Self { runtime, settings }
    }

    pub fn settings(&self) -> SchedulerSettings {
        self.settings
    }

    /// Run every task of `run` to a terminal state or until the deadline
    ///
    /// `context` is the base context; each task receives a copy. Tasks left
    /// unfinished by the deadline stay non-terminal for the caller to
    /// backfill.
    pub async fn dispatch(
        &self,
        run: &mut AnalysisRun,
        context: &Context,
        tracker: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> DispatchReport {
        let task_count = run.task_count();
        let concurrency = self.settings.concurrency_for(task_count);
        let deadline = Instant::now() + self.settings.run_deadline;

        info!(
            run_id = %run.id,
            round = run.round,
            tasks = task_count,
            concurrency,
            "Dispatching analysis tasks"
        );
        tracker.begin_round(run.round, run.keys());

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut workers = JoinSet::new();

        for key in run.keys() {
            let worker = Worker {
                key: key.clone(),
                runtime: Arc::clone(&self.runtime),
                context: context.clone(),
                timeout: self.settings.task_timeout,
                semaphore: Arc::clone(&semaphore),
                cancel: cancel.clone(),
                events: tx.clone(),
            };
            workers.spawn(worker.run());
        }
        drop(tx);

        let mut report = DispatchReport::default();
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => apply(run, tracker, event, &mut report),
                    None => {
                        reap_panicked(run, tracker, &mut workers, &mut report).await;
                        break;
                    }
                },
                () = &mut sleep => {
                    let unfinished = run.unfinished().len();
                    warn!(
                        run_id = %run.id,
                        round = run.round,
                        unfinished,
                        "Run deadline elapsed, abandoning unfinished tasks"
                    );
                    report.deadline_elapsed = unfinished > 0;
                    workers.abort_all();
                    break;
                }
            }
        }

        report.cancelled = cancel.is_cancelled();
        info!(
            run_id = %run.id,
            round = run.round,
            succeeded = report.succeeded,
            failed = report.failed,
            timed_out = report.timed_out,
            deadline_elapsed = report.deadline_elapsed,
            cancelled = report.cancelled,
            "Dispatch finished"
        );
        report
    }
}

/// Fail every task still open after all workers hung up
///
/// Only a worker that panicked can exit without reporting.
async fn reap_panicked(
    run: &mut AnalysisRun,
    tracker: &ProgressTracker,
    workers: &mut JoinSet<()>,
    report: &mut DispatchReport,
) {
    while let Some(joined) = workers.join_next().await {
        if let Err(err) = joined {
            if err.is_panic() {
                warn!(run_id = %run.id, round = run.round, "Analysis worker panicked");
            }
        }
    }

    for key in run.unfinished() {
        let Some(task) = run.task_mut(&key) else {
            continue;
        };
        if task.fail(PANICKED_CAUSE) {
            warn!(task = %key, "Task failed: runtime panicked");
            report.failed += 1;
            tracker.update(&key, task.percent, task.status_message.clone(), &task.status);
        }
    }
}

fn apply(
    run: &mut AnalysisRun,
    tracker: &ProgressTracker,
    event: TaskEvent,
    report: &mut DispatchReport,
) {
    match event {
        TaskEvent::Started(key) => {
            let Some(task) = run.task_mut(&key) else {
                return;
            };
            if task.start() {
                debug!(task = %key, "Task started");
                tracker.update(&key, task.percent, task.status_message.clone(), &task.status);
            }
        }
        TaskEvent::Finished(key, outcome) => {
            let Some(task) = run.task_mut(&key) else {
                return;
            };
            let applied = match outcome {
                Outcome::Succeeded(signal) => {
                    report.succeeded += 1;
                    task.succeed(signal)
                }
                Outcome::Failed(cause) => {
                    warn!(task = %key, %cause, "Task failed");
                    report.failed += 1;
                    task.fail(cause)
                }
                Outcome::TimedOut(cause) => {
                    warn!(task = %key, %cause, "Task timed out");
                    report.timed_out += 1;
                    task.time_out(cause, None)
                }
            };
            if applied {
                tracker.update(&key, task.percent, task.status_message.clone(), &task.status);
            }
        }
    }
}

struct Worker {
    key: TaskKey,
    runtime: Arc<dyn AgentRuntime>,
    context: Context,
    timeout: Duration,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<TaskEvent>,
}

impl Worker {
    async fn run(self) {
        let permit = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok(),
        };
        let Some(_permit) = permit else {
            self.finish(Outcome::Failed(CANCELLED_CAUSE.to_string()));
            return;
        };
        if self.cancel.is_cancelled() {
            self.finish(Outcome::Failed(CANCELLED_CAUSE.to_string()));
            return;
        }

        if self.events.send(TaskEvent::Started(self.key.clone())).is_err() {
            return;
        }

        let call = self
            .runtime
            .analyze(&self.key.ticker, &self.key.analyst_id, &self.context);
        let outcome = tokio::select! {
            biased;
            () = self.cancel.cancelled() => Outcome::Failed(CANCELLED_CAUSE.to_string()),
            result = tokio::time::timeout(self.timeout, call) => match result {
                Ok(Ok(signal)) => Outcome::Succeeded(signal),
                Ok(Err(err)) => Outcome::Failed(failure_cause(&err)),
                Err(_) => Outcome::TimedOut(format!(
                    "no response within {}ms",
                    self.timeout.as_millis()
                )),
            },
        };
        self.finish(outcome);
    }

    fn finish(&self, outcome: Outcome) {
        let _ = self.events.send(TaskEvent::Finished(self.key.clone(), outcome));
    }
}

/// Cause text without the "<analyst> failed:" prefix the aggregator adds
fn failure_cause(err: &Error) -> String {
    match err {
        Error::AgentFailure { cause, .. } => cause.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::{AnalysisRequest, AnalysisRun};
    use async_trait::async_trait;
    use panel_core::{MockAgentRuntime, Ticker};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn is_cancelled(status: &TaskStatus) -> bool {
        matches!(status, TaskStatus::Failed { cause } if cause == CANCELLED_CAUSE)
    }

    /// Runtime with a scripted latency and answer per analyst
    struct ScriptedRuntime {
        script: HashMap<&'static str, (Duration, Option<Signal>)>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedRuntime {
        fn new(script: &[(&'static str, u64, Option<Signal>)]) -> Self {
            Self {
                script: script
                    .iter()
                    .map(|(id, ms, signal)| (*id, (Duration::from_millis(*ms), signal.clone())))
                    .collect(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AgentRuntime for ScriptedRuntime {
        async fn analyze(
            &self,
            _ticker: &Ticker,
            analyst_id: &str,
            _context: &Context,
        ) -> panel_core::Result<Signal> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let (delay, signal) = self.script.get(analyst_id).cloned().unwrap_or_default();
            tokio::time::sleep(delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            signal.ok_or_else(|| Error::agent_failure(analyst_id, "scripted failure"))
        }
    }

    fn settings(concurrency: usize, task_ms: u64, run_ms: u64) -> SchedulerSettings {
        SchedulerSettings {
            max_concurrency: concurrency,
            task_timeout: Duration::from_millis(task_ms),
            run_deadline: Duration::from_millis(run_ms),
        }
    }

    fn run(tickers: &str, analysts: &[&str]) -> AnalysisRun {
        let spec = AnalysisRequest::new(tickers, analysts.iter().copied())
            .validate()
            .unwrap();
        AnalysisRun::new(Uuid::new_v4(), spec, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_all_tasks_succeed() {
        let mut mock = MockAgentRuntime::new();
        mock.expect_analyze()
            .times(4)
            .returning(|_, _, _| Ok(Signal::buy(70, "cheap")));

        let scheduler = TaskScheduler::new(Arc::new(mock), settings(8, 1_000, 5_000));
        let mut run = run("AAPL MSFT", &["warren_buffett_agent", "wsb_agent"]);
        let tracker = ProgressTracker::new();

        let context = run.context();
        let report = scheduler
            .dispatch(&mut run, &context, &tracker, &CancellationToken::new())
            .await;

        assert_eq!(report.succeeded, 4);
        assert!(!report.deadline_elapsed);
        assert!(run.all_terminal());
        for task in run.tasks() {
            assert_eq!(task.status, TaskStatus::Succeeded);
        }
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot["wsb_agent"]["MSFT"].percent, 100);
        assert_eq!(snapshot["wsb_agent"]["MSFT"].message, "done");
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let mut mock = MockAgentRuntime::new();
        mock.expect_analyze().returning(|_, analyst, _| {
            if analyst == "wsb_agent" {
                Err(Error::agent_failure(analyst, "rate limited"))
            } else {
                Ok(Signal::sell(60, "expensive"))
            }
        });

        let scheduler = TaskScheduler::new(Arc::new(mock), settings(8, 1_000, 5_000));
        let mut run = run("AAPL", &["ben_graham_agent", "wsb_agent"]);

        let context = run.context();
        let report = scheduler
            .dispatch(&mut run, &context, &ProgressTracker::new(), &CancellationToken::new())
            .await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        let statuses: Vec<_> = run.tasks().map(|t| t.status.clone()).collect();
        assert_eq!(statuses[0], TaskStatus::Succeeded);
        assert_eq!(
            statuses[1],
            TaskStatus::Failed {
                cause: "rate limited".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_task_timeout() {
        let runtime = ScriptedRuntime::new(&[
            ("warren_buffett_agent", 100, Some(Signal::buy(80, "moat"))),
            ("wsb_agent", 10_000, Some(Signal::buy(99, "rocket"))),
        ]);
        let scheduler = TaskScheduler::new(Arc::new(runtime), settings(8, 1_000, 5_000));
        let mut run = run("AAPL", &["warren_buffett_agent", "wsb_agent"]);

        let context = run.context();
        let report = scheduler
            .dispatch(&mut run, &context, &ProgressTracker::new(), &CancellationToken::new())
            .await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.timed_out, 1);
        assert!(!report.deadline_elapsed);
        let slow = run.tasks().nth(1).unwrap();
        assert_eq!(slow.status.label(), "timed_out");
        assert!(slow.result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_deadline_leaves_unfinished_tasks() {
        let runtime = ScriptedRuntime::new(&[
            ("warren_buffett_agent", 100, Some(Signal::buy(80, "moat"))),
            ("wsb_agent", 4_000, Some(Signal::buy(99, "rocket"))),
        ]);
        let scheduler = TaskScheduler::new(Arc::new(runtime), settings(8, 5_000, 3_000));
        let mut run = run("AAPL MSFT", &["warren_buffett_agent", "wsb_agent"]);

        let context = run.context();
        let report = scheduler
            .dispatch(&mut run, &context, &ProgressTracker::new(), &CancellationToken::new())
            .await;

        assert!(report.deadline_elapsed);
        assert_eq!(report.succeeded, 2);
        assert_eq!(run.unfinished().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let runtime = Arc::new(ScriptedRuntime::new(&[
            ("warren_buffett_agent", 200, Some(Signal::buy(80, "moat"))),
            ("wsb_agent", 200, Some(Signal::buy(90, "rocket"))),
            ("ben_graham_agent", 200, Some(Signal::neutral(50, "fair"))),
        ]));
        let scheduler = TaskScheduler::new(runtime.clone(), settings(2, 1_000, 10_000));
        let mut run = run(
            "AAPL MSFT NVDA",
            &["warren_buffett_agent", "wsb_agent", "ben_graham_agent"],
        );

        let context = run.context();
        let report = scheduler
            .dispatch(&mut run, &context, &ProgressTracker::new(), &CancellationToken::new())
            .await;

        assert_eq!(report.succeeded, 9);
        assert_eq!(runtime.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_marks_everything_failed() {
        let runtime = ScriptedRuntime::new(&[("wsb_agent", 10_000, Some(Signal::buy(99, "rocket")))]);
        let scheduler = TaskScheduler::new(Arc::new(runtime), settings(1, 20_000, 60_000));
        let mut run = run("AAPL MSFT", &["wsb_agent"]);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let context = run.context();
        let report = scheduler
            .dispatch(&mut run, &context, &ProgressTracker::new(), &cancel)
            .await;

        assert!(report.cancelled);
        assert!(run.all_terminal());
        let first = run.tasks().next().unwrap();
        assert!(first.started_at.is_some());
        assert!(is_cancelled(&first.status));
        // Never got a permit, never invoked the runtime
        let second = run.tasks().nth(1).unwrap();
        assert!(second.started_at.is_none());
        assert!(is_cancelled(&second.status));
    }

    /// Panics for one analyst, answers for everyone else
    struct PanicsFor(&'static str);

    #[async_trait]
    impl AgentRuntime for PanicsFor {
        async fn analyze(
            &self,
            _ticker: &Ticker,
            analyst_id: &str,
            _context: &Context,
        ) -> panel_core::Result<Signal> {
            assert_ne!(analyst_id, self.0, "runtime blew up");
            Ok(Signal::buy(70, "fine"))
        }
    }

    #[tokio::test]
    async fn test_panicking_runtime_fails_its_task() {
        let scheduler =
            TaskScheduler::new(Arc::new(PanicsFor("wsb_agent")), settings(8, 1_000, 5_000));
        let mut run = run("AAPL", &["warren_buffett_agent", "wsb_agent"]);
        let tracker = ProgressTracker::new();

        let context = run.context();
        let report = scheduler
            .dispatch(&mut run, &context, &tracker, &CancellationToken::new())
            .await;

        assert!(!report.deadline_elapsed);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert!(run.all_terminal());
        assert_eq!(
            run.tasks().nth(1).unwrap().status,
            TaskStatus::Failed {
                cause: PANICKED_CAUSE.to_string()
            }
        );
        assert_eq!(tracker.snapshot()["wsb_agent"]["AAPL"].percent, 100);
    }

    #[test]
    fn test_concurrency_for() {
        let settings = SchedulerSettings::from(&EngineConfig::default());
        assert_eq!(settings.concurrency_for(3), 3);
        assert_eq!(settings.concurrency_for(39), 8);
        assert_eq!(settings.concurrency_for(0), 1);
    }

    #[tokio::test]
    async fn test_context_is_forwarded() {
        let mut mock = MockAgentRuntime::new();
        mock.expect_analyze()
            .withf(|ticker, analyst, ctx| {
                ticker.as_str() == "AAPL" && analyst == "wsb_agent" && ctx.round() == 2
            })
            .times(1)
            .returning(|_, _, _| Ok(Signal::neutral(40, "wait")));

        let scheduler = TaskScheduler::new(Arc::new(mock), settings(8, 1_000, 5_000));
        let mut run = run("AAPL", &["wsb_agent"]);
        let context = run.context().with_round(2);

        let report = scheduler
            .dispatch(&mut run, &context, &ProgressTracker::new(), &CancellationToken::new())
            .await;
        assert_eq!(report.succeeded, 1);
    }
}
