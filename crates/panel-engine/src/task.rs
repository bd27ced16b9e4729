//! Analysis tasks and their status state machine

use chrono::{DateTime, Utc};
use panel_core::{Signal, Ticker};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a task: one ticker paired with one analyst
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    pub ticker: Ticker,
    pub analyst_id: String,
}

impl TaskKey {
    pub fn new(ticker: Ticker, analyst_id: impl Into<String>) -> Self {
        Self {
            ticker,
            analyst_id: analyst_id.into(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ticker, self.analyst_id)
    }
}

/// Lifecycle of a task
///
/// `Pending -> Running -> {Succeeded, Failed, TimedOut}`. A pending task may
/// also go straight to `Failed` (cancelled before it started) or `TimedOut`
/// (backfilled after the run deadline). Terminal states are final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed { cause: String },
    TimedOut { cause: String },
}

impl TaskStatus {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed { .. } | Self::TimedOut { .. }
        )
    }

    /// Short status label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed { .. } => "failed",
            Self::TimedOut { .. } => "timed_out",
        }
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(&self, next: &TaskStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running) => true,
            (Self::Pending, Self::Failed { .. } | Self::TimedOut { .. }) => true,
            (Self::Running, next) => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { cause } => write!(f, "failed: {cause}"),
            Self::TimedOut { cause } => write!(f, "timed out: {cause}"),
            other => f.write_str(other.label()),
        }
    }
}

/// One unit of work inside a run
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisTask {
    pub key: TaskKey,
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub percent: u8,
    pub status_message: String,
    pub result: Option<Signal>,
}

impl AnalysisTask {
    pub fn new(key: TaskKey) -> Self {
        Self {
            key,
            status: TaskStatus::Pending,
            started_at: None,
            finished_at: None,
            percent: 0,
            status_message: "queued".to_string(),
            result: None,
        }
    }

    /// Pending -> Running
    pub fn start(&mut self) -> bool {
        if !self.transition(TaskStatus::Running) {
            return false;
        }
        self.started_at = Some(Utc::now());
        self.percent = 10;
        self.status_message = "started".to_string();
        true
    }

    /// Running -> Succeeded
    pub fn succeed(&mut self, signal: Signal) -> bool {
        if !self.transition(TaskStatus::Succeeded) {
            return false;
        }
        self.result = Some(signal);
        self.finish("done");
        true
    }

    /// Pending | Running -> Failed
    pub fn fail(&mut self, cause: impl Into<String>) -> bool {
        let cause = cause.into();
        let message = format!("failed: {cause}");
        if !self.transition(TaskStatus::Failed { cause }) {
            return false;
        }
        self.finish(message);
        true
    }

    /// Pending | Running -> TimedOut, optionally with a substitute signal
    pub fn time_out(&mut self, cause: impl Into<String>, substitute: Option<Signal>) -> bool {
        let cause = cause.into();
        let message = format!("timed out: {cause}");
        if !self.transition(TaskStatus::TimedOut { cause }) {
            return false;
        }
        self.result = substitute;
        self.finish(message);
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_transition_to(&next) {
            tracing::warn!(
                task = %self.key,
                from = self.status.label(),
                to = next.label(),
                "Ignoring illegal task transition"
            );
            return false;
        }
        self.status = next;
        true
    }

    fn finish(&mut self, message: impl Into<String>) {
        self.finished_at = Some(Utc::now());
        self.percent = 100;
        self.status_message = message.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> AnalysisTask {
        AnalysisTask::new(TaskKey::new(
            Ticker::parse("AAPL").unwrap(),
            "warren_buffett_agent",
        ))
    }

    #[test]
    fn test_happy_path() {
        let mut task = task();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.percent, 0);

        assert!(task.start());
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.percent, 10);
        assert!(task.started_at.is_some());

        assert!(task.succeed(Signal::buy(80, "moat")));
        assert!(task.is_terminal());
        assert_eq!(task.percent, 100);
        assert_eq!(task.result.as_ref().map(|s| s.confidence), Some(80));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut task = task();
        task.start();
        task.fail("boom");

        assert!(!task.succeed(Signal::buy(80, "late")));
        assert!(!task.time_out("late", None));
        assert!(!task.start());
        assert_eq!(
            task.status,
            TaskStatus::Failed {
                cause: "boom".to_string()
            }
        );
        assert!(task.result.is_none());
    }

    #[test]
    fn test_pending_can_fail_without_running() {
        let mut task = task();
        assert!(task.fail("cancelled"));
        assert!(task.started_at.is_none());
        assert_eq!(task.status_message, "failed: cancelled");
    }

    #[test]
    fn test_pending_cannot_succeed() {
        let mut task = task();
        assert!(!task.succeed(Signal::neutral(10, "skipped start")));
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(TaskStatus::TimedOut {
            cause: "60s".to_string(),
        })
        .unwrap();
        assert_eq!(json["state"], "timed_out");
        assert_eq!(json["cause"], "60s");
    }
}
