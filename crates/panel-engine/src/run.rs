//! Analysis requests and runs

use crate::task::{AnalysisTask, TaskKey};
use chrono::{DateTime, NaiveDate, Utc};
use panel_core::{AnalystRegistry, Context, SignalLabels, TickerSet, ValidationError};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Client request for an analysis or a round table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    /// Raw ticker input; a comma/space separated string or a list
    #[serde(default, deserialize_with = "string_or_list")]
    pub tickers: String,

    /// Analyst ids in display order
    #[serde(default)]
    pub selected_analysts: Vec<String>,

    /// Optional window start (YYYY-MM-DD)
    #[serde(default)]
    pub start_date: Option<String>,

    /// Optional window end (YYYY-MM-DD)
    #[serde(default)]
    pub end_date: Option<String>,

    /// Client-chosen run id for progress polling and cancellation
    #[serde(default)]
    pub run_id: Option<Uuid>,

    /// Round-table only: fewer debate rounds than configured
    #[serde(default)]
    pub max_rounds: Option<u32>,
}

impl AnalysisRequest {
    pub fn new<S: Into<String>>(
        tickers: impl Into<String>,
        analysts: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            tickers: tickers.into(),
            selected_analysts: analysts.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Validate the request against the analyst catalog
    pub fn validate(&self) -> Result<RunSpec, ValidationError> {
        let tickers = TickerSet::parse(&self.tickers)?;
        let analysts = AnalystRegistry::global().resolve_selection(&self.selected_analysts)?;
        let window = AnalysisWindow::parse(self.start_date.as_deref(), self.end_date.as_deref())?;

        Ok(RunSpec {
            tickers,
            analysts,
            window,
        })
    }
}

fn string_or_list<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::One(raw) => raw,
        Raw::Many(list) => list.join(","),
    })
}

/// Optional, inclusive date bounds for the analysis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl AnalysisWindow {
    /// Parse `YYYY-MM-DD` bounds; blank strings count as absent
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, ValidationError> {
        let start = parse_date("start", start)?;
        let end = parse_date("end", end)?;

        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(ValidationError::InvalidDateRange(format!(
                    "start date {s} is after end date {e}"
                )));
            }
        }

        Ok(Self { start, end })
    }
}

fn parse_date(which: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, ValidationError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, DATE_FORMAT).map(Some).map_err(|_| {
            ValidationError::InvalidDateRange(format!("{which} date must be YYYY-MM-DD, got {s}"))
        }),
    }
}

/// A validated request: what a run is built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub tickers: TickerSet,
    pub analysts: Vec<String>,
    pub window: AnalysisWindow,
}

impl RunSpec {
    /// Number of tasks a fan-out of this spec produces
    pub fn task_count(&self) -> usize {
        self.tickers.len() * self.analysts.len()
    }

    /// Whether the ticker aggregate is a pass-through of a single analyst
    pub fn is_single_analyst(&self) -> bool {
        self.analysts.len() == 1
    }
}

/// The full set of tasks spawned by one fan-out
///
/// The task set is fixed at creation; tasks can only change status.
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    pub id: Uuid,
    pub spec: RunSpec,
    pub round: u32,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    /// Label set of the response; also picks the agents' language
    pub labels: SignalLabels,
    tasks: HashMap<TaskKey, AnalysisTask>,
    order: Vec<TaskKey>,
}

impl AnalysisRun {
    /// Fan a spec out into one pending task per (ticker, analyst) pair
    ///
    /// Order is tickers outer, analysts inner.
    pub fn new(id: Uuid, spec: RunSpec, budget: Duration) -> Self {
        let created_at = Utc::now();
        let deadline = chrono::Duration::from_std(budget)
            .ok()
            .and_then(|d| created_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut tasks = HashMap::with_capacity(spec.task_count());
        let mut order = Vec::with_capacity(spec.task_count());
        for ticker in &spec.tickers {
            for analyst_id in &spec.analysts {
                let key = TaskKey::new(ticker.clone(), analyst_id.clone());
                tasks.insert(key.clone(), AnalysisTask::new(key.clone()));
                order.push(key);
            }
        }

        Self {
            id,
            spec,
            round: 0,
            created_at,
            deadline,
            labels: SignalLabels::default(),
            tasks,
            order,
        }
    }

    pub fn with_labels(mut self, labels: SignalLabels) -> Self {
        self.labels = labels;
        self
    }

    /// A fresh run with the same shape, for the next round-table round
    pub fn next_round(&self, budget: Duration) -> Self {
        let mut run = Self::new(self.id, self.spec.clone(), budget).with_labels(self.labels);
        run.round = self.round + 1;
        run
    }

    pub fn task_count(&self) -> usize {
        self.order.len()
    }

    /// Task keys in fan-out order
    pub fn keys(&self) -> &[TaskKey] {
        &self.order
    }

    /// Tasks in fan-out order
    pub fn tasks(&self) -> impl Iterator<Item = &AnalysisTask> {
        self.order.iter().filter_map(|key| self.tasks.get(key))
    }

    pub fn task(&self, key: &TaskKey) -> Option<&AnalysisTask> {
        self.tasks.get(key)
    }

    pub fn task_mut(&mut self, key: &TaskKey) -> Option<&mut AnalysisTask> {
        self.tasks.get_mut(key)
    }

    /// Keys of tasks not yet in a terminal state
    pub fn unfinished(&self) -> Vec<TaskKey> {
        self.tasks()
            .filter(|t| !t.is_terminal())
            .map(|t| t.key.clone())
            .collect()
    }

    pub fn all_terminal(&self) -> bool {
        self.tasks.values().all(AnalysisTask::is_terminal)
    }

    /// Base context for every task in this run
    pub fn context(&self) -> Context {
        Context::new()
            .with_run_id(self.id.to_string())
            .with_round(self.round)
            .with_language(self.labels.language())
            .with_window(self.spec.window.start, self.spec.window.end)
    }
}
