//! Merging task results into per-ticker responses

use crate::response::{AnalystSignal, RenderedSignal, TickerAnalysesResponse, TickerMap};
use crate::run::AnalysisRun;
use crate::task::{AnalysisTask, TaskStatus};
use panel_core::{Direction, Signal, SignalLabels, Statement, clamp_confidence};
use uuid::Uuid;

/// Outcome of a plurality vote over a set of signals
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Consensus {
    pub direction: Direction,
    /// Rounded mean confidence of the analysts backing `direction`
    pub confidence: u8,
    /// Analysts backing `direction`
    pub votes: usize,
    /// Size of the largest voting bloc
    pub top_votes: usize,
    pub total: usize,
    /// Two or more directions shared the top vote count
    pub tied: bool,
}

impl Consensus {
    /// Fraction of analysts sharing the majority direction
    pub fn agreement_ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.top_votes as f64 / self.total as f64
    }
}

/// Plurality vote; ties resolve to `Neutral`
///
/// The confidence is the mean of the winning voters only. A tie yields the
/// mean of the neutral voters, or 0 when nobody voted neutral.
pub fn consensus<'a>(signals: impl IntoIterator<Item = &'a Signal>) -> Consensus {
    let signals: Vec<&Signal> = signals.into_iter().collect();
    let count = |d: Direction| signals.iter().filter(|s| s.signal == d).count();

    let top_votes = Direction::ALL.iter().map(|d| count(*d)).max().unwrap_or(0);
    let leaders: Vec<Direction> = Direction::ALL
        .iter()
        .copied()
        .filter(|d| count(*d) == top_votes)
        .collect();

    let tied = leaders.len() > 1;
    let direction = match leaders.as_slice() {
        [only] => *only,
        _ => Direction::Neutral,
    };

    let backers: Vec<u8> = signals
        .iter()
        .filter(|s| s.signal == direction)
        .map(|s| s.confidence)
        .collect();
    let confidence = if backers.is_empty() {
        0
    } else {
        let sum: u32 = backers.iter().map(|c| u32::from(*c)).sum();
        clamp_confidence(f64::from(sum) / backers.len() as f64)
    };

    Consensus {
        direction,
        confidence,
        votes: backers.len(),
        top_votes,
        total: signals.len(),
        tied,
    }
}

/// The signal a terminal task contributes to the response
///
/// Failed and timed-out tasks without a substitute are replaced by a
/// zero-confidence neutral signal naming the cause.
pub fn resolve_signal(task: &AnalysisTask) -> Signal {
    let analyst = &task.key.analyst_id;
    match (&task.status, &task.result) {
        (TaskStatus::Succeeded | TaskStatus::TimedOut { .. }, Some(signal)) => signal.clone(),
        (TaskStatus::Failed { cause } | TaskStatus::TimedOut { cause }, _) => {
            failure_signal(analyst, cause)
        }
        _ => failure_signal(analyst, "did not complete"),
    }
}

/// Neutral, zero-confidence replacement for a failed task
pub fn failure_signal(analyst: &str, cause: &str) -> Signal {
    Signal::neutral(0, format!("{analyst} failed: {cause}"))
}

/// Builds responses from finished runs
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAggregator {
    labels: SignalLabels,
}

impl ResultAggregator {
    pub fn new(labels: SignalLabels) -> Self {
        Self { labels }
    }

    pub fn labels(&self) -> SignalLabels {
        self.labels
    }

    /// Resolved statements per ticker, in analyst-selection order
    pub fn statements(run: &AnalysisRun) -> TickerMap<Vec<Statement>> {
        let mut statements = TickerMap::new();
        for ticker in &run.spec.tickers {
            let entries = run
                .tasks()
                .filter(|task| &task.key.ticker == ticker)
                .map(|task| Statement::new(task.key.analyst_id.clone(), resolve_signal(task)))
                .collect();
            statements.insert(ticker.clone(), entries);
        }
        statements
    }

    /// Aggregate a run whose tasks are all terminal
    pub fn aggregate(&self, run: &AnalysisRun, partial: bool) -> TickerAnalysesResponse {
        self.render(
            run.id,
            &Self::statements(run),
            run.spec.is_single_analyst(),
            partial,
        )
    }

    /// Render resolved statements into the response shape
    pub fn render(
        &self,
        run_id: Uuid,
        statements: &TickerMap<Vec<Statement>>,
        single_analyst: bool,
        partial: bool,
    ) -> TickerAnalysesResponse {
        TickerAnalysesResponse {
            run_id,
            ticker_analyses: self.entries(statements),
            overall: statements.map(|_, entries| {
                RenderedSignal::render(&Self::overall(entries, single_analyst), self.labels)
            }),
            partial,
        }
    }

    /// Render statements as client entries
    pub fn entries(&self, statements: &TickerMap<Vec<Statement>>) -> TickerMap<Vec<AnalystSignal>> {
        statements.map(|_, entries| {
            entries
                .iter()
                .map(|statement| AnalystSignal {
                    agent_name: statement.analyst_id.clone(),
                    signal: RenderedSignal::render(&statement.signal, self.labels),
                })
                .collect()
        })
    }

    /// The overall signal for one ticker
    pub fn overall(statements: &[Statement], single_analyst: bool) -> Signal {
        if single_analyst {
            if let [only] = statements {
                return only.signal.clone();
            }
        }

        let vote = consensus(statements.iter().map(|s| &s.signal));
        let reasoning = if vote.tied {
            format!(
                "no majority among {} analysts, defaulting to {}",
                vote.total, vote.direction
            )
        } else {
            format!(
                "{} of {} analysts say {}",
                vote.votes, vote.total, vote.direction
            )
        };
        Signal::new(vote.direction, vote.confidence, reasoning)
    }
}
