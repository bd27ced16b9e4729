//! Error types for panel-core
//!
//! The variants follow the failure taxonomy of an analysis run: validation
//! failures are rejected before any work is scheduled, agent failures and
//! timeouts are absorbed per task, cancellation terminates the run.

use thiserror::Error;

/// Result type alias for panel-core
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum number of distinct tickers a single request may carry
pub const MAX_TICKERS: usize = 3;

/// Input rejected before any task is created
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// No ticker survived parsing
    #[error("no tickers provided")]
    Empty,

    /// More distinct tickers than a request may carry
    #[error("too many tickers: {found} provided, at most {limit} allowed")]
    TooMany { limit: usize, found: usize },

    /// More debate rounds than the server allows
    #[error("too many debate rounds: {found} requested, at most {limit} allowed")]
    TooManyRounds { limit: u32, found: u32 },

    /// Symbol with characters or length no exchange uses
    #[error("invalid ticker symbol: {0}")]
    InvalidSymbol(String),

    /// No analyst selected
    #[error("no analysts selected")]
    NoAnalysts,

    /// Analyst id missing from the catalog
    #[error("unknown analyst: {0}")]
    UnknownAnalyst(String),

    /// Malformed or inverted analysis window
    #[error("invalid date range: {0}")]
    InvalidDateRange(String),

    /// Client-chosen run id already names a live run
    #[error("run already in progress: {0}")]
    RunInProgress(String),
}

impl ValidationError {
    /// Stable machine-readable tag for API payloads
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::TooMany { .. } => "too_many",
            Self::TooManyRounds { .. } => "too_many_rounds",
            Self::InvalidSymbol(_) => "invalid_symbol",
            Self::NoAnalysts => "no_analysts",
            Self::UnknownAnalyst(_) => "unknown_analyst",
            Self::InvalidDateRange(_) => "invalid_date_range",
            Self::RunInProgress(_) => "run_in_progress",
        }
    }
}

/// Error type for panel operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or out-of-bounds request
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A single agent call failed
    #[error("{analyst} failed: {cause}")]
    AgentFailure { analyst: String, cause: String },

    /// An operation exceeded its time budget
    #[error("timed out: {0}")]
    Timeout(String),

    /// The caller aborted the run
    #[error("run cancelled")]
    Cancelled,

    /// Unexpected internal fault
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build an agent failure for the given analyst
    pub fn agent_failure(analyst: impl Into<String>, cause: impl ToString) -> Self {
        Self::AgentFailure {
            analyst: analyst.into(),
            cause: cause.to_string(),
        }
    }

    /// Whether the error is a rejected request rather than a fault
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
