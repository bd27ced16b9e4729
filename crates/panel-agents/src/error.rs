//! Error types for agent runtimes

use crate::llm::LLMError;
use thiserror::Error;

/// Errors raised while an agent works on a ticker
#[derive(Debug, Error)]
pub enum AgentsError {
    /// Market data request failed
    #[error("Market data error: {0}")]
    MarketData(String),

    /// Data not available for the requested symbol
    #[error("Data not available for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    /// Technical indicator calculation error
    #[error("Technical indicator error: {0}")]
    Indicator(String),

    /// LLM call failed
    #[error(transparent)]
    Llm(#[from] LLMError),

    /// Prompt template failed to render
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// The model answered with something that is not a signal
    #[error("Unparseable reply: {0}")]
    Parse(String),

    /// No persona registered under this id
    #[error("Unknown analyst: {0}")]
    UnknownAnalyst(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentsError>;

impl AgentsError {
    /// Attribute the error to an analyst as a task-level failure
    pub fn into_failure(self, analyst: &str) -> panel_core::Error {
        panel_core::Error::agent_failure(analyst, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentsError::DataUnavailable {
            symbol: "AAPL".to_string(),
            reason: "No price history".to_string(),
        };
        assert_eq!(err.to_string(), "Data not available for AAPL: No price history");
    }

    #[test]
    fn test_into_failure() {
        let err = AgentsError::MarketData("HTTP 503".to_string()).into_failure("wsb_agent");

        match err {
            panel_core::Error::AgentFailure { analyst, cause } => {
                assert_eq!(analyst, "wsb_agent");
                assert_eq!(cause, "Market data error: HTTP 503");
            }
            other => panic!("Expected AgentFailure, got {other:?}"),
        }
    }
}
