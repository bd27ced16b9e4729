//! Execution context handed to agent runtimes
//!
//! The `Context` struct is a key-value store for per-call information: the
//! analysis window, the round-table round and the statements peers made in
//! the previous round.

use crate::signal::Signal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Well-known context keys
pub mod keys {
    /// Language preference (e.g., "en", "zh")
    pub const LANGUAGE: &str = "language";
    /// Identifier of the owning run
    pub const RUN_ID: &str = "run_id";
    /// Round-table round number (0 = opening)
    pub const ROUND: &str = "round";
    /// Previous round's statements, keyed by ticker
    pub const PRIOR_STATEMENTS: &str = "prior_statements";
    /// Inclusive start of the analysis window
    pub const START_DATE: &str = "start_date";
    /// Inclusive end of the analysis window
    pub const END_DATE: &str = "end_date";
}

/// What one analyst said about one ticker in a round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub analyst_id: String,
    #[serde(flatten)]
    pub signal: Signal,
}

impl Statement {
    pub fn new(analyst_id: impl Into<String>, signal: Signal) -> Self {
        Self {
            analyst_id: analyst_id.into(),
            signal,
        }
    }
}

/// Context passed to agent runtimes
///
/// # Example
///
/// ```
/// use panel_core::Context;
///
/// let ctx = Context::new().with_language("en").with_round(2);
///
/// assert_eq!(ctx.language(), Some("en"));
/// assert_eq!(ctx.round(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    data: HashMap<String, serde_json::Value>,
}

impl Context {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    // =========== Builder Methods ===========

    /// Set the language preference
    pub fn with_language(mut self, lang: impl Into<String>) -> Self {
        self.insert(keys::LANGUAGE, serde_json::json!(lang.into()));
        self
    }

    /// Set the owning run id
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.insert(keys::RUN_ID, serde_json::json!(run_id.into()));
        self
    }

    /// Set the round-table round
    pub fn with_round(mut self, round: u32) -> Self {
        self.set_round(round);
        self
    }

    /// Set the analysis window; `None` bounds are left unset
    pub fn with_window(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        if let Some(start) = start {
            self.insert(keys::START_DATE, serde_json::json!(start));
        }
        if let Some(end) = end {
            self.insert(keys::END_DATE, serde_json::json!(end));
        }
        self
    }

    // =========== Common Accessors ===========

    /// Get the language preference
    pub fn language(&self) -> Option<&str> {
        self.get(keys::LANGUAGE).and_then(|v| v.as_str())
    }

    /// Get the owning run id
    pub fn run_id(&self) -> Option<&str> {
        self.get(keys::RUN_ID).and_then(|v| v.as_str())
    }

    /// Round-table round, 0 when absent
    pub fn round(&self) -> u32 {
        self.get(keys::ROUND)
            .and_then(serde_json::Value::as_u64)
            .and_then(|r| u32::try_from(r).ok())
            .unwrap_or(0)
    }

    /// Set the round-table round
    pub fn set_round(&mut self, round: u32) {
        self.insert(keys::ROUND, serde_json::json!(round));
    }

    /// Start of the analysis window
    pub fn start_date(&self) -> Option<NaiveDate> {
        self.get_typed(keys::START_DATE).ok().flatten()
    }

    /// End of the analysis window
    pub fn end_date(&self) -> Option<NaiveDate> {
        self.get_typed(keys::END_DATE).ok().flatten()
    }

    /// Replace the previous round's statements
    pub fn set_prior_statements(
        &mut self,
        statements: &HashMap<String, Vec<Statement>>,
    ) -> crate::Result<()> {
        self.insert_typed(keys::PRIOR_STATEMENTS, statements)
    }

    /// Previous round's statements for a ticker, empty outside round-table mode
    pub fn prior_statements(&self, ticker: &str) -> Vec<Statement> {
        self.get_typed::<HashMap<String, Vec<Statement>>>(keys::PRIOR_STATEMENTS)
            .ok()
            .flatten()
            .and_then(|mut all| all.remove(ticker))
            .unwrap_or_default()
    }

    // =========== Generic Key-Value Operations ===========

    /// Insert a value into the context
    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    /// Get a value from the context
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Insert a typed value into the context
    pub fn insert_typed<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> crate::Result<()> {
        let json_value = serde_json::to_value(value).map_err(|e| {
            crate::Error::Internal(format!("Failed to serialize context value: {e}"))
        })?;
        self.data.insert(key.into(), json_value);
        Ok(())
    }

    /// Get a typed value from the context
    pub fn get_typed<T: for<'de> Deserialize<'de>>(&self, key: &str) -> crate::Result<Option<T>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(value) => {
                let typed = serde_json::from_value(value.clone()).map_err(|e| {
                    crate::Error::Internal(format!("Failed to deserialize context value: {e}"))
                })?;
                Ok(Some(typed))
            }
        }
    }

    /// Check if a key exists in the context
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Number of entries in the context
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the context is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Direction;

    #[test]
    fn test_basic_operations() {
        let mut ctx = Context::new();
        assert!(ctx.is_empty());

        ctx.insert("key", serde_json::json!("value"));
        assert_eq!(ctx.len(), 1);
        assert!(ctx.contains_key("key"));
        assert_eq!(ctx.get("key"), Some(&serde_json::json!("value")));
    }

    #[test]
    fn test_round_defaults_to_opening() {
        let mut ctx = Context::new();
        assert_eq!(ctx.round(), 0);

        ctx.set_round(3);
        assert_eq!(ctx.round(), 3);
    }

    #[test]
    fn test_window() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2);
        let end = NaiveDate::from_ymd_opt(2024, 6, 28);
        let ctx = Context::new().with_window(start, end);
        assert_eq!(ctx.start_date(), start);
        assert_eq!(ctx.end_date(), end);

        let ctx = Context::new().with_window(None, end);
        assert!(!ctx.contains_key(keys::START_DATE));
        assert_eq!(ctx.start_date(), None);
    }

    #[test]
    fn test_prior_statements_by_ticker() {
        let mut statements = HashMap::new();
        statements.insert(
            "AAPL".to_string(),
            vec![
                Statement::new("warren_buffett_agent", Signal::buy(80, "moat")),
                Statement::new("wsb_agent", Signal::sell(40, "too boring")),
            ],
        );

        let mut ctx = Context::new().with_round(1);
        ctx.set_prior_statements(&statements).unwrap();

        let aapl = ctx.prior_statements("AAPL");
        assert_eq!(aapl.len(), 2);
        assert_eq!(aapl[1].signal.signal, Direction::Sell);
        assert!(ctx.prior_statements("MSFT").is_empty());
    }

    #[test]
    fn test_statement_flattens_signal() {
        let json =
            serde_json::to_value(Statement::new("wsb_agent", Signal::neutral(10, "meh"))).unwrap();
        assert_eq!(json["analyst_id"], "wsb_agent");
        assert_eq!(json["signal"], "neutral");
        assert_eq!(json["confidence"], 10);
    }

    #[test]
    fn test_get_typed_missing_key() {
        let ctx = Context::new();
        let result: crate::Result<Option<u32>> = ctx.get_typed("missing");
        assert!(result.unwrap().is_none());
    }
}
