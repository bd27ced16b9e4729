//! Ticker parsing and validation

use crate::error::{MAX_TICKERS, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_SYMBOL_LEN: usize = 12;

/// A normalized stock symbol (trimmed, upper-case, non-empty)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticker(String);

impl Ticker {
    /// Normalize and validate a single symbol
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let symbol = raw.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(ValidationError::Empty);
        }

        let valid_chars = symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));
        if !valid_chars || symbol.len() > MAX_SYMBOL_LEN {
            return Err(ValidationError::InvalidSymbol(symbol));
        }

        Ok(Self(symbol))
    }

    /// Get the symbol as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Deduplicated, bounded, order-preserving list of tickers for one request
///
/// # Example
///
/// ```
/// use panel_core::TickerSet;
///
/// let set = TickerSet::parse("AAPL, aapl , MSFT").unwrap();
/// assert_eq!(set.symbols(), vec!["AAPL", "MSFT"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TickerSet(Vec<Ticker>);

impl TickerSet {
    /// Parse a raw comma and/or whitespace separated ticker string
    ///
    /// Exceeding [`MAX_TICKERS`] distinct symbols is a rejected request,
    /// never a silent truncation.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let mut tickers: Vec<Ticker> = Vec::new();

        for token in raw
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.trim().is_empty())
        {
            let ticker = Ticker::parse(token)?;
            if !tickers.contains(&ticker) {
                tickers.push(ticker);
            }
        }

        if tickers.is_empty() {
            return Err(ValidationError::Empty);
        }
        if tickers.len() > MAX_TICKERS {
            return Err(ValidationError::TooMany {
                limit: MAX_TICKERS,
                found: tickers.len(),
            });
        }

        Ok(Self(tickers))
    }

    /// Iterate over the tickers in first-seen order
    pub fn iter(&self) -> std::slice::Iter<'_, Ticker> {
        self.0.iter()
    }

    /// Number of distinct tickers
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a parsed set, kept for API symmetry
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Symbols as plain strings
    pub fn symbols(&self) -> Vec<&str> {
        self.0.iter().map(Ticker::as_str).collect()
    }

    /// Borrow the underlying slice
    pub fn as_slice(&self) -> &[Ticker] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a TickerSet {
    type Item = &'a Ticker;
    type IntoIter = std::slice::Iter<'a, Ticker>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
