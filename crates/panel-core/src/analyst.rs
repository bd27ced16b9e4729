//! Analyst catalog
//!
//! The catalog is data, not behavior: it names the personas a request may
//! select. Strategies live behind [`crate::AgentRuntime`].

use crate::error::ValidationError;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

/// Broad strategy family of an analyst
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalystCategory {
    Value,
    Growth,
    Activist,
    Macro,
    Momentum,
    Quantitative,
}

impl fmt::Display for AnalystCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Value => "value",
            Self::Growth => "growth",
            Self::Activist => "activist",
            Self::Macro => "macro",
            Self::Momentum => "momentum",
            Self::Quantitative => "quantitative",
        };
        f.write_str(name)
    }
}

/// A named investment persona
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Analyst {
    pub id: &'static str,
    pub label: &'static str,
    pub category: AnalystCategory,
    pub description: &'static str,
}

impl Analyst {
    const fn new(
        id: &'static str,
        label: &'static str,
        category: AnalystCategory,
        description: &'static str,
    ) -> Self {
        Self {
            id,
            label,
            category,
            description,
        }
    }
}

static CATALOG: LazyLock<AnalystRegistry> = LazyLock::new(|| {
    use AnalystCategory::{Activist, Growth, Macro, Momentum, Quantitative, Value};

    AnalystRegistry {
        analysts: vec![
            Analyst::new(
                "warren_buffett_agent",
                "Warren Buffett",
                Value,
                "Durable competitive advantages bought at a fair price and held for decades",
            ),
            Analyst::new(
                "charlie_munger_agent",
                "Charlie Munger",
                Value,
                "Quality businesses with predictable economics, inverted risk checklists",
            ),
            Analyst::new(
                "ben_graham_agent",
                "Ben Graham",
                Value,
                "Margin of safety against intrinsic value, balance-sheet strength",
            ),
            Analyst::new(
                "bill_ackman_agent",
                "Bill Ackman",
                Activist,
                "Concentrated positions in undervalued franchises with a catalyst for change",
            ),
            Analyst::new(
                "cathie_wood_agent",
                "Cathie Wood",
                Growth,
                "Disruptive innovation and exponential growth over a five-year horizon",
            ),
            Analyst::new(
                "phil_fisher_agent",
                "Phil Fisher",
                Growth,
                "Long-run growth driven by management quality and reinvestment",
            ),
            Analyst::new(
                "peter_lynch_agent",
                "Peter Lynch",
                Growth,
                "Growth at a reasonable price in businesses you can understand",
            ),
            Analyst::new(
                "nancy_pelosi_agent",
                "Nancy Pelosi",
                Macro,
                "Policy and legislative tailwinds, sector rotation around public spending",
            ),
            Analyst::new(
                "wsb_agent",
                "WallStreetBets",
                Momentum,
                "Retail momentum, volume spikes and contrarian squeezes",
            ),
            Analyst::new(
                "technical_analyst_agent",
                "Technical Analyst",
                Quantitative,
                "Trend, moving-average crossovers and RSI on price history",
            ),
            Analyst::new(
                "fundamentals_agent",
                "Fundamentals Analyst",
                Quantitative,
                "Profitability, growth and financial health from reported metrics",
            ),
            Analyst::new(
                "sentiment_agent",
                "Sentiment Analyst",
                Momentum,
                "Market mood from recent returns and trading activity",
            ),
            Analyst::new(
                "valuation_agent",
                "Valuation Analyst",
                Value,
                "Intrinsic value estimates compared with the market price",
            ),
        ],
    }
});

/// Process-wide, read-only catalog of known analysts
#[derive(Debug)]
pub struct AnalystRegistry {
    analysts: Vec<Analyst>,
}

impl AnalystRegistry {
    /// The global catalog, built on first access
    pub fn global() -> &'static AnalystRegistry {
        &CATALOG
    }

    /// All analysts in display order
    pub fn all(&self) -> &[Analyst] {
        &self.analysts
    }

    /// Look up an analyst by id
    pub fn get(&self, id: &str) -> Option<&Analyst> {
        self.analysts.iter().find(|a| a.id == id)
    }

    /// Whether the id names a known analyst
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Validate a selection of analyst ids
    ///
    /// Duplicates collapse to their first occurrence; the returned ids keep
    /// selection order.
    pub fn resolve_selection<S: AsRef<str>>(
        &self,
        selected: &[S],
    ) -> Result<Vec<String>, ValidationError> {
        let mut ids: Vec<String> = Vec::with_capacity(selected.len());

        for raw in selected {
            let id = raw.as_ref().trim();
            if id.is_empty() {
                continue;
            }
            if !self.contains(id) {
                return Err(ValidationError::UnknownAnalyst(id.to_string()));
            }
            if !ids.iter().any(|existing| existing == id) {
                ids.push(id.to_string());
            }
        }

        if ids.is_empty() {
            return Err(ValidationError::NoAnalysts);
        }
        Ok(ids)
    }
}
