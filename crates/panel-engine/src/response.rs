//! Response payloads
//!
//! Field names follow the wire format the web client reads
//! (`ticker_analyses`, `agent_name`, ...).

use panel_core::{Direction, Signal, SignalLabels, Ticker};
use serde::ser::{Serialize, SerializeMap, Serializer};
use uuid::Uuid;

/// Ticker-keyed map that keeps request order when serialized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerMap<T>(Vec<(Ticker, T)>);

impl<T> Default for TickerMap<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> TickerMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the value for a ticker, keeping its first position
    pub fn insert(&mut self, ticker: Ticker, value: T) {
        match self.0.iter_mut().find(|(t, _)| *t == ticker) {
            Some((_, existing)) => *existing = value,
            None => self.0.push((ticker, value)),
        }
    }

    pub fn get(&self, ticker: &str) -> Option<&T> {
        self.0
            .iter()
            .find(|(t, _)| t.as_str() == ticker)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Ticker, &T)> {
        self.0.iter().map(|(t, v)| (t, v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Transform every value, keeping order
    pub fn map<U>(&self, mut f: impl FnMut(&Ticker, &T) -> U) -> TickerMap<U> {
        TickerMap(self.0.iter().map(|(t, v)| (t.clone(), f(t, v))).collect())
    }
}

impl<T: Serialize> Serialize for TickerMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (ticker, value) in &self.0 {
            map.serialize_entry(ticker.as_str(), value)?;
        }
        map.end()
    }
}

/// A signal rendered for clients with the configured labels
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RenderedSignal {
    pub signal: String,
    pub confidence: u8,
    pub reasoning: String,
    #[serde(skip)]
    pub direction: Direction,
}

impl RenderedSignal {
    pub fn render(signal: &Signal, labels: SignalLabels) -> Self {
        Self {
            signal: signal.signal.label(labels).to_string(),
            confidence: signal.confidence,
            reasoning: signal.reasoning.clone(),
            direction: signal.signal,
        }
    }
}

/// One analyst's entry for one ticker
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AnalystSignal {
    pub agent_name: String,
    #[serde(flatten)]
    pub signal: RenderedSignal,
}

/// Result of a single fan-out
#[derive(Debug, Clone, serde::Serialize)]
pub struct TickerAnalysesResponse {
    pub run_id: Uuid,
    /// Per-ticker entries in analyst-selection order
    pub ticker_analyses: TickerMap<Vec<AnalystSignal>>,
    /// Per-ticker aggregate; a pass-through when one analyst was selected
    pub overall: TickerMap<RenderedSignal>,
    /// The run deadline fired and some entries are fallbacks
    pub partial: bool,
}

/// One turn of the round-table debate
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConsensusRound {
    /// 0 for the opening round
    pub round_number: u32,
    /// Every analyst's position per ticker after this round
    pub per_agent_statement: TickerMap<Vec<AnalystSignal>>,
    /// Lowest agreement ratio across tickers
    pub agreement_ratio: f64,
    /// Highest mean confidence change versus the previous round; absent for the opening
    pub convergence_delta: Option<f64>,
    /// Analysts whose call failed this round and kept their prior statement
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub carried_forward: Vec<String>,
}

/// Terminal state of a round table
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundTableOutcome {
    Converged,
    Exhausted,
}

/// How the debate on one ticker ended
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DebateSummary {
    /// Majority position with its head count, e.g. "Buy (2/3 analysts, confidence 75)"
    pub consensus_view: String,
    /// Final statements that disagree with the overall signal
    pub dissenting_opinions: Vec<AnalystSignal>,
    /// Who moved between the opening and the final round
    pub discussion_summary: String,
}

/// Result of a round-table run
#[derive(Debug, Clone, serde::Serialize)]
pub struct RoundTableResponse {
    /// Aggregate of the last round
    #[serde(flatten)]
    pub result: TickerAnalysesResponse,
    /// Full round history, opening round first
    pub rounds: Vec<ConsensusRound>,
    pub converged: bool,
    pub outcome: RoundTableOutcome,
    /// Debate rounds run after the opening
    pub rounds_completed: u32,
    /// Per-ticker consensus and dissent after the last round
    pub summaries: TickerMap<DebateSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticker(s: &str) -> Ticker {
        Ticker::parse(s).unwrap()
    }

    #[test]
    fn test_ticker_map_keeps_insertion_order() {
        let mut map = TickerMap::new();
        map.insert(ticker("MSFT"), 1);
        map.insert(ticker("AAPL"), 2);
        map.insert(ticker("MSFT"), 3);

        assert_eq!(map.len(), 2);
        assert_eq!(map.get("MSFT"), Some(&3));
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"MSFT":3,"AAPL":2}"#);
    }

    #[test]
    fn test_rendered_signal_labels() {
        let signal = Signal::buy(70, "moat");
        let zh = RenderedSignal::render(&signal, SignalLabels::Chinese);
        let en = RenderedSignal::render(&signal, SignalLabels::English);
        assert_eq!(zh.signal, "买入");
        assert_eq!(en.signal, "Buy");
        assert_eq!(zh.direction, Direction::Buy);
    }

    #[test]
    fn test_analyst_signal_wire_shape() {
        let entry = AnalystSignal {
            agent_name: "warren_buffett_agent".to_string(),
            signal: RenderedSignal::render(&Signal::neutral(50, "fair"), SignalLabels::Chinese),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "agent_name": "warren_buffett_agent",
                "signal": "中性",
                "confidence": 50,
                "reasoning": "fair"
            })
        );
    }
}
