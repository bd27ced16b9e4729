//! Deterministic personas over market data

use crate::market::{HistoryWindow, MarketDataConfig, MarketDataProvider};
use crate::snapshot::MarketSnapshot;
use crate::strategies::strategy_for;
use async_trait::async_trait;
use panel_core::{
    AgentRuntime, AnalystRegistry, Context, Direction, Error, Result, Signal, Statement, Ticker,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// [`AgentRuntime`] that evaluates persona strategies over price history
///
/// In round-table rounds each persona revisits its previous statement: it
/// defects to the peer majority only when that majority both outnumbers and
/// out-confides its own camp, and otherwise holds its direction while
/// tempering its confidence toward agreeing peers.
pub struct RuleBasedRuntime {
    market: Arc<dyn MarketDataProvider>,
    history_days: u64,
}

impl RuleBasedRuntime {
    pub fn new(market: Arc<dyn MarketDataProvider>) -> Self {
        Self {
            market,
            history_days: MarketDataConfig::default().history_days,
        }
    }

    pub fn with_history_days(mut self, days: u64) -> Self {
        self.history_days = days;
        self
    }

    async fn opening_signal(
        &self,
        ticker: &Ticker,
        analyst_id: &str,
        context: &Context,
    ) -> Result<Signal> {
        let analyst = AnalystRegistry::global()
            .get(analyst_id)
            .ok_or_else(|| Error::agent_failure(analyst_id, "no strategy for this analyst"))?;

        let window = HistoryWindow::from_context(context, self.history_days);
        let bars = self
            .market
            .price_history(ticker, &window)
            .await
            .map_err(|e| e.into_failure(analyst_id))?;
        let snapshot =
            MarketSnapshot::from_bars(ticker.as_str(), &bars).map_err(|e| e.into_failure(analyst_id))?;

        Ok(strategy_for(analyst.category).evaluate(&snapshot))
    }
}

#[async_trait]
impl AgentRuntime for RuleBasedRuntime {
    #[instrument(skip(self, context), fields(round = context.round()))]
    async fn analyze(&self, ticker: &Ticker, analyst_id: &str, context: &Context) -> Result<Signal> {
        let statements = context.prior_statements(ticker.as_str());
        let own = statements.iter().find(|s| s.analyst_id == analyst_id);

        let position = match own {
            Some(statement) if context.round() > 0 => statement.signal.clone(),
            _ => self.opening_signal(ticker, analyst_id, context).await?,
        };

        if context.round() == 0 {
            return Ok(position);
        }

        let peers: Vec<&Statement> = statements
            .iter()
            .filter(|s| s.analyst_id != analyst_id)
            .collect();
        let revised = deliberate(position, &peers, context.round());
        debug!(
            signal = %revised.signal,
            confidence = revised.confidence,
            peers = peers.len(),
            "Revised position"
        );
        Ok(revised)
    }

    fn name(&self) -> &str {
        "rules"
    }
}

/// Revisit a position in light of what the peers said last round
pub fn deliberate(position: Signal, peers: &[&Statement], round: u32) -> Signal {
    let Some((majority, votes, mean_confidence)) = peer_majority(peers) else {
        return position;
    };

    if majority == position.signal {
        let confidence = (f64::from(position.confidence) + mean_confidence) / 2.0;
        return Signal::with_score(
            position.signal,
            confidence,
            format!(
                "round {round}: holding {} with {votes} agreeing peers; {}",
                position.signal, position.reasoning
            ),
        );
    }

    // Our own camp counts us plus the peers already on our side
    let allies = peers
        .iter()
        .filter(|s| s.signal.signal == position.signal)
        .count()
        + 1;
    if votes > allies && mean_confidence > f64::from(position.confidence) {
        let confidence = (f64::from(position.confidence) + mean_confidence) / 2.0;
        return Signal::with_score(
            majority,
            confidence,
            format!(
                "round {round}: moved from {} to {majority}, persuaded by {votes} peers",
                position.signal
            ),
        );
    }

    Signal {
        reasoning: format!(
            "round {round}: holding {} against {votes} peers for {majority}; {}",
            position.signal, position.reasoning
        ),
        ..position
    }
}

/// Most common peer direction, its vote count and mean confidence
///
/// Ties between directions yield `None`: no majority to move toward.
fn peer_majority(peers: &[&Statement]) -> Option<(Direction, usize, f64)> {
    let tallies: Vec<(Direction, usize, f64)> = Direction::ALL
        .iter()
        .map(|&direction| {
            let confidences: Vec<f64> = peers
                .iter()
                .filter(|s| s.signal.signal == direction)
                .map(|s| f64::from(s.signal.confidence))
                .collect();
            let mean = if confidences.is_empty() {
                0.0
            } else {
                confidences.iter().sum::<f64>() / confidences.len() as f64
            };
            (direction, confidences.len(), mean)
        })
        .collect();

    let top = tallies.iter().map(|t| t.1).max().unwrap_or(0);
    if top == 0 {
        return None;
    }
    let mut leaders = tallies.into_iter().filter(|t| t.1 == top);
    let leader = leaders.next();
    if leaders.next().is_some() {
        return None;
    }
    leader
}
