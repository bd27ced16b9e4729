//! Rule-based persona strategies
//!
//! Each strategy family scores a [`MarketSnapshot`] against a handful of
//! checks. The score maps to a direction with the WSB-style thresholds: at
//! least 60% of the available points is a buy, at most 30% is a sell.

use crate::snapshot::MarketSnapshot;
use panel_core::{AnalystCategory, Direction, Signal};

const BUY_RATIO: f64 = 0.6;
const SELL_RATIO: f64 = 0.3;

/// Accumulates points and the reasons behind them
#[derive(Debug, Default)]
pub struct Scorecard {
    score: f64,
    max: f64,
    reasons: Vec<String>,
}

impl Scorecard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Award `points` out of `max` for one check
    pub fn check(&mut self, points: f64, max: f64, reason: impl Into<String>) -> &mut Self {
        self.score += points.clamp(0.0, max);
        self.max += max;
        self.reasons.push(reason.into());
        self
    }

    pub fn ratio(&self) -> f64 {
        if self.max > 0.0 {
            self.score / self.max
        } else {
            0.5
        }
    }

    /// Direction and confidence implied by the score
    pub fn into_signal(self, persona: &str) -> Signal {
        let ratio = self.ratio();
        let (direction, confidence) = if ratio >= BUY_RATIO {
            (Direction::Buy, 55.0 + (ratio - BUY_RATIO) / (1.0 - BUY_RATIO) * 40.0)
        } else if ratio <= SELL_RATIO {
            (Direction::Sell, 55.0 + (SELL_RATIO - ratio) / SELL_RATIO * 40.0)
        } else {
            (Direction::Neutral, 50.0)
        };

        let reasoning = format!(
            "{persona}: scored {:.1}/{:.1}; {}",
            self.score,
            self.max,
            self.reasons.join("; ")
        );
        Signal::with_score(direction, confidence, reasoning)
    }
}

/// How one strategy family reads a snapshot
pub trait PersonaStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, snapshot: &MarketSnapshot) -> Signal;
}

/// The strategy backing an analyst category
pub fn strategy_for(category: AnalystCategory) -> &'static dyn PersonaStrategy {
    match category {
        AnalystCategory::Value => &ValueStrategy,
        AnalystCategory::Growth => &GrowthStrategy,
        AnalystCategory::Activist => &ActivistStrategy,
        AnalystCategory::Macro => &TrendStrategy,
        AnalystCategory::Momentum => &MomentumStrategy,
        AnalystCategory::Quantitative => &TechnicalStrategy,
    }
}

/// Margin of safety: buys weakness in steady names
pub struct ValueStrategy;

impl PersonaStrategy for ValueStrategy {
    fn name(&self) -> &'static str {
        "value"
    }

    fn evaluate(&self, s: &MarketSnapshot) -> Signal {
        let mut card = Scorecard::new();
        card.check(
            s.drawdown / 10.0,
            3.0,
            format!("{:.1}% below the period high", s.drawdown),
        )
        .check(
            if s.last_close < s.sma_long { 2.0 } else { 0.0 },
            2.0,
            format!("price {:.2} vs long average {:.2}", s.last_close, s.sma_long),
        )
        .check(
            (60.0 - s.volatility) / 15.0,
            3.0,
            format!("volatility {:.1}%", s.volatility),
        )
        .check(
            if s.rsi < 40.0 { 2.0 } else if s.rsi < 60.0 { 1.0 } else { 0.0 },
            2.0,
            format!("RSI {:.1}", s.rsi),
        );
        card.into_signal(self.name())
    }
}

/// Sustained appreciation and an intact uptrend
pub struct GrowthStrategy;

impl PersonaStrategy for GrowthStrategy {
    fn name(&self) -> &'static str {
        "growth"
    }

    fn evaluate(&self, s: &MarketSnapshot) -> Signal {
        let mut card = Scorecard::new();
        card.check(
            s.period_return / 10.0,
            4.0,
            format!("{:+.1}% over the window", s.period_return),
        )
        .check(
            if s.golden_cross() { 3.0 } else { 0.0 },
            3.0,
            format!("short average {:.2} vs long {:.2}", s.sma_short, s.sma_long),
        )
        .check(
            if s.above_long_average() { 3.0 } else { 0.0 },
            3.0,
            format!("price {:.2} vs long average {:.2}", s.last_close, s.sma_long),
        );
        card.into_signal(self.name())
    }
}

/// Beaten-down franchises showing signs of a turn
pub struct ActivistStrategy;

impl PersonaStrategy for ActivistStrategy {
    fn name(&self) -> &'static str {
        "activist"
    }

    fn evaluate(&self, s: &MarketSnapshot) -> Signal {
        let mut card = Scorecard::new();
        card.check(
            (s.drawdown - 10.0) / 5.0,
            4.0,
            format!("{:.1}% below the period high", s.drawdown),
        )
        .check(
            s.recent_return,
            3.0,
            format!("{:+.1}% over the last sessions", s.recent_return),
        )
        .check(
            if s.volume_ratio > 1.2 { 3.0 } else { 0.0 },
            3.0,
            format!("recent volume {:.2}x average", s.volume_ratio),
        );
        card.into_signal(self.name())
    }
}

/// Long-horizon trend following
pub struct TrendStrategy;

impl PersonaStrategy for TrendStrategy {
    fn name(&self) -> &'static str {
        "trend"
    }

    fn evaluate(&self, s: &MarketSnapshot) -> Signal {
        let mut card = Scorecard::new();
        card.check(
            if s.above_long_average() { 4.0 } else { 0.0 },
            4.0,
            format!("price {:.2} vs long average {:.2}", s.last_close, s.sma_long),
        )
        .check(
            (s.period_return + 10.0) / 7.5,
            4.0,
            format!("{:+.1}% over the window", s.period_return),
        )
        .check(
            (40.0 - s.volatility) / 10.0,
            2.0,
            format!("volatility {:.1}%", s.volatility),
        );
        card.into_signal(self.name())
    }
}

/// Retail momentum: volume spikes and short-term moves
pub struct MomentumStrategy;

impl PersonaStrategy for MomentumStrategy {
    fn name(&self) -> &'static str {
        "momentum"
    }

    fn evaluate(&self, s: &MarketSnapshot) -> Signal {
        let mut card = Scorecard::new();
        card.check(
            (s.volume_ratio - 1.0) * 5.0,
            5.0,
            format!("recent volume {:.2}x average", s.volume_ratio),
        )
        .check(
            s.recent_return + 2.5,
            5.0,
            format!("{:+.1}% over the last sessions", s.recent_return),
        )
        .check(
            (s.rsi - 40.0) / 6.0,
            5.0,
            format!("RSI {:.1}", s.rsi),
        );
        card.into_signal(self.name())
    }
}

/// Moving-average crossovers and RSI
pub struct TechnicalStrategy;

impl PersonaStrategy for TechnicalStrategy {
    fn name(&self) -> &'static str {
        "technical"
    }

    fn evaluate(&self, s: &MarketSnapshot) -> Signal {
        let mut card = Scorecard::new();
        card.check(
            if s.golden_cross() { 4.0 } else { 0.0 },
            4.0,
            format!("short average {:.2} vs long {:.2}", s.sma_short, s.sma_long),
        )
        .check(
            if s.last_close > s.sma_short { 3.0 } else { 0.0 },
            3.0,
            format!("price {:.2} vs short average {:.2}", s.last_close, s.sma_short),
        )
        .check(
            // Overbought readings cost points, oversold ones earn a bounce
            if s.rsi > 80.0 {
                1.0
            } else if s.rsi < 25.0 {
                2.0
            } else {
                3.0 * (s.rsi - 25.0) / 55.0
            },
            3.0,
            format!("RSI {:.1}", s.rsi),
        );
        card.into_signal(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::fixtures::{bars, linear};

    fn snapshot(closes: &[f64]) -> MarketSnapshot {
        MarketSnapshot::from_bars("TEST", &bars(closes)).unwrap()
    }

    #[test]
    fn test_scorecard_thresholds() {
        let mut card = Scorecard::new();
        card.check(6.0, 10.0, "ok");
        let signal = card.into_signal("test");
        assert_eq!(signal.signal, Direction::Buy);
        assert_eq!(signal.confidence, 55);
        assert_eq!(signal.reasoning, "test: scored 6.0/10.0; ok");

        let mut card = Scorecard::new();
        card.check(-5.0, 10.0, "clamped");
        let signal = card.into_signal("test");
        assert_eq!(signal.signal, Direction::Sell);
        assert_eq!(signal.confidence, 95);

        let mut card = Scorecard::new();
        card.check(4.5, 10.0, "mixed");
        assert_eq!(card.into_signal("test"), Signal::neutral(50, "test: scored 4.5/10.0; mixed"));
    }

    #[test]
    fn test_growth_likes_uptrend() {
        let up = snapshot(&linear(100.0, 150.0, 60));
        let down = snapshot(&linear(150.0, 100.0, 60));

        assert_eq!(GrowthStrategy.evaluate(&up).signal, Direction::Buy);
        assert_eq!(GrowthStrategy.evaluate(&down).signal, Direction::Sell);
        assert_eq!(TrendStrategy.evaluate(&up).signal, Direction::Buy);
        assert_eq!(TechnicalStrategy.evaluate(&down).signal, Direction::Sell);
    }

    #[test]
    fn test_value_disagrees_with_growth_on_drawdown() {
        let down = snapshot(&linear(150.0, 100.0, 60));
        let value = ValueStrategy.evaluate(&down);
        let growth = GrowthStrategy.evaluate(&down);

        assert_ne!(value.signal, growth.signal);
        assert_eq!(value.signal, Direction::Buy);
    }

    #[test]
    fn test_every_category_has_a_strategy() {
        let snap = snapshot(&linear(100.0, 110.0, 30));
        for analyst in panel_core::AnalystRegistry::global().all() {
            let signal = strategy_for(analyst.category).evaluate(&snap);
            assert!(signal.confidence <= 100);
            assert!(!signal.reasoning.is_empty());
        }
    }
}
