//! Indicator summary computed from price history

use crate::error::{AgentsError, Result};
use crate::market::PriceBar;
use serde::Serialize;
use ta::Next;
use ta::indicators::{RelativeStrengthIndex, SimpleMovingAverage};

const SHORT_SMA: usize = 20;
const LONG_SMA: usize = 50;
const RSI_PERIOD: usize = 14;
const RECENT_BARS: usize = 5;
const TRADING_DAYS: f64 = 252.0;

/// What a persona sees of a ticker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub bars: usize,
    pub last_close: f64,
    /// Return over the whole window, percent
    pub period_return: f64,
    /// Return over the last few bars, percent
    pub recent_return: f64,
    pub sma_short: f64,
    pub sma_long: f64,
    pub rsi: f64,
    /// Annualized volatility of daily returns, percent
    pub volatility: f64,
    pub high: f64,
    pub low: f64,
    /// Distance below the window high, percent
    pub drawdown: f64,
    pub avg_volume: f64,
    /// Recent average volume over the window average
    pub volume_ratio: f64,
}

impl MarketSnapshot {
    /// Summarize `bars` (oldest first); needs at least two bars
    pub fn from_bars(symbol: &str, bars: &[PriceBar]) -> Result<Self> {
        if bars.len() < 2 {
            return Err(AgentsError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("{} bars of history, need at least 2", bars.len()),
            });
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();
        let first_close = closes[0];
        let last_close = closes[closes.len() - 1];
        let recent_from = closes[closes.len().saturating_sub(RECENT_BARS + 1)];

        let sma_short = last_value(
            SimpleMovingAverage::new(SHORT_SMA.min(closes.len()))
                .map_err(|e| AgentsError::Indicator(e.to_string()))?,
            &closes,
        );
        let sma_long = last_value(
            SimpleMovingAverage::new(LONG_SMA.min(closes.len()))
                .map_err(|e| AgentsError::Indicator(e.to_string()))?,
            &closes,
        );
        let rsi = last_value(
            RelativeStrengthIndex::new(RSI_PERIOD)
                .map_err(|e| AgentsError::Indicator(e.to_string()))?,
            &closes,
        );

        let high = bars.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let low = bars.iter().map(|b| b.low).fold(f64::MAX, f64::min);

        let avg_volume = mean(&volumes);
        let recent_volume = mean(&volumes[volumes.len().saturating_sub(RECENT_BARS)..]);

        Ok(Self {
            symbol: symbol.to_string(),
            bars: bars.len(),
            last_close,
            period_return: pct_change(first_close, last_close),
            recent_return: pct_change(recent_from, last_close),
            sma_short,
            sma_long,
            rsi,
            volatility: volatility(&closes),
            high,
            low,
            drawdown: if high > 0.0 {
                (high - last_close) / high * 100.0
            } else {
                0.0
            },
            avg_volume,
            volume_ratio: if avg_volume > 0.0 {
                recent_volume / avg_volume
            } else {
                1.0
            },
        })
    }

    pub fn above_long_average(&self) -> bool {
        self.last_close > self.sma_long
    }

    pub fn golden_cross(&self) -> bool {
        self.sma_short > self.sma_long
    }
}

fn last_value<I: Next<f64, Output = f64>>(mut indicator: I, values: &[f64]) -> f64 {
    values.iter().fold(0.0, |_, &v| indicator.next(v))
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn pct_change(from: f64, to: f64) -> f64 {
    if from == 0.0 {
        0.0
    } else {
        (to - from) / from * 100.0
    }
}

fn volatility(closes: &[f64]) -> f64 {
    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }
    let avg = mean(&returns);
    let variance =
        returns.iter().map(|r| (r - avg).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    variance.sqrt() * TRADING_DAYS.sqrt() * 100.0
}
