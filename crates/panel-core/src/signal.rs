//! Trading signal types

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Directional recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Direction {
    Buy,
    Sell,
    Neutral,
}

/// Label set used when rendering directions for clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalLabels {
    /// 买入 / 卖出 / 中性, as the original web client expects
    #[default]
    Chinese,
    /// Buy / Sell / Neutral
    English,
}

impl SignalLabels {
    /// Language code agents should write their reasoning in
    pub fn language(&self) -> &'static str {
        match self {
            Self::Chinese => "zh",
            Self::English => "en",
        }
    }
}

impl FromStr for SignalLabels {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chinese" | "zh" | "cn" => Ok(Self::Chinese),
            "english" | "en" => Ok(Self::English),
            other => Err(format!("unknown signal label set: {other}")),
        }
    }
}

impl Direction {
    /// All directions, in tie-break precedence order
    pub const ALL: [Direction; 3] = [Direction::Neutral, Direction::Buy, Direction::Sell];

    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Neutral => "neutral",
        }
    }

    /// Render for a client using the given label set
    pub fn label(&self, labels: SignalLabels) -> &'static str {
        match (labels, self) {
            (SignalLabels::Chinese, Self::Buy) => "买入",
            (SignalLabels::Chinese, Self::Sell) => "卖出",
            (SignalLabels::Chinese, Self::Neutral) => "中性",
            (SignalLabels::English, Self::Buy) => "Buy",
            (SignalLabels::English, Self::Sell) => "Sell",
            (SignalLabels::English, Self::Neutral) => "Neutral",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed {
            "买入" | "看涨" => return Ok(Self::Buy),
            "卖出" | "看跌" => return Ok(Self::Sell),
            "中性" | "持有" => return Ok(Self::Neutral),
            _ => {}
        }

        match trimmed.to_lowercase().as_str() {
            "buy" | "bullish" | "long" => Ok(Self::Buy),
            "sell" | "bearish" | "short" => Ok(Self::Sell),
            "neutral" | "hold" => Ok(Self::Neutral),
            other => Err(format!("unrecognized signal: {other}")),
        }
    }
}

impl TryFrom<String> for Direction {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Direction> for &'static str {
    fn from(direction: Direction) -> Self {
        direction.as_str()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directional recommendation with confidence (0-100) and rationale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    /// Recommended direction
    pub signal: Direction,
    /// Confidence, clamped to 0..=100
    #[serde(deserialize_with = "deserialize_confidence")]
    pub confidence: u8,
    /// Free-form rationale
    pub reasoning: String,
}

impl Signal {
    /// Create a signal, clamping confidence to 100
    pub fn new(signal: Direction, confidence: u8, reasoning: impl Into<String>) -> Self {
        Self {
            signal,
            confidence: confidence.min(100),
            reasoning: reasoning.into(),
        }
    }

    /// Create a buy signal
    pub fn buy(confidence: u8, reasoning: impl Into<String>) -> Self {
        Self::new(Direction::Buy, confidence, reasoning)
    }

    /// Create a sell signal
    pub fn sell(confidence: u8, reasoning: impl Into<String>) -> Self {
        Self::new(Direction::Sell, confidence, reasoning)
    }

    /// Create a neutral signal
    pub fn neutral(confidence: u8, reasoning: impl Into<String>) -> Self {
        Self::new(Direction::Neutral, confidence, reasoning)
    }

    /// Create a signal from a fractional confidence, rounding and clamping
    pub fn with_score(signal: Direction, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self::new(signal, clamp_confidence(confidence), reasoning)
    }
}

/// Round and clamp an arbitrary number into the 0..=100 confidence range
pub fn clamp_confidence(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

fn deserialize_confidence<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    Ok(clamp_confidence(value))
}
