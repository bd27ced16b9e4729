//! Market data abstraction consumed by agent runtimes

use crate::error::{AgentsError, Result};
use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use panel_core::{Context, Ticker};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_REQUESTS_PER_MINUTE: u32 = 30;
const DEFAULT_HISTORY_DAYS: u64 = 365;

/// One daily bar of price history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Inclusive date range of history to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl HistoryWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The window requested in the context, filled in with defaults
    ///
    /// A missing end means today; a missing start means `default_days`
    /// before the end.
    pub fn from_context(context: &Context, default_days: u64) -> Self {
        let end = context
            .end_date()
            .unwrap_or_else(|| Utc::now().date_naive());
        let start = context.start_date().unwrap_or_else(|| {
            end.checked_sub_days(Days::new(default_days))
                .unwrap_or(NaiveDate::MIN)
        });
        Self { start, end }
    }
}

/// Source of price history for agent runtimes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Daily bars for `ticker` within `window`, oldest first
    async fn price_history(&self, ticker: &Ticker, window: &HistoryWindow)
    -> Result<Vec<PriceBar>>;

    fn name(&self) -> &str {
        "market-data"
    }
}

/// Settings for market data access
#[derive(Debug, Clone)]
pub struct MarketDataConfig {
    /// How long fetched history stays cached
    pub cache_ttl: Duration,

    /// Outbound request budget
    pub requests_per_minute: u32,

    /// History length when the request carries no start date
    pub history_days: u64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            history_days: DEFAULT_HISTORY_DAYS,
        }
    }
}

impl MarketDataConfig {
    /// Defaults overlaid with `PANEL_MARKET_CACHE_TTL_SECS`,
    /// `PANEL_MARKET_REQUESTS_PER_MINUTE` and `PANEL_MARKET_HISTORY_DAYS`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(secs) = env_parse::<u64>("PANEL_MARKET_CACHE_TTL_SECS")? {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(rpm) = env_parse("PANEL_MARKET_REQUESTS_PER_MINUTE")? {
            config.requests_per_minute = rpm;
        }
        if let Some(days) = env_parse("PANEL_MARKET_HISTORY_DAYS")? {
            config.history_days = days;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.requests_per_minute = rpm;
        self
    }

    pub fn with_history_days(mut self, days: u64) -> Self {
        self.history_days = days;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.requests_per_minute == 0 {
            return Err(AgentsError::Config(
                "requests_per_minute must be greater than 0".to_string(),
            ));
        }
        if self.history_days == 0 {
            return Err(AgentsError::Config(
                "history_days must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AgentsError::Config(format!("{key} has an invalid value: {raw}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_window_from_context() {
        let ctx = Context::new().with_window(Some(date("2024-01-02")), Some(date("2024-03-01")));
        let window = HistoryWindow::from_context(&ctx, 365);
        assert_eq!(window, HistoryWindow::new(date("2024-01-02"), date("2024-03-01")));
    }

    #[test]
    fn test_window_defaults_start_from_end() {
        let ctx = Context::new().with_window(None, Some(date("2024-03-01")));
        let window = HistoryWindow::from_context(&ctx, 29);
        assert_eq!(window.start, date("2024-02-01"));
        assert_eq!(window.end, date("2024-03-01"));
    }

    #[test]
    fn test_config_validation() {
        assert!(MarketDataConfig::default().validate().is_ok());
        assert!(
            MarketDataConfig::default()
                .with_requests_per_minute(0)
                .validate()
                .is_err()
        );
        assert!(
            MarketDataConfig::default()
                .with_history_days(0)
                .validate()
                .is_err()
        );
    }
}
