//! Yahoo Finance price history behind a cache and a rate limiter

use crate::cache::MarketCache;
use crate::error::{AgentsError, Result};
use crate::market::{HistoryWindow, MarketDataConfig, MarketDataProvider, PriceBar};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use panel_core::Ticker;
use std::num::NonZeroU32;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, instrument};
use yahoo_finance_api as yahoo;

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

const SECONDS_PER_DAY: i64 = 86_400;

/// Market data from Yahoo Finance
///
/// Histories are cached per (symbol, window) and outbound requests share a
/// per-minute budget.
pub struct YahooMarketData {
    connector: yahoo::YahooConnector,
    cache: MarketCache<(String, HistoryWindow), Vec<PriceBar>>,
    rate_limiter: SharedRateLimiter,
    config: MarketDataConfig,
}

impl YahooMarketData {
    pub fn new(config: MarketDataConfig) -> Result<Self> {
        config.validate()?;
        let connector = yahoo::YahooConnector::new()
            .map_err(|e| AgentsError::MarketData(e.to_string()))?;

        let rpm = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            connector,
            cache: MarketCache::new(config.cache_ttl),
            rate_limiter,
            config,
        })
    }

    /// Create from `PANEL_MARKET_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(MarketDataConfig::from_env()?)
    }

    pub fn config(&self) -> &MarketDataConfig {
        &self.config
    }

    async fn fetch(&self, symbol: &str, window: HistoryWindow) -> Result<Vec<PriceBar>> {
        self.rate_limiter.until_ready().await;

        let start = day_start(window.start)?;
        // Yahoo treats the end bound as exclusive
        let end = OffsetDateTime::from_unix_timestamp(
            window.end.and_time(NaiveTime::MIN).and_utc().timestamp() + SECONDS_PER_DAY,
        )
        .map_err(|e| AgentsError::MarketData(format!("Invalid end date: {e}")))?;

        debug!(symbol, start = %window.start, end = %window.end, "Fetching quote history");
        let response = self
            .connector
            .get_quote_history(symbol, start, end)
            .await
            .map_err(|e| AgentsError::MarketData(e.to_string()))?;

        let quotes = response
            .quotes()
            .map_err(|e| AgentsError::MarketData(e.to_string()))?;

        let bars: Vec<PriceBar> = quotes
            .iter()
            .filter_map(|q| {
                let date = DateTime::from_timestamp(q.timestamp as i64, 0)?.date_naive();
                Some(PriceBar {
                    date,
                    open: q.open,
                    high: q.high,
                    low: q.low,
                    close: q.close,
                    volume: q.volume,
                })
            })
            .collect();

        if bars.is_empty() {
            return Err(AgentsError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("no quotes between {} and {}", window.start, window.end),
            });
        }
        Ok(bars)
    }
}

fn day_start(date: NaiveDate) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(date.and_time(NaiveTime::MIN).and_utc().timestamp())
        .map_err(|e| AgentsError::MarketData(format!("Invalid start date: {e}")))
}

#[async_trait]
impl MarketDataProvider for YahooMarketData {
    #[instrument(skip(self), fields(ticker = %ticker))]
    async fn price_history(
        &self,
        ticker: &Ticker,
        window: &HistoryWindow,
    ) -> Result<Vec<PriceBar>> {
        let symbol = ticker.as_str();
        let window = *window;
        self.cache
            .get_or_fetch((symbol.to_string(), window), || self.fetch(symbol, window))
            .await
    }

    fn name(&self) -> &str {
        "yahoo"
    }
}
