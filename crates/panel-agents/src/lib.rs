//! Agent runtimes for analyst panels
//!
//! Two [`panel_core::AgentRuntime`] implementations:
//!
//! - [`RuleBasedRuntime`] scores a [`MarketSnapshot`] with one
//!   [`PersonaStrategy`] per analyst category
//! - [`LlmRuntime`] asks an OpenAI-compatible chat model to play the persona
//!
//! Both read price history through a [`MarketDataProvider`];
//! [`YahooMarketData`] is the production implementation.
//!
//! # Example
//!
//! ```no_run
//! use panel_agents::{MarketDataConfig, RuleBasedRuntime, YahooMarketData};
//! use std::sync::Arc;
//!
//! # fn main() -> panel_agents::Result<()> {
//! let market = Arc::new(YahooMarketData::new(MarketDataConfig::default())?);
//! let runtime = RuleBasedRuntime::new(market);
//! # let _ = runtime;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod error;
pub mod llm;
pub mod market;
pub mod rules;
pub mod snapshot;
pub mod strategies;
pub mod yahoo;

pub use cache::MarketCache;
pub use error::{AgentsError, Result};
pub use llm::{LlmRuntime, OpenAIConfig, OpenAIProvider};
pub use market::{HistoryWindow, MarketDataConfig, MarketDataProvider, PriceBar};
pub use rules::RuleBasedRuntime;
pub use snapshot::MarketSnapshot;
pub use strategies::{PersonaStrategy, Scorecard, strategy_for};
pub use yahoo::YahooMarketData;
