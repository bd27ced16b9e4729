//! Core abstractions for analyst panels
//!
//! This crate defines the domain types shared by the orchestration engine,
//! the agent runtimes and the HTTP surface.

pub mod analyst;
pub mod context;
pub mod error;
pub mod runtime;
pub mod signal;
pub mod ticker;

pub use analyst::{Analyst, AnalystCategory, AnalystRegistry};
pub use context::{Context, Statement};
pub use error::{Error, MAX_TICKERS, Result, ValidationError};
pub use runtime::AgentRuntime;
#[cfg(any(test, feature = "mocks"))]
pub use runtime::MockAgentRuntime;
pub use signal::{Direction, Signal, SignalLabels, clamp_confidence};
pub use ticker::{Ticker, TickerSet};
