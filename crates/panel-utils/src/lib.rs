//! Shared utilities for analyst panels
//!
//! Logging setup and process-level configuration used by the server and CLI.

pub mod config;
pub mod logging;

pub use config::{Config, ConfigError, RuntimeKind};
pub use logging::{LogFormat, init_tracing};
