//! Configuration management utilities

use crate::logging::LogFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;

/// Invalid process configuration
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{key} has an invalid value: {value}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

/// Which agent runtime answers analysis tasks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// Deterministic persona strategies over market data
    #[default]
    Rules,
    /// Chat-model personas
    Llm,
}

impl FromStr for RuntimeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rules" | "rule" => Ok(Self::Rules),
            "llm" => Ok(Self::Llm),
            other => Err(format!("unknown runtime: {other}")),
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rules => "rules",
            Self::Llm => "llm",
        })
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application name
    pub app_name: String,
    /// Environment (development, production, ...)
    pub environment: String,
    /// Address the HTTP server binds to
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,
    pub runtime: RuntimeKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "analyst-panel".to_string(),
            environment: "development".to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            log_format: LogFormat::default(),
            runtime: RuntimeKind::default(),
        }
    }
}

impl Config {
    /// Defaults overlaid with `PANEL_ENV`, `PANEL_HOST`, `PANEL_PORT`,
    /// `PANEL_LOG_FORMAT` and `PANEL_RUNTIME`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(env) = lookup("PANEL_ENV") {
            config.environment = env;
        }
        if let Some(host) = lookup("PANEL_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("PANEL_PORT") {
            config.port = parse("PANEL_PORT", &port)?;
        }
        if let Some(format) = lookup("PANEL_LOG_FORMAT") {
            config.log_format = parse("PANEL_LOG_FORMAT", &format)?;
        }
        if let Some(runtime) = lookup("PANEL_RUNTIME") {
            config.runtime = parse("PANEL_RUNTIME", &runtime)?;
        }

        Ok(config)
    }

    /// `host:port` for binding a listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

fn parse<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError {
        key,
        value: raw.to_string(),
    })
}
