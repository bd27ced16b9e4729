//! Configuration for analysis runs

use crate::error::{EngineError, Result};
use panel_core::SignalLabels;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Round-table convergence settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoundTableConfig {
    /// Debate rounds after the opening round
    pub max_rounds: u32,

    /// Fraction of analysts sharing the majority direction that counts as agreement
    pub agreement_threshold: f64,

    /// Mean per-analyst confidence change (points) below which positions are settled
    pub confidence_delta: f64,
}

impl Default for RoundTableConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            agreement_threshold: 1.0,
            confidence_delta: 5.0,
        }
    }
}

/// Configuration for the orchestration engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on concurrently running tasks per run
    pub max_concurrency: usize,

    /// Budget for a single (ticker, analyst) call
    pub task_timeout: Duration,

    /// Wall-clock budget for one fan-out
    pub run_deadline: Duration,

    /// Round-table settings
    pub round_table: RoundTableConfig,

    /// Label set used in responses
    pub signal_labels: SignalLabels,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            task_timeout: Duration::from_secs(60),  // 1 minute
            run_deadline: Duration::from_secs(180), // 3 minutes
            round_table: RoundTableConfig::default(),
            signal_labels: SignalLabels::Chinese,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Load the configuration from the environment on top of the defaults
    pub fn from_env() -> Result<Self> {
        EngineConfigBuilder::default().with_env()?.build()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(EngineError::ConfigError(
                "max_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.task_timeout.is_zero() || self.run_deadline.is_zero() {
            return Err(EngineError::ConfigError(
                "task_timeout and run_deadline must be greater than 0".to_string(),
            ));
        }

        if self.task_timeout > self.run_deadline {
            return Err(EngineError::ConfigError(format!(
                "task_timeout ({:?}) must not exceed run_deadline ({:?})",
                self.task_timeout, self.run_deadline
            )));
        }

        if self.round_table.max_rounds == 0 {
            return Err(EngineError::ConfigError(
                "max_rounds must be greater than 0".to_string(),
            ));
        }

        let threshold = self.round_table.agreement_threshold;
        if threshold.is_nan() || threshold <= 0.0 || threshold > 1.0 {
            return Err(EngineError::ConfigError(format!(
                "agreement_threshold must be in (0, 1], got {threshold}"
            )));
        }

        let delta = self.round_table.confidence_delta;
        if delta.is_nan() || delta < 0.0 {
            return Err(EngineError::ConfigError(
                "confidence_delta must not be negative".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for EngineConfig
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    max_concurrency: Option<usize>,
    task_timeout: Option<Duration>,
    run_deadline: Option<Duration>,
    max_rounds: Option<u32>,
    agreement_threshold: Option<f64>,
    confidence_delta: Option<f64>,
    signal_labels: Option<SignalLabels>,
}

impl EngineConfigBuilder {
    /// Set the concurrency cap
    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    /// Set the per-task timeout
    pub fn task_timeout(mut self, duration: Duration) -> Self {
        self.task_timeout = Some(duration);
        self
    }

    /// Set the per-run deadline
    pub fn run_deadline(mut self, duration: Duration) -> Self {
        self.run_deadline = Some(duration);
        self
    }

    /// Set the number of debate rounds
    pub fn max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = Some(rounds);
        self
    }

    /// Set the agreement threshold
    pub fn agreement_threshold(mut self, threshold: f64) -> Self {
        self.agreement_threshold = Some(threshold);
        self
    }

    /// Set the confidence delta
    pub fn confidence_delta(mut self, delta: f64) -> Self {
        self.confidence_delta = Some(delta);
        self
    }

    /// Set the response label set
    pub fn signal_labels(mut self, labels: SignalLabels) -> Self {
        self.signal_labels = Some(labels);
        self
    }

    /// Overlay values from `PANEL_*` environment variables
    pub fn with_env(mut self) -> Result<Self> {
        if let Some(limit) = env_parse::<usize>("PANEL_MAX_CONCURRENCY")? {
            self.max_concurrency = Some(limit);
        }
        if let Some(secs) = env_parse::<u64>("PANEL_TASK_TIMEOUT_SECS")? {
            self.task_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = env_parse::<u64>("PANEL_RUN_DEADLINE_SECS")? {
            self.run_deadline = Some(Duration::from_secs(secs));
        }
        if let Some(rounds) = env_parse::<u32>("PANEL_MAX_ROUNDS")? {
            self.max_rounds = Some(rounds);
        }
        if let Ok(raw) = std::env::var("PANEL_SIGNAL_LABELS") {
            let labels = raw.parse::<SignalLabels>().map_err(EngineError::ConfigError)?;
            self.signal_labels = Some(labels);
        }
        Ok(self)
    }

    /// Build the configuration
    pub fn build(self) -> Result<EngineConfig> {
        let defaults = EngineConfig::default();

        let config = EngineConfig {
            max_concurrency: self.max_concurrency.unwrap_or(defaults.max_concurrency),
            task_timeout: self.task_timeout.unwrap_or(defaults.task_timeout),
            run_deadline: self.run_deadline.unwrap_or(defaults.run_deadline),
            round_table: RoundTableConfig {
                max_rounds: self.max_rounds.unwrap_or(defaults.round_table.max_rounds),
                agreement_threshold: self
                    .agreement_threshold
                    .unwrap_or(defaults.round_table.agreement_threshold),
                confidence_delta: self
                    .confidence_delta
                    .unwrap_or(defaults.round_table.confidence_delta),
            },
            signal_labels: self.signal_labels.unwrap_or(defaults.signal_labels),
        };

        config.validate()?;
        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| EngineError::ConfigError(format!("{key} has an invalid value: {raw}"))),
        Err(_) => Ok(None),
    }
}
