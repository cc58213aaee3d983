use crate::{
    clock::MAX_TICK_INTERVAL,
    error::{EngineError, EngineResult},
    store::RetryPolicy,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the next scan is scheduled relative to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickPolicy {
    /// Next scan starts one interval after the previous scan *started*.
    #[default]
    FixedRate,
    /// Next scan starts one interval after the previous scan *finished*.
    FixedDelay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite database path, SQLite URI, or `:memory:`.
    pub store_target: String,
    /// Seconds between scans.
    pub tick_interval: f64,
    /// Worker threads evaluating records within one cycle.
    pub concurrency: usize,
    pub tick_policy: TickPolicy,
    pub retry: RetryConfig,
    /// Seconds to wait for an in-flight cycle to drain on shutdown.
    pub shutdown_timeout: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_target: "equilibrate.db".into(),
            tick_interval: 5.0,
            concurrency: 4,
            tick_policy: TickPolicy::FixedRate,
            retry: RetryConfig::default(),
            shutdown_timeout: 10.0,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file. Missing keys take their defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: EngineConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Config with hardcoded values for use in tests: in-memory store,
    /// millisecond ticks, no retry backoff.
    pub fn default_test() -> Self {
        Self {
            store_target: ":memory:".into(),
            tick_interval: 0.01,
            concurrency: 2,
            tick_policy: TickPolicy::FixedRate,
            retry: RetryConfig {
                max_attempts: 3,
                initial_backoff_ms: 0,
                max_backoff_ms: 0,
            },
            shutdown_timeout: 1.0,
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        let max_secs = MAX_TICK_INTERVAL.as_secs_f64();
        if !(self.tick_interval > 0.0 && self.tick_interval <= max_secs) {
            return Err(EngineError::InvalidConfig(format!(
                "tick_interval must be in (0, {max_secs}] seconds, got {}",
                self.tick_interval
            )));
        }
        if self.concurrency == 0 {
            return Err(EngineError::InvalidConfig("concurrency must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(EngineError::InvalidConfig(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if !(self.shutdown_timeout >= 0.0 && self.shutdown_timeout <= max_secs) {
            return Err(EngineError::InvalidConfig(format!(
                "shutdown_timeout must be in [0, {max_secs}] seconds, got {}",
                self.shutdown_timeout
            )));
        }
        if self.store_target.trim().is_empty() {
            return Err(EngineError::InvalidConfig("store_target is empty".into()));
        }
        Ok(())
    }

    /// Tick interval as a `Duration`, capped at one day. Never panics,
    /// even on a config that has not been validated.
    pub fn tick_interval(&self) -> Duration {
        bounded_secs(self.tick_interval)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        bounded_secs(self.shutdown_timeout)
    }
}

/// NaN and negatives map to zero, anything past the ceiling to the ceiling.
fn bounded_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs)
        .unwrap_or(if secs > 0.0 { MAX_TICK_INTERVAL } else { Duration::ZERO })
        .min(MAX_TICK_INTERVAL)
}
