//! Scheduler configuration
//!
//! Loaded from TOML by the host process:
//! ```toml
//! tick_interval_ms = 100
//! default_delay_ms = 100
//! external_event_firing = true
//! runner_thread_name = "reactor-runner"
//! ```

use crate::error::SchedulerError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Valid range for `tick_interval_ms`
const TICK_INTERVAL_RANGE_MS: (u64, u64) = (1, 60_000);

/// Valid range for `default_delay_ms`
const DEFAULT_DELAY_RANGE_MS: (u64, u64) = (0, 3_600_000);

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Sweep period; bounds debounce resolution latency (default: 100ms)
    pub tick_interval_ms: u64,

    /// Delay used by `schedule()` when none is given (default: 100ms)
    pub default_delay_ms: u64,

    /// Whether `on_external_event()` may fire entries early (default: true)
    pub external_event_firing: bool,

    /// Name given to command runner threads
    pub runner_thread_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            default_delay_ms: 100,
            external_event_firing: true,
            runner_thread_name: "reactor-runner".to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)
            .context("Failed to parse scheduler configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config: {}", path.display()))
    }

    /// Check every value against its valid range
    pub fn validate(&self) -> std::result::Result<(), SchedulerError> {
        check_range("tick_interval_ms", self.tick_interval_ms, TICK_INTERVAL_RANGE_MS)?;
        check_range("default_delay_ms", self.default_delay_ms, DEFAULT_DELAY_RANGE_MS)?;

        if self.runner_thread_name.trim().is_empty() {
            return Err(SchedulerError::InvalidConfig(
                "runner_thread_name must not be empty".to_string(),
            ));
        }
        // Thread names cannot carry interior NULs
        if self.runner_thread_name.contains('\0') {
            return Err(SchedulerError::InvalidConfig(
                "runner_thread_name must not contain NUL bytes".to_string(),
            ));
        }

        Ok(())
    }

    /// Sweep period as a `Duration`
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Default debounce delay as a `Duration`
    pub fn default_delay(&self) -> Duration {
        Duration::from_millis(self.default_delay_ms)
    }
}

fn check_range(
    key: &str,
    value: u64,
    (min, max): (u64, u64),
) -> std::result::Result<(), SchedulerError> {
    if value < min || value > max {
        return Err(SchedulerError::InvalidConfig(format!(
            "{} must be between {} and {} (got {})",
            key, min, max, value
        )));
    }
    Ok(())
}
