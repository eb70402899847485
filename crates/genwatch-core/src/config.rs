use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{CoreError, CoreErrorKind};

pub const CONFIG_PATH_ENV: &str = "GENWATCH_CONFIG";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingIntervals {
    pub single_ms: u64,
    pub few_ms: u64,
    pub many_ms: u64,
}

impl Default for PollingIntervals {
    fn default() -> Self {
        Self {
            single_ms: 5_000,
            few_ms: 8_000,
            many_ms: 10_000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Fallback interval for hosts that poll without a task count.
    pub base_interval_ms: u64,
    pub intervals: PollingIntervals,
    pub max_duration_ms: u64,
    pub max_retries: u32,
    pub retry_delay_base_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: 10_000,
            intervals: PollingIntervals::default(),
            max_duration_ms: 600_000,
            max_retries: 3,
            retry_delay_base_ms: 1_000,
        }
    }
}

impl PollingConfig {
    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        for (field, value) in [
            ("polling.base_interval_ms", self.base_interval_ms),
            ("polling.intervals.single_ms", self.intervals.single_ms),
            ("polling.intervals.few_ms", self.intervals.few_ms),
            ("polling.intervals.many_ms", self.intervals.many_ms),
            ("polling.max_duration_ms", self.max_duration_ms),
        ] {
            if value == 0 {
                return Err(CoreError::invalid_input(format!(
                    "{field} must be greater than 0"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub total_duration_ms: u64,
    pub target_progress: f64,
    pub max_jitter: f64,
    pub min_tick_delay_ms: u64,
    pub max_tick_delay_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            total_duration_ms: 120_000,
            target_progress: 99.99,
            max_jitter: 0.25,
            min_tick_delay_ms: 500,
            max_tick_delay_ms: 1_500,
        }
    }
}

impl ProgressConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.total_duration_ms == 0 {
            return Err(CoreError::invalid_input(
                "progress.total_duration_ms must be greater than 0",
            ));
        }
        if !(self.target_progress > 0.0 && self.target_progress < 100.0) {
            return Err(CoreError::invalid_input(format!(
                "progress.target_progress must be in (0, 100), got {}",
                self.target_progress
            )));
        }
        if !(self.max_jitter >= 0.0 && self.max_jitter.is_finite()) {
            return Err(CoreError::invalid_input(format!(
                "progress.max_jitter must be a non-negative number, got {}",
                self.max_jitter
            )));
        }
        if self.min_tick_delay_ms > self.max_tick_delay_ms {
            return Err(CoreError::invalid_input(format!(
                "progress.min_tick_delay_ms ({}) exceeds progress.max_tick_delay_ms ({})",
                self.min_tick_delay_ms, self.max_tick_delay_ms
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenwatchConfig {
    pub polling: PollingConfig,
    pub progress: ProgressConfig,
}

impl GenwatchConfig {
    /// Loads from `GENWATCH_CONFIG` when set, otherwise returns the defaults.
    pub fn load_default() -> Result<Self, CoreError> {
        match env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load_from_path(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path_ref = path.as_ref();
        let raw = fs::read_to_string(path_ref).map_err(|error| {
            CoreError::new(
                CoreErrorKind::StorageFailure,
                format!("failed to read config file {}: {error}", path_ref.display()),
            )
        })?;
        Self::from_json_str(&raw).map_err(|error| CoreError {
            message: format!("{} ({})", error.message, path_ref.display()),
            ..error
        })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CoreError> {
        let cfg: Self = serde_json::from_str(raw).map_err(|error| {
            CoreError::new(
                CoreErrorKind::ParseFailure,
                format!("failed to parse config: {error}"),
            )
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        self.polling.validate()?;
        self.progress.validate()
    }

    /// Divides every duration by `factor`, keeping each at least 1 ms.
    pub fn time_scaled(&self, factor: f64) -> Result<Self, CoreError> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(CoreError::invalid_input(format!(
                "time scale must be a positive number, got {factor}"
            )));
        }
        let scale = |ms: u64| ((ms as f64 / factor).round() as u64).max(1);

        let mut scaled = *self;
        scaled.polling.base_interval_ms = scale(self.polling.base_interval_ms);
        scaled.polling.intervals.single_ms = scale(self.polling.intervals.single_ms);
        scaled.polling.intervals.few_ms = scale(self.polling.intervals.few_ms);
        scaled.polling.intervals.many_ms = scale(self.polling.intervals.many_ms);
        scaled.polling.max_duration_ms = scale(self.polling.max_duration_ms);
        scaled.polling.retry_delay_base_ms = scale(self.polling.retry_delay_base_ms);
        scaled.progress.total_duration_ms = scale(self.progress.total_duration_ms);
        scaled.progress.min_tick_delay_ms = scale(self.progress.min_tick_delay_ms);
        scaled.progress.max_tick_delay_ms = scale(self.progress.max_tick_delay_ms);
        Ok(scaled)
    }
}
