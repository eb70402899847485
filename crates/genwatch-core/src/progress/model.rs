use std::time::Duration;

use crate::config::ProgressConfig;
use crate::progress::random::RandomSource;

pub const COMPLETE: f64 = 100.0;

/// Pure advancement rules of the simulated progress estimate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgressModel {
    config: ProgressConfig,
}

impl ProgressModel {
    pub fn new(config: ProgressConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProgressConfig {
        &self.config
    }

    /// Linear estimate for `elapsed`, capped at the target.
    pub fn ideal(&self, elapsed: Duration) -> f64 {
        let target = self.config.target_progress;
        let fraction = elapsed.as_secs_f64() * 1_000.0 / self.config.total_duration_ms as f64;
        (fraction * target).min(target)
    }

    /// Next progress value. Never below `previous`, never above the target.
    pub fn advance(&self, previous: f64, elapsed: Duration, jitter: f64) -> f64 {
        let target = self.config.target_progress;
        let jitter = jitter.clamp(-self.config.max_jitter, self.config.max_jitter);
        let candidate = self.ideal(elapsed) + jitter;
        round4(previous.max(candidate.min(target)))
    }

    /// Maps a unit sample onto `[-max_jitter, +max_jitter]`.
    pub fn jitter(&self, random: &dyn RandomSource) -> f64 {
        (random.unit() * 2.0 - 1.0) * self.config.max_jitter
    }

    /// Maps a unit sample onto `[min_tick_delay, max_tick_delay]`.
    pub fn tick_delay(&self, random: &dyn RandomSource) -> Duration {
        let min = self.config.min_tick_delay_ms;
        let span = self.config.max_tick_delay_ms.saturating_sub(min);
        let offset = (random.unit().clamp(0.0, 1.0) * span as f64).round() as u64;
        Duration::from_millis(min + offset.min(span))
    }
}

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
