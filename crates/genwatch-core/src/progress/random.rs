use std::sync::Mutex;

use rand::Rng;

/// Source of uniform samples in `[0, 1)` for jitter and tick delays.
pub trait RandomSource: Send + Sync {
    fn unit(&self) -> f64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn unit(&self) -> f64 {
        rand::rng().random::<f64>()
    }
}

/// Always returns the same sample. `FixedRandom::NEUTRAL` yields zero jitter
/// and the midpoint tick delay.
#[derive(Clone, Copy, Debug)]
pub struct FixedRandom(pub f64);

impl FixedRandom {
    pub const NEUTRAL: FixedRandom = FixedRandom(0.5);
}

impl RandomSource for FixedRandom {
    fn unit(&self) -> f64 {
        self.0
    }
}

/// Cycles through a fixed list of samples.
#[derive(Debug)]
pub struct SequenceRandom {
    samples: Vec<f64>,
    cursor: Mutex<usize>,
}

impl SequenceRandom {
    pub fn new(samples: Vec<f64>) -> Self {
        Self {
            samples,
            cursor: Mutex::new(0),
        }
    }
}

impl RandomSource for SequenceRandom {
    fn unit(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.5;
        }
        let mut cursor = self
            .cursor
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let sample = self.samples[*cursor % self.samples.len()];
        *cursor = cursor.wrapping_add(1);
        sample
    }
}
