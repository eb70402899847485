pub mod model;
pub mod random;
mod timer;

pub use model::{COMPLETE, ProgressModel, round4};
pub use random::{FixedRandom, RandomSource, SequenceRandom, ThreadRandom};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::ProgressConfig;
use crate::models::{CoreError, CoreErrorKind, TaskId, TaskStatus};
use timer::TimerGuard;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct GenerationSignals {
    pub is_generating: bool,
    pub is_completed: bool,
}

impl GenerationSignals {
    pub const IDLE: GenerationSignals = GenerationSignals {
        is_generating: false,
        is_completed: false,
    };
    pub const GENERATING: GenerationSignals = GenerationSignals {
        is_generating: true,
        is_completed: false,
    };
    pub const COMPLETED: GenerationSignals = GenerationSignals {
        is_generating: false,
        is_completed: true,
    };

    /// Failed tasks read as aborted: neither generating nor completed.
    pub const fn from_status(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Pending | TaskStatus::Processing | TaskStatus::Queued => Self::GENERATING,
            TaskStatus::Success => Self::COMPLETED,
            TaskStatus::Failed => Self::IDLE,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Idle,
    Running,
    Completed,
}

enum EstimatorState {
    Idle,
    Running {
        started_at: Instant,
        _timer: TimerGuard,
    },
    Completed,
}

impl EstimatorState {
    fn phase(&self) -> ProgressPhase {
        match self {
            EstimatorState::Idle => ProgressPhase::Idle,
            EstimatorState::Running { .. } => ProgressPhase::Running,
            EstimatorState::Completed => ProgressPhase::Completed,
        }
    }
}

struct EstimatorShared {
    state: EstimatorState,
    // Bumped on every transition; a firing from an older run is discarded.
    epoch: u64,
}

struct EstimatorCore {
    task: Option<TaskId>,
    model: ProgressModel,
    random: Arc<dyn RandomSource>,
    shared: Mutex<EstimatorShared>,
    progress: watch::Sender<f64>,
}

/// Simulated progress for one generation task that only reports whether it
/// is generating or completed.
///
/// While running, a tick loop on the given runtime advances the estimate at
/// irregular intervals towards `target_progress`; only a completion signal
/// moves it to 100. Leaving the running state, or dropping the estimator,
/// aborts the loop before returning.
pub struct ProgressEstimator {
    core: Arc<EstimatorCore>,
    runtime: Handle,
}

impl ProgressEstimator {
    pub fn new(config: ProgressConfig, random: Arc<dyn RandomSource>, runtime: Handle) -> Self {
        Self::build(None, config, random, runtime)
    }

    /// Same as [`ProgressEstimator::new`], tagging log events with `task_id`.
    pub fn for_task(
        task_id: TaskId,
        config: ProgressConfig,
        random: Arc<dyn RandomSource>,
        runtime: Handle,
    ) -> Self {
        Self::build(Some(task_id), config, random, runtime)
    }

    pub fn for_current_runtime(
        config: ProgressConfig,
        random: Arc<dyn RandomSource>,
    ) -> Result<Self, CoreError> {
        let runtime = Handle::try_current().map_err(|error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("progress estimator requires a tokio runtime: {error}"),
            )
        })?;
        Ok(Self::new(config, random, runtime))
    }

    fn build(
        task: Option<TaskId>,
        config: ProgressConfig,
        random: Arc<dyn RandomSource>,
        runtime: Handle,
    ) -> Self {
        let (progress, _) = watch::channel(0.0);
        Self {
            core: Arc::new(EstimatorCore {
                task,
                model: ProgressModel::new(config),
                random,
                shared: Mutex::new(EstimatorShared {
                    state: EstimatorState::Idle,
                    epoch: 0,
                }),
                progress,
            }),
            runtime,
        }
    }

    pub fn progress(&self) -> f64 {
        *self.core.progress.borrow()
    }

    pub fn phase(&self) -> ProgressPhase {
        self.core.lock().state.phase()
    }

    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.core.progress.subscribe()
    }

    pub fn set_signals(&self, signals: GenerationSignals) {
        let mut shared = self.core.lock();
        let from = shared.state.phase();

        if signals.is_completed {
            if from != ProgressPhase::Completed {
                shared.epoch = shared.epoch.wrapping_add(1);
                shared.state = EstimatorState::Completed;
                self.core.log_transition(from, ProgressPhase::Completed);
            }
            self.core.publish_if_changed(COMPLETE);
            return;
        }

        match (from, signals.is_generating) {
            (ProgressPhase::Running, true) | (ProgressPhase::Idle, false) => {}
            (ProgressPhase::Idle | ProgressPhase::Completed, true) => {
                shared.epoch = shared.epoch.wrapping_add(1);
                // Drop any previous guard before the new loop exists.
                shared.state = EstimatorState::Idle;
                self.core.publish_if_changed(0.0);

                let first_delay = self.core.model.tick_delay(self.core.random.as_ref());
                let join = self.runtime.spawn(run_ticks(
                    Arc::downgrade(&self.core),
                    shared.epoch,
                    first_delay,
                ));
                shared.state = EstimatorState::Running {
                    started_at: Instant::now(),
                    _timer: TimerGuard::new(join.abort_handle()),
                };
                self.core.log_transition(from, ProgressPhase::Running);
            }
            (ProgressPhase::Running | ProgressPhase::Completed, false) => {
                shared.epoch = shared.epoch.wrapping_add(1);
                shared.state = EstimatorState::Idle;
                self.core.publish_if_changed(0.0);
                self.core.log_transition(from, ProgressPhase::Idle);
            }
        }
    }
}

impl Drop for ProgressEstimator {
    fn drop(&mut self) {
        let mut shared = self.core.lock();
        shared.epoch = shared.epoch.wrapping_add(1);
        if let EstimatorState::Running { .. } = shared.state {
            shared.state = EstimatorState::Idle;
        }
    }
}

impl EstimatorCore {
    fn lock(&self) -> MutexGuard<'_, EstimatorShared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_if_changed(&self, value: f64) {
        self.progress.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    fn log_transition(&self, from: ProgressPhase, to: ProgressPhase) {
        tracing::debug!(
            task_id = self.task.map(|id| id.0),
            from = ?from,
            to = ?to,
            progress = *self.progress.borrow(),
            "progress estimator transition"
        );
    }

    /// One advancement. Returns the delay before the next firing, or `None`
    /// once `epoch` is no longer the running instance.
    fn tick(&self, epoch: u64) -> Option<Duration> {
        let shared = self.lock();
        if shared.epoch != epoch {
            return None;
        }
        let EstimatorState::Running { started_at, .. } = &shared.state else {
            return None;
        };

        let elapsed = Instant::now().saturating_duration_since(*started_at);
        let jitter = self.model.jitter(self.random.as_ref());
        let previous = *self.progress.borrow();
        let next = self.model.advance(previous, elapsed, jitter);
        self.progress.send_replace(next);

        tracing::trace!(
            task_id = self.task.map(|id| id.0),
            elapsed_ms = elapsed.as_millis() as u64,
            previous,
            next,
            "progress advanced"
        );

        Some(self.model.tick_delay(self.random.as_ref()))
    }
}

async fn run_ticks(core: Weak<EstimatorCore>, epoch: u64, first_delay: Duration) {
    let mut delay = first_delay;
    loop {
        tokio::time::sleep(delay).await;
        let Some(core) = core.upgrade() else {
            return;
        };
        match core.tick(epoch) {
            Some(next) => delay = next,
            None => return,
        }
    }
}
