use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::config::ProgressConfig;
use crate::models::{TaskId, TaskRecord};
use crate::progress::{GenerationSignals, ProgressEstimator, ProgressPhase, RandomSource};

/// One progress estimator per task, driven by reported task statuses.
pub struct GenerationTracker {
    config: ProgressConfig,
    random: Arc<dyn RandomSource>,
    runtime: Handle,
    estimators: BTreeMap<TaskId, ProgressEstimator>,
}

impl GenerationTracker {
    pub fn new(config: ProgressConfig, random: Arc<dyn RandomSource>, runtime: Handle) -> Self {
        Self {
            config,
            random,
            runtime,
            estimators: BTreeMap::new(),
        }
    }

    pub fn apply(&mut self, records: &[TaskRecord]) {
        for record in records {
            let estimator = self.estimators.entry(record.id).or_insert_with(|| {
                ProgressEstimator::for_task(
                    record.id,
                    self.config,
                    self.random.clone(),
                    self.runtime.clone(),
                )
            });
            estimator.set_signals(GenerationSignals::from_status(record.status));
        }
    }

    pub fn progress(&self, task_id: TaskId) -> Option<f64> {
        self.estimators.get(&task_id).map(ProgressEstimator::progress)
    }

    pub fn phase(&self, task_id: TaskId) -> Option<ProgressPhase> {
        self.estimators.get(&task_id).map(ProgressEstimator::phase)
    }

    pub fn subscribe(&self, task_id: TaskId) -> Option<watch::Receiver<f64>> {
        self.estimators.get(&task_id).map(ProgressEstimator::subscribe)
    }

    /// Stops tracking `task_id`; its tick loop is cancelled.
    pub fn remove(&mut self, task_id: TaskId) -> bool {
        self.estimators.remove(&task_id).is_some()
    }

    /// Drops estimators for tasks that are no longer running and returns
    /// their ids. Hosts tracking long-lived sessions call this after
    /// rendering final states, since `apply` never forgets a task.
    pub fn retain_active(&mut self) -> Vec<TaskId> {
        let settled: Vec<TaskId> = self
            .estimators
            .iter()
            .filter(|(_, estimator)| estimator.phase() != ProgressPhase::Running)
            .map(|(id, _)| *id)
            .collect();
        for id in &settled {
            self.estimators.remove(id);
        }
        settled
    }

    pub fn task_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.estimators.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.estimators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.estimators.is_empty()
    }

    /// Mean progress over tracked tasks, 0 when nothing is tracked.
    pub fn overall_progress(&self) -> f64 {
        if self.estimators.is_empty() {
            return 0.0;
        }
        let total: f64 = self.estimators.values().map(ProgressEstimator::progress).sum();
        crate::progress::round4(total / self.estimators.len() as f64)
    }
}
