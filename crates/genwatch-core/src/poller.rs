use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, watch};
use tokio::time::Instant;

use crate::config::PollingConfig;
use crate::models::{CoreError, CoreErrorKind, TaskId, TaskRecord, count_generating};
use crate::polling::{interval_for_count, retry_delay};

pub type OrchestrationResult<T> = Result<T, CoreError>;

pub type StatusFetch<'a> =
    Pin<Box<dyn Future<Output = OrchestrationResult<Vec<TaskRecord>>> + Send + 'a>>;

/// Remote task-status service. Returns the current record for each known id;
/// ids the service does not report are left unchanged.
pub trait TaskStatusSource: Send + Sync {
    fn fetch_statuses<'a>(&'a self, task_ids: &'a [TaskId]) -> StatusFetch<'a>;
}

#[derive(Clone, Debug, Default)]
pub struct PollCancellationToken {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl PollCancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSnapshot {
    pub round: u32,
    pub records: Vec<TaskRecord>,
    pub generating: usize,
    pub next_interval_ms: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollReport {
    pub records: Vec<TaskRecord>,
    pub rounds: u32,
    pub elapsed_ms: u64,
}

/// Drives status polling for one task set until every task is terminal.
pub struct TaskPoller {
    config: PollingConfig,
    source: Arc<dyn TaskStatusSource>,
    updates: watch::Sender<PollSnapshot>,
}

impl TaskPoller {
    pub fn new(config: PollingConfig, source: Arc<dyn TaskStatusSource>) -> Self {
        let (updates, _) = watch::channel(PollSnapshot::default());
        Self {
            config,
            source,
            updates,
        }
    }

    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    pub fn subscribe(&self) -> watch::Receiver<PollSnapshot> {
        self.updates.subscribe()
    }

    pub async fn run(
        &self,
        task_ids: Vec<TaskId>,
        token: PollCancellationToken,
    ) -> OrchestrationResult<PollReport> {
        let started = Instant::now();
        let deadline = started + self.config.max_duration();
        let mut latest: BTreeMap<TaskId, Option<TaskRecord>> =
            task_ids.into_iter().map(|id| (id, None)).collect();
        let mut round = 0u32;

        loop {
            if token.is_cancelled() {
                return Err(cancelled_error());
            }

            let pending: Vec<TaskId> = latest
                .iter()
                .filter(|(_, record)| {
                    !matches!(record, Some(record) if record.status.is_terminal())
                })
                .map(|(id, _)| *id)
                .collect();

            if !pending.is_empty() {
                let records = self
                    .fetch_with_retry(&pending, started, deadline, &token)
                    .await?;
                for record in records {
                    match latest.get_mut(&record.id) {
                        Some(slot) => *slot = Some(record),
                        None => tracing::debug!(
                            task_id = record.id.0,
                            "ignoring status for task outside the polled set"
                        ),
                    }
                }
            }
            round = round.saturating_add(1);

            let records: Vec<TaskRecord> = latest.values().flatten().copied().collect();
            // Tasks the service has not reported yet still count as in flight.
            let unreported = latest.values().filter(|record| record.is_none()).count();
            let generating = count_generating(&records) + unreported;
            let next_interval = interval_for_count(&self.config.intervals, generating);

            tracing::debug!(
                round,
                generating,
                next_interval_ms = next_interval.map(|d| d.as_millis() as u64),
                "polled task statuses"
            );
            self.updates.send_replace(PollSnapshot {
                round,
                records: records.clone(),
                generating,
                next_interval_ms: next_interval.map(|d| d.as_millis() as u64),
            });

            let Some(interval) = next_interval else {
                return Ok(PollReport {
                    records,
                    rounds: round,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            };

            // The next round never starts past the deadline.
            let wake = (Instant::now() + interval).min(deadline);
            sleep_until_or_cancel(wake, &token).await?;
            if Instant::now() >= deadline {
                return Err(abandon(started, generating));
            }
        }
    }

    async fn fetch_with_retry(
        &self,
        task_ids: &[TaskId],
        started: Instant,
        deadline: Instant,
        token: &PollCancellationToken,
    ) -> OrchestrationResult<Vec<TaskRecord>> {
        let mut attempt = 0u32;
        loop {
            match self.source.fetch_statuses(task_ids).await {
                Ok(records) => return Ok(records),
                Err(error) if error.kind == CoreErrorKind::Cancelled => return Err(error),
                Err(error) if attempt >= self.config.max_retries => {
                    tracing::error!(
                        attempt,
                        kind = ?error.kind,
                        message = %error.message,
                        "task status fetch failed after retries"
                    );
                    return Err(error);
                }
                Err(error) => {
                    let delay = retry_delay(&self.config, attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        kind = ?error.kind,
                        message = %error.message,
                        "task status fetch failed, retrying"
                    );
                    let wake = (Instant::now() + delay).min(deadline);
                    sleep_until_or_cancel(wake, token).await?;
                    if Instant::now() >= deadline {
                        return Err(abandon(started, task_ids.len()));
                    }
                    attempt += 1;
                }
            }
        }
    }
}

async fn sleep_until_or_cancel(
    wake: Instant,
    token: &PollCancellationToken,
) -> OrchestrationResult<()> {
    tokio::select! {
        _ = tokio::time::sleep_until(wake) => Ok(()),
        _ = token.cancelled() => Err(cancelled_error()),
    }
}

fn abandon(started: Instant, generating: usize) -> CoreError {
    let elapsed = started.elapsed();
    tracing::error!(
        generating,
        elapsed_ms = elapsed.as_millis() as u64,
        "abandoning task polling after max duration"
    );
    CoreError::new(
        CoreErrorKind::Timeout,
        format!(
            "{generating} task(s) still generating after {} ms",
            elapsed.as_millis()
        ),
    )
}

fn cancelled_error() -> CoreError {
    CoreError::new(CoreErrorKind::Cancelled, "task polling was cancelled")
}
