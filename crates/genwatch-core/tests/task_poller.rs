use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use genwatch_core::models::{CoreError, CoreErrorKind, TaskId, TaskRecord, TaskStatus};
use genwatch_core::{
    OrchestrationResult, PollCancellationToken, PollingConfig, StatusFetch, TaskPoller,
    TaskStatusSource,
};
use tokio::time::Instant;

#[derive(Default)]
struct ScriptedState {
    responses: VecDeque<OrchestrationResult<Vec<TaskRecord>>>,
    fallback: Vec<TaskRecord>,
    requests: Vec<Vec<TaskId>>,
}

#[derive(Clone, Default)]
struct ScriptedSource {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedSource {
    fn new(responses: Vec<OrchestrationResult<Vec<TaskRecord>>>) -> Self {
        let source = Self::default();
        source.state.lock().unwrap().responses = responses.into();
        source
    }

    fn with_fallback(self, fallback: Vec<TaskRecord>) -> Self {
        self.state.lock().unwrap().fallback = fallback;
        self
    }

    fn requests(&self) -> Vec<Vec<TaskId>> {
        self.state.lock().unwrap().requests.clone()
    }
}

impl TaskStatusSource for ScriptedSource {
    fn fetch_statuses<'a>(&'a self, task_ids: &'a [TaskId]) -> StatusFetch<'a> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.requests.push(task_ids.to_vec());
            let fallback = state.fallback.clone();
            state.responses.pop_front().unwrap_or(Ok(fallback))
        })
    }
}

fn record(id: u64, status: TaskStatus) -> TaskRecord {
    TaskRecord::new(TaskId(id), status)
}

fn transport_error() -> CoreError {
    CoreError::new(CoreErrorKind::TransportFailure, "connection reset")
}

fn poller(source: &ScriptedSource, config: PollingConfig) -> TaskPoller {
    TaskPoller::new(config, Arc::new(source.clone()))
}

#[tokio::test(start_paused = true)]
async fn polls_until_every_task_is_terminal() {
    let source = ScriptedSource::new(vec![
        Ok(vec![
            record(1, TaskStatus::Processing),
            record(2, TaskStatus::Pending),
        ]),
        Ok(vec![
            record(1, TaskStatus::Success),
            record(2, TaskStatus::Processing),
        ]),
        Ok(vec![record(2, TaskStatus::Failed)]),
    ]);
    let poller = poller(&source, PollingConfig::default());

    let report = poller
        .run(vec![TaskId(1), TaskId(2)], PollCancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.rounds, 3);
    assert_eq!(
        report.records,
        vec![
            record(1, TaskStatus::Success),
            record(2, TaskStatus::Failed)
        ]
    );
    // Two in flight (few bucket), then one (single bucket).
    assert_eq!(report.elapsed_ms, 8_000 + 5_000);
    assert_eq!(
        source.requests(),
        vec![
            vec![TaskId(1), TaskId(2)],
            vec![TaskId(1), TaskId(2)],
            vec![TaskId(2)],
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn empty_task_set_finishes_without_fetching() {
    let source = ScriptedSource::default();
    let poller = poller(&source, PollingConfig::default());

    let report = poller
        .run(Vec::new(), PollCancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.rounds, 1);
    assert!(report.records.is_empty());
    assert!(source.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_with_backoff() {
    let source = ScriptedSource::new(vec![
        Err(transport_error()),
        Err(transport_error()),
        Ok(vec![record(1, TaskStatus::Success)]),
    ]);
    let poller = poller(&source, PollingConfig::default());

    let report = poller
        .run(vec![TaskId(1)], PollCancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.rounds, 1);
    assert_eq!(source.requests().len(), 3);
    assert_eq!(report.elapsed_ms, 1_000 + 2_000);
}

#[tokio::test(start_paused = true)]
async fn persistent_failure_surfaces_after_max_retries() {
    let source = ScriptedSource::new((0..10).map(|_| Err(transport_error())).collect());
    let config = PollingConfig {
        max_retries: 3,
        ..PollingConfig::default()
    };
    let poller = poller(&source, config);

    let error = poller
        .run(vec![TaskId(1)], PollCancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::TransportFailure);
    assert_eq!(source.requests().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn polling_is_abandoned_after_max_duration() {
    let source = ScriptedSource::default().with_fallback(vec![record(1, TaskStatus::Queued)]);
    let config = PollingConfig {
        max_duration_ms: 20_000,
        ..PollingConfig::default()
    };
    let poller = poller(&source, config);

    let error = poller
        .run(vec![TaskId(1)], PollCancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::Timeout);
    // Rounds at 0, 5, 10 and 15 seconds; the wake-up at 20 s hits the deadline.
    assert_eq!(source.requests().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn abandonment_does_not_overshoot_the_deadline() {
    let source = ScriptedSource::default()
        .with_fallback((1..=4).map(|id| record(id, TaskStatus::Processing)).collect());
    let config = PollingConfig {
        max_duration_ms: 12_000,
        ..PollingConfig::default()
    };
    let poller = poller(&source, config);
    let started = Instant::now();

    let error = poller
        .run((1..=4).map(TaskId).collect(), PollCancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::Timeout);
    assert_eq!(started.elapsed().as_millis(), 12_000);
    // Many bucket: rounds at 0 and 10 seconds, none after the deadline.
    assert_eq!(source.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn retry_backoff_is_cut_short_by_the_deadline() {
    let source = ScriptedSource::new((0..10).map(|_| Err(transport_error())).collect());
    let config = PollingConfig {
        max_duration_ms: 2_500,
        ..PollingConfig::default()
    };
    let poller = poller(&source, config);
    let started = Instant::now();

    let error = poller
        .run(vec![TaskId(1)], PollCancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::Timeout);
    assert_eq!(started.elapsed().as_millis(), 2_500);
    // Attempts at 0 and 1 s; the 2 s backoff is clipped at 2.5 s.
    assert_eq!(source.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_the_wait_between_rounds() {
    let source = ScriptedSource::default().with_fallback(vec![record(1, TaskStatus::Processing)]);
    let poller = Arc::new(poller(&source, PollingConfig::default()));
    let token = PollCancellationToken::new();

    let handle = tokio::spawn({
        let poller = poller.clone();
        let token = token.clone();
        async move { poller.run(vec![TaskId(1)], token).await }
    });

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    token.cancel();

    let error = handle.await.unwrap().unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::Cancelled);
    assert_eq!(source.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn snapshots_are_published_each_round() {
    let source = ScriptedSource::new(vec![
        Ok(vec![
            record(1, TaskStatus::Queued),
            record(2, TaskStatus::Queued),
            record(3, TaskStatus::Queued),
            record(4, TaskStatus::Processing),
        ]),
        Ok(vec![
            record(1, TaskStatus::Success),
            record(2, TaskStatus::Success),
            record(3, TaskStatus::Success),
            record(4, TaskStatus::Success),
        ]),
    ]);
    let poller = poller(&source, PollingConfig::default());
    let mut snapshots = poller.subscribe();

    let run = poller.run(
        (1..=4).map(TaskId).collect(),
        PollCancellationToken::new(),
    );
    let observe = async {
        snapshots.changed().await.unwrap();
        let first = snapshots.borrow_and_update().clone();
        assert_eq!(first.round, 1);
        assert_eq!(first.generating, 4);
        assert_eq!(first.next_interval_ms, Some(10_000));
    };
    let (report, ()) = tokio::join!(run, observe);
    report.unwrap();

    let last = snapshots.borrow().clone();
    assert_eq!(last.round, 2);
    assert_eq!(last.generating, 0);
    assert_eq!(last.next_interval_ms, None);
}

#[tokio::test(start_paused = true)]
async fn unreported_tasks_keep_polling_and_foreign_ids_are_ignored() {
    let source = ScriptedSource::new(vec![
        Ok(vec![record(99, TaskStatus::Success)]),
        Ok(vec![record(1, TaskStatus::Success)]),
    ]);
    let poller = poller(&source, PollingConfig::default());

    let report = poller
        .run(vec![TaskId(1)], PollCancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.rounds, 2);
    assert_eq!(report.records, vec![record(1, TaskStatus::Success)]);
    assert_eq!(report.elapsed_ms, 5_000);
}
