use std::sync::Arc;
use std::time::Duration;

use genwatch_core::models::{CoreError, TaskId, TaskRecord, TaskStatus};
use genwatch_core::progress::{RandomSource, ThreadRandom};
use genwatch_core::{
    GenerationTracker, GenwatchConfig, OrchestrationResult, PollCancellationToken, PollReport,
    PollSnapshot, StatusFetch, TaskPoller, TaskStatusSource,
};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::runtime::Handle;
use tokio::time::Instant;

#[derive(Clone, Debug)]
pub struct SimulateOptions {
    pub tasks: u64,
    pub fail_rate: f64,
    pub json: bool,
    pub render_interval: Duration,
}

struct SimulatedTask {
    queued_until: Duration,
    finishes_after: Duration,
    fails: bool,
}

/// In-process stand-in for the task-status service.
pub struct SimulatedService {
    started: Instant,
    tasks: Vec<SimulatedTask>,
}

impl SimulatedService {
    pub fn new(
        options: &SimulateOptions,
        config: &GenwatchConfig,
        random: &dyn RandomSource,
    ) -> Self {
        let typical = Duration::from_millis(config.progress.total_duration_ms);
        let tasks = (0..options.tasks)
            .map(|_| {
                let finishes_after = typical.mul_f64(0.4 + random.unit() * 0.8);
                SimulatedTask {
                    queued_until: finishes_after.mul_f64(0.1),
                    finishes_after,
                    fails: random.unit() < options.fail_rate,
                }
            })
            .collect();
        Self {
            started: Instant::now(),
            tasks,
        }
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        (1..=self.tasks.len() as u64).map(TaskId).collect()
    }

    fn status_of(&self, task: &SimulatedTask, elapsed: Duration) -> TaskStatus {
        if elapsed >= task.finishes_after {
            if task.fails {
                TaskStatus::Failed
            } else {
                TaskStatus::Success
            }
        } else if elapsed < task.queued_until {
            TaskStatus::Queued
        } else if elapsed < task.queued_until.mul_f64(1.5) {
            TaskStatus::Pending
        } else {
            TaskStatus::Processing
        }
    }
}

impl TaskStatusSource for SimulatedService {
    fn fetch_statuses<'a>(&'a self, task_ids: &'a [TaskId]) -> StatusFetch<'a> {
        Box::pin(async move {
            let elapsed = self.started.elapsed();
            Ok(task_ids
                .iter()
                .filter_map(|id| {
                    let index = usize::try_from(id.0).ok()?.checked_sub(1)?;
                    let task = self.tasks.get(index)?;
                    Some(TaskRecord::new(*id, self.status_of(task, elapsed)))
                })
                .collect())
        })
    }
}

#[derive(Serialize)]
struct TaskLine {
    id: u64,
    status: Option<&'static str>,
    code: Option<i32>,
    progress: f64,
}

#[derive(Serialize)]
struct ProgressLine {
    at: String,
    event: &'static str,
    round: u32,
    next_poll_ms: Option<u64>,
    overall: f64,
    tasks: Vec<TaskLine>,
}

struct Renderer {
    json: bool,
    latest: PollSnapshot,
}

impl Renderer {
    fn emit(&self, event: &'static str, tracker: &GenerationTracker) {
        let tasks: Vec<TaskLine> = tracker
            .task_ids()
            .map(|id| {
                let record = self.latest.records.iter().find(|record| record.id == id);
                TaskLine {
                    id: id.0,
                    status: record.map(|record| record.status.as_str()),
                    code: record.map(|record| record.status.code()),
                    progress: tracker.progress(id).unwrap_or(0.0),
                }
            })
            .collect();
        let line = ProgressLine {
            at: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_else(|_| String::from("-")),
            event,
            round: self.latest.round,
            next_poll_ms: self.latest.next_interval_ms,
            overall: tracker.overall_progress(),
            tasks,
        };

        if self.json {
            match serde_json::to_string(&line) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::warn!(error = %e, "failed to encode progress line"),
            }
            return;
        }

        let next = line
            .next_poll_ms
            .map(|ms| format!("{ms} ms"))
            .unwrap_or_else(|| String::from("stop"));
        let detail: Vec<String> = line
            .tasks
            .iter()
            .map(|task| {
                format!(
                    "#{} {} {:>7.3}%",
                    task.id,
                    task.status.unwrap_or("unknown"),
                    task.progress
                )
            })
            .collect();
        println!(
            "{} [{:<6}] round {:>3} next poll {:>9} overall {:>7.3}% | {}",
            line.at,
            line.event,
            line.round,
            next,
            line.overall,
            detail.join(", ")
        );
    }
}

pub async fn run(
    options: SimulateOptions,
    config: GenwatchConfig,
) -> OrchestrationResult<PollReport> {
    let random: Arc<dyn RandomSource> = Arc::new(ThreadRandom);
    let service = Arc::new(SimulatedService::new(&options, &config, random.as_ref()));
    let task_ids = service.task_ids();

    tracing::info!(
        tasks = task_ids.len(),
        fail_rate = options.fail_rate,
        total_duration_ms = config.progress.total_duration_ms,
        "starting simulated generation session"
    );

    let poller = TaskPoller::new(config.polling, service);
    let mut snapshots = poller.subscribe();
    let mut tracker = GenerationTracker::new(config.progress, random, Handle::current());
    let mut renderer = Renderer {
        json: options.json,
        latest: PollSnapshot::default(),
    };

    let token = PollCancellationToken::new();
    let run = poller.run(task_ids, token);
    tokio::pin!(run);
    let mut render_tick = tokio::time::interval(options.render_interval);

    let outcome = loop {
        tokio::select! {
            outcome = &mut run => break outcome,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    continue;
                }
                renderer.latest = snapshots.borrow_and_update().clone();
                tracker.apply(&renderer.latest.records);
                renderer.emit("poll", &tracker);
            }
            _ = render_tick.tick() => renderer.emit("tick", &tracker),
        }
    };

    if let Ok(report) = &outcome {
        renderer.latest = PollSnapshot {
            round: report.rounds,
            records: report.records.clone(),
            generating: 0,
            next_interval_ms: None,
        };
        tracker.apply(&report.records);
    }
    renderer.emit("done", &tracker);

    outcome.map_err(|error: CoreError| {
        tracing::error!(kind = ?error.kind, message = %error.message, "simulated session failed");
        error
    })
}
