pub mod config;
pub mod logging;
pub mod models;
pub mod poller;
pub mod polling;
pub mod progress;
pub mod tracking;

pub use config::{GenwatchConfig, PollingConfig, PollingIntervals, ProgressConfig};
pub use poller::{
    OrchestrationResult, PollCancellationToken, PollReport, PollSnapshot, StatusFetch,
    TaskPoller, TaskStatusSource,
};
pub use polling::{IntervalBucket, interval_for_count, polling_interval, retry_delay};
pub use progress::{GenerationSignals, ProgressEstimator, ProgressPhase};
pub use tracking::GenerationTracker;
