use serde::{Deserialize, Serialize};

use crate::models::CoreError;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

/// Status of a generation task as reported by the task-status service.
///
/// The numeric codes are a wire contract with that service. `Queued` uses
/// the sentinel 9999 so it stays clear of the low range the service assigns.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum TaskStatus {
    Pending,
    Processing,
    Success,
    Failed,
    Queued,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Processing,
        TaskStatus::Success,
        TaskStatus::Failed,
        TaskStatus::Queued,
    ];

    pub const fn code(self) -> i32 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Processing => 1,
            TaskStatus::Success => 2,
            TaskStatus::Failed => 3,
            TaskStatus::Queued => 9999,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, CoreError> {
        match code {
            0 => Ok(TaskStatus::Pending),
            1 => Ok(TaskStatus::Processing),
            2 => Ok(TaskStatus::Success),
            3 => Ok(TaskStatus::Failed),
            9999 => Ok(TaskStatus::Queued),
            other => Err(CoreError::invalid_input(format!(
                "unknown task status code '{other}'"
            ))),
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
            TaskStatus::Queued => "queued",
        }
    }
}

impl TryFrom<i32> for TaskStatus {
    type Error = CoreError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        TaskStatus::from_code(code)
    }
}

impl From<TaskStatus> for i32 {
    fn from(status: TaskStatus) -> Self {
        status.code()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub status: TaskStatus,
}

impl TaskRecord {
    pub fn new(id: TaskId, status: TaskStatus) -> Self {
        Self { id, status }
    }
}

/// Number of records whose status is not terminal.
pub fn count_generating<'a>(records: impl IntoIterator<Item = &'a TaskRecord>) -> usize {
    records
        .into_iter()
        .filter(|record| !record.status.is_terminal())
        .count()
}
