use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::MonitorError;

/// 任务执行记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub name: Option<String>,
    pub state: TaskState,
    pub args: Option<String>,
    pub kwargs: Option<String>,
    pub eta: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub traceback: Option<String>,
    /// 执行该任务的Worker主机名，仅用于查找
    pub worker: Option<String>,
    pub runtime: Option<f64>,
    pub retries: u32,
    /// 最近一次被接受的事件时间
    pub timestamp: DateTime<Utc>,
}

/// 任务状态
///
/// ```text
/// RECEIVED → STARTED → SUCCESS | FAILURE | RETRY
/// RETRY → STARTED
/// 任意非终态 → REVOKED
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskState {
    #[serde(rename = "RECEIVED")]
    Received,
    #[serde(rename = "STARTED")]
    Started,
    #[serde(rename = "RETRY")]
    Retry,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILURE")]
    Failure,
    #[serde(rename = "REVOKED")]
    Revoked,
}

impl TaskState {
    pub const ALL: [TaskState; 6] = [
        TaskState::Received,
        TaskState::Started,
        TaskState::Retry,
        TaskState::Success,
        TaskState::Failure,
        TaskState::Revoked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Received => "RECEIVED",
            TaskState::Started => "STARTED",
            TaskState::Retry => "RETRY",
            TaskState::Success => "SUCCESS",
            TaskState::Failure => "FAILURE",
            TaskState::Revoked => "REVOKED",
        }
    }

    /// 终态之后不再接受任何状态转换
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Success | TaskState::Failure | TaskState::Revoked
        )
    }

    /// 检查状态转换是否合法
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;

        match (self, next) {
            (Received, Started) => true,
            (Started, Success | Failure | Retry) => true,
            (Retry, Started) => true,
            (from, Revoked) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RECEIVED" => Ok(TaskState::Received),
            "STARTED" => Ok(TaskState::Started),
            "RETRY" => Ok(TaskState::Retry),
            "SUCCESS" => Ok(TaskState::Success),
            "FAILURE" => Ok(TaskState::Failure),
            "REVOKED" => Ok(TaskState::Revoked),
            _ => Err(MonitorError::InvalidArgument(format!("未知的任务状态: {s}"))),
        }
    }
}

impl TaskRecord {
    /// 以首个观察到的事件创建记录
    pub fn new(task_id: impl Into<String>, state: TaskState, timestamp: DateTime<Utc>) -> Self {
        Self {
            task_id: task_id.into(),
            name: None,
            state,
            args: None,
            kwargs: None,
            eta: None,
            expires: None,
            result: None,
            traceback: None,
            worker: None,
            runtime: None,
            retries: 0,
            timestamp,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
