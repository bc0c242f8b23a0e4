use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskState;

/// 来自任务队列的监控事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MonitorEvent {
    Task(TaskEvent),
    Worker(WorkerEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: String,
    pub event_type: TaskEventType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: TaskEventPayload,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventType {
    Received,
    Started,
    Succeeded,
    Failed,
    Retried,
    Revoked,
}

/// 事件附带的任务字段，缺省字段不覆盖已有值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskEventPayload {
    pub name: Option<String>,
    pub args: Option<String>,
    pub kwargs: Option<String>,
    pub eta: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub traceback: Option<String>,
    pub hostname: Option<String>,
    pub runtime: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerEvent {
    pub hostname: String,
    pub event_type: WorkerEventType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: WorkerEventPayload,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkerEventType {
    Online,
    Heartbeat,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerEventPayload {
    pub active: Option<u32>,
    pub processed: Option<u64>,
    pub loadavg: Option<[f64; 3]>,
    pub freq: Option<f64>,
    pub sw_ident: Option<String>,
    pub sw_ver: Option<String>,
}

impl TaskEventType {
    /// 事件对应的目标状态
    pub fn target_state(&self) -> TaskState {
        match self {
            TaskEventType::Received => TaskState::Received,
            TaskEventType::Started => TaskState::Started,
            TaskEventType::Succeeded => TaskState::Success,
            TaskEventType::Failed => TaskState::Failure,
            TaskEventType::Retried => TaskState::Retry,
            TaskEventType::Revoked => TaskState::Revoked,
        }
    }

    /// 同一时间戳下的应用顺序
    pub fn rank(&self) -> u8 {
        match self {
            TaskEventType::Received => 0,
            TaskEventType::Started => 1,
            TaskEventType::Retried => 2,
            TaskEventType::Succeeded => 3,
            TaskEventType::Failed => 4,
            TaskEventType::Revoked => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskEventType::Received => "task-received",
            TaskEventType::Started => "task-started",
            TaskEventType::Succeeded => "task-succeeded",
            TaskEventType::Failed => "task-failed",
            TaskEventType::Retried => "task-retried",
            TaskEventType::Revoked => "task-revoked",
        }
    }
}

impl TaskEvent {
    pub fn new(
        task_id: impl Into<String>,
        event_type: TaskEventType,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            event_type,
            timestamp,
            payload: TaskEventPayload::default(),
        }
    }

    /// 幂等去重键：task_id + 事件类型 + 时间戳
    pub fn dedup_key(&self) -> (TaskEventType, DateTime<Utc>) {
        (self.event_type, self.timestamp)
    }
}

impl MonitorEvent {
    pub fn event_type_str(&self) -> &'static str {
        match self {
            MonitorEvent::Task(event) => event.event_type.as_str(),
            MonitorEvent::Worker(event) => match event.event_type {
                WorkerEventType::Online => "worker-online",
                WorkerEventType::Heartbeat => "worker-heartbeat",
            },
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            MonitorEvent::Task(event) => event.timestamp,
            MonitorEvent::Worker(event) => event.timestamp,
        }
    }

    pub fn deserialize_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn serialize_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
