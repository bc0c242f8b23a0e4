use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TaskRecord, TaskState};
use crate::errors::MonitorError;

/// 任务列表过滤条件，所有条件之间为“与”关系
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskFilter {
    pub state: Option<TaskState>,
    pub name: Option<String>,
    pub worker: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// 在名称、ID、参数和Worker中做不区分大小写的子串匹配
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSortField {
    TaskId,
    Name,
    State,
    #[default]
    Timestamp,
    Eta,
    Expires,
    Worker,
    Runtime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSort {
    pub field: TaskSortField,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

/// 分页查询结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPage {
    pub items: Vec<TaskRecord>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

/// 各状态的任务数量
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStateSummary {
    pub received: usize,
    pub started: usize,
    pub retry: usize,
    pub success: usize,
    pub failure: usize,
    pub revoked: usize,
}

impl TaskFilter {
    pub fn matches(&self, task: &TaskRecord) -> bool {
        if self.state.is_some_and(|state| task.state != state) {
            return false;
        }
        if let Some(name) = &self.name {
            if task.name.as_deref() != Some(name.as_str()) {
                return false;
            }
        }
        if let Some(worker) = &self.worker {
            if task.worker.as_deref() != Some(worker.as_str()) {
                return false;
            }
        }
        if self.since.is_some_and(|since| task.timestamp < since) {
            return false;
        }
        if self.until.is_some_and(|until| task.timestamp > until) {
            return false;
        }
        if let Some(needle) = &self.search {
            let needle = needle.to_lowercase();
            let haystacks = [
                Some(task.task_id.as_str()),
                task.name.as_deref(),
                task.args.as_deref(),
                task.kwargs.as_deref(),
                task.worker.as_deref(),
            ];
            if !haystacks
                .into_iter()
                .flatten()
                .any(|text| text.to_lowercase().contains(&needle))
            {
                return false;
            }
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self == &TaskFilter::default()
    }
}

impl FromStr for TaskSortField {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task_id" => Ok(TaskSortField::TaskId),
            "name" => Ok(TaskSortField::Name),
            "state" => Ok(TaskSortField::State),
            "timestamp" | "tstamp" => Ok(TaskSortField::Timestamp),
            "eta" => Ok(TaskSortField::Eta),
            "expires" => Ok(TaskSortField::Expires),
            "worker" => Ok(TaskSortField::Worker),
            "runtime" => Ok(TaskSortField::Runtime),
            _ => Err(MonitorError::InvalidArgument(format!("不支持的排序字段: {s}"))),
        }
    }
}

impl FromStr for SortOrder {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(MonitorError::InvalidArgument(format!("不支持的排序方向: {s}"))),
        }
    }
}

impl TaskSort {
    pub fn new(field: TaskSortField, order: SortOrder) -> Self {
        Self { field, order }
    }

    pub fn asc(field: TaskSortField) -> Self {
        Self::new(field, SortOrder::Asc)
    }

    pub fn desc(field: TaskSortField) -> Self {
        Self::new(field, SortOrder::Desc)
    }
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

impl TaskStateSummary {
    pub fn record(&mut self, state: TaskState) {
        match state {
            TaskState::Received => self.received += 1,
            TaskState::Started => self.started += 1,
            TaskState::Retry => self.retry += 1,
            TaskState::Success => self.success += 1,
            TaskState::Failure => self.failure += 1,
            TaskState::Revoked => self.revoked += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.active() + self.finished()
    }

    pub fn active(&self) -> usize {
        self.received + self.started + self.retry
    }

    pub fn finished(&self) -> usize {
        self.success + self.failure + self.revoked
    }
}
