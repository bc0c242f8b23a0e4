use thiserror::Error;

use crate::models::TaskState;

/// 监控服务错误类型定义
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("任务未找到: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("Worker未找到: {hostname}")]
    WorkerNotFound { hostname: String },

    #[error("周期任务未找到: {name}")]
    ScheduleNotFound { name: String },

    #[error("无效参数: {0}")]
    InvalidArgument(String),

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("控制通道不可用: {0}")]
    UpstreamUnavailable(String),

    #[error("任务 {task_id} 已处于终态 {state}，事件被丢弃")]
    StaleEvent { task_id: String, state: TaskState },

    #[error("消息队列错误: {0}")]
    MessageQueue(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl MonitorError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable(message.into())
    }

    /// 是否属于查找失败类错误
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TaskNotFound { .. } | Self::WorkerNotFound { .. } | Self::ScheduleNotFound { .. }
        )
    }

    /// 是否属于调用方参数错误
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::InvalidCron { .. })
    }

    /// 是否由控制通道故障引起
    pub fn is_upstream_unavailable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_) | Self::MessageQueue(_))
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, MonitorError>;
