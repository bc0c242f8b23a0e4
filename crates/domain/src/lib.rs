//! # 领域服务
//!
//! - [`state_store`]: 由事件流驱动的任务与Worker状态存储
//! - [`query`]: 状态存储之上的过滤、排序、分页查询
//! - [`schedule`]: 周期任务表单校验与下次执行时间计算
//! - [`registry`]: 已注册任务名称

pub mod query;
pub mod registry;
pub mod schedule;
pub mod state_store;

pub use query::QueryService;
pub use registry::InMemoryTaskRegistry;
pub use schedule::{next_run_after, CrontabScheduler, PeriodicScheduleService};
pub use state_store::{IngestOutcome, IngestStats, StateStore};
