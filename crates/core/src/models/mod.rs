//! # 数据模型
//!
//! 定义任务队列监控服务的核心数据结构，包括任务记录、Worker记录、
//! 监控事件、控制消息以及周期任务定义。
//!
//! ## 核心模型
//!
//! ### TaskRecord - 任务执行记录
//! 一个任务在任务队列中的最新已知状态，由事件流创建和更新，从不删除。
//!
//! ### WorkerRecord - Worker节点记录
//! 以主机名为键，记录最近一次心跳；存活状态由心跳时间派生。
//!
//! ### MonitorEvent - 监控事件
//! 任务生命周期事件和Worker心跳，是状态存储唯一的写入来源。
//!
//! ### ControlMessage - 控制消息
//! 撤销任务、设置速率限制、Worker广播命令在控制通道上的格式。
//!
//! ### PeriodicScheduleEntry - 周期任务定义
//! 间隔调度或crontab调度二选一。
//!
//! ## 状态管理
//!
//! ### 任务状态流转
//! ```text
//! RECEIVED → STARTED → SUCCESS
//!               ↓  ↑     FAILURE
//!             RETRY
//!
//! 任意非终态 → REVOKED
//! ```
//!
//! SUCCESS、FAILURE、REVOKED 为终态，终态之后到达的事件被丢弃。
//!
//! ## 序列化
//!
//! 所有模型都实现 `serde::Serialize` 和 `serde::Deserialize`，
//! 时间字段统一使用 `DateTime<Utc>`。

pub mod control;
pub mod event;
pub mod query;
pub mod schedule;
pub mod task;
pub mod worker;

pub use control::*;
pub use event::*;
pub use query::*;
pub use schedule::*;
pub use task::*;
pub use worker::*;
