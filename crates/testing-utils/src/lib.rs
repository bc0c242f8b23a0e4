//! # Taskmon Testing Utils
//!
//! 工作区共享的测试工具：控制通道、事件源、周期任务存储的模拟实现，
//! 以及监控事件构建器。
//!
//! ```toml
//! [dev-dependencies]
//! taskmon-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
