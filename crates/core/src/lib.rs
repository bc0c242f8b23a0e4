//! taskmon 核心库：数据模型、错误类型、配置以及组件之间的抽象接口。

pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use self::config::*;
pub use errors::*;

pub type MonitorResult<T> = std::result::Result<T, MonitorError>;
