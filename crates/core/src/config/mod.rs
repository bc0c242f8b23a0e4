//! 配置管理
//!
//! 配置按以下优先级合并（后者覆盖前者）：
//!
//! 1. 内置默认值
//! 2. TOML配置文件（`-c` 指定，或依次查找 `config/taskmon.toml`、`taskmon.toml`、
//!    `/etc/taskmon/config.toml`）
//! 3. 环境变量，前缀 `TASKMON`，层级分隔符 `__`，例如 `TASKMON__BROKER__URL`

pub mod models;

pub use models::*;
