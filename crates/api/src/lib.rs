//! # Taskmon API
//!
//! 任务队列监控服务的HTTP接口，基于Axum构建。
//!
//! ## API 端点
//!
//! ### 查询
//! - `GET /api/tasks` - 过滤、排序、分页的任务列表
//! - `GET /api/tasks/summary` - 各状态任务数量
//! - `GET /api/tasks/{task_id}` - 任务详情
//! - `GET /api/workers` - Worker列表及存活状态
//! - `GET /api/workers/{hostname}` - Worker详情
//!
//! ### 控制命令
//! - `GET /api/commands` - 可用的批量命令
//! - `POST /api/commands/{name}` - 执行命令，成功返回 `202 Accepted`
//!
//! ### 周期任务
//! - `GET /api/registry/tasks` - 已注册任务名
//! - `GET|POST /api/schedules` - 列出或保存周期任务
//! - `GET|DELETE /api/schedules/{name}` - 查看（含下次执行时间）或删除
//!
//! ### 其他
//! - `POST /api/events` - 批量写入监控事件
//! - `GET /health` - 健康检查
//! - `GET /metrics` - Prometheus指标
//!
//! ## 错误响应
//!
//! ```json
//! {
//!   "success": false,
//!   "error": {
//!     "message": "任务未找到: t1",
//!     "type": "TASK_NOT_FOUND",
//!     "code": 404,
//!     "timestamp": "2024-01-01T00:00:00Z"
//!   }
//! }
//! ```
//!
//! 查找失败返回404，参数错误返回400，控制通道不可用返回503，其余为500。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use std::time::Duration;

use axum::Router;
use taskmon_core::config::ApiConfig;
use tower_http::timeout::TimeoutLayer;

use middleware::{cors_layer, request_logging, trace_layer};
pub use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(state: AppState, api_config: &ApiConfig) -> Router {
    let mut app = create_routes(state)
        .layer(axum::middleware::from_fn(request_logging))
        .layer(TimeoutLayer::new(Duration::from_secs(
            api_config.request_timeout_seconds,
        )))
        .layer(trace_layer());

    if api_config.cors_enabled {
        app = app.layer(cors_layer());
    }

    app
}
