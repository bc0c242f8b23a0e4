use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use taskmon_dispatcher::CommandRegistry;
use taskmon_domain::{PeriodicScheduleService, QueryService, StateStore};

use crate::handlers::{
    commands::{execute_command, list_commands},
    events::ingest_events,
    health::health_check,
    metrics::render_metrics,
    schedules::{delete_schedule, get_schedule, list_schedules, registered_tasks, save_schedule},
    tasks::{get_task, list_tasks, task_summary},
    workers::{get_worker, list_workers},
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StateStore>,
    pub query: Arc<QueryService>,
    pub commands: Arc<CommandRegistry>,
    pub schedules: Arc<PeriodicScheduleService>,
    pub metrics: Option<PrometheusHandle>,
    pub default_page_size: usize,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        // 任务查询
        .route("/api/tasks", get(list_tasks))
        .route("/api/tasks/summary", get(task_summary))
        .route("/api/tasks/{task_id}", get(get_task))
        // Worker查询
        .route("/api/workers", get(list_workers))
        .route("/api/workers/{hostname}", get(get_worker))
        // 控制命令
        .route("/api/commands", get(list_commands))
        .route("/api/commands/{name}", post(execute_command))
        // 周期任务
        .route("/api/registry/tasks", get(registered_tasks))
        .route("/api/schedules", get(list_schedules).post(save_schedule))
        .route(
            "/api/schedules/{name}",
            get(get_schedule).delete(delete_schedule),
        )
        // 推送式事件摄取
        .route("/api/events", post(ingest_events))
        .with_state(state)
}
