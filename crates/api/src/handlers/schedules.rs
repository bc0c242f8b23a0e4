use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskmon_core::models::{PeriodicScheduleEntry, PeriodicScheduleForm};

use crate::{
    error::ApiResult,
    response::{created, success, ApiResponse},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct NextRunParams {
    pub from: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleWithNextRun {
    #[serde(flatten)]
    pub entry: PeriodicScheduleEntry,
    pub next_run: Option<DateTime<Utc>>,
}

/// 已注册任务名，用于周期任务表单的下拉选项
pub async fn registered_tasks(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.schedules.registered_task_choices()))
}

pub async fn list_schedules(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.schedules.list().await?))
}

/// 校验并保存周期任务，同名则覆盖
pub async fn save_schedule(
    State(state): State<AppState>,
    Json(form): Json<PeriodicScheduleForm>,
) -> ApiResult<impl IntoResponse> {
    let entry = state.schedules.save(&form).await?;
    Ok(created(entry))
}

pub async fn get_schedule(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<NextRunParams>,
) -> ApiResult<impl IntoResponse> {
    let (entry, next_run) = state
        .schedules
        .get_with_next_run(&name, params.from.unwrap_or_else(Utc::now))
        .await?;
    Ok(success(ScheduleWithNextRun { entry, next_run }))
}

pub async fn delete_schedule(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.schedules.delete(&name).await?;
    Ok(ApiResponse::success_empty_with_message(format!(
        "周期任务 {name} 已删除"
    )))
}
