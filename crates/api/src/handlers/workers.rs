use axum::{
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{error::ApiResult, response::success, routes::AppState};

/// 获取Worker列表，包含派生的存活状态
pub async fn list_workers(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.query.list_workers().await))
}

pub async fn get_worker(
    State(state): State<AppState>,
    Path(hostname): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let worker = state.query.get_worker(&hostname).await?;
    Ok(success(worker))
}
