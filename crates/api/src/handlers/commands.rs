use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::Value;

use crate::{
    error::ApiResult,
    response::{accepted, success},
    routes::AppState,
};

/// 列出可用的批量命令
pub async fn list_commands(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.commands.descriptors()))
}

/// 执行命名命令，返回202表示控制通道已接收
pub async fn execute_command(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let report = state.commands.execute_named(&name, body).await?;
    let message = format!("命令 {} 已发送 {} 条消息", report.command, report.messages_sent);
    Ok(accepted(report, message))
}
