use axum::{extract::State, response::IntoResponse, Json};
use taskmon_core::models::MonitorEvent;
use taskmon_domain::IngestStats;
use tracing::debug;

use crate::{error::ApiResult, response::success, routes::AppState};

/// 批量写入监控事件，返回本批的摄取结果统计
pub async fn ingest_events(
    State(state): State<AppState>,
    Json(events): Json<Vec<MonitorEvent>>,
) -> ApiResult<impl IntoResponse> {
    let mut stats = IngestStats::default();
    for event in events {
        stats.record(state.store.ingest(event).await);
    }

    debug!("HTTP批量摄取 {} 个事件", stats.total());
    Ok(success(stats))
}
