use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::routes::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let stats = state.store.stats();
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "taskmon",
        "version": env!("CARGO_PKG_VERSION"),
        "tasks": state.store.task_count().await,
        "workers": state.store.worker_count().await,
        "events": stats,
    }))
}
