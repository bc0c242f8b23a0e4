use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use taskmon_core::{
    models::{Page, SortOrder, TaskFilter, TaskSort, TaskSortField, TaskState},
    MonitorResult,
};

use crate::{error::ApiResult, response::success, routes::AppState};

/// 任务列表查询参数
#[derive(Debug, Default, Deserialize)]
pub struct TaskQueryParams {
    pub state: Option<String>,
    pub name: Option<String>,
    pub worker: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl TaskQueryParams {
    pub fn into_query(self, default_limit: usize) -> MonitorResult<(TaskFilter, TaskSort, Page)> {
        let filter = TaskFilter {
            state: self.state.as_deref().map(str::parse::<TaskState>).transpose()?,
            name: self.name,
            worker: self.worker,
            since: self.since,
            until: self.until,
            search: self.search,
        };

        let sort = TaskSort::new(
            self.sort
                .as_deref()
                .map(str::parse::<TaskSortField>)
                .transpose()?
                .unwrap_or_default(),
            self.order
                .as_deref()
                .map(str::parse::<SortOrder>)
                .transpose()?
                .unwrap_or_default(),
        );

        let page = Page::new(
            self.offset.unwrap_or(0),
            self.limit.unwrap_or(default_limit),
        );

        Ok((filter, sort, page))
    }
}

/// 获取任务列表
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<TaskQueryParams>,
) -> ApiResult<impl IntoResponse> {
    let (filter, sort, page) = params.into_query(state.default_page_size)?;
    let page = state.query.list_tasks(&filter, sort, page).await?;
    Ok(success(page))
}

/// 获取单个任务
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let task = state.query.get_task(&task_id).await?;
    Ok(success(task))
}

/// 各状态任务数量
pub async fn task_summary(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.query.task_summary().await))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params_defaults() {
        let (filter, sort, page) = TaskQueryParams::default().into_query(50).unwrap();
        assert!(filter.is_empty());
        assert_eq!(sort, TaskSort::default());
        assert_eq!(page, Page::new(0, 50));
    }

    #[test]
    fn test_query_params_parse_enums() {
        let params = TaskQueryParams {
            state: Some("failure".to_string()),
            sort: Some("runtime".to_string()),
            order: Some("ASC".to_string()),
            limit: Some(10),
            ..Default::default()
        };
        let (filter, sort, page) = params.into_query(50).unwrap();
        assert_eq!(filter.state, Some(TaskState::Failure));
        assert_eq!(sort, TaskSort::asc(TaskSortField::Runtime));
        assert_eq!(page.limit, 10);

        let bad = TaskQueryParams {
            sort: Some("color".to_string()),
            ..Default::default()
        };
        assert!(bad.into_query(50).unwrap_err().is_invalid_argument());
    }
}
