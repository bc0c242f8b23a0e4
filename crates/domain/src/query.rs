use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use taskmon_core::{
    models::{
        Page, SortOrder, TaskFilter, TaskPage, TaskRecord, TaskSort, TaskSortField,
        TaskStateSummary, WorkerView,
    },
    MonitorError, MonitorResult,
};
use tracing::debug;

use crate::state_store::StateStore;

/// 状态存储之上的只读查询服务
pub struct QueryService {
    store: Arc<StateStore>,
    liveness_threshold: Duration,
    max_page_size: usize,
}

impl QueryService {
    pub fn new(store: Arc<StateStore>, liveness_threshold: Duration, max_page_size: usize) -> Self {
        Self {
            store,
            liveness_threshold,
            max_page_size,
        }
    }

    pub fn liveness_threshold(&self) -> Duration {
        self.liveness_threshold
    }

    pub fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    /// 过滤、排序并分页任务记录
    ///
    /// 页大小超过上限时按上限截断；结果为空不是错误。
    pub async fn list_tasks(
        &self,
        filter: &TaskFilter,
        sort: TaskSort,
        page: Page,
    ) -> MonitorResult<TaskPage> {
        if page.limit == 0 {
            return Err(MonitorError::invalid_argument("分页大小必须大于0"));
        }
        if let (Some(since), Some(until)) = (filter.since, filter.until) {
            if since > until {
                return Err(MonitorError::invalid_argument(format!(
                    "时间范围无效: {since} 晚于 {until}"
                )));
            }
        }

        let limit = page.limit.min(self.max_page_size);

        let mut matched: Vec<TaskRecord> = self
            .store
            .tasks()
            .await
            .into_iter()
            .filter(|task| filter.matches(task))
            .collect();
        matched.sort_by(|a, b| compare_tasks(a, b, sort));

        let total = matched.len();
        let items: Vec<TaskRecord> = matched.into_iter().skip(page.offset).take(limit).collect();

        debug!(
            "任务查询: 匹配 {} 条，返回 {} 条 (offset={}, limit={})",
            total,
            items.len(),
            page.offset,
            limit
        );

        Ok(TaskPage {
            items,
            total,
            offset: page.offset,
            limit,
        })
    }

    pub async fn get_task(&self, task_id: &str) -> MonitorResult<TaskRecord> {
        self.store.get_task(task_id).await
    }

    /// 所有Worker及其派生的存活状态，按主机名排序
    pub async fn list_workers(&self) -> Vec<WorkerView> {
        self.list_workers_at(Utc::now()).await
    }

    pub async fn list_workers_at(&self, now: DateTime<Utc>) -> Vec<WorkerView> {
        let mut workers = self.store.workers().await;
        workers.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        workers
            .iter()
            .map(|worker| worker.view(now, self.liveness_threshold))
            .collect()
    }

    pub async fn get_worker(&self, hostname: &str) -> MonitorResult<WorkerView> {
        let worker = self.store.get_worker(hostname).await?;
        Ok(worker.view(Utc::now(), self.liveness_threshold))
    }

    pub async fn task_summary(&self) -> TaskStateSummary {
        let mut summary = TaskStateSummary::default();
        for task in self.store.tasks().await {
            summary.record(task.state);
        }
        summary
    }
}

/// 按排序字段比较，缺失值始终排在最后，相同时按 task_id 升序
fn compare_tasks(a: &TaskRecord, b: &TaskRecord, sort: TaskSort) -> Ordering {
    let primary = match sort.field {
        TaskSortField::TaskId => directed(a.task_id.cmp(&b.task_id), sort.order),
        TaskSortField::Name => compare_optional(a.name.as_ref(), b.name.as_ref(), sort.order),
        TaskSortField::State => directed(a.state.cmp(&b.state), sort.order),
        TaskSortField::Timestamp => directed(a.timestamp.cmp(&b.timestamp), sort.order),
        TaskSortField::Eta => compare_optional(a.eta.as_ref(), b.eta.as_ref(), sort.order),
        TaskSortField::Expires => {
            compare_optional(a.expires.as_ref(), b.expires.as_ref(), sort.order)
        }
        TaskSortField::Worker => {
            compare_optional(a.worker.as_ref(), b.worker.as_ref(), sort.order)
        }
        TaskSortField::Runtime => match (a.runtime, b.runtime) {
            (Some(x), Some(y)) => directed(x.total_cmp(&y), sort.order),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    };

    primary.then_with(|| a.task_id.cmp(&b.task_id))
}

fn compare_optional<T: Ord>(a: Option<&T>, b: Option<&T>, order: SortOrder) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => directed(x.cmp(y), order),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn directed(ordering: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}
