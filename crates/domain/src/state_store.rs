//! # 状态存储
//!
//! 保存任务与Worker的最新已知状态，事件流是唯一的写入来源。
//!
//! ## 写入语义
//!
//! - 同一任务的 (事件类型, 时间戳) 重复到达视为重复投递，不产生任何变化
//! - 任务记录由该任务已接受的全部事件按时间戳重放得到，乱序事件落在
//!   自己的时间位置上，同一字段以时间戳较晚者为准
//! - 任务进入终态后，后续事件一律丢弃并计数，此时只保留去重键
//! - 重放时违反状态机的事件不会被应用，摄取结果为拒绝；事件保留在历史中，
//!   较早的事件补齐空缺后会在重放中生效，因此最终记录与到达顺序无关
//!
//! ## 并发
//!
//! 记录按键的哈希分布到多个 `RwLock<HashMap>` 分片中，记录在写锁内整体替换，
//! 读者只会看到替换前或替换后的完整记录。

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use taskmon_core::{
    models::{
        MonitorEvent, TaskEvent, TaskEventType, TaskRecord, TaskState, WorkerEvent, WorkerRecord,
    },
    MonitorError, MonitorResult,
};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// 单个事件的摄取结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcome {
    Applied,
    Duplicate,
    Stale,
    Rejected,
}

impl IngestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestOutcome::Applied => "applied",
            IngestOutcome::Duplicate => "duplicate",
            IngestOutcome::Stale => "stale",
            IngestOutcome::Rejected => "rejected",
        }
    }
}

/// 摄取统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub applied: u64,
    pub duplicate: u64,
    pub stale: u64,
    pub rejected: u64,
}

impl IngestStats {
    pub fn record(&mut self, outcome: IngestOutcome) {
        match outcome {
            IngestOutcome::Applied => self.applied += 1,
            IngestOutcome::Duplicate => self.duplicate += 1,
            IngestOutcome::Stale => self.stale += 1,
            IngestOutcome::Rejected => self.rejected += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.applied + self.duplicate + self.stale + self.rejected
    }
}

#[derive(Debug, Default)]
struct IngestCounters {
    applied: AtomicU64,
    duplicate: AtomicU64,
    stale: AtomicU64,
    rejected: AtomicU64,
}

impl IngestCounters {
    fn record(&self, outcome: IngestOutcome, kind: &'static str) {
        let slot = match outcome {
            IngestOutcome::Applied => &self.applied,
            IngestOutcome::Duplicate => &self.duplicate,
            IngestOutcome::Stale => &self.stale,
            IngestOutcome::Rejected => &self.rejected,
        };
        slot.fetch_add(1, Ordering::Relaxed);
        counter!("taskmon_events_ingested_total", "kind" => kind, "outcome" => outcome.as_str())
            .increment(1);
    }

    fn snapshot(&self) -> IngestStats {
        IngestStats {
            applied: self.applied.load(Ordering::Relaxed),
            duplicate: self.duplicate.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// 任务记录、尚未终结时的事件历史以及全部去重键
#[derive(Debug)]
struct TaskSlot {
    record: TaskRecord,
    /// 按 (时间戳, 事件顺序) 排列；任务进入终态后清空
    history: Vec<TaskEvent>,
    seen: Vec<(TaskEventType, DateTime<Utc>)>,
}

impl TaskSlot {
    fn new(event: TaskEvent) -> Self {
        let record = first_record(&event);
        let seen = vec![event.dedup_key()];
        let history = if record.is_terminal() {
            Vec::new()
        } else {
            vec![event]
        };
        Self {
            record,
            history,
            seen,
        }
    }

    /// 在原位合并新事件
    ///
    /// 调用方持有分片写锁，读者只会看到合并前或合并后的记录。
    fn merge(&mut self, event: TaskEvent) -> MonitorResult<IngestOutcome> {
        let key = event.dedup_key();
        if self.seen.contains(&key) {
            return Ok(IngestOutcome::Duplicate);
        }

        if self.record.is_terminal() {
            return Err(MonitorError::StaleEvent {
                task_id: self.record.task_id.clone(),
                state: self.record.state,
            });
        }

        let position = self
            .history
            .partition_point(|accepted| order_key(accepted) <= order_key(&event));
        self.history.insert(position, event);
        self.seen.push(key);

        let (record, refused) = replay(&self.history, position)?;
        self.record = record;
        if self.record.is_terminal() {
            self.history = Vec::new();
        }

        match refused {
            None => Ok(IngestOutcome::Applied),
            Some((from, to)) => Err(MonitorError::invalid_argument(format!(
                "非法的状态转换 {from} -> {to}，等待更早的事件"
            ))),
        }
    }
}

struct Shards<V> {
    shards: Vec<RwLock<HashMap<String, V>>>,
}

impl<V> Shards<V> {
    fn new(count: usize) -> Self {
        let count = count.max(1);
        Self {
            shards: (0..count).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard_for(&self, key: &str) -> &RwLock<HashMap<String, V>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }

    async fn read<T>(&self, key: &str, f: impl FnOnce(&V) -> T) -> Option<T> {
        self.shard_for(key).read().await.get(key).map(f)
    }

    async fn collect<T>(&self, f: impl Fn(&V) -> T) -> Vec<T> {
        let mut values = Vec::new();
        for shard in &self.shards {
            values.extend(shard.read().await.values().map(&f));
        }
        values
    }

    async fn len(&self) -> usize {
        let mut len = 0;
        for shard in &self.shards {
            len += shard.read().await.len();
        }
        len
    }
}

/// 任务与Worker状态存储
pub struct StateStore {
    tasks: Shards<TaskSlot>,
    workers: Shards<WorkerRecord>,
    counters: IngestCounters,
}

impl StateStore {
    pub fn new(shard_count: usize) -> Self {
        Self {
            tasks: Shards::new(shard_count),
            workers: Shards::new(shard_count),
            counters: IngestCounters::default(),
        }
    }

    /// 摄取一个监控事件，错误在内部吸收并计数
    pub async fn ingest(&self, event: MonitorEvent) -> IngestOutcome {
        match event {
            MonitorEvent::Task(event) => self.ingest_task(event).await,
            MonitorEvent::Worker(event) => self.ingest_worker(event).await,
        }
    }

    pub async fn ingest_task(&self, event: TaskEvent) -> IngestOutcome {
        let task_id = event.task_id.clone();
        let event_type = event.event_type;

        let outcome = {
            let mut shard = self.tasks.shard_for(&task_id).write().await;
            match shard.get_mut(&task_id) {
                None => {
                    shard.insert(task_id.clone(), TaskSlot::new(event));
                    Ok(IngestOutcome::Applied)
                }
                Some(slot) => slot.merge(event),
            }
        };

        let outcome = match outcome {
            Ok(outcome) => {
                debug!(
                    "任务事件 {} ({}) 摄取结果: {}",
                    task_id,
                    event_type.as_str(),
                    outcome.as_str()
                );
                outcome
            }
            Err(e @ MonitorError::StaleEvent { .. }) => {
                warn!("丢弃过期事件 {}: {}", event_type.as_str(), e);
                IngestOutcome::Stale
            }
            Err(e) => {
                warn!("拒绝任务事件 {} ({}): {}", task_id, event_type.as_str(), e);
                IngestOutcome::Rejected
            }
        };

        self.counters.record(outcome, "task");
        outcome
    }

    pub async fn ingest_worker(&self, event: WorkerEvent) -> IngestOutcome {
        let outcome = {
            let mut shard = self.workers.shard_for(&event.hostname).write().await;
            match shard.get(&event.hostname) {
                Some(existing) if event.timestamp == existing.last_heartbeat => {
                    IngestOutcome::Duplicate
                }
                Some(existing) if event.timestamp < existing.last_heartbeat => {
                    IngestOutcome::Stale
                }
                existing => {
                    let mut record = existing
                        .cloned()
                        .unwrap_or_else(|| WorkerRecord::new(&event.hostname, event.timestamp));
                    apply_heartbeat(&mut record, &event);
                    shard.insert(event.hostname.clone(), record);
                    IngestOutcome::Applied
                }
            }
        };

        debug!(
            "Worker事件 {} 摄取结果: {}",
            event.hostname,
            outcome.as_str()
        );
        self.counters.record(outcome, "worker");
        outcome
    }

    pub async fn get_task(&self, task_id: &str) -> MonitorResult<TaskRecord> {
        self.tasks
            .read(task_id, |slot| slot.record.clone())
            .await
            .ok_or_else(|| MonitorError::TaskNotFound {
                task_id: task_id.to_string(),
            })
    }

    pub async fn get_worker(&self, hostname: &str) -> MonitorResult<WorkerRecord> {
        self.workers
            .read(hostname, WorkerRecord::clone)
            .await
            .ok_or_else(|| MonitorError::WorkerNotFound {
                hostname: hostname.to_string(),
            })
    }

    /// 所有任务记录的快照，顺序不保证
    pub async fn tasks(&self) -> Vec<TaskRecord> {
        self.tasks.collect(|slot| slot.record.clone()).await
    }

    pub async fn workers(&self) -> Vec<WorkerRecord> {
        self.workers.collect(WorkerRecord::clone).await
    }

    pub async fn task_count(&self) -> usize {
        self.tasks.len().await
    }

    pub async fn worker_count(&self) -> usize {
        self.workers.len().await
    }

    pub fn stats(&self) -> IngestStats {
        self.counters.snapshot()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(16)
    }
}

fn order_key(event: &TaskEvent) -> (DateTime<Utc>, u8) {
    (event.timestamp, event.event_type.rank())
}

/// 按顺序重放事件历史得到任务记录，首个事件可以处于任意状态
///
/// 违反状态机的事件被跳过；若位于 `index` 的事件被跳过，同时返回被拒绝的状态转换。
fn replay(
    history: &[TaskEvent],
    index: usize,
) -> MonitorResult<(TaskRecord, Option<(TaskState, TaskState)>)> {
    let (first, rest) = history
        .split_first()
        .ok_or_else(|| MonitorError::Internal("空的事件历史".to_string()))?;

    let mut record = first_record(first);
    let mut refused = None;
    for (offset, event) in rest.iter().enumerate() {
        let next = event.event_type.target_state();
        if !record.state.can_transition_to(next) {
            if offset + 1 == index {
                refused = Some((record.state, next));
            }
            continue;
        }
        apply_task_event(&mut record, event);
    }
    Ok((record, refused))
}

fn first_record(event: &TaskEvent) -> TaskRecord {
    let mut record = TaskRecord::new(
        &event.task_id,
        event.event_type.target_state(),
        event.timestamp,
    );
    apply_task_event(&mut record, event);
    record
}

fn apply_task_event(record: &mut TaskRecord, event: &TaskEvent) {
    let payload = &event.payload;
    let state = event.event_type.target_state();

    record.state = state;
    record.timestamp = event.timestamp;

    if let Some(name) = &payload.name {
        record.name = Some(name.clone());
    }
    if let Some(args) = &payload.args {
        record.args = Some(args.clone());
    }
    if let Some(kwargs) = &payload.kwargs {
        record.kwargs = Some(kwargs.clone());
    }
    if payload.eta.is_some() {
        record.eta = payload.eta;
    }
    if payload.expires.is_some() {
        record.expires = payload.expires;
    }
    if let Some(hostname) = &payload.hostname {
        record.worker = Some(hostname.clone());
    }

    match state {
        TaskState::Success => {
            if payload.result.is_some() {
                record.result = payload.result.clone();
            }
            if payload.runtime.is_some() {
                record.runtime = payload.runtime;
            }
        }
        TaskState::Failure => {
            if payload.traceback.is_some() {
                record.traceback = payload.traceback.clone();
            }
        }
        TaskState::Retry => record.retries += 1,
        _ => {}
    }
}

fn apply_heartbeat(record: &mut WorkerRecord, event: &WorkerEvent) {
    let payload = &event.payload;

    record.last_heartbeat = event.timestamp;
    if payload.active.is_some() {
        record.active = payload.active;
    }
    if payload.processed.is_some() {
        record.processed = payload.processed;
    }
    if payload.loadavg.is_some() {
        record.loadavg = payload.loadavg;
    }
    if payload.freq.is_some() {
        record.freq = payload.freq;
    }
    if let Some(sw_ident) = &payload.sw_ident {
        record.sw_ident = Some(sw_ident.clone());
    }
    if let Some(sw_ver) = &payload.sw_ver {
        record.sw_ver = Some(sw_ver.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use taskmon_core::models::{TaskEventType, WorkerEventType};
    use taskmon_testing_utils::{TaskEventBuilder, WorkerEventBuilder};

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    #[tokio::test]
    async fn test_lifecycle_ends_in_success_and_drops_later_failure() {
        let store = StateStore::new(4);

        let events = [
            TaskEventBuilder::new("t1", TaskEventType::Received)
                .at(at(0))
                .with_name("proj.tasks.add")
                .build(),
            TaskEventBuilder::new("t1", TaskEventType::Started)
                .at(at(1))
                .with_hostname("celery@node1")
                .build(),
            TaskEventBuilder::new("t1", TaskEventType::Succeeded)
                .at(at(2))
                .with_result("ok")
                .with_runtime(0.25)
                .build(),
        ];
        for event in events {
            assert_eq!(store.ingest_task(event).await, IngestOutcome::Applied);
        }

        let task = store.get_task("t1").await.unwrap();
        assert_eq!(task.state, TaskState::Success);
        assert_eq!(task.result.as_deref(), Some("ok"));
        assert_eq!(task.name.as_deref(), Some("proj.tasks.add"));
        assert_eq!(task.worker.as_deref(), Some("celery@node1"));
        assert_eq!(task.runtime, Some(0.25));
        assert_eq!(task.timestamp, at(2));

        let failure = TaskEventBuilder::new("t1", TaskEventType::Failed)
            .at(at(3))
            .with_traceback("boom")
            .build();
        assert_eq!(store.ingest_task(failure).await, IngestOutcome::Stale);

        let after = store.get_task("t1").await.unwrap();
        assert_eq!(after, task);
        assert_eq!(store.stats().stale, 1);
    }

    #[tokio::test]
    async fn test_duplicate_event_is_a_noop() {
        let store = StateStore::new(2);
        let received = TaskEventBuilder::new("t1", TaskEventType::Received)
            .at(at(0))
            .build();

        assert_eq!(
            store.ingest_task(received.clone()).await,
            IngestOutcome::Applied
        );
        let before = store.get_task("t1").await.unwrap();

        assert_eq!(store.ingest_task(received).await, IngestOutcome::Duplicate);
        assert_eq!(store.get_task("t1").await.unwrap(), before);
        assert_eq!(store.task_count().await, 1);
        assert_eq!(store.stats().duplicate, 1);
    }

    #[tokio::test]
    async fn test_duplicate_of_terminal_event_is_duplicate() {
        let store = StateStore::new(2);
        let success = TaskEventBuilder::new("t1", TaskEventType::Succeeded)
            .at(at(5))
            .with_result("ok")
            .build();

        store.ingest_task(success.clone()).await;
        assert_eq!(store.ingest_task(success).await, IngestOutcome::Duplicate);
    }

    #[tokio::test]
    async fn test_out_of_order_events_land_at_their_timestamp() {
        let store = StateStore::new(2);

        let started = TaskEventBuilder::new("t1", TaskEventType::Started)
            .at(at(1))
            .with_hostname("celery@node2")
            .build();
        let received = TaskEventBuilder::new("t1", TaskEventType::Received)
            .at(at(0))
            .with_name("proj.tasks.mul")
            .with_hostname("celery@node1")
            .build();

        assert_eq!(store.ingest_task(started).await, IngestOutcome::Applied);
        assert_eq!(store.ingest_task(received).await, IngestOutcome::Applied);

        let task = store.get_task("t1").await.unwrap();
        assert_eq!(task.state, TaskState::Started);
        assert_eq!(task.timestamp, at(1));
        assert_eq!(task.name.as_deref(), Some("proj.tasks.mul"));
        // 较晚的事件覆盖同名字段
        assert_eq!(task.worker.as_deref(), Some("celery@node2"));
    }

    #[tokio::test]
    async fn test_first_event_may_carry_any_state() {
        let store = StateStore::new(2);
        let failed = TaskEventBuilder::new("t9", TaskEventType::Failed)
            .at(at(4))
            .with_traceback("Traceback ...")
            .build();

        assert_eq!(store.ingest_task(failed).await, IngestOutcome::Applied);
        let task = store.get_task("t9").await.unwrap();
        assert_eq!(task.state, TaskState::Failure);
        assert_eq!(task.traceback.as_deref(), Some("Traceback ..."));
        assert!(task.result.is_none());
    }

    #[tokio::test]
    async fn test_state_machine_violation_is_rejected() {
        let store = StateStore::new(2);
        store
            .ingest_task(TaskEventBuilder::new("t1", TaskEventType::Received).at(at(0)).build())
            .await;

        let success = TaskEventBuilder::new("t1", TaskEventType::Succeeded)
            .at(at(1))
            .with_result("ok")
            .build();
        assert_eq!(store.ingest_task(success).await, IngestOutcome::Rejected);

        let task = store.get_task("t1").await.unwrap();
        assert_eq!(task.state, TaskState::Received);
        assert!(task.result.is_none());
        assert_eq!(store.stats().rejected, 1);

        // 补齐空缺后被拒绝的事件在重放中生效
        let started = TaskEventBuilder::new("t1", TaskEventType::Started)
            .at(at(0) + Duration::milliseconds(500))
            .build();
        assert_eq!(store.ingest_task(started).await, IngestOutcome::Applied);

        let task = store.get_task("t1").await.unwrap();
        assert_eq!(task.state, TaskState::Success);
        assert_eq!(task.result.as_deref(), Some("ok"));
        assert_eq!(task.timestamp, at(1));
    }

    #[tokio::test]
    async fn test_terminal_task_keeps_only_dedup_keys() {
        let store = StateStore::new(2);
        for (event_type, seconds) in [
            (TaskEventType::Received, 0),
            (TaskEventType::Started, 1),
            (TaskEventType::Succeeded, 2),
        ] {
            store
                .ingest_task(
                    TaskEventBuilder::new("t1", event_type)
                        .at(at(seconds))
                        .with_args("[1, 2]")
                        .build(),
                )
                .await;
        }

        let (history, seen) = store
            .tasks
            .read("t1", |slot| (slot.history.len(), slot.seen.len()))
            .await
            .unwrap();
        assert_eq!(history, 0);
        assert_eq!(seen, 3);

        let replayed = TaskEventBuilder::new("t1", TaskEventType::Started)
            .at(at(1))
            .build();
        assert_eq!(store.ingest_task(replayed).await, IngestOutcome::Duplicate);
    }

    #[tokio::test]
    async fn test_retries_are_counted() {
        let store = StateStore::new(2);
        let sequence = [
            (TaskEventType::Received, 0),
            (TaskEventType::Started, 1),
            (TaskEventType::Retried, 2),
            (TaskEventType::Started, 3),
            (TaskEventType::Retried, 4),
            (TaskEventType::Started, 5),
            (TaskEventType::Failed, 6),
        ];
        for (event_type, seconds) in sequence {
            let outcome = store
                .ingest_task(TaskEventBuilder::new("t1", event_type).at(at(seconds)).build())
                .await;
            assert_eq!(outcome, IngestOutcome::Applied);
        }

        let task = store.get_task("t1").await.unwrap();
        assert_eq!(task.state, TaskState::Failure);
        assert_eq!(task.retries, 2);
    }

    #[tokio::test]
    async fn test_revoke_from_any_non_terminal_state() {
        let store = StateStore::new(2);
        store
            .ingest_task(TaskEventBuilder::new("t1", TaskEventType::Received).at(at(0)).build())
            .await;
        let outcome = store
            .ingest_task(TaskEventBuilder::new("t1", TaskEventType::Revoked).at(at(1)).build())
            .await;
        assert_eq!(outcome, IngestOutcome::Applied);
        assert_eq!(
            store.get_task("t1").await.unwrap().state,
            TaskState::Revoked
        );
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let store = StateStore::default();
        assert!(store.get_task("missing").await.unwrap_err().is_not_found());
        assert!(store.get_worker("celery@x").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_worker_heartbeats_only_move_forward() {
        let store = StateStore::new(2);

        let online = WorkerEventBuilder::new("celery@node1", WorkerEventType::Online)
            .at(at(10))
            .with_sw("py-celery", "5.3.0")
            .build();
        assert_eq!(store.ingest_worker(online).await, IngestOutcome::Applied);

        let heartbeat = WorkerEventBuilder::new("celery@node1", WorkerEventType::Heartbeat)
            .at(at(20))
            .with_active(3)
            .build();
        assert_eq!(
            store.ingest_worker(heartbeat.clone()).await,
            IngestOutcome::Applied
        );
        assert_eq!(store.ingest_worker(heartbeat).await, IngestOutcome::Duplicate);

        let older = WorkerEventBuilder::new("celery@node1", WorkerEventType::Heartbeat)
            .at(at(15))
            .with_active(9)
            .build();
        assert_eq!(store.ingest_worker(older).await, IngestOutcome::Stale);

        let worker = store.get_worker("celery@node1").await.unwrap();
        assert_eq!(worker.last_heartbeat, at(20));
        assert_eq!(worker.first_seen, at(10));
        assert_eq!(worker.active, Some(3));
        assert_eq!(worker.sw_ver.as_deref(), Some("5.3.0"));
    }

    /// 一个带重试的完整生命周期：(事件类型, 时间戳秒数, 该时间戳对应的状态)
    const LIFECYCLE: [(TaskEventType, i64, TaskState); 5] = [
        (TaskEventType::Received, 0, TaskState::Received),
        (TaskEventType::Started, 1, TaskState::Started),
        (TaskEventType::Retried, 2, TaskState::Retry),
        (TaskEventType::Started, 3, TaskState::Started),
        (TaskEventType::Succeeded, 4, TaskState::Success),
    ];

    fn lifecycle_event(task_id: &str, index: usize) -> TaskEvent {
        let (event_type, seconds, _) = LIFECYCLE[index];
        let mut builder = TaskEventBuilder::new(task_id, event_type).at(at(seconds));
        if event_type == TaskEventType::Succeeded {
            builder = builder.with_result("ok");
        }
        builder.build()
    }

    fn permutations(items: Vec<usize>) -> Vec<Vec<usize>> {
        if items.len() <= 1 {
            return vec![items];
        }
        let mut result = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.clone();
            let head = rest.remove(i);
            for mut tail in permutations(rest) {
                tail.insert(0, head);
                result.push(tail);
            }
        }
        result
    }

    #[tokio::test]
    async fn test_final_state_is_independent_of_arrival_order() {
        for order in permutations((0..LIFECYCLE.len()).collect()) {
            let store = StateStore::new(1);
            for index in &order {
                store.ingest_task(lifecycle_event("t1", *index)).await;
            }
            let task = store.get_task("t1").await.unwrap();
            assert_eq!(task.state, TaskState::Success, "到达顺序 {order:?}");
            assert_eq!(task.timestamp, at(4), "到达顺序 {order:?}");
            assert_eq!(task.result.as_deref(), Some("ok"));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_out_of_order_events_for_same_task() {
        use std::sync::atomic::AtomicBool;
        use std::sync::Arc;

        let store = Arc::new(StateStore::new(4));
        let orders = permutations((0..LIFECYCLE.len()).collect());
        let task_ids: Vec<String> = (0..12).map(|i| format!("task-{i}")).collect();
        let done = Arc::new(AtomicBool::new(false));

        let mut readers = Vec::new();
        for _ in 0..3 {
            let store = store.clone();
            let done = done.clone();
            let task_ids = task_ids.clone();
            readers.push(tokio::spawn(async move {
                let mut snapshots = 0usize;
                while !done.load(Ordering::SeqCst) {
                    for task_id in &task_ids {
                        if let Ok(task) = store.get_task(task_id).await {
                            let expected = LIFECYCLE
                                .iter()
                                .find(|(_, seconds, _)| at(*seconds) == task.timestamp)
                                .map(|(_, _, state)| *state);
                            assert_eq!(Some(task.state), expected, "{task:?}");
                            assert!(task.retries <= 1);
                            if task.state != TaskState::Success {
                                assert!(task.result.is_none());
                            }
                            snapshots += 1;
                        }
                    }
                    tokio::task::yield_now().await;
                }
                snapshots
            }));
        }

        let mut writers = Vec::new();
        for (i, task_id) in task_ids.iter().enumerate() {
            // 每个任务使用不同的到达顺序
            let order = &orders[(i * 37) % orders.len()];
            for index in order {
                let store = store.clone();
                let event = lifecycle_event(task_id, *index);
                writers.push(tokio::spawn(async move { store.ingest_task(event).await }));
            }
        }
        for writer in writers {
            writer.await.unwrap();
        }

        done.store(true, Ordering::SeqCst);
        let mut snapshots = 0;
        for reader in readers {
            snapshots += reader.await.unwrap();
        }
        assert!(snapshots > 0);

        for task_id in &task_ids {
            let task = store.get_task(task_id).await.unwrap();
            assert_eq!(task.state, TaskState::Success, "{task_id}");
            assert_eq!(task.timestamp, at(4));
            assert_eq!(task.result.as_deref(), Some("ok"));
        }
        assert_eq!(store.stats().total(), (task_ids.len() * LIFECYCLE.len()) as u64);
    }

    #[tokio::test]
    async fn test_concurrent_ingestion_of_distinct_tasks() {
        let store = std::sync::Arc::new(StateStore::new(8));
        let mut handles = Vec::new();

        for i in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let task_id = format!("task-{i}");
                store
                    .ingest_task(
                        TaskEventBuilder::new(&task_id, TaskEventType::Received)
                            .at(at(0))
                            .build(),
                    )
                    .await;
                store
                    .ingest_task(
                        TaskEventBuilder::new(&task_id, TaskEventType::Started)
                            .at(at(1))
                            .build(),
                    )
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), IngestOutcome::Applied);
        }
        assert_eq!(store.task_count().await, 50);
        assert_eq!(store.stats().applied, 100);
    }
}
