//! 核心trait的内存模拟实现
//!
//! 模拟实现记录所有调用，便于断言网络调用次数和发送内容。

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskmon_core::models::{ControlMessage, MonitorEvent, PeriodicScheduleEntry};
use taskmon_core::traits::{ControlChannel, ControlConnection, EventSource, ScheduleStore};
use taskmon_core::{MonitorError, Result};

#[derive(Debug, Default)]
struct MockChannelState {
    opens: AtomicUsize,
    closes: AtomicUsize,
    open_connections: AtomicUsize,
    fail_open: AtomicBool,
    fail_send: AtomicBool,
    send_delay: Mutex<Option<Duration>>,
    sent: Mutex<Vec<ControlMessage>>,
}

/// 记录所有打开的连接和发送的消息的控制通道
#[derive(Debug, Clone, Default)]
pub struct MockControlChannel {
    state: Arc<MockChannelState>,
}

impl MockControlChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的 `open` 调用全部失败
    pub fn fail_open(&self, fail: bool) {
        self.state.fail_open.store(fail, Ordering::SeqCst);
    }

    /// 之后的 `send` 调用全部失败，失败的连接会被标记为关闭
    pub fn fail_send(&self, fail: bool) {
        self.state.fail_send.store(fail, Ordering::SeqCst);
    }

    /// 每次发送前等待，用于触发超时
    pub fn set_send_delay(&self, delay: Option<Duration>) {
        *self.state.send_delay.lock().unwrap() = delay;
    }

    pub fn open_count(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// 当前尚未关闭的连接数量
    pub fn live_connections(&self) -> usize {
        self.state.open_connections.load(Ordering::SeqCst)
    }

    pub fn sent_messages(&self) -> Vec<ControlMessage> {
        self.state.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.state.sent.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.state.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl ControlChannel for MockControlChannel {
    async fn open(&self) -> Result<Box<dyn ControlConnection>> {
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(MonitorError::upstream("模拟连接失败"));
        }
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        self.state.open_connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockControlConnection {
            state: self.state.clone(),
            open: true,
        }))
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

struct MockControlConnection {
    state: Arc<MockChannelState>,
    open: bool,
}

impl MockControlConnection {
    fn mark_closed(&mut self) {
        if self.open {
            self.open = false;
            self.state.closes.fetch_add(1, Ordering::SeqCst);
            self.state.open_connections.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl ControlConnection for MockControlConnection {
    async fn send(&mut self, message: &ControlMessage) -> Result<()> {
        if !self.open {
            return Err(MonitorError::MessageQueue("连接已关闭".to_string()));
        }

        let delay = *self.state.send_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.state.fail_send.load(Ordering::SeqCst) {
            self.mark_closed();
            return Err(MonitorError::MessageQueue("模拟发送失败".to_string()));
        }

        self.state.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn close(&mut self) -> Result<()> {
        self.mark_closed();
        Ok(())
    }
}

impl Drop for MockControlConnection {
    fn drop(&mut self) {
        self.mark_closed();
    }
}

/// 预置事件批次的事件源
#[derive(Debug, Clone, Default)]
pub struct MockEventSource {
    events: Arc<Mutex<VecDeque<MonitorEvent>>>,
    failures: Arc<AtomicUsize>,
    polls: Arc<AtomicUsize>,
}

impl MockEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<MonitorEvent>) -> Self {
        let source = Self::new();
        source.push_all(events);
        source
    }

    pub fn push(&self, event: MonitorEvent) {
        self.events.lock().unwrap().push_back(event);
    }

    pub fn push_all(&self, events: Vec<MonitorEvent>) {
        self.events.lock().unwrap().extend(events);
    }

    /// 接下来的 `count` 次拉取返回错误
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn remaining(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSource for MockEventSource {
    async fn next_batch(&self, max_events: usize) -> Result<Vec<MonitorEvent>> {
        self.polls.fetch_add(1, Ordering::SeqCst);

        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(MonitorError::MessageQueue("模拟事件源故障".to_string()));
        }

        let mut events = self.events.lock().unwrap();
        let count = max_events.min(events.len());
        Ok(events.drain(..count).collect())
    }
}

/// 基于HashMap的周期任务存储
#[derive(Debug, Clone, Default)]
pub struct MockScheduleStore {
    entries: Arc<Mutex<HashMap<String, PeriodicScheduleEntry>>>,
    gets: Arc<AtomicUsize>,
    evict_on_get: Arc<AtomicBool>,
}

impl MockScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// 读取后立即删除条目，模拟读取之间的并发删除
    pub fn evict_on_get(&self, evict: bool) {
        self.evict_on_get.store(evict, Ordering::SeqCst);
    }
}

#[async_trait]
impl ScheduleStore for MockScheduleStore {
    async fn upsert(&self, entry: &PeriodicScheduleEntry) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(entry.name.clone(), entry.clone());
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<PeriodicScheduleEntry>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.lock().unwrap();
        if self.evict_on_get.load(Ordering::SeqCst) {
            return Ok(entries.remove(name));
        }
        Ok(entries.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<PeriodicScheduleEntry>> {
        Ok(self.entries.lock().unwrap().values().cloned().collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.entries.lock().unwrap().remove(name).is_some())
    }
}
