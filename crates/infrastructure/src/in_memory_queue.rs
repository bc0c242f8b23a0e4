//! 进程内的控制通道和事件源
//!
//! 用于嵌入式部署和测试：控制消息通过 tokio broadcast 扇出给所有订阅者，
//! 监控事件通过有界 mpsc 通道传入。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use taskmon_core::{
    models::{ControlMessage, MonitorEvent},
    traits::{ControlChannel, ControlConnection, EventSource},
    MonitorError, Result,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct InMemoryQueueConfig {
    /// broadcast通道容量，落后的订阅者会丢失最早的消息
    pub control_capacity: usize,
    /// 保留最近发送的控制消息数量
    pub history_limit: usize,
    /// 事件通道容量，满时发布方等待
    pub event_capacity: usize,
}

impl Default for InMemoryQueueConfig {
    fn default() -> Self {
        Self {
            control_capacity: 1024,
            history_limit: 1000,
            event_capacity: 10_000,
        }
    }
}

/// 进程内控制通道
#[derive(Clone)]
pub struct InMemoryControlChannel {
    sender: broadcast::Sender<ControlMessage>,
    history: Arc<Mutex<VecDeque<ControlMessage>>>,
    history_limit: usize,
    published: Arc<AtomicU64>,
}

impl InMemoryControlChannel {
    pub fn new() -> Self {
        Self::with_config(&InMemoryQueueConfig::default())
    }

    pub fn with_config(config: &InMemoryQueueConfig) -> Self {
        let (sender, _) = broadcast::channel(config.control_capacity.max(1));
        info!(
            "创建内存控制通道 (容量: {}, 历史: {})",
            config.control_capacity, config.history_limit
        );
        Self {
            sender,
            history: Arc::new(Mutex::new(VecDeque::new())),
            history_limit: config.history_limit,
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 订阅之后发送的控制消息，模拟一个Worker
    pub fn subscribe(&self) -> broadcast::Receiver<ControlMessage> {
        self.sender.subscribe()
    }

    /// 最近发送的控制消息，按发送顺序
    pub fn history(&self) -> Vec<ControlMessage> {
        self.history
            .lock()
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    fn record(&self, message: &ControlMessage) {
        if let Ok(mut history) = self.history.lock() {
            history.push_back(message.clone());
            while history.len() > self.history_limit {
                history.pop_front();
            }
        }
        self.published.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for InMemoryControlChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControlChannel for InMemoryControlChannel {
    async fn open(&self) -> Result<Box<dyn ControlConnection>> {
        Ok(Box::new(InMemoryControlConnection {
            channel: self.clone(),
            open: true,
        }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

struct InMemoryControlConnection {
    channel: InMemoryControlChannel,
    open: bool,
}

#[async_trait]
impl ControlConnection for InMemoryControlConnection {
    async fn send(&mut self, message: &ControlMessage) -> Result<()> {
        if !self.open {
            return Err(MonitorError::MessageQueue("控制连接已关闭".to_string()));
        }

        self.channel.record(message);
        match self.channel.sender.send(message.clone()) {
            Ok(receivers) => debug!(
                "控制消息 {} 已投递给 {} 个订阅者",
                message.method(),
                receivers
            ),
            // 扇出交换机在没有绑定队列时同样会丢弃消息
            Err(_) => debug!("控制消息 {} 没有订阅者", message.method()),
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }
}

/// 进程内事件源
pub struct InMemoryEventFeed {
    sender: mpsc::Sender<MonitorEvent>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<MonitorEvent>>,
}

impl InMemoryEventFeed {
    pub fn new() -> Self {
        Self::with_config(&InMemoryQueueConfig::default())
    }

    pub fn with_config(config: &InMemoryQueueConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.event_capacity.max(1));
        Self {
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
        }
    }

    /// 发布端句柄，可在多个生产者之间克隆
    pub fn publisher(&self) -> EventPublisher {
        EventPublisher {
            sender: self.sender.clone(),
        }
    }
}

impl Default for InMemoryEventFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSource for InMemoryEventFeed {
    async fn next_batch(&self, max_events: usize) -> Result<Vec<MonitorEvent>> {
        let mut receiver = self.receiver.lock().await;
        let mut batch = Vec::with_capacity(max_events.min(64));
        while batch.len() < max_events {
            match receiver.try_recv() {
                Ok(event) => batch.push(event),
                Err(_) => break,
            }
        }
        Ok(batch)
    }
}

#[derive(Clone)]
pub struct EventPublisher {
    sender: mpsc::Sender<MonitorEvent>,
}

impl EventPublisher {
    pub async fn publish(&self, event: MonitorEvent) -> Result<()> {
        self.sender
            .send(event)
            .await
            .map_err(|_| MonitorError::MessageQueue("事件通道已关闭".to_string()))
    }
}
