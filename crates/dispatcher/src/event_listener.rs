use std::sync::Arc;
use std::time::Duration;

use taskmon_core::{
    config::{BrokerConfig, MonitorConfig},
    traits::EventSource,
    MonitorResult,
};
use taskmon_domain::{IngestOutcome, StateStore};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 事件监听配置
#[derive(Debug, Clone)]
pub struct EventListenerConfig {
    /// 每次拉取的最大事件数
    pub batch_size: usize,
    /// 并发摄取循环数量
    pub workers: usize,
    /// 没有事件时的等待间隔
    pub idle_poll_interval: Duration,
    /// 拉取失败后的退避时间
    pub error_backoff: Duration,
}

impl Default for EventListenerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            workers: 2,
            idle_poll_interval: Duration::from_millis(100),
            error_backoff: Duration::from_secs(1),
        }
    }
}

impl EventListenerConfig {
    pub fn from_config(broker: &BrokerConfig, monitor: &MonitorConfig) -> Self {
        Self {
            batch_size: broker.event_batch_size,
            workers: monitor.ingest_workers,
            idle_poll_interval: monitor.idle_poll_interval(),
            ..Default::default()
        }
    }
}

/// 从事件源拉取监控事件并写入状态存储
///
/// 多个摄取循环可以并发运行，同一任务的事件乱序到达由状态存储处理。
pub struct EventListener {
    store: Arc<StateStore>,
    source: Arc<dyn EventSource>,
    config: EventListenerConfig,
    running: Arc<RwLock<bool>>,
}

impl EventListener {
    pub fn new(
        store: Arc<StateStore>,
        source: Arc<dyn EventSource>,
        config: EventListenerConfig,
    ) -> Self {
        Self {
            store,
            source,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub fn config(&self) -> &EventListenerConfig {
        &self.config
    }

    /// 启动摄取循环，返回各循环的句柄
    pub async fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        *self.running.write().await = true;

        let workers = self.config.workers.max(1);
        info!("启动事件监听器，摄取循环数量: {}", workers);

        (0..workers)
            .map(|index| {
                let listener = Arc::clone(self);
                tokio::spawn(async move { listener.ingest_loop(index).await })
            })
            .collect()
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
        info!("事件监听器停止信号已发送");
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    async fn ingest_loop(&self, index: usize) {
        debug!("摄取循环 {} 已启动", index);

        while self.is_running().await {
            match self.poll_once().await {
                Ok(0) => tokio::time::sleep(self.config.idle_poll_interval).await,
                Ok(count) => debug!("摄取循环 {} 处理了 {} 个事件", index, count),
                Err(e) => {
                    error!("拉取监控事件失败: {}", e);
                    tokio::time::sleep(self.config.error_backoff).await;
                }
            }
        }

        debug!("摄取循环 {} 已退出", index);
    }

    /// 拉取并处理一批事件，返回本批事件数量
    pub async fn poll_once(&self) -> MonitorResult<usize> {
        let events = self.source.next_batch(self.config.batch_size).await?;
        let count = events.len();

        for event in events {
            let kind = event.event_type_str();
            match self.store.ingest(event).await {
                IngestOutcome::Rejected => warn!("{} 事件被拒绝", kind),
                outcome => debug!("{} 事件: {}", kind, outcome.as_str()),
            }
        }

        Ok(count)
    }
}
