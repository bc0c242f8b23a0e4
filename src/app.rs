use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use taskmon_api::{create_app, AppState};
use taskmon_core::{
    config::{AppConfig, BrokerType},
    traits::{ControlChannel, EventSource},
};
use taskmon_dispatcher::{
    CommandDispatcher, CommandRegistry, EventListener, EventListenerConfig, LivenessMonitor,
    LivenessMonitorConfig,
};
use taskmon_domain::{InMemoryTaskRegistry, PeriodicScheduleService, QueryService, StateStore};
use taskmon_infrastructure::{
    ControlConnectionPool, EventPublisher, InMemoryControlChannel, InMemoryEventFeed,
    InMemoryQueueConfig, InMemoryScheduleStore, RabbitMqControlChannel, RabbitMqEventSource,
    TimeoutConfig, TimeoutHandler,
};
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{info, warn};

/// 内存代理模式下的通道，供嵌入式使用和测试
#[derive(Clone)]
pub struct EmbeddedBroker {
    pub control: InMemoryControlChannel,
    pub events: EventPublisher,
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    store: Arc<StateStore>,
    pool: Arc<ControlConnectionPool>,
    source: Arc<dyn EventSource>,
    listener: Arc<EventListener>,
    liveness: Arc<LivenessMonitor>,
    state: AppState,
    embedded: Option<EmbeddedBroker>,
}

impl Application {
    /// 根据配置组装所有组件
    pub async fn new(config: AppConfig, metrics: Option<PrometheusHandle>) -> Result<Self> {
        info!("初始化应用程序，代理类型: {:?}", config.broker.r#type);

        let (channel, source, embedded) = create_broker(&config).await?;

        let store = Arc::new(StateStore::new(config.monitor.store_shards));
        let query = Arc::new(QueryService::new(
            store.clone(),
            config.monitor.liveness_threshold(),
            config.monitor.max_page_size,
        ));

        let pool = ControlConnectionPool::new(
            channel,
            config.broker.pool_size,
            TimeoutHandler::new(TimeoutConfig::from(&config.broker)),
        );
        let dispatcher = CommandDispatcher::new(pool.clone()).with_origin(origin_name());
        let commands = Arc::new(CommandRegistry::new(Arc::new(dispatcher)));

        let registry = Arc::new(InMemoryTaskRegistry::new(config.registry.tasks.clone()));
        info!("已注册任务数量: {}", registry.len());
        let schedules = Arc::new(PeriodicScheduleService::new(
            registry,
            Arc::new(InMemoryScheduleStore::new()),
        ));

        let listener = Arc::new(EventListener::new(
            store.clone(),
            source.clone(),
            EventListenerConfig::from_config(&config.broker, &config.monitor),
        ));
        let liveness = Arc::new(LivenessMonitor::new(
            store.clone(),
            LivenessMonitorConfig::from(&config.monitor),
        ));

        let state = AppState {
            store: store.clone(),
            query,
            commands,
            schedules,
            metrics,
            default_page_size: config.monitor.default_page_size,
        };

        Ok(Self {
            config,
            store,
            pool,
            source,
            listener,
            liveness,
            state,
            embedded,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// 内存代理模式下返回可直接使用的通道
    pub fn embedded_broker(&self) -> Option<&EmbeddedBroker> {
        self.embedded.as_ref()
    }

    pub fn router(&self) -> Router {
        create_app(self.state.clone(), &self.config.api)
    }

    /// 运行后台服务和API服务器，直到收到关闭信号
    ///
    /// 监听地址在启动后台循环之前绑定；绑定失败时不会留下任何运行中的循环。
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let tcp = if self.config.api.enabled {
            let bind_address = &self.config.api.bind_address;
            match TcpListener::bind(bind_address).await {
                Ok(tcp) => Some(tcp),
                Err(e) => {
                    self.release_connections().await;
                    return Err(e).with_context(|| format!("绑定地址失败: {bind_address}"));
                }
            }
        } else {
            None
        };

        let listener_handles = self.listener.start().await;
        let liveness_handle = self.liveness.start().await;

        let served = match tcp {
            Some(tcp) => {
                info!("API服务器启动在 http://{}", self.config.api.bind_address);
                let server_rx = shutdown_rx.resubscribe();
                axum::serve(tcp, self.router().into_make_service())
                    .with_graceful_shutdown(wait_for(server_rx))
                    .await
                    .context("API服务器运行失败")
            }
            None => {
                info!("API服务器已禁用");
                let _ = shutdown_rx.recv().await;
                Ok(())
            }
        };

        info!("开始停止后台服务");
        self.listener.stop().await;
        self.liveness.stop().await;

        for handle in listener_handles {
            if let Err(e) = handle.await {
                warn!("摄取循环异常退出: {}", e);
            }
        }
        liveness_handle.abort();

        self.release_connections().await;

        let stats = self.store.stats();
        info!(
            "应用已停止，累计事件: 应用 {} / 重复 {} / 过期 {} / 拒绝 {}",
            stats.applied, stats.duplicate, stats.stale, stats.rejected
        );
        served
    }

    async fn release_connections(&self) {
        self.pool.close_idle().await;
        if let Err(e) = self.source.close().await {
            warn!("关闭事件源失败: {}", e);
        }
    }
}

async fn wait_for(mut shutdown_rx: broadcast::Receiver<()>) {
    let _ = shutdown_rx.recv().await;
    info!("API服务器收到关闭信号");
}

async fn create_broker(
    config: &AppConfig,
) -> Result<(
    Arc<dyn ControlChannel>,
    Arc<dyn EventSource>,
    Option<EmbeddedBroker>,
)> {
    match config.broker.r#type {
        BrokerType::Memory => {
            let queue_config = InMemoryQueueConfig::default();
            let control = InMemoryControlChannel::with_config(&queue_config);
            let feed = InMemoryEventFeed::with_config(&queue_config);
            let embedded = EmbeddedBroker {
                control: control.clone(),
                events: feed.publisher(),
            };
            info!("使用内存代理");
            Ok((Arc::new(control), Arc::new(feed), Some(embedded)))
        }
        BrokerType::Rabbitmq => {
            info!("连接消息队列: {}", mask_amqp_url(&config.broker.url));
            let source = RabbitMqEventSource::new(&config.broker)
                .await
                .context("连接事件队列失败")?;
            let control = RabbitMqControlChannel::new(&config.broker);
            info!("消息队列连接成功");
            Ok((Arc::new(control), Arc::new(source), None))
        }
    }
}

/// 控制消息中的发送方名称
fn origin_name() -> String {
    let host = hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("taskmon@{host}")
}

/// 屏蔽AMQP URL中的敏感信息
fn mask_amqp_url(url: &str) -> String {
    let authority_start = url.find("://").map(|pos| pos + 3).unwrap_or(0);
    if let Some(at_pos) = url[authority_start..].find('@').map(|pos| pos + authority_start) {
        if let Some(colon_pos) = url[authority_start..at_pos]
            .rfind(':')
            .map(|pos| pos + authority_start)
        {
            let mut masked = url.to_string();
            masked.replace_range(colon_pos + 1..at_pos, "***");
            return masked;
        }
    }
    url.to_string()
}
