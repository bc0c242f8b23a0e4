//! RabbitMQ 实现
//!
//! - 控制消息以JSON发布到扇出交换机，开启发布确认，代理确认即视为发送成功
//! - 监控事件从持久化队列中按批拉取，解析后立即确认

use async_trait::async_trait;
use lapin::{
    options::*, types::FieldTable, BasicProperties, Channel, Connection, ConnectionProperties,
    ExchangeKind,
};
use taskmon_core::{
    config::BrokerConfig,
    models::{ControlMessage, MonitorEvent},
    traits::{ControlChannel, ControlConnection, EventSource},
    MonitorError, Result,
};
use tracing::{debug, info, warn};

/// RabbitMQ 控制通道，每个连接独占一个AMQP连接和通道
pub struct RabbitMqControlChannel {
    url: String,
    exchange: String,
}

impl RabbitMqControlChannel {
    pub fn new(config: &BrokerConfig) -> Self {
        Self {
            url: config.url.clone(),
            exchange: config.control_exchange.clone(),
        }
    }
}

#[async_trait]
impl ControlChannel for RabbitMqControlChannel {
    async fn open(&self) -> Result<Box<dyn ControlConnection>> {
        let connection = Connection::connect(&self.url, ConnectionProperties::default())
            .await
            .map_err(|e| MonitorError::upstream(format!("连接RabbitMQ失败: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| MonitorError::upstream(format!("创建通道失败: {e}")))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| MonitorError::upstream(format!("开启发布确认失败: {e}")))?;

        channel
            .exchange_declare(
                &self.exchange,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                MonitorError::upstream(format!("声明交换机 {} 失败: {e}", self.exchange))
            })?;

        debug!("控制连接已建立: {}", self.exchange);

        Ok(Box::new(RabbitMqControlConnection {
            connection,
            channel,
            exchange: self.exchange.clone(),
        }))
    }

    fn describe(&self) -> String {
        format!("rabbitmq exchange={}", self.exchange)
    }
}

struct RabbitMqControlConnection {
    connection: Connection,
    channel: Channel,
    exchange: String,
}

#[async_trait]
impl ControlConnection for RabbitMqControlConnection {
    async fn send(&mut self, message: &ControlMessage) -> Result<()> {
        let payload = message
            .serialize_bytes()
            .map_err(|e| MonitorError::Serialization(format!("序列化控制消息失败: {e}")))?;

        let confirm = self
            .channel
            .basic_publish(
                &self.exchange,
                "",
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2),
            )
            .await
            .map_err(|e| MonitorError::upstream(format!("发布控制消息失败: {e}")))?;

        let confirmation = confirm
            .await
            .map_err(|e| MonitorError::upstream(format!("控制消息发布确认失败: {e}")))?;

        if confirmation.is_nack() {
            return Err(MonitorError::upstream(format!(
                "代理拒绝了控制消息 {}",
                message.id
            )));
        }

        debug!("控制消息 {} ({}) 已确认", message.id, message.method());
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    async fn close(&mut self) -> Result<()> {
        if self.channel.status().connected() {
            self.channel
                .close(200, "正常关闭")
                .await
                .map_err(|e| MonitorError::MessageQueue(format!("关闭通道失败: {e}")))?;
        }
        if self.connection.status().connected() {
            self.connection
                .close(200, "正常关闭")
                .await
                .map_err(|e| MonitorError::MessageQueue(format!("关闭连接失败: {e}")))?;
        }
        Ok(())
    }
}

/// 从RabbitMQ队列拉取监控事件
pub struct RabbitMqEventSource {
    connection: Connection,
    channel: Channel,
    queue: String,
}

impl RabbitMqEventSource {
    pub async fn new(config: &BrokerConfig) -> Result<Self> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| MonitorError::MessageQueue(format!("连接RabbitMQ失败: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| MonitorError::MessageQueue(format!("创建通道失败: {e}")))?;

        channel
            .queue_declare(
                &config.event_queue,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                MonitorError::MessageQueue(format!(
                    "声明队列 {} 失败: {e}",
                    config.event_queue
                ))
            })?;

        info!("成功连接到RabbitMQ事件队列: {}", config.event_queue);

        Ok(Self {
            connection,
            channel,
            queue: config.event_queue.clone(),
        })
    }
}

#[async_trait]
impl EventSource for RabbitMqEventSource {
    async fn next_batch(&self, max_events: usize) -> Result<Vec<MonitorEvent>> {
        let mut events = Vec::new();

        while events.len() < max_events {
            let message = self
                .channel
                .basic_get(&self.queue, BasicGetOptions { no_ack: false })
                .await
                .map_err(|e| {
                    MonitorError::MessageQueue(format!("从队列 {} 获取消息失败: {e}", self.queue))
                })?;

            let Some(message) = message else {
                break;
            };

            match MonitorEvent::deserialize_bytes(&message.delivery.data) {
                Ok(event) => events.push(event),
                // 无法解析的消息不会因重投而变得可解析，确认后丢弃
                Err(e) => warn!("丢弃无法解析的事件消息: {}", e),
            }

            self.channel
                .basic_ack(message.delivery.delivery_tag, BasicAckOptions::default())
                .await
                .map_err(|e| MonitorError::MessageQueue(format!("确认消息失败: {e}")))?;
        }

        if !events.is_empty() {
            debug!("从队列 {} 拉取 {} 个事件", self.queue, events.len());
        }
        Ok(events)
    }

    async fn close(&self) -> Result<()> {
        if self.connection.status().connected() {
            self.connection
                .close(200, "正常关闭")
                .await
                .map_err(|e| MonitorError::MessageQueue(format!("关闭连接失败: {e}")))?;
        }
        info!("RabbitMQ事件连接已关闭");
        Ok(())
    }
}
