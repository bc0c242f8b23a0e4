use async_trait::async_trait;

use crate::{
    models::{ControlMessage, MonitorEvent},
    Result,
};

/// 控制通道抽象接口
///
/// 控制通道只保证“已被代理接收”的确认语义，不保证Worker真正执行，
/// 也不保证恰好一次投递。
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// 打开一个到控制通道的连接
    async fn open(&self) -> Result<Box<dyn ControlConnection>>;

    /// 通道描述，用于日志
    fn describe(&self) -> String;
}

/// 控制通道上的单个连接，使用期间由调用方独占
#[async_trait]
pub trait ControlConnection: Send {
    /// 发送一条控制消息，返回即表示代理已确认接收
    async fn send(&mut self, message: &ControlMessage) -> Result<()>;

    /// 连接是否仍然可用
    fn is_open(&self) -> bool;

    /// 关闭连接
    async fn close(&mut self) -> Result<()>;
}

/// 监控事件来源
#[async_trait]
pub trait EventSource: Send + Sync {
    /// 拉取下一批事件，没有事件时返回空集合
    async fn next_batch(&self, max_events: usize) -> Result<Vec<MonitorEvent>>;

    /// 释放底层连接
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
