//! 控制通道连接池
//!
//! 连接在使用期间由持有者独占，`PooledConnection` 被丢弃时归还连接池；
//! 发送失败或已关闭的连接直接丢弃，不再复用。

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use metrics::{counter, histogram};
use taskmon_core::{
    models::ControlMessage,
    traits::{ControlChannel, ControlConnection},
    MonitorError, Result,
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::timeout_handler::{execute_with_timeout, TimeoutHandler};

pub struct ControlConnectionPool {
    channel: Arc<dyn ControlChannel>,
    idle: Mutex<Vec<Box<dyn ControlConnection>>>,
    permits: Arc<Semaphore>,
    max_size: usize,
    timeouts: TimeoutHandler,
}

impl ControlConnectionPool {
    pub fn new(
        channel: Arc<dyn ControlChannel>,
        max_size: usize,
        timeouts: TimeoutHandler,
    ) -> Arc<Self> {
        let max_size = max_size.max(1);
        Arc::new(Self {
            channel,
            idle: Mutex::new(Vec::new()),
            permits: Arc::new(Semaphore::new(max_size)),
            max_size,
            timeouts,
        })
    }

    /// 获取一个连接，优先复用空闲连接
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection> {
        let acquire_timeout = self.timeouts.config().acquire_timeout;
        let permit = execute_with_timeout(
            async {
                self.permits
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| MonitorError::upstream("控制连接池已关闭"))
            },
            acquire_timeout,
            "连接池",
            "acquire",
        )
        .await?;

        if let Some(connection) = self.take_idle() {
            debug!("复用空闲控制连接");
            return Ok(PooledConnection::new(connection, self.clone(), permit));
        }

        let started = Instant::now();
        let channel = self.channel.clone();
        let connection = self
            .timeouts
            .connect_operation(
                async move {
                    channel.open().await.map_err(|e| match e {
                        MonitorError::UpstreamUnavailable(_) => e,
                        other => MonitorError::upstream(format!("打开控制连接失败: {other}")),
                    })
                },
                "open_control_connection",
            )
            .await
            .inspect_err(|e| {
                counter!("taskmon_control_connect_failures_total").increment(1);
                warn!("打开控制连接失败 ({}): {}", self.channel.describe(), e);
            })?;

        histogram!("taskmon_control_connect_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        debug!("新建控制连接: {}", self.channel.describe());

        Ok(PooledConnection::new(connection, self.clone(), permit))
    }

    fn take_idle(&self) -> Option<Box<dyn ControlConnection>> {
        let mut idle = self.lock_idle();
        while let Some(connection) = idle.pop() {
            if connection.is_open() {
                return Some(connection);
            }
            debug!("丢弃已关闭的空闲连接");
        }
        None
    }

    fn release(&self, connection: Box<dyn ControlConnection>) {
        if connection.is_open() {
            self.lock_idle().push(connection);
        }
    }

    fn lock_idle(&self) -> MutexGuard<'_, Vec<Box<dyn ControlConnection>>> {
        self.idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 关闭所有空闲连接
    pub async fn close_idle(&self) {
        let connections: Vec<_> = self.lock_idle().drain(..).collect();
        let count = connections.len();
        for mut connection in connections {
            if let Err(e) = connection.close().await {
                warn!("关闭控制连接失败: {}", e);
            }
        }
        debug!("已关闭 {} 个空闲控制连接", count);
    }

    pub fn idle_count(&self) -> usize {
        self.lock_idle().len()
    }

    /// 当前可立即获取的连接数量
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn timeouts(&self) -> &TimeoutHandler {
        &self.timeouts
    }

    pub fn describe(&self) -> String {
        self.channel.describe()
    }
}

/// 从连接池借出的连接，丢弃时自动归还
pub struct PooledConnection {
    connection: Option<Box<dyn ControlConnection>>,
    pool: Arc<ControlConnectionPool>,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    fn new(
        connection: Box<dyn ControlConnection>,
        pool: Arc<ControlConnectionPool>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            connection: Some(connection),
            pool,
            broken: false,
            _permit: permit,
        }
    }

    /// 发送一条控制消息并等待代理确认；失败后该连接不再归还连接池
    pub async fn send(&mut self, message: &ControlMessage) -> Result<()> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| MonitorError::Internal("连接已被释放".to_string()))?;

        let result = self
            .pool
            .timeouts
            .command_operation(connection.send(message), message.method())
            .await;

        if let Err(e) = &result {
            self.broken = true;
            warn!("控制消息 {} ({}) 发送失败: {}", message.id, message.method(), e);
            return result.map_err(|e| match e {
                MonitorError::UpstreamUnavailable(_) => e,
                other => MonitorError::upstream(format!("发送控制消息失败: {other}")),
            });
        }

        Ok(())
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            if self.broken {
                debug!("丢弃失败的控制连接");
            } else {
                self.pool.release(connection);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeout_handler::TimeoutConfig;
    use std::time::Duration;
    use taskmon_testing_utils::MockControlChannel;

    fn pool_with(channel: &MockControlChannel, size: usize) -> Arc<ControlConnectionPool> {
        ControlConnectionPool::new(
            Arc::new(channel.clone()),
            size,
            TimeoutHandler::new(TimeoutConfig {
                connect_timeout: Duration::from_millis(200),
                acquire_timeout: Duration::from_millis(50),
                command_timeout: Duration::from_millis(50),
            }),
        )
    }

    #[tokio::test]
    async fn test_connection_is_reused_after_release() {
        let channel = MockControlChannel::new();
        let pool = pool_with(&channel, 2);

        {
            let mut conn = pool.acquire().await.unwrap();
            conn.send(&ControlMessage::revoke("t1")).await.unwrap();
        }
        assert_eq!(pool.idle_count(), 1);

        {
            let mut conn = pool.acquire().await.unwrap();
            conn.send(&ControlMessage::revoke("t2")).await.unwrap();
        }

        assert_eq!(channel.open_count(), 1);
        assert_eq!(channel.sent_count(), 2);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_failed_connection_is_discarded() {
        let channel = MockControlChannel::new();
        let pool = pool_with(&channel, 1);

        channel.fail_send(true);
        {
            let mut conn = pool.acquire().await.unwrap();
            let err = conn.send(&ControlMessage::revoke("t1")).await.unwrap_err();
            assert!(err.is_upstream_unavailable());
            assert!(conn.is_broken());
        }

        assert_eq!(pool.idle_count(), 0);
        assert_eq!(channel.live_connections(), 0);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_acquire_times_out_when_exhausted() {
        let channel = MockControlChannel::new();
        let pool = pool_with(&channel, 1);

        let _held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.err().unwrap();
        assert!(matches!(err, MonitorError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_open_failure_is_upstream_unavailable() {
        let channel = MockControlChannel::new();
        channel.fail_open(true);
        let pool = pool_with(&channel, 1);

        let err = pool.acquire().await.err().unwrap();
        assert!(err.is_upstream_unavailable());
        // 失败后许可被释放
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_slow_send_times_out() {
        let channel = MockControlChannel::new();
        channel.set_send_delay(Some(Duration::from_millis(300)));
        let pool = pool_with(&channel, 1);

        let mut conn = pool.acquire().await.unwrap();
        let err = conn.send(&ControlMessage::revoke("t1")).await.unwrap_err();
        assert!(matches!(err, MonitorError::UpstreamUnavailable(_)));
        drop(conn);
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn test_close_idle() {
        let channel = MockControlChannel::new();
        let pool = pool_with(&channel, 2);
        drop(pool.acquire().await.unwrap());
        assert_eq!(channel.live_connections(), 1);

        pool.close_idle().await;
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(channel.live_connections(), 0);
    }
}
