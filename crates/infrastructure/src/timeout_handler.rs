//! 控制通道操作的超时处理
//!
//! 所有与代理交互的异步操作都经过这里，超时统一转换为
//! `MonitorError::UpstreamUnavailable`。

use std::future::Future;
use std::time::Duration;

use taskmon_core::{config::BrokerConfig, MonitorError, Result};
use tokio::time::timeout;
use tracing::{error, instrument};

/// 各类操作的超时时间
#[derive(Debug, Clone, Copy)]
pub struct TimeoutConfig {
    /// 建立控制连接
    pub connect_timeout: Duration,
    /// 等待连接池空闲连接
    pub acquire_timeout: Duration,
    /// 发送单条控制消息并等待代理确认
    pub command_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            acquire_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&BrokerConfig> for TimeoutConfig {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            acquire_timeout: config.acquire_timeout(),
            command_timeout: config.command_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutHandler {
    config: TimeoutConfig,
}

impl TimeoutHandler {
    pub fn new(config: TimeoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TimeoutConfig {
        &self.config
    }

    #[instrument(skip(self, operation))]
    pub async fn connect_operation<F, T>(&self, operation: F, operation_name: &str) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        execute_with_timeout(operation, self.config.connect_timeout, "连接", operation_name).await
    }

    #[instrument(skip(self, operation))]
    pub async fn command_operation<F, T>(&self, operation: F, operation_name: &str) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        execute_with_timeout(operation, self.config.command_timeout, "控制命令", operation_name)
            .await
    }
}

/// 在给定时间内执行操作，超时返回 `UpstreamUnavailable`
pub async fn execute_with_timeout<F, T>(
    operation: F,
    timeout_duration: Duration,
    operation_type: &str,
    operation_name: &str,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(timeout_duration, operation).await {
        Ok(result) => result,
        Err(_) => {
            let error_msg = format!(
                "{operation_type}操作 '{operation_name}' 超时 (超时时间: {timeout_duration:?})"
            );
            error!("{}", error_msg);
            Err(MonitorError::UpstreamUnavailable(error_msg))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_operation_within_timeout() {
        let handler = TimeoutHandler::default();
        let result = handler
            .command_operation(async { Ok("sent") }, "revoke")
            .await;
        assert_eq!(result.unwrap(), "sent");
    }

    #[tokio::test]
    async fn test_timeout_maps_to_upstream_unavailable() {
        let handler = TimeoutHandler::new(TimeoutConfig {
            command_timeout: Duration::from_millis(20),
            ..Default::default()
        });

        let result: Result<()> = handler
            .command_operation(
                async {
                    sleep(Duration::from_millis(200)).await;
                    Ok(())
                },
                "shutdown",
            )
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, MonitorError::UpstreamUnavailable(_)));
        assert!(err.to_string().contains("shutdown"));
    }

    #[tokio::test]
    async fn test_inner_error_is_preserved() {
        let handler = TimeoutHandler::default();
        let result: Result<()> = handler
            .connect_operation(
                async { Err(MonitorError::MessageQueue("refused".to_string())) },
                "connect",
            )
            .await;
        assert!(matches!(result, Err(MonitorError::MessageQueue(_))));
    }
}
