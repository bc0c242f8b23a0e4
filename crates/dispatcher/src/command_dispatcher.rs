use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use taskmon_core::{
    models::{ControlMessage, RateLimit, WorkerCommand},
    MonitorError, MonitorResult,
};
use taskmon_infrastructure::ControlConnectionPool;
use tracing::{debug, error, info};

/// 一次命令分发的结果
///
/// 成功只表示代理已接收消息，不代表Worker已经执行。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub command: String,
    pub messages_sent: usize,
    pub targets: Vec<String>,
}

/// 校验控制命令并通过连接池发送到控制通道
pub struct CommandDispatcher {
    pool: Arc<ControlConnectionPool>,
    origin: Option<String>,
}

impl CommandDispatcher {
    pub fn new(pool: Arc<ControlConnectionPool>) -> Self {
        Self { pool, origin: None }
    }

    /// 设置控制消息的发送方节点名
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn pool(&self) -> &Arc<ControlConnectionPool> {
        &self.pool
    }

    pub async fn revoke(&self, task_id: &str) -> MonitorResult<DispatchReport> {
        self.revoke_tasks(&[task_id]).await
    }

    /// 撤销一组任务，每个不同的任务ID发送一条撤销消息
    pub async fn revoke_tasks<S: AsRef<str>>(&self, task_ids: &[S]) -> MonitorResult<DispatchReport> {
        let task_ids = distinct(task_ids, "任务ID")?;
        let messages = task_ids.iter().map(ControlMessage::revoke).collect();

        self.dispatch("revoke", messages, task_ids).await
    }

    /// 为一组任务设置速率限制，每个不同的任务名广播一次
    pub async fn set_rate_limit<S: AsRef<str>>(
        &self,
        task_names: &[S],
        rate: &str,
    ) -> MonitorResult<DispatchReport> {
        let rate = RateLimit::parse(rate)?;
        let task_names = distinct(task_names, "任务名称")?;
        let messages = task_names
            .iter()
            .map(|name| ControlMessage::rate_limit(name, &rate))
            .collect();

        self.dispatch("rate_limit", messages, task_names).await
    }

    /// 向指定Worker广播命令，目标集合为空时不会打开任何连接
    pub async fn broadcast_worker_command<S: AsRef<str>>(
        &self,
        command: WorkerCommand,
        hostnames: &[S],
    ) -> MonitorResult<DispatchReport> {
        let hostnames = distinct(hostnames, "Worker主机名")?;
        let message = ControlMessage::worker_command(command, hostnames.clone());

        self.dispatch(command.as_str(), vec![message], hostnames)
            .await
    }

    async fn dispatch(
        &self,
        command: &'static str,
        messages: Vec<ControlMessage>,
        targets: Vec<String>,
    ) -> MonitorResult<DispatchReport> {
        let started = Instant::now();
        let total = messages.len();

        let result = self.send_all(messages).await;
        histogram!("taskmon_command_dispatch_duration_seconds", "command" => command)
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(sent) => {
                counter!("taskmon_commands_dispatched_total", "command" => command).increment(1);
                info!(
                    "命令 {} 已发送 {} 条消息，目标: {}",
                    command,
                    sent,
                    targets.join(", ")
                );
                Ok(DispatchReport {
                    command: command.to_string(),
                    messages_sent: sent,
                    targets,
                })
            }
            Err((sent, e)) => {
                counter!("taskmon_commands_failed_total", "command" => command).increment(1);
                error!("命令 {} 发送失败 (已发送 {}/{}): {}", command, sent, total, e);
                Err(match e {
                    MonitorError::UpstreamUnavailable(message) if sent > 0 => {
                        MonitorError::UpstreamUnavailable(format!(
                            "{message} (已发送 {sent}/{total})"
                        ))
                    }
                    other => other,
                })
            }
        }
    }

    /// 在同一个连接上依次发送，连接在所有退出路径上都会释放
    async fn send_all(
        &self,
        messages: Vec<ControlMessage>,
    ) -> Result<usize, (usize, MonitorError)> {
        let mut connection = self.pool.acquire().await.map_err(|e| (0, e))?;

        let mut sent = 0;
        for message in messages {
            let message = match &self.origin {
                Some(origin) => message.with_origin(origin.clone()),
                None => message,
            };
            connection
                .send(&message)
                .await
                .map_err(|e| (sent, e))?;
            debug!("控制消息 {} ({}) 已发送", message.id, message.method());
            sent += 1;
        }

        Ok(sent)
    }
}

/// 去重并保持首次出现的顺序，空集合或空值视为参数错误
fn distinct<S: AsRef<str>>(values: &[S], label: &str) -> MonitorResult<Vec<String>> {
    if values.is_empty() {
        return Err(MonitorError::invalid_argument(format!("{label}不能为空")));
    }

    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for value in values {
        let value = value.as_ref().trim();
        if value.is_empty() {
            return Err(MonitorError::invalid_argument(format!("{label}不能为空字符串")));
        }
        if seen.insert(value.to_string()) {
            result.push(value.to_string());
        }
    }
    Ok(result)
}
