//! 命名的批量控制命令
//!
//! 每个命令描述它需要的输入，执行时委托给 [`CommandDispatcher`]。

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskmon_core::{models::WorkerCommand, MonitorError, MonitorResult};
use tracing::info;

use crate::command_dispatcher::{CommandDispatcher, DispatchReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandName {
    RevokeTasks,
    RateLimitTasks,
    ShutdownNodes,
    EnableEvents,
    DisableEvents,
}

impl CommandName {
    pub const ALL: [CommandName; 5] = [
        CommandName::RevokeTasks,
        CommandName::RateLimitTasks,
        CommandName::ShutdownNodes,
        CommandName::EnableEvents,
        CommandName::DisableEvents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandName::RevokeTasks => "revoke_tasks",
            CommandName::RateLimitTasks => "rate_limit_tasks",
            CommandName::ShutdownNodes => "shutdown_nodes",
            CommandName::EnableEvents => "enable_events",
            CommandName::DisableEvents => "disable_events",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CommandName::RevokeTasks => "撤销选中的任务",
            CommandName::RateLimitTasks => "为选中的任务名设置速率限制",
            CommandName::ShutdownNodes => "关闭选中的Worker节点",
            CommandName::EnableEvents => "为选中的Worker开启事件上报",
            CommandName::DisableEvents => "为选中的Worker关闭事件上报",
        }
    }

    pub fn input(&self) -> CommandInput {
        match self {
            CommandName::RevokeTasks => CommandInput::TaskIds,
            CommandName::RateLimitTasks => CommandInput::TaskNamesWithRate,
            CommandName::ShutdownNodes
            | CommandName::EnableEvents
            | CommandName::DisableEvents => CommandInput::Hostnames,
        }
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandName {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| MonitorError::invalid_argument(format!("未知命令: {s}")))
    }
}

/// 命令需要的输入形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandInput {
    /// `{"task_ids": [...]}`
    TaskIds,
    /// `{"task_names": [...], "rate": "10/s"}`
    TaskNamesWithRate,
    /// `{"hostnames": [...]}`
    Hostnames,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandDescriptor {
    pub name: CommandName,
    pub description: &'static str,
    pub input: CommandInput,
}

/// 一次命令调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRequest {
    RevokeTasks { task_ids: Vec<String> },
    RateLimitTasks { task_names: Vec<String>, rate: String },
    Broadcast { command: WorkerCommand, hostnames: Vec<String> },
}

#[derive(Deserialize)]
struct TaskIdsInput {
    task_ids: Vec<String>,
}

#[derive(Deserialize)]
struct RateLimitInput {
    task_names: Vec<String>,
    rate: String,
}

#[derive(Deserialize)]
struct HostnamesInput {
    hostnames: Vec<String>,
}

impl CommandRequest {
    /// 按命令的输入形式解析JSON参数
    pub fn from_json(name: CommandName, body: Value) -> MonitorResult<Self> {
        let invalid = |e: serde_json::Error| {
            MonitorError::invalid_argument(format!("命令 {name} 的参数无效: {e}"))
        };

        Ok(match name {
            CommandName::RevokeTasks => {
                let input: TaskIdsInput = serde_json::from_value(body).map_err(invalid)?;
                CommandRequest::RevokeTasks {
                    task_ids: input.task_ids,
                }
            }
            CommandName::RateLimitTasks => {
                let input: RateLimitInput = serde_json::from_value(body).map_err(invalid)?;
                CommandRequest::RateLimitTasks {
                    task_names: input.task_names,
                    rate: input.rate,
                }
            }
            CommandName::ShutdownNodes => Self::broadcast(WorkerCommand::Shutdown, body, invalid)?,
            CommandName::EnableEvents => {
                Self::broadcast(WorkerCommand::EnableEvents, body, invalid)?
            }
            CommandName::DisableEvents => {
                Self::broadcast(WorkerCommand::DisableEvents, body, invalid)?
            }
        })
    }

    fn broadcast(
        command: WorkerCommand,
        body: Value,
        invalid: impl Fn(serde_json::Error) -> MonitorError,
    ) -> MonitorResult<Self> {
        let input: HostnamesInput = serde_json::from_value(body).map_err(invalid)?;
        Ok(CommandRequest::Broadcast {
            command,
            hostnames: input.hostnames,
        })
    }

    pub fn name(&self) -> CommandName {
        match self {
            CommandRequest::RevokeTasks { .. } => CommandName::RevokeTasks,
            CommandRequest::RateLimitTasks { .. } => CommandName::RateLimitTasks,
            CommandRequest::Broadcast { command, .. } => match command {
                WorkerCommand::Shutdown => CommandName::ShutdownNodes,
                WorkerCommand::EnableEvents => CommandName::EnableEvents,
                WorkerCommand::DisableEvents => CommandName::DisableEvents,
            },
        }
    }
}

/// 批量命令注册表
pub struct CommandRegistry {
    dispatcher: Arc<CommandDispatcher>,
}

impl CommandRegistry {
    pub fn new(dispatcher: Arc<CommandDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn descriptors(&self) -> Vec<CommandDescriptor> {
        CommandName::ALL
            .into_iter()
            .map(|name| CommandDescriptor {
                name,
                description: name.description(),
                input: name.input(),
            })
            .collect()
    }

    pub async fn execute(&self, request: CommandRequest) -> MonitorResult<DispatchReport> {
        info!("执行命令: {}", request.name());

        match request {
            CommandRequest::RevokeTasks { task_ids } => {
                self.dispatcher.revoke_tasks(&task_ids).await
            }
            CommandRequest::RateLimitTasks { task_names, rate } => {
                self.dispatcher.set_rate_limit(&task_names, &rate).await
            }
            CommandRequest::Broadcast { command, hostnames } => {
                self.dispatcher
                    .broadcast_worker_command(command, &hostnames)
                    .await
            }
        }
    }

    /// 按名称解析参数并执行
    pub async fn execute_named(&self, name: &str, body: Value) -> MonitorResult<DispatchReport> {
        let name: CommandName = name.parse()?;
        self.execute(CommandRequest::from_json(name, body)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskmon_infrastructure::{ControlConnectionPool, TimeoutHandler};
    use taskmon_testing_utils::MockControlChannel;

    fn registry(channel: &MockControlChannel) -> CommandRegistry {
        let pool = ControlConnectionPool::new(Arc::new(channel.clone()), 1, TimeoutHandler::default());
        CommandRegistry::new(Arc::new(CommandDispatcher::new(pool)))
    }

    #[test]
    fn test_descriptors_cover_every_command() {
        let registry = registry(&MockControlChannel::new());
        let descriptors = registry.descriptors();
        let names: Vec<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "revoke_tasks",
                "rate_limit_tasks",
                "shutdown_nodes",
                "enable_events",
                "disable_events"
            ]
        );
        assert_eq!(descriptors[1].input, CommandInput::TaskNamesWithRate);

        let json = serde_json::to_value(&descriptors[2]).unwrap();
        assert_eq!(json["name"], "shutdown_nodes");
        assert_eq!(json["input"], "hostnames");
    }

    #[test]
    fn test_parse_request() {
        let request = CommandRequest::from_json(
            CommandName::RateLimitTasks,
            json!({"task_names": ["a.b"], "rate": "5/m"}),
        )
        .unwrap();
        assert_eq!(request.name(), CommandName::RateLimitTasks);

        let err = CommandRequest::from_json(CommandName::RevokeTasks, json!({"hostnames": []}))
            .unwrap_err();
        assert!(err.is_invalid_argument());

        assert!("reboot_cluster".parse::<CommandName>().is_err());
    }

    #[tokio::test]
    async fn test_execute_named_commands() {
        let channel = MockControlChannel::new();
        let registry = registry(&channel);

        let report = registry
            .execute_named("revoke_tasks", json!({"task_ids": ["t1", "t2"]}))
            .await
            .unwrap();
        assert_eq!(report.messages_sent, 2);

        let report = registry
            .execute_named("disable_events", json!({"hostnames": ["celery@a"]}))
            .await
            .unwrap();
        assert_eq!(report.command, "disable_events");
        assert_eq!(channel.sent_count(), 3);
    }

    #[tokio::test]
    async fn test_empty_selection_is_rejected() {
        let channel = MockControlChannel::new();
        let registry = registry(&channel);

        let err = registry
            .execute_named("shutdown_nodes", json!({"hostnames": []}))
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(channel.open_count(), 0);
    }
}
