use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::MonitorError;

/// 发往控制通道的远程控制消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub id: String,
    #[serde(flatten)]
    pub command: ControlCommand,
    /// 目标Worker，`None` 表示广播到所有Worker
    pub destination: Option<Vec<String>>,
    /// 发送方节点名
    pub origin: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "arguments", rename_all = "snake_case")]
pub enum ControlCommand {
    Revoke { task_id: String, terminate: bool },
    RateLimit { task_name: String, rate: String },
    Shutdown,
    EnableEvents,
    DisableEvents,
}

/// 可广播给Worker的命令
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkerCommand {
    Shutdown,
    EnableEvents,
    DisableEvents,
}

impl WorkerCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerCommand::Shutdown => "shutdown",
            WorkerCommand::EnableEvents => "enable_events",
            WorkerCommand::DisableEvents => "disable_events",
        }
    }

    pub fn to_control_command(self) -> ControlCommand {
        match self {
            WorkerCommand::Shutdown => ControlCommand::Shutdown,
            WorkerCommand::EnableEvents => ControlCommand::EnableEvents,
            WorkerCommand::DisableEvents => ControlCommand::DisableEvents,
        }
    }
}

impl FromStr for WorkerCommand {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shutdown" => Ok(WorkerCommand::Shutdown),
            "enable_events" => Ok(WorkerCommand::EnableEvents),
            "disable_events" => Ok(WorkerCommand::DisableEvents),
            _ => Err(MonitorError::InvalidArgument(format!("未知的Worker命令: {s}"))),
        }
    }
}

impl fmt::Display for WorkerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 速率限制单位
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RateUnit {
    PerSecond,
    PerMinute,
    PerHour,
}

impl RateUnit {
    fn suffix(&self) -> &'static str {
        match self {
            RateUnit::PerSecond => "s",
            RateUnit::PerMinute => "m",
            RateUnit::PerHour => "h",
        }
    }
}

/// 经过校验的速率限制，例如 `10/s`、`100/m`、`0`（取消限制）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    pub value: f64,
    pub unit: Option<RateUnit>,
}

impl RateLimit {
    pub fn parse(input: &str) -> Result<Self, MonitorError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(MonitorError::InvalidArgument("速率限制不能为空".to_string()));
        }

        let (number, unit) = match trimmed.split_once('/') {
            Some((number, unit)) => {
                let unit = match unit.trim() {
                    "s" => RateUnit::PerSecond,
                    "m" => RateUnit::PerMinute,
                    "h" => RateUnit::PerHour,
                    other => {
                        return Err(MonitorError::InvalidArgument(format!(
                            "无效的速率单位: {other}，支持 s/m/h"
                        )))
                    }
                };
                (number.trim(), Some(unit))
            }
            None => (trimmed, None),
        };

        if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return Err(MonitorError::InvalidArgument(format!(
                "无效的速率限制: {input}"
            )));
        }

        let value: f64 = number
            .parse()
            .map_err(|_| MonitorError::InvalidArgument(format!("无效的速率限制: {input}")))?;
        if !value.is_finite() || value < 0.0 {
            return Err(MonitorError::InvalidArgument(format!(
                "速率限制必须为非负数: {input}"
            )));
        }

        Ok(Self { value, unit })
    }

    pub fn is_disabled(&self) -> bool {
        self.value == 0.0
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            Some(unit) => write!(f, "{}/{}", self.value, unit.suffix()),
            None => write!(f, "{}", self.value),
        }
    }
}

impl FromStr for RateLimit {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl ControlMessage {
    pub fn new(command: ControlCommand, destination: Option<Vec<String>>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            command,
            destination,
            origin: None,
            timestamp: Utc::now(),
        }
    }

    pub fn revoke(task_id: impl Into<String>) -> Self {
        Self::new(
            ControlCommand::Revoke {
                task_id: task_id.into(),
                terminate: false,
            },
            None,
        )
    }

    pub fn rate_limit(task_name: impl Into<String>, rate: &RateLimit) -> Self {
        Self::new(
            ControlCommand::RateLimit {
                task_name: task_name.into(),
                rate: rate.to_string(),
            },
            None,
        )
    }

    pub fn worker_command(command: WorkerCommand, destination: Vec<String>) -> Self {
        Self::new(command.to_control_command(), Some(destination))
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn method(&self) -> &'static str {
        match &self.command {
            ControlCommand::Revoke { .. } => "revoke",
            ControlCommand::RateLimit { .. } => "rate_limit",
            ControlCommand::Shutdown => "shutdown",
            ControlCommand::EnableEvents => "enable_events",
            ControlCommand::DisableEvents => "disable_events",
        }
    }

    pub fn serialize_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn deserialize_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_accepts_valid_rates() {
        let rate = RateLimit::parse("10/s").unwrap();
        assert_eq!(rate.value, 10.0);
        assert_eq!(rate.unit, Some(RateUnit::PerSecond));
        assert_eq!(rate.to_string(), "10/s");

        assert_eq!(RateLimit::parse("100/m").unwrap().to_string(), "100/m");
        assert_eq!(RateLimit::parse(" 2.5/h ").unwrap().unit, Some(RateUnit::PerHour));
        assert!(RateLimit::parse("0").unwrap().is_disabled());
        assert_eq!(RateLimit::parse("42").unwrap().unit, None);
    }

    #[test]
    fn test_rate_limit_rejects_malformed_rates() {
        for bad in ["", "  ", "-1/s", "ten/s", "10/d", "10/", "/s", "1e3", "NaN", "10/s/s"] {
            let err = RateLimit::parse(bad).unwrap_err();
            assert!(err.is_invalid_argument(), "expected {bad:?} to be rejected");
        }
    }

    #[test]
    fn test_control_message_wire_format() {
        let message = ControlMessage::revoke("t1").with_origin("taskmon@host");
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["method"], "revoke");
        assert_eq!(json["arguments"]["task_id"], "t1");
        assert_eq!(json["arguments"]["terminate"], false);
        assert_eq!(json["origin"], "taskmon@host");
        assert!(json["destination"].is_null());

        let shutdown = ControlMessage::worker_command(
            WorkerCommand::Shutdown,
            vec!["celery@a".to_string()],
        );
        let json = serde_json::to_value(&shutdown).unwrap();
        assert_eq!(json["method"], "shutdown");
        assert_eq!(json["destination"][0], "celery@a");

        let bytes = shutdown.serialize_bytes().unwrap();
        let decoded = ControlMessage::deserialize_bytes(&bytes).unwrap();
        assert_eq!(decoded, shutdown);
    }

    #[test]
    fn test_worker_command_parse() {
        assert_eq!("shutdown".parse::<WorkerCommand>().unwrap(), WorkerCommand::Shutdown);
        assert_eq!(
            "disable_events".parse::<WorkerCommand>().unwrap().to_control_command(),
            ControlCommand::DisableEvents
        );
        assert!("reboot".parse::<WorkerCommand>().is_err());
    }
}
