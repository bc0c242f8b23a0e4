use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Worker节点信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub hostname: String,
    pub last_heartbeat: DateTime<Utc>,
    pub first_seen: DateTime<Utc>,
    pub active: Option<u32>,
    pub processed: Option<u64>,
    pub loadavg: Option<[f64; 3]>,
    /// 心跳频率（秒）
    pub freq: Option<f64>,
    pub sw_ident: Option<String>,
    pub sw_ver: Option<String>,
}

/// 附带存活状态的Worker视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerView {
    #[serde(flatten)]
    pub worker: WorkerRecord,
    pub is_alive: bool,
}

impl WorkerRecord {
    pub fn new(hostname: impl Into<String>, heartbeat_at: DateTime<Utc>) -> Self {
        Self {
            hostname: hostname.into(),
            last_heartbeat: heartbeat_at,
            first_seen: heartbeat_at,
            active: None,
            processed: None,
            loadavg: None,
            freq: None,
            sw_ident: None,
            sw_ver: None,
        }
    }

    /// 检查Worker是否存活
    ///
    /// 截止点不包含在内：心跳恰好为 `threshold` 之前时视为离线。
    pub fn is_alive(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        now - self.last_heartbeat < threshold
    }

    pub fn view(&self, now: DateTime<Utc>, threshold: Duration) -> WorkerView {
        WorkerView {
            worker: self.clone(),
            is_alive: self.is_alive(now, threshold),
        }
    }
}
