use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 存活阈值与检测间隔的上限：30天
pub const MAX_LIVENESS_SECONDS: u64 = 30 * 24 * 60 * 60;

/// 状态存储、事件摄取与存活检测配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// 最近一次心跳距今小于该值的Worker视为存活
    pub liveness_threshold_seconds: u64,
    pub liveness_check_interval_seconds: u64,
    pub store_shards: usize,
    /// 并发事件摄取循环数量
    pub ingest_workers: usize,
    /// 事件源为空时的轮询间隔
    pub idle_poll_interval_ms: u64,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            liveness_threshold_seconds: 150,
            liveness_check_interval_seconds: 30,
            store_shards: 16,
            ingest_workers: 2,
            idle_poll_interval_ms: 100,
            default_page_size: 50,
            max_page_size: 500,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.liveness_threshold_seconds == 0 {
            return Err(anyhow::anyhow!("存活阈值必须大于0"));
        }

        if self.liveness_threshold_seconds > MAX_LIVENESS_SECONDS {
            return Err(anyhow::anyhow!(
                "存活阈值 {} 秒超过上限 {} 秒",
                self.liveness_threshold_seconds,
                MAX_LIVENESS_SECONDS
            ));
        }

        if self.liveness_check_interval_seconds == 0 {
            return Err(anyhow::anyhow!("存活检测间隔必须大于0"));
        }

        if self.liveness_check_interval_seconds > MAX_LIVENESS_SECONDS {
            return Err(anyhow::anyhow!(
                "存活检测间隔 {} 秒超过上限 {} 秒",
                self.liveness_check_interval_seconds,
                MAX_LIVENESS_SECONDS
            ));
        }

        if self.store_shards == 0 {
            return Err(anyhow::anyhow!("状态存储分片数必须大于0"));
        }

        if self.ingest_workers == 0 {
            return Err(anyhow::anyhow!("事件摄取并发数必须大于0"));
        }

        if self.default_page_size == 0 || self.max_page_size == 0 {
            return Err(anyhow::anyhow!("分页大小必须大于0"));
        }

        if self.default_page_size > self.max_page_size {
            return Err(anyhow::anyhow!(
                "默认分页大小 {} 不能超过最大分页大小 {}",
                self.default_page_size,
                self.max_page_size
            ));
        }

        Ok(())
    }

    /// 未经校验的超大值截断为上限
    pub fn liveness_threshold(&self) -> chrono::Duration {
        let seconds = self.liveness_threshold_seconds.min(MAX_LIVENESS_SECONDS);
        chrono::Duration::seconds(seconds as i64)
    }

    pub fn liveness_check_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_check_interval_seconds.min(MAX_LIVENESS_SECONDS))
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }
}

/// 已注册任务名称，用于周期任务表单的任务选择
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub tasks: Vec<String>,
}

impl RegistryConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(blank) = self.tasks.iter().position(|name| name.trim().is_empty()) {
            return Err(anyhow::anyhow!("第 {} 个注册任务名称为空", blank + 1));
        }
        Ok(())
    }
}
