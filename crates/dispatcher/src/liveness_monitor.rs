use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::gauge;
use serde::Serialize;
use taskmon_core::config::MonitorConfig;
use taskmon_domain::StateStore;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Worker存活检测配置
#[derive(Debug, Clone)]
pub struct LivenessMonitorConfig {
    /// 心跳超时阈值
    pub threshold: chrono::Duration,
    /// 检测间隔
    pub check_interval: Duration,
}

impl Default for LivenessMonitorConfig {
    fn default() -> Self {
        Self {
            threshold: chrono::Duration::seconds(150),
            check_interval: Duration::from_secs(30),
        }
    }
}

impl From<&MonitorConfig> for LivenessMonitorConfig {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            threshold: config.liveness_threshold(),
            check_interval: config.liveness_check_interval(),
        }
    }
}

/// 单次检测结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LivenessReport {
    pub alive: usize,
    pub offline: usize,
    pub came_online: Vec<String>,
    pub went_offline: Vec<String>,
}

/// 周期性扫描Worker心跳，记录上线和离线变化
///
/// 存活状态始终在查询时派生，这里只负责日志和指标。
pub struct LivenessMonitor {
    store: Arc<StateStore>,
    config: LivenessMonitorConfig,
    last_seen_alive: Mutex<HashMap<String, bool>>,
    running: Arc<RwLock<bool>>,
}

impl LivenessMonitor {
    pub fn new(store: Arc<StateStore>, config: LivenessMonitorConfig) -> Self {
        Self {
            store,
            config,
            last_seen_alive: Mutex::new(HashMap::new()),
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn start(self: &Arc<Self>) -> JoinHandle<()> {
        *self.running.write().await = true;
        info!(
            "启动Worker存活检测，阈值: {}秒，间隔: {:?}",
            self.config.threshold.num_seconds(),
            self.config.check_interval
        );

        let monitor = Arc::clone(self);
        tokio::spawn(async move { monitor.detection_loop().await })
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
        info!("Worker存活检测停止信号已发送");
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    async fn detection_loop(&self) {
        let mut interval = tokio::time::interval(self.config.check_interval);

        while self.is_running().await {
            interval.tick().await;
            if !self.is_running().await {
                break;
            }
            self.check_at(Utc::now()).await;
        }

        debug!("Worker存活检测循环已退出");
    }

    /// 以给定时间执行一次检测
    pub async fn check_at(&self, now: DateTime<Utc>) -> LivenessReport {
        let workers = self.store.workers().await;
        let mut previous = self.last_seen_alive.lock().await;
        let mut report = LivenessReport::default();

        for worker in workers {
            let alive = worker.is_alive(now, self.config.threshold);
            if alive {
                report.alive += 1;
            } else {
                report.offline += 1;
            }

            match previous.insert(worker.hostname.clone(), alive) {
                Some(was_alive) if was_alive == alive => {}
                Some(_) | None if alive => {
                    info!("Worker {} ONLINE", worker.hostname);
                    report.came_online.push(worker.hostname);
                }
                Some(_) => {
                    warn!(
                        "Worker {} OFFLINE，最后心跳: {}",
                        worker.hostname, worker.last_heartbeat
                    );
                    report.went_offline.push(worker.hostname);
                }
                None => debug!("首次发现离线Worker {}", worker.hostname),
            }
        }

        gauge!("taskmon_workers_alive").set(report.alive as f64);
        gauge!("taskmon_workers_offline").set(report.offline as f64);

        report
    }
}
