use async_trait::async_trait;

use crate::{models::PeriodicScheduleEntry, Result};

/// 周期任务持久化接口，由外部调度器的存储层实现
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// 新建或覆盖同名周期任务
    async fn upsert(&self, entry: &PeriodicScheduleEntry) -> Result<()>;

    /// 根据名称获取周期任务
    async fn get(&self, name: &str) -> Result<Option<PeriodicScheduleEntry>>;

    /// 获取所有周期任务
    async fn list(&self) -> Result<Vec<PeriodicScheduleEntry>>;

    /// 删除周期任务，返回是否存在
    async fn delete(&self, name: &str) -> Result<bool>;
}

/// 已注册任务名称的只读注册表
pub trait TaskRegistry: Send + Sync {
    /// 按字典序返回全部已注册任务名
    fn names(&self) -> Vec<String>;

    fn contains(&self, name: &str) -> bool;
}
