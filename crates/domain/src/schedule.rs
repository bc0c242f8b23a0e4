use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use serde_json::Value;
use taskmon_core::{
    models::{CrontabSchedule, PeriodicScheduleEntry, PeriodicScheduleForm, Schedule},
    traits::{ScheduleStore, TaskRegistry},
    MonitorError, MonitorResult,
};
use tracing::{debug, info, warn};

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// crontab调度的解析结果
///
/// 字段格式与任务队列的crontab一致（分、时、星期、日、月），星期可用 0-7
/// 或英文缩写，0 和 7 都表示周日。
pub struct CrontabScheduler {
    schedule: CronSchedule,
}

impl CrontabScheduler {
    pub fn new(crontab: &CrontabSchedule) -> MonitorResult<Self> {
        let fields = [
            ("minute", crontab.minute.trim().to_string()),
            ("hour", crontab.hour.trim().to_string()),
            ("day_of_month", crontab.day_of_month.trim().to_string()),
            ("month_of_year", crontab.month_of_year.trim().to_string()),
            (
                "day_of_week",
                translate_day_of_week(crontab).map_err(|message| invalid_cron(crontab, message))?,
            ),
        ];

        // 逐个字段校验，便于指出出错的字段
        for (index, (field, value)) in fields.iter().enumerate() {
            if value.is_empty() {
                return Err(invalid_cron(crontab, format!("{field} 不能为空")));
            }
            let mut probe = ["*"; 5];
            probe[index] = value.as_str();
            let expr = to_cron_expression(&probe);
            CronSchedule::from_str(&expr)
                .map_err(|e| invalid_cron(crontab, format!("{field}: {e}")))?;
        }

        let values = [
            fields[0].1.as_str(),
            fields[1].1.as_str(),
            fields[2].1.as_str(),
            fields[3].1.as_str(),
            fields[4].1.as_str(),
        ];
        let expr = to_cron_expression(&values);
        let schedule =
            CronSchedule::from_str(&expr).map_err(|e| invalid_cron(crontab, e.to_string()))?;

        Ok(Self { schedule })
    }

    /// 严格晚于 `from` 的下一次执行时间
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }
}

/// 转换为cron库的表达式：秒 分 时 日 月 星期
fn to_cron_expression(fields: &[&str; 5]) -> String {
    let [minute, hour, day_of_month, month_of_year, day_of_week] = fields;
    format!("0 {minute} {hour} {day_of_month} {month_of_year} {day_of_week}")
}

fn invalid_cron(crontab: &CrontabSchedule, message: impl Into<String>) -> MonitorError {
    MonitorError::InvalidCron {
        expr: crontab.to_string(),
        message: message.into(),
    }
}

fn translate_day_of_week(crontab: &CrontabSchedule) -> Result<String, String> {
    let field = crontab.day_of_week.trim();
    if field.is_empty() {
        return Err("day_of_week 不能为空".to_string());
    }

    field
        .split(',')
        .map(|part| {
            let part = part.trim();
            if part == "*" {
                return Ok("*".to_string());
            }
            if part.contains('/') {
                return Err(format!("day_of_week 不支持步长: {part}"));
            }
            match part.split_once('-') {
                Some((start, end)) => Ok(format!("{}-{}", day_name(start)?, day_name(end)?)),
                None => day_name(part).map(str::to_string),
            }
        })
        .collect::<Result<Vec<_>, _>>()
        .map(|parts| parts.join(","))
}

fn day_name(value: &str) -> Result<&'static str, String> {
    let value = value.trim();
    if let Ok(number) = value.parse::<usize>() {
        return DAY_NAMES
            .get(number % 7)
            .filter(|_| number <= 7)
            .copied()
            .ok_or_else(|| format!("无效的星期: {value}，取值范围 0-7"));
    }

    DAY_NAMES
        .iter()
        .find(|name| {
            value
                .get(..3)
                .is_some_and(|prefix| name.eq_ignore_ascii_case(prefix))
        })
        .copied()
        .ok_or_else(|| format!("无效的星期: {value}"))
}

/// 计算周期任务在 `from` 之后的下一次执行时间
///
/// 间隔调度以 `from` 作为上次执行时间；禁用或已过期的任务返回 `None`。
pub fn next_run_after(
    entry: &PeriodicScheduleEntry,
    from: DateTime<Utc>,
) -> MonitorResult<Option<DateTime<Utc>>> {
    if !entry.enabled || entry.is_expired(from) {
        return Ok(None);
    }

    let next = match &entry.schedule {
        Schedule::Interval(interval) => Some(
            from.checked_add_signed(interval.as_duration())
                .ok_or_else(|| {
                    MonitorError::invalid_argument(format!(
                        "周期任务 {} 的间隔超出可表示的时间范围",
                        entry.name
                    ))
                })?,
        ),
        Schedule::Crontab(crontab) => CrontabScheduler::new(crontab)?.next_after(from),
    };

    Ok(next.filter(|next| !entry.is_expired(*next)))
}

/// 周期任务校验与管理
pub struct PeriodicScheduleService {
    registry: Arc<dyn TaskRegistry>,
    store: Arc<dyn ScheduleStore>,
}

impl PeriodicScheduleService {
    pub fn new(registry: Arc<dyn TaskRegistry>, store: Arc<dyn ScheduleStore>) -> Self {
        Self { registry, store }
    }

    /// 已注册任务的选择列表
    pub fn registered_task_choices(&self) -> Vec<String> {
        self.registry.names()
    }

    /// 校验表单并生成周期任务定义，不做持久化
    pub fn validate(&self, form: &PeriodicScheduleForm) -> MonitorResult<PeriodicScheduleEntry> {
        let name = form.name.trim();
        if name.is_empty() {
            return Err(MonitorError::invalid_argument("周期任务名称不能为空"));
        }

        let task = self.resolve_task(form)?;

        let schedule = match (&form.interval, &form.crontab) {
            (Some(_), Some(_)) => {
                return Err(MonitorError::invalid_argument(
                    "间隔调度和crontab调度只能选择一种",
                ))
            }
            (None, None) => {
                return Err(MonitorError::invalid_argument(
                    "必须提供间隔调度或crontab调度",
                ))
            }
            (Some(interval), None) => {
                if interval.every == 0 {
                    return Err(MonitorError::invalid_argument("间隔必须大于0"));
                }
                if Utc::now()
                    .checked_add_signed(interval.as_duration())
                    .is_none()
                {
                    return Err(MonitorError::invalid_argument(format!(
                        "间隔过大: {} {:?}",
                        interval.every, interval.period
                    )));
                }
                Schedule::Interval(interval.clone())
            }
            (None, Some(crontab)) => {
                CrontabScheduler::new(crontab)?;
                Schedule::Crontab(crontab.clone())
            }
        };

        let args = form.args.clone().unwrap_or_else(|| Value::Array(Vec::new()));
        if !args.is_array() {
            return Err(MonitorError::invalid_argument("args 必须是JSON数组"));
        }
        let kwargs = form
            .kwargs
            .clone()
            .unwrap_or_else(|| Value::Object(Default::default()));
        if !kwargs.is_object() {
            return Err(MonitorError::invalid_argument("kwargs 必须是JSON对象"));
        }

        Ok(PeriodicScheduleEntry {
            name: name.to_string(),
            task,
            enabled: form.enabled.unwrap_or(true),
            schedule,
            args,
            kwargs,
            queue: non_empty(&form.queue),
            exchange: non_empty(&form.exchange),
            routing_key: non_empty(&form.routing_key),
            expires: form.expires,
        })
    }

    /// 非空的注册任务优先于自定义任务名
    fn resolve_task(&self, form: &PeriodicScheduleForm) -> MonitorResult<String> {
        if let Some(registered) = non_empty(&form.registered_task) {
            if !self.registry.contains(&registered) {
                warn!("周期任务 {} 使用了未注册的任务: {}", form.name, registered);
            }
            return Ok(registered);
        }

        non_empty(&form.task).ok_or_else(|| MonitorError::invalid_argument("必须指定任务名称"))
    }

    pub async fn save(&self, form: &PeriodicScheduleForm) -> MonitorResult<PeriodicScheduleEntry> {
        let entry = self.validate(form)?;
        self.store.upsert(&entry).await?;
        info!("保存周期任务: {} -> {}", entry.name, entry.task);
        Ok(entry)
    }

    pub async fn get(&self, name: &str) -> MonitorResult<PeriodicScheduleEntry> {
        self.store
            .get(name)
            .await?
            .ok_or_else(|| MonitorError::ScheduleNotFound {
                name: name.to_string(),
            })
    }

    pub async fn list(&self) -> MonitorResult<Vec<PeriodicScheduleEntry>> {
        let mut entries = self.store.list().await?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    pub async fn delete(&self, name: &str) -> MonitorResult<()> {
        if !self.store.delete(name).await? {
            return Err(MonitorError::ScheduleNotFound {
                name: name.to_string(),
            });
        }
        info!("删除周期任务: {}", name);
        Ok(())
    }

    /// 获取周期任务及其在 `from` 之后的下次执行时间，只读取一次存储
    pub async fn get_with_next_run(
        &self,
        name: &str,
        from: DateTime<Utc>,
    ) -> MonitorResult<(PeriodicScheduleEntry, Option<DateTime<Utc>>)> {
        let entry = self.get(name).await?;
        let next = next_run_after(&entry, from)?;
        debug!("周期任务 {} 下次执行时间: {:?}", name, next);
        Ok((entry, next))
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryTaskRegistry;
    use chrono::{Datelike, Duration, TimeZone, Timelike, Weekday};
    use serde_json::json;
    use taskmon_core::models::{IntervalPeriod, IntervalSchedule};
    use taskmon_testing_utils::MockScheduleStore;

    fn service() -> PeriodicScheduleService {
        let registry = InMemoryTaskRegistry::new(["proj.tasks.add", "proj.tasks.cleanup"]);
        PeriodicScheduleService::new(Arc::new(registry), Arc::new(MockScheduleStore::new()))
    }

    fn interval_form(name: &str) -> PeriodicScheduleForm {
        PeriodicScheduleForm {
            name: name.to_string(),
            task: Some("proj.tasks.add".to_string()),
            interval: Some(IntervalSchedule::new(10, IntervalPeriod::Seconds)),
            ..Default::default()
        }
    }

    fn crontab(minute: &str, hour: &str, day_of_week: &str) -> CrontabSchedule {
        CrontabSchedule {
            minute: minute.to_string(),
            hour: hour.to_string(),
            day_of_week: day_of_week.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_registered_task_overrides_free_text() {
        let form = PeriodicScheduleForm {
            registered_task: Some("proj.tasks.cleanup".to_string()),
            task: Some("custom.task".to_string()),
            ..interval_form("nightly")
        };
        let entry = service().validate(&form).unwrap();
        assert_eq!(entry.task, "proj.tasks.cleanup");
        assert!(entry.enabled);
        assert_eq!(entry.args, json!([]));
        assert_eq!(entry.kwargs, json!({}));

        let blank_registered = PeriodicScheduleForm {
            registered_task: Some("  ".to_string()),
            task: Some("custom.task".to_string()),
            ..interval_form("custom")
        };
        assert_eq!(service().validate(&blank_registered).unwrap().task, "custom.task");
    }

    #[test]
    fn test_missing_task_is_rejected() {
        let form = PeriodicScheduleForm {
            task: None,
            ..interval_form("empty")
        };
        assert!(service().validate(&form).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_exactly_one_schedule_required() {
        let both = PeriodicScheduleForm {
            crontab: Some(CrontabSchedule::default()),
            ..interval_form("both")
        };
        assert!(service().validate(&both).is_err());

        let neither = PeriodicScheduleForm {
            interval: None,
            ..interval_form("neither")
        };
        assert!(service().validate(&neither).is_err());

        let zero = PeriodicScheduleForm {
            interval: Some(IntervalSchedule::new(0, IntervalPeriod::Minutes)),
            ..interval_form("zero")
        };
        assert!(service().validate(&zero).is_err());
    }

    #[test]
    fn test_args_and_kwargs_shapes() {
        let ok = PeriodicScheduleForm {
            args: Some(json!([1, "two"])),
            kwargs: Some(json!({"retry": true})),
            ..interval_form("shaped")
        };
        assert!(service().validate(&ok).is_ok());

        let bad_args = PeriodicScheduleForm {
            args: Some(json!({"a": 1})),
            ..interval_form("bad-args")
        };
        assert!(service().validate(&bad_args).is_err());

        let bad_kwargs = PeriodicScheduleForm {
            kwargs: Some(json!([1])),
            ..interval_form("bad-kwargs")
        };
        assert!(service().validate(&bad_kwargs).is_err());
    }

    #[test]
    fn test_crontab_validation() {
        assert!(CrontabScheduler::new(&crontab("*/15", "*", "*")).is_ok());
        assert!(CrontabScheduler::new(&crontab("0", "4", "1-5")).is_ok());
        assert!(CrontabScheduler::new(&crontab("30", "7", "mon,fri")).is_ok());
        assert!(CrontabScheduler::new(&crontab("0", "0", "0,7")).is_ok());

        for bad in [
            crontab("61", "*", "*"),
            crontab("*", "25", "*"),
            crontab("*", "*", "8"),
            crontab("*", "*", "*/2"),
            crontab("", "*", "*"),
        ] {
            let err = CrontabScheduler::new(&bad).err().unwrap();
            assert!(matches!(err, MonitorError::InvalidCron { .. }), "{bad}");
        }
    }

    #[test]
    fn test_crontab_next_run() {
        // 2024-01-01 是周一
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let scheduler = CrontabScheduler::new(&crontab("30", "7", "0")).unwrap();
        let next = scheduler.next_after(from).unwrap();
        assert_eq!(next.weekday(), Weekday::Sun);
        assert_eq!((next.hour(), next.minute()), (7, 30));
        assert_eq!(next.day(), 7);

        let hourly = CrontabScheduler::new(&crontab("0", "*", "*")).unwrap();
        let first = hourly.next_after(from).unwrap();
        assert_eq!(hourly.next_after(first).unwrap(), from + Duration::hours(2));
    }

    #[test]
    fn test_next_run_after_honors_enabled_and_expiry() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut entry = service().validate(&interval_form("every-10s")).unwrap();
        assert_eq!(
            next_run_after(&entry, from).unwrap(),
            Some(from + Duration::seconds(10))
        );

        entry.expires = Some(from + Duration::seconds(5));
        assert_eq!(next_run_after(&entry, from).unwrap(), None);

        entry.expires = None;
        entry.enabled = false;
        assert_eq!(next_run_after(&entry, from).unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_interval_is_rejected() {
        let service = service();
        let huge = PeriodicScheduleForm {
            interval: Some(IntervalSchedule::new(u32::MAX, IntervalPeriod::Hours)),
            ..interval_form("huge")
        };
        assert!(service.validate(&huge).unwrap_err().is_invalid_argument());
        assert!(service.save(&huge).await.is_err());
        assert!(service.get("huge").await.unwrap_err().is_not_found());

        // 已持久化的超大间隔在计算时返回错误而不是崩溃
        let entry = PeriodicScheduleEntry {
            schedule: Schedule::Interval(IntervalSchedule::new(u32::MAX, IntervalPeriod::Hours)),
            ..service.validate(&interval_form("huge")).unwrap()
        };
        let err = next_run_after(&entry, Utc::now()).unwrap_err();
        assert!(err.is_invalid_argument());

        let near_max = DateTime::<Utc>::MAX_UTC - Duration::seconds(5);
        let err = next_run_after(&entry, near_max).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[tokio::test]
    async fn test_get_with_next_run_reads_store_once() {
        let store = MockScheduleStore::new();
        let registry = InMemoryTaskRegistry::new(["proj.tasks.add"]);
        let service = PeriodicScheduleService::new(Arc::new(registry), Arc::new(store.clone()));
        service.save(&interval_form("every-10s")).await.unwrap();

        store.evict_on_get(true);
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let (entry, next) = service.get_with_next_run("every-10s", from).await.unwrap();
        assert_eq!(entry.name, "every-10s");
        assert_eq!(next, Some(from + Duration::seconds(10)));
        assert_eq!(store.get_count(), 1);

        let err = service.get_with_next_run("every-10s", from).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_save_get_list_delete() {
        let service = service();
        service.save(&interval_form("b-job")).await.unwrap();
        let form = PeriodicScheduleForm {
            interval: None,
            crontab: Some(crontab("0", "3", "*")),
            ..interval_form("a-job")
        };
        service.save(&form).await.unwrap();

        let names: Vec<String> = service
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(names, vec!["a-job", "b-job"]);

        let entry = service.get("a-job").await.unwrap();
        assert!(matches!(entry.schedule, Schedule::Crontab(_)));

        service.delete("a-job").await.unwrap();
        assert!(service.get("a-job").await.unwrap_err().is_not_found());
        assert!(service.delete("a-job").await.unwrap_err().is_not_found());
    }

    #[test]
    fn test_registered_task_choices_sorted() {
        assert_eq!(
            service().registered_task_choices(),
            vec!["proj.tasks.add", "proj.tasks.cleanup"]
        );
    }
}
