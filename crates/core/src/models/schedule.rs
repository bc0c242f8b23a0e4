use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 周期任务定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicScheduleEntry {
    pub name: String,
    pub task: String,
    pub enabled: bool,
    pub schedule: Schedule,
    pub args: serde_json::Value,
    pub kwargs: serde_json::Value,
    pub queue: Option<String>,
    pub exchange: Option<String>,
    pub routing_key: Option<String>,
    pub expires: Option<DateTime<Utc>>,
}

/// 调度方式，间隔与crontab互斥
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    Interval(IntervalSchedule),
    Crontab(CrontabSchedule),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalSchedule {
    pub every: u32,
    pub period: IntervalPeriod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalPeriod {
    Days,
    Hours,
    Minutes,
    Seconds,
    Microseconds,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrontabSchedule {
    #[serde(default = "wildcard")]
    pub minute: String,
    #[serde(default = "wildcard")]
    pub hour: String,
    #[serde(default = "wildcard")]
    pub day_of_week: String,
    #[serde(default = "wildcard")]
    pub day_of_month: String,
    #[serde(default = "wildcard")]
    pub month_of_year: String,
}

fn wildcard() -> String {
    "*".to_string()
}

/// 提交周期任务时的表单，包含注册任务选择和自定义任务名两个入口
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodicScheduleForm {
    pub name: String,
    pub registered_task: Option<String>,
    pub task: Option<String>,
    pub enabled: Option<bool>,
    pub interval: Option<IntervalSchedule>,
    pub crontab: Option<CrontabSchedule>,
    pub args: Option<serde_json::Value>,
    pub kwargs: Option<serde_json::Value>,
    pub queue: Option<String>,
    pub exchange: Option<String>,
    pub routing_key: Option<String>,
    pub expires: Option<DateTime<Utc>>,
}

impl IntervalSchedule {
    pub fn new(every: u32, period: IntervalPeriod) -> Self {
        Self { every, period }
    }

    pub fn as_duration(&self) -> Duration {
        let every = i64::from(self.every);
        match self.period {
            IntervalPeriod::Days => Duration::days(every),
            IntervalPeriod::Hours => Duration::hours(every),
            IntervalPeriod::Minutes => Duration::minutes(every),
            IntervalPeriod::Seconds => Duration::seconds(every),
            IntervalPeriod::Microseconds => Duration::microseconds(every),
        }
    }
}

impl Default for CrontabSchedule {
    fn default() -> Self {
        Self {
            minute: wildcard(),
            hour: wildcard(),
            day_of_week: wildcard(),
            day_of_month: wildcard(),
            month_of_year: wildcard(),
        }
    }
}

impl std::fmt::Display for CrontabSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {} {} (m/h/d/dM/MY)",
            self.minute, self.hour, self.day_of_week, self.day_of_month, self.month_of_year
        )
    }
}

impl PeriodicScheduleEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interval_duration() {
        assert_eq!(
            IntervalSchedule::new(10, IntervalPeriod::Seconds).as_duration(),
            Duration::seconds(10)
        );
        assert_eq!(
            IntervalSchedule::new(2, IntervalPeriod::Days).as_duration(),
            Duration::hours(48)
        );
    }

    #[test]
    fn test_crontab_defaults_to_wildcards() {
        let crontab: CrontabSchedule = serde_json::from_value(json!({"minute": "30"})).unwrap();
        assert_eq!(crontab.minute, "30");
        assert_eq!(crontab.hour, "*");
        assert_eq!(crontab.to_string(), "30 * * * * (m/h/d/dM/MY)");
    }

    #[test]
    fn test_schedule_tagging() {
        let schedule = Schedule::Interval(IntervalSchedule::new(5, IntervalPeriod::Minutes));
        let value = serde_json::to_value(&schedule).unwrap();
        assert_eq!(value, json!({"type": "interval", "every": 5, "period": "minutes"}));
    }
}
