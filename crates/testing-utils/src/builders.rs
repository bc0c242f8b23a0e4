//! 监控事件构建器

use chrono::{DateTime, Utc};
use taskmon_core::models::{
    MonitorEvent, TaskEvent, TaskEventPayload, TaskEventType, WorkerEvent, WorkerEventPayload,
    WorkerEventType,
};

pub struct TaskEventBuilder {
    event: TaskEvent,
}

impl TaskEventBuilder {
    pub fn new(task_id: impl Into<String>, event_type: TaskEventType) -> Self {
        Self {
            event: TaskEvent {
                task_id: task_id.into(),
                event_type,
                timestamp: Utc::now(),
                payload: TaskEventPayload::default(),
            },
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.event.timestamp = timestamp;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.event.payload.name = Some(name.to_string());
        self
    }

    pub fn with_args(mut self, args: &str) -> Self {
        self.event.payload.args = Some(args.to_string());
        self
    }

    pub fn with_kwargs(mut self, kwargs: &str) -> Self {
        self.event.payload.kwargs = Some(kwargs.to_string());
        self
    }

    pub fn with_hostname(mut self, hostname: &str) -> Self {
        self.event.payload.hostname = Some(hostname.to_string());
        self
    }

    pub fn with_result(mut self, result: &str) -> Self {
        self.event.payload.result = Some(result.to_string());
        self
    }

    pub fn with_traceback(mut self, traceback: &str) -> Self {
        self.event.payload.traceback = Some(traceback.to_string());
        self
    }

    pub fn with_runtime(mut self, runtime: f64) -> Self {
        self.event.payload.runtime = Some(runtime);
        self
    }

    pub fn with_eta(mut self, eta: DateTime<Utc>) -> Self {
        self.event.payload.eta = Some(eta);
        self
    }

    pub fn build(self) -> TaskEvent {
        self.event
    }

    pub fn build_event(self) -> MonitorEvent {
        MonitorEvent::Task(self.event)
    }
}

pub struct WorkerEventBuilder {
    event: WorkerEvent,
}

impl WorkerEventBuilder {
    pub fn new(hostname: impl Into<String>, event_type: WorkerEventType) -> Self {
        Self {
            event: WorkerEvent {
                hostname: hostname.into(),
                event_type,
                timestamp: Utc::now(),
                payload: WorkerEventPayload::default(),
            },
        }
    }

    pub fn heartbeat(hostname: impl Into<String>) -> Self {
        Self::new(hostname, WorkerEventType::Heartbeat)
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.event.timestamp = timestamp;
        self
    }

    pub fn with_active(mut self, active: u32) -> Self {
        self.event.payload.active = Some(active);
        self
    }

    pub fn with_processed(mut self, processed: u64) -> Self {
        self.event.payload.processed = Some(processed);
        self
    }

    pub fn with_loadavg(mut self, loadavg: [f64; 3]) -> Self {
        self.event.payload.loadavg = Some(loadavg);
        self
    }

    pub fn with_sw(mut self, ident: &str, version: &str) -> Self {
        self.event.payload.sw_ident = Some(ident.to_string());
        self.event.payload.sw_ver = Some(version.to_string());
        self
    }

    pub fn build(self) -> WorkerEvent {
        self.event
    }

    pub fn build_event(self) -> MonitorEvent {
        MonitorEvent::Worker(self.event)
    }
}
