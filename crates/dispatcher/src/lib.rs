//! 控制与后台服务
//!
//! 包含控制命令分发、批量命令注册表、事件摄取循环以及Worker存活检测。

pub mod command_dispatcher;
pub mod command_registry;
pub mod event_listener;
pub mod liveness_monitor;

pub use command_dispatcher::{CommandDispatcher, DispatchReport};
pub use command_registry::{
    CommandDescriptor, CommandInput, CommandName, CommandRegistry, CommandRequest,
};
pub use event_listener::{EventListener, EventListenerConfig};
pub use liveness_monitor::{LivenessMonitor, LivenessMonitorConfig, LivenessReport};
