//! 基础设施：控制通道、事件源与周期任务存储的具体实现

pub mod in_memory_queue;
pub mod message_queue;
pub mod pool;
pub mod schedule_store;
pub mod timeout_handler;

pub use in_memory_queue::{
    EventPublisher, InMemoryControlChannel, InMemoryEventFeed, InMemoryQueueConfig,
};
pub use message_queue::{RabbitMqControlChannel, RabbitMqEventSource};
pub use pool::{ControlConnectionPool, PooledConnection};
pub use schedule_store::InMemoryScheduleStore;
pub use timeout_handler::{execute_with_timeout, TimeoutConfig, TimeoutHandler};
