pub mod api_observability;
pub mod app_config;
pub mod broker;
pub mod monitor;

pub use api_observability::{ApiConfig, LogFormat, ObservabilityConfig};
pub use app_config::AppConfig;
pub use broker::{BrokerConfig, BrokerType};
pub use monitor::{MonitorConfig, RegistryConfig};
