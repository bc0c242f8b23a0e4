pub mod app;
pub mod shutdown;

pub use app::{Application, EmbeddedBroker};
pub use shutdown::ShutdownManager;
