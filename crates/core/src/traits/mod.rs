pub mod message_queue;
pub mod repository;

pub use message_queue::*;
pub use repository::*;
