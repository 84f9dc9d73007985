pub mod error;
pub mod models;
pub mod publisher;

pub use error::MqError;
pub use models::{BrokerMessage, BroccoliError, MqConfig, MqQueue, init_mq};
pub use publisher::{GradePublisher, QueuePublisher};

pub type Mq = MqQueue;
