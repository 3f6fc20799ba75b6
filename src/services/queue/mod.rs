//! Queue runtime: in-process broker, publisher and consumer pool with
//! at-least-once delivery and dead-letter queues.

pub mod broker;
pub mod consumer;
pub mod models;
pub mod publisher;

pub use broker::{InProcessBroker, QueueDepths};
pub use consumer::ConsumerPool;
pub use models::{CacheInvalidateJob, DeadLetter, Delivery, TaskRecord};
pub use publisher::QueuePublisher;
