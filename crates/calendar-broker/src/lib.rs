//! Message broker abstraction for notification delivery.
//!
//! - [`Broker`] - start/stop, queue declaration, consume and publish
//! - [`Delivery`] - a received message with explicit `ack`/`nack`
//! - [`Consumer`] - the stream of deliveries for one registered consumer
//! - [`MemoryBroker`] - in-process backend with at-least-once redelivery
//!
//! ```ignore
//! let broker = MemoryBroker::new();
//! broker.start().await?;
//! broker.queue_declare(&QueueConfig::default()).await?;
//! let mut consumer = broker.consume(&ConsumeConfig::default()).await?;
//! while let Some(delivery) = consumer.recv().await {
//!     handle(&delivery.body);
//!     delivery.ack(false).await?;
//! }
//! ```

pub mod broker;
pub mod config;
pub mod error;
pub mod memory;

pub use broker::{Acknowledger, BoxFuture, Broker, Consumer, Delivery};
pub use config::{ConsumeConfig, DEFAULT_QUEUE, PublishConfig, QueueConfig};
pub use error::{BrokerError, BrokerResult};
pub use memory::MemoryBroker;
