//! The broker capability trait and the consumer-side types.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::{ConsumeConfig, PublishConfig, QueueConfig};
use crate::error::BrokerResult;

/// A boxed future for async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A message broker with explicit acknowledgement.
///
/// Delivery is at-least-once: a message handed to a consumer that never
/// acknowledges it is delivered again, flagged as redelivered.
pub trait Broker: Send + Sync {
    /// Returns a short backend name for logs.
    fn name(&self) -> &str;

    /// Opens the connection. Every other operation fails before this.
    fn start(&self) -> BoxFuture<'_, BrokerResult<()>>;

    /// Closes the connection and ends every consumer stream.
    fn stop(&self) -> BoxFuture<'_, BrokerResult<()>>;

    /// Declares a queue. Redeclaring an existing queue is a no-op.
    fn queue_declare<'a>(&'a self, config: &'a QueueConfig) -> BoxFuture<'a, BrokerResult<()>>;

    /// Registers a consumer on a declared queue.
    fn consume<'a>(&'a self, config: &'a ConsumeConfig) -> BoxFuture<'a, BrokerResult<Consumer>>;

    /// Publishes `body` according to `config`.
    fn publish<'a>(
        &'a self,
        config: &'a PublishConfig,
        body: Vec<u8>,
    ) -> BoxFuture<'a, BrokerResult<()>>;
}

/// Backend hook behind [`Delivery::ack`], [`Delivery::nack`] and consumer
/// cancellation.
pub trait Acknowledger: Send + Sync {
    fn ack(&self, delivery_tag: u64, multiple: bool) -> BoxFuture<'_, BrokerResult<()>>;

    fn nack(
        &self,
        delivery_tag: u64,
        multiple: bool,
        requeue: bool,
    ) -> BoxFuture<'_, BrokerResult<()>>;

    /// Called when a [`Consumer`] is dropped. Outstanding deliveries of that
    /// consumer go back to the queue.
    fn cancel(&self, queue: &str, consumer_tag: &str);
}

/// A message handed to a consumer.
pub struct Delivery {
    /// Identifies this delivery for acknowledgement.
    pub delivery_tag: u64,
    pub body: Vec<u8>,
    pub content_type: String,
    pub routing_key: String,
    /// Set when this message was handed out before and not acknowledged.
    pub redelivered: bool,
    acker: Arc<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        delivery_tag: u64,
        body: Vec<u8>,
        content_type: impl Into<String>,
        routing_key: impl Into<String>,
        redelivered: bool,
        acker: Arc<dyn Acknowledger>,
    ) -> Self {
        Self {
            delivery_tag,
            body,
            content_type: content_type.into(),
            routing_key: routing_key.into(),
            redelivered,
            acker,
        }
    }

    /// Acknowledges this delivery, or with `multiple` every outstanding
    /// delivery up to and including it.
    pub async fn ack(&self, multiple: bool) -> BrokerResult<()> {
        self.acker.ack(self.delivery_tag, multiple).await
    }

    /// Rejects this delivery. With `requeue` it goes back to the front of the
    /// queue, otherwise it is discarded.
    pub async fn nack(&self, multiple: bool, requeue: bool) -> BrokerResult<()> {
        self.acker.nack(self.delivery_tag, multiple, requeue).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("body_len", &self.body.len())
            .field("content_type", &self.content_type)
            .field("routing_key", &self.routing_key)
            .field("redelivered", &self.redelivered)
            .finish()
    }
}

/// The receiving end of a registered consumer.
///
/// Dropping it cancels the consumer.
pub struct Consumer {
    tag: String,
    queue: String,
    deliveries: mpsc::UnboundedReceiver<Delivery>,
    acker: Arc<dyn Acknowledger>,
}

impl Consumer {
    pub fn new(
        tag: impl Into<String>,
        queue: impl Into<String>,
        deliveries: mpsc::UnboundedReceiver<Delivery>,
        acker: Arc<dyn Acknowledger>,
    ) -> Self {
        Self {
            tag: tag.into(),
            queue: queue.into(),
            deliveries,
            acker,
        }
    }

    /// Waits for the next delivery. `None` once the broker has stopped or
    /// the consumer was cancelled on the broker side.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.deliveries.recv().await
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("tag", &self.tag)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.deliveries.close();
        self.acker.cancel(&self.queue, &self.tag);
    }
}
