//! Notification sender.
//!
//! Drains the notification queue and acknowledges every delivery after
//! handling it. Handling is a structured log line; the sender does not
//! deduplicate redelivered messages.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use calendar_broker::{Broker, ConsumeConfig, Delivery};
use calendar_core::NotificationMessage;
use calendar_protocol::decode_notification;

use crate::error::{ServerError, ServerResult};
use crate::signals::{ShutdownHandle, ShutdownSignal};

/// Sender configuration.
#[derive(Debug, Clone, Default)]
pub struct SenderConfig {
    pub consume: ConsumeConfig,
}

impl SenderConfig {
    pub fn new(consume: ConsumeConfig) -> Self {
        Self { consume }
    }
}

/// Cumulative sender counters.
#[derive(Debug, Clone, Default)]
pub struct SenderState {
    pub received: u64,
    pub acked: u64,
    pub ack_failures: u64,
    /// Payloads that did not decode. They are still acknowledged.
    pub malformed: u64,
    pub last_message: Option<NotificationMessage>,
}

/// Shared sender state.
pub type SharedSenderState = Arc<RwLock<SenderState>>;

/// Consumes notification messages from the broker.
pub struct Sender {
    config: SenderConfig,
    broker: Arc<dyn Broker>,
    state: SharedSenderState,
    stop: ShutdownHandle,
}

impl Sender {
    pub fn new(config: SenderConfig, broker: Arc<dyn Broker>) -> Self {
        Self {
            config,
            broker,
            state: Arc::new(RwLock::new(SenderState::default())),
            stop: ShutdownHandle::new(),
        }
    }

    /// Returns a handle for stopping the sender and reading its state.
    pub fn handle(&self) -> SenderHandle {
        SenderHandle {
            stop: self.stop.clone(),
            state: self.state.clone(),
        }
    }

    /// Consumes until `shutdown` fires or the handle is stopped.
    ///
    /// Fails if the consumer cannot be registered, or if the broker ends
    /// the stream while neither stop path was taken. Nothing is retried.
    pub async fn run(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        let queue = self.config.consume.queue.clone();
        let mut consumer = self
            .broker
            .consume(&self.config.consume)
            .await
            .map_err(|source| ServerError::Consume {
                queue: queue.clone(),
                source,
            })?;
        info!(queue = %queue, consumer = consumer.tag(), "Sender started");

        let stopped = shutdown.clone().wait();
        let halted = self.stop.wait().wait();
        tokio::pin!(stopped, halted);

        loop {
            tokio::select! {
                biased;
                _ = &mut stopped => {
                    info!("Sender stopping: shutdown requested");
                    return Ok(());
                }
                _ = &mut halted => {
                    info!("Sender stopping");
                    return Ok(());
                }
                delivery = consumer.recv() => match delivery {
                    Some(delivery) => self.handle_delivery(delivery).await,
                    None => {
                        if shutdown.is_triggered() || self.stop.is_shutdown() {
                            return Ok(());
                        }
                        warn!(queue = %queue, "Consumer stream closed");
                        return Err(ServerError::ConsumerClosed { queue });
                    }
                },
            }
        }
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        let decoded = decode_notification(&delivery.body);
        let mut state = self.state.write().await;
        state.received += 1;

        match decoded {
            Ok(message) => {
                info!(
                    event_id = %message.id,
                    title = %message.title,
                    notification = %message.notification,
                    redelivered = delivery.redelivered,
                    "Notification sent"
                );
                state.last_message = Some(message);
            }
            Err(e) => {
                warn!(
                    delivery_tag = delivery.delivery_tag,
                    error = %e,
                    "Discarding malformed notification"
                );
                state.malformed += 1;
            }
        }

        if self.config.consume.auto_ack {
            return;
        }
        match delivery.ack(false).await {
            Ok(()) => {
                state.acked += 1;
                debug!(delivery_tag = delivery.delivery_tag, "Delivery acknowledged");
            }
            Err(e) => {
                state.ack_failures += 1;
                warn!(delivery_tag = delivery.delivery_tag, error = %e, "Failed to acknowledge delivery");
            }
        }
    }
}

/// Handle for stopping a running sender.
#[derive(Clone, Debug)]
pub struct SenderHandle {
    stop: ShutdownHandle,
    state: SharedSenderState,
}

impl SenderHandle {
    /// Stops the sender. Idempotent.
    pub fn stop(&self) {
        self.stop.trigger();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_shutdown()
    }

    pub async fn state(&self) -> SenderState {
        self.state.read().await.clone()
    }
}
