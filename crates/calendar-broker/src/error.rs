//! Error types for broker operations.

use thiserror::Error;

/// Errors returned by a [`Broker`](crate::Broker) or by acknowledging a
/// [`Delivery`](crate::Delivery).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker was not started, or has been stopped.
    #[error("broker is not connected")]
    NotConnected,

    #[error("queue not found: {0}")]
    QueueNotFound(String),

    /// The queue already has a consumer that excludes this one.
    #[error("queue {0} is locked by an exclusive consumer")]
    ExclusiveQueue(String),

    /// A mandatory message matched no queue.
    #[error("no queue bound for exchange {exchange:?} with routing key {routing_key:?}")]
    Unroutable {
        exchange: String,
        routing_key: String,
    },

    /// The tag was already acknowledged, or the delivery was auto-acked.
    #[error("unknown delivery tag {0}")]
    UnknownDeliveryTag(u64),

    /// The transport closed underneath an operation.
    #[error("broker closed: {0}")]
    Closed(String),
}

impl BrokerError {
    /// Returns true if the failure is about connection state rather than
    /// the request itself.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Closed(_))
    }
}

/// A specialized Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;
