//! Server error types.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use calendar_broker::BrokerError;
use calendar_protocol::ProtocolError;
use calendar_storage::StorageError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error (socket, signal handler, etc.).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Payload encoding error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A listener could not be bound.
    #[error("failed to bind {component} listener on {addr}: {source}")]
    Bind {
        component: &'static str,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Registering the sender's consumer failed.
    #[error("failed to consume from queue {queue}: {source}")]
    Consume {
        queue: String,
        #[source]
        source: BrokerError,
    },

    /// The broker ended the consumer stream while the sender was running.
    #[error("consumer stream for queue {queue} closed unexpectedly")]
    ConsumerClosed { queue: String },

    /// A server loop failed while serving.
    #[error("{component} server failed: {message}")]
    Serve {
        component: &'static str,
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn serve(component: &'static str, message: impl Into<String>) -> Self {
        Self::Serve {
            component,
            message: message.into(),
        }
    }
}
