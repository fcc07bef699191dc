//! Queue, consume and publish settings.
//!
//! The fields follow AMQP 0-9-1 so the same configuration file drives any
//! backend. Defaults describe a single notification queue reached through
//! the default exchange.

use serde::{Deserialize, Serialize};

/// Queue that carries notification messages by default.
pub const DEFAULT_QUEUE: &str = "calendar.notifications";

/// Settings for declaring a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub name: String,
    /// Survives a broker stop/start cycle.
    pub durable: bool,
    /// Removed once its last consumer goes away.
    pub auto_delete: bool,
    /// At most one consumer at a time.
    pub exclusive: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_QUEUE.to_string(),
            durable: true,
            auto_delete: false,
            exclusive: false,
        }
    }
}

impl QueueConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    #[must_use]
    pub fn with_auto_delete(mut self, auto_delete: bool) -> Self {
        self.auto_delete = auto_delete;
        self
    }

    #[must_use]
    pub fn with_exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }
}

/// Settings for registering a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumeConfig {
    pub queue: String,
    /// Consumer tag. Empty lets the broker pick one.
    pub consumer: String,
    /// Deliveries count as acknowledged as soon as they are handed out.
    pub auto_ack: bool,
    /// Refuse other consumers on the queue while this one is active.
    pub exclusive: bool,
}

impl Default for ConsumeConfig {
    fn default() -> Self {
        Self {
            queue: DEFAULT_QUEUE.to_string(),
            consumer: "calendar-sender".to_string(),
            auto_ack: false,
            exclusive: false,
        }
    }
}

impl ConsumeConfig {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_consumer(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = consumer.into();
        self
    }

    #[must_use]
    pub fn with_auto_ack(mut self, auto_ack: bool) -> Self {
        self.auto_ack = auto_ack;
        self
    }

    #[must_use]
    pub fn with_exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }
}

/// Settings for publishing a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Empty string is the default exchange, which routes by queue name.
    pub exchange: String,
    pub routing_key: String,
    pub content_type: String,
    /// Fail instead of silently dropping a message no queue accepts.
    pub mandatory: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            exchange: String::new(),
            routing_key: DEFAULT_QUEUE.to_string(),
            content_type: "application/json".to_string(),
            mandatory: false,
        }
    }
}

impl PublishConfig {
    pub fn new(routing_key: impl Into<String>) -> Self {
        Self {
            routing_key: routing_key.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    #[must_use]
    pub fn with_mandatory(mut self, mandatory: bool) -> Self {
        self.mandatory = mandatory;
        self
    }
}
