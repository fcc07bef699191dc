//! Wire types for the calendar service.
//!
//! - [`http`] - JSON bodies and query strings of the HTTP adapter
//! - [`grpc`] - protobuf messages plus generated `EventService` and
//!   `UserService` stubs
//! - [`encode_notification`] / [`decode_notification`] - the broker payload
//!   carrying a [`NotificationMessage`](calendar_core::NotificationMessage)

pub mod error;
pub mod grpc;
pub mod http;
pub mod notification;

pub use error::{ProtocolError, ProtocolResult};
pub use notification::{NOTIFICATION_CONTENT_TYPE, decode_notification, encode_notification};

/// Maximum size of a notification payload in bytes (64 KiB).
pub const MAX_NOTIFICATION_SIZE: usize = 64 * 1024;
