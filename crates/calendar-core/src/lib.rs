//! Core types: users, events, notifications, time windows, tracing.

pub mod model;
pub mod time;
pub mod tracing;

pub use model::{Event, NewEvent, NewUser, NotificationMessage, User};
pub use time::{TimeWindow, midnight, retention_cutoff, truncate_to_second};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing, parse_level};
