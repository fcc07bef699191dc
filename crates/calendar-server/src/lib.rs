//! Calendar service runtime.
//!
//! This crate provides:
//! - [`Calendar`], the lock-guarded facade every adapter goes through
//! - the notification [`Scheduler`] and [`Sender`], connected only through
//!   the broker
//! - HTTP (axum) and gRPC (tonic) adapters
//! - the [`Supervisor`] that runs all of them under one shutdown signal
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use calendar_broker::MemoryBroker;
//! use calendar_server::{Calendar, SignalHandler, Supervisor, SupervisorConfig};
//! use calendar_storage::MemoryStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let calendar = Arc::new(Calendar::new(Arc::new(MemoryStorage::new())));
//!     let signals = SignalHandler::new();
//!     signals.spawn_listener()?;
//!
//!     let supervisor = Supervisor::new(
//!         SupervisorConfig::default(),
//!         calendar,
//!         Arc::new(MemoryBroker::new()),
//!         signals.shutdown_handle(),
//!     );
//!     let report = supervisor.run().await?;
//!     assert!(report.is_clean());
//!     Ok(())
//! }
//! ```

mod app;
mod config;
mod error;
mod grpc;
mod http;
mod scheduler;
mod sender;
mod signals;
mod supervisor;

pub use app::Calendar;
pub use config::{DEFAULT_GRPC_PORT, DEFAULT_HTTP_PORT, GrpcConfig, HttpConfig, ephemeral_addr};
pub use error::{ServerError, ServerResult};
pub use grpc::{EventApi, GrpcServer, UserApi, status_from_storage};
pub use http::{ApiError, HttpServer, router, status_for};
pub use scheduler::{
    Scheduler, SchedulerConfig, SchedulerHandle, SchedulerState, SharedSchedulerState,
    TickReport, new_scheduler_state,
};
pub use sender::{Sender, SenderConfig, SenderHandle, SenderState, SharedSenderState};
pub use signals::{ShutdownHandle, ShutdownSignal, SignalHandler};
pub use supervisor::{
    ComponentFailure, Components, Supervisor, SupervisorConfig, SupervisorReport,
};
