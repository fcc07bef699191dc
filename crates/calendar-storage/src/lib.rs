//! Storage trait and backends for users and events.
//!
//! - [`Storage`] - the capability trait the application is written against
//! - [`MemoryStorage`] - process-local maps, used by default and in tests
//! - [`PgStorage`] - PostgreSQL via sqlx (feature `postgres`)
//! - [`StorageError`] - the error taxonomy shared by every backend
//!
//! ```ignore
//! use std::sync::Arc;
//! use calendar_storage::{MemoryStorage, Storage};
//!
//! let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
//! let id = storage.create_event(event).await?;
//! ```

pub mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod storage;

pub use error::{StorageError, StorageErrorCode, StorageResult};
pub use memory::MemoryStorage;
#[cfg(feature = "postgres")]
pub use postgres::{PgConfig, PgStorage};
pub use storage::{BoxFuture, Storage};
