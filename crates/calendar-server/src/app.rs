//! The calendar application facade.
//!
//! Every adapter and background task goes through [`Calendar`]. It owns one
//! read-write lock around the storage backend: writes exclude each other and
//! all reads, reads run concurrently. There is no cross-call atomicity; a
//! select followed by an update is two independent operations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use calendar_core::{Event, NewEvent, NewUser, User};
use calendar_storage::{Storage, StorageError, StorageResult};

/// Concurrency-guarded business logic over a [`Storage`] backend.
pub struct Calendar {
    storage: Arc<dyn Storage>,
    lock: RwLock<()>,
}

impl Calendar {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            lock: RwLock::new(()),
        }
    }

    /// Name of the underlying storage backend.
    pub fn backend(&self) -> &str {
        self.storage.name()
    }

    #[instrument(skip_all)]
    pub async fn create_user(&self, user: NewUser) -> StorageResult<String> {
        let _guard = self.lock.write().await;
        let id = self.storage.create_user(user).await?;
        debug!(user_id = %id, "user created");
        Ok(id)
    }

    pub async fn select_users(&self) -> StorageResult<Vec<User>> {
        let _guard = self.lock.read().await;
        self.storage.select_users().await
    }

    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: &str) -> StorageResult<()> {
        let _guard = self.lock.write().await;
        self.storage.delete_user(id).await
    }

    /// Stores a new event. The notification time is truncated to whole
    /// seconds before it is written.
    #[instrument(skip_all)]
    pub async fn create_event(&self, event: NewEvent) -> StorageResult<String> {
        validate(&event.title, event.beginning, event.finish)?;
        let event = event.normalized();

        let _guard = self.lock.write().await;
        let id = self.storage.create_event(event).await?;
        debug!(event_id = %id, "event created");
        Ok(id)
    }

    pub async fn select_events(&self) -> StorageResult<Vec<Event>> {
        let _guard = self.lock.read().await;
        self.storage.select_events().await
    }

    /// Replaces the event with `event.id`. Fails with `NotFound` rather than
    /// inserting.
    #[instrument(skip_all, fields(event_id = %event.id))]
    pub async fn update_event(&self, event: Event) -> StorageResult<()> {
        validate(&event.title, event.beginning, event.finish)?;
        let event = event.normalized();

        let _guard = self.lock.write().await;
        self.storage.update_event(event).await
    }

    #[instrument(skip(self))]
    pub async fn delete_event(&self, id: &str) -> StorageResult<()> {
        let _guard = self.lock.write().await;
        self.storage.delete_event(id).await
    }

    /// Events beginning in `[midnight(date), midnight(date) + 24h)`.
    pub async fn select_events_for_day(&self, date: DateTime<Utc>) -> StorageResult<Vec<Event>> {
        let _guard = self.lock.read().await;
        self.storage.select_events_for_day(date).await
    }

    /// Events beginning in `[date, date + 7d)`.
    pub async fn select_events_for_week(&self, date: DateTime<Utc>) -> StorageResult<Vec<Event>> {
        let _guard = self.lock.read().await;
        self.storage.select_events_for_week(date).await
    }

    /// Events beginning in `[date, date + 1 calendar month)`.
    pub async fn select_events_for_month(&self, date: DateTime<Utc>) -> StorageResult<Vec<Event>> {
        let _guard = self.lock.read().await;
        self.storage.select_events_for_month(date).await
    }

    /// Events whose notification falls in the same second as `at`.
    pub async fn select_events_by_time(&self, at: DateTime<Utc>) -> StorageResult<Vec<Event>> {
        let _guard = self.lock.read().await;
        self.storage.select_events_by_time(at).await
    }

    /// Events whose notification second lies in `(after, until]`.
    pub async fn select_events_notified_between(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StorageResult<Vec<Event>> {
        let _guard = self.lock.read().await;
        self.storage.select_events_notified_between(after, until).await
    }

    /// Events that began strictly before `cutoff`.
    pub async fn select_events_before(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<Event>> {
        let _guard = self.lock.read().await;
        self.storage.select_events_before(cutoff).await
    }
}

impl std::fmt::Debug for Calendar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Calendar")
            .field("backend", &self.storage.name())
            .finish()
    }
}

fn validate(title: &str, beginning: DateTime<Utc>, finish: DateTime<Utc>) -> StorageResult<()> {
    if title.trim().is_empty() {
        return Err(StorageError::validation("event title must not be empty"));
    }
    if finish < beginning {
        return Err(StorageError::validation("event finish precedes its beginning"));
    }
    Ok(())
}
