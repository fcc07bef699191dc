//! The storage capability trait.
//!
//! Every backend implements [`Storage`]. Methods return boxed futures so the
//! trait stays object-safe and the application can hold an
//! `Arc<dyn Storage>` chosen at startup. Dropping a returned future abandons
//! the operation.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use calendar_core::{Event, NewEvent, NewUser, TimeWindow, User};

use crate::error::StorageResult;

/// A boxed future for async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Persistence for users and events.
///
/// Implementations must be safe to call from many tasks at once. Selections
/// return owned snapshots sorted by `beginning`, then `id`.
pub trait Storage: Send + Sync {
    /// Returns a short backend name for logs ("memory", "postgres").
    fn name(&self) -> &str;

    /// Stores a new user and returns its assigned identifier.
    fn create_user(&self, user: NewUser) -> BoxFuture<'_, StorageResult<String>>;

    /// Returns every stored user.
    fn select_users(&self) -> BoxFuture<'_, StorageResult<Vec<User>>>;

    /// Removes a user. Fails with `NotFound` for an unknown id.
    fn delete_user<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StorageResult<()>>;

    /// Stores a new event and returns its assigned identifier.
    fn create_event(&self, event: NewEvent) -> BoxFuture<'_, StorageResult<String>>;

    /// Returns every stored event.
    fn select_events(&self) -> BoxFuture<'_, StorageResult<Vec<Event>>>;

    /// Replaces all fields of the event with `event.id`.
    ///
    /// Fails with `NotFound` if no such event exists.
    fn update_event(&self, event: Event) -> BoxFuture<'_, StorageResult<()>>;

    /// Removes an event. Fails with `NotFound` for an unknown id.
    fn delete_event<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StorageResult<()>>;

    /// Returns events whose `beginning` lies in `[window.start, window.end)`.
    fn select_events_in(&self, window: TimeWindow) -> BoxFuture<'_, StorageResult<Vec<Event>>>;

    /// Returns events whose notification time, truncated to the second,
    /// equals `at` truncated to the second.
    fn select_events_by_time(&self, at: DateTime<Utc>)
    -> BoxFuture<'_, StorageResult<Vec<Event>>>;

    /// Returns events whose notification time, truncated to the second,
    /// lies in `(after, until]`.
    fn select_events_notified_between(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> BoxFuture<'_, StorageResult<Vec<Event>>>;

    /// Returns events that began strictly before `cutoff`.
    fn select_events_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> BoxFuture<'_, StorageResult<Vec<Event>>>;

    /// Events beginning on the calendar day (UTC) containing `date`.
    fn select_events_for_day(&self, date: DateTime<Utc>) -> BoxFuture<'_, StorageResult<Vec<Event>>> {
        self.select_events_in(TimeWindow::day(date))
    }

    /// Events beginning within seven days of `start`.
    fn select_events_for_week(
        &self,
        start: DateTime<Utc>,
    ) -> BoxFuture<'_, StorageResult<Vec<Event>>> {
        self.select_events_in(TimeWindow::week(start))
    }

    /// Events beginning within one calendar month of `start`.
    fn select_events_for_month(
        &self,
        start: DateTime<Utc>,
    ) -> BoxFuture<'_, StorageResult<Vec<Event>>> {
        self.select_events_in(TimeWindow::month(start))
    }
}

/// Sorts events into the order every backend returns them in.
pub(crate) fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| a.beginning.cmp(&b.beginning).then_with(|| a.id.cmp(&b.id)));
}

/// Generates a fresh record identifier.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
