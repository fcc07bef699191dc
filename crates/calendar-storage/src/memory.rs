//! In-memory storage backend.
//!
//! Data lives for the lifetime of the process. Used for local runs and
//! throughout the test suites.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use calendar_core::{Event, NewEvent, NewUser, TimeWindow, User, truncate_to_second};

use crate::error::{StorageError, StorageResult};
use crate::storage::{BoxFuture, Storage, new_id, sort_events};

/// Users and events held in two maps keyed by id.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    users: RwLock<HashMap<String, User>>,
    events: RwLock<HashMap<String, Event>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn events_matching<F>(&self, predicate: F) -> Vec<Event>
    where
        F: Fn(&Event) -> bool,
    {
        let events = self.events.read().await;
        let mut matched: Vec<Event> = events.values().filter(|e| predicate(e)).cloned().collect();
        sort_events(&mut matched);
        matched
    }
}

impl Storage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn create_user(&self, user: NewUser) -> BoxFuture<'_, StorageResult<String>> {
        Box::pin(async move {
            let id = new_id();
            self.users.write().await.insert(id.clone(), user.with_id(&id));
            debug!(user_id = %id, "user stored");
            Ok(id)
        })
    }

    fn select_users(&self) -> BoxFuture<'_, StorageResult<Vec<User>>> {
        Box::pin(async move {
            let users = self.users.read().await;
            let mut all: Vec<User> = users.values().cloned().collect();
            all.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(all)
        })
    }

    fn delete_user<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move {
            match self.users.write().await.remove(id) {
                Some(_) => Ok(()),
                None => Err(StorageError::not_found(format!("user {id}"))),
            }
        })
    }

    fn create_event(&self, event: NewEvent) -> BoxFuture<'_, StorageResult<String>> {
        Box::pin(async move {
            let id = new_id();
            self.events.write().await.insert(id.clone(), event.with_id(&id));
            debug!(event_id = %id, "event stored");
            Ok(id)
        })
    }

    fn select_events(&self) -> BoxFuture<'_, StorageResult<Vec<Event>>> {
        Box::pin(async move { Ok(self.events_matching(|_| true).await) })
    }

    fn update_event(&self, event: Event) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            let mut events = self.events.write().await;
            match events.get_mut(&event.id) {
                Some(slot) => {
                    *slot = event;
                    Ok(())
                }
                None => Err(StorageError::not_found(format!("event {}", event.id))),
            }
        })
    }

    fn delete_event<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move {
            match self.events.write().await.remove(id) {
                Some(_) => Ok(()),
                None => Err(StorageError::not_found(format!("event {id}"))),
            }
        })
    }

    fn select_events_in(&self, window: TimeWindow) -> BoxFuture<'_, StorageResult<Vec<Event>>> {
        Box::pin(async move { Ok(self.events_matching(|e| window.contains(e.beginning)).await) })
    }

    fn select_events_by_time(
        &self,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, StorageResult<Vec<Event>>> {
        let at = truncate_to_second(at);
        Box::pin(async move {
            Ok(self
                .events_matching(|e| truncate_to_second(e.notification) == at)
                .await)
        })
    }

    fn select_events_notified_between(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> BoxFuture<'_, StorageResult<Vec<Event>>> {
        let (after, until) = (truncate_to_second(after), truncate_to_second(until));
        Box::pin(async move {
            Ok(self
                .events_matching(|e| {
                    let at = truncate_to_second(e.notification);
                    after < at && at <= until
                })
                .await)
        })
    }

    fn select_events_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> BoxFuture<'_, StorageResult<Vec<Event>>> {
        Box::pin(async move { Ok(self.events_matching(|e| e.beginning < cutoff).await) })
    }
}
