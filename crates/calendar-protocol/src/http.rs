//! HTTP/JSON request and response bodies.
//!
//! Field names are camelCase on the wire. Dates in query strings use the
//! `YYYY-MM-DD` form and are interpreted as midnight UTC.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use calendar_core::{Event, NewEvent, NewUser, User};

/// Body of `POST /create/user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: u32,
}

impl From<UserPayload> for NewUser {
    fn from(p: UserPayload) -> Self {
        NewUser {
            first_name: p.first_name,
            last_name: p.last_name,
            email: p.email,
            age: p.age,
        }
    }
}

/// A stored user as returned by `GET /select/users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: u32,
}

impl From<User> for UserRecord {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            first_name: u.first_name,
            last_name: u.last_name,
            email: u.email,
            age: u.age,
        }
    }
}

/// Body of `POST /create/event`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub beginning: DateTime<Utc>,
    pub finish: DateTime<Utc>,
    pub notification: DateTime<Utc>,
    pub user_id: String,
}

impl From<EventPayload> for NewEvent {
    fn from(p: EventPayload) -> Self {
        NewEvent {
            title: p.title,
            description: p.description,
            beginning: p.beginning,
            finish: p.finish,
            notification: p.notification,
            user_id: p.user_id,
        }
    }
}

/// A stored event: the body of `PUT /update/event` and the element of
/// every event listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub beginning: DateTime<Utc>,
    pub finish: DateTime<Utc>,
    pub notification: DateTime<Utc>,
    pub user_id: String,
}

impl From<Event> for EventRecord {
    fn from(e: Event) -> Self {
        Self {
            id: e.id,
            title: e.title,
            description: e.description,
            beginning: e.beginning,
            finish: e.finish,
            notification: e.notification,
            user_id: e.user_id,
        }
    }
}

impl From<EventRecord> for Event {
    fn from(r: EventRecord) -> Self {
        Event {
            id: r.id,
            title: r.title,
            description: r.description,
            beginning: r.beginning,
            finish: r.finish,
            notification: r.notification,
            user_id: r.user_id,
        }
    }
}

/// Response to a successful create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: String,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code, e.g. `not_found`.
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Query of `GET /select/events/day`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayQuery {
    pub date: NaiveDate,
}

impl DayQuery {
    pub fn reference(&self) -> DateTime<Utc> {
        midnight_utc(self.date)
    }
}

/// Query of `GET /select/events/week` and `/month`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeQuery {
    pub start_date: NaiveDate,
}

impl RangeQuery {
    pub fn reference(&self) -> DateTime<Utc> {
        midnight_utc(self.start_date)
    }
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}
