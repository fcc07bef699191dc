//! gRPC messages and service stubs for package `calendar`.
//!
//! Messages are declared here with `prost` derives; the `EventService` and
//! `UserService` client/server modules are generated by `build.rs`.

use chrono::{DateTime, Utc};
use prost_types::Timestamp;

use calendar_core::{Event as DomainEvent, NewEvent, NewUser, User as DomainUser};

use crate::error::{ProtocolError, ProtocolResult};

include!(concat!(env!("OUT_DIR"), "/calendar.EventService.rs"));
include!(concat!(env!("OUT_DIR"), "/calendar.UserService.rs"));

#[derive(Clone, PartialEq, prost::Message)]
pub struct User {
    /// Ignored on create.
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub first_name: String,
    #[prost(string, tag = "3")]
    pub last_name: String,
    #[prost(string, tag = "4")]
    pub email: String,
    #[prost(uint32, tag = "5")]
    pub age: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Event {
    /// Ignored on create, required on update.
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub title: String,
    #[prost(string, tag = "3")]
    pub description: String,
    #[prost(message, optional, tag = "4")]
    pub beginning: Option<Timestamp>,
    #[prost(message, optional, tag = "5")]
    pub finish: Option<Timestamp>,
    #[prost(message, optional, tag = "6")]
    pub notification: Option<Timestamp>,
    #[prost(string, tag = "7")]
    pub user_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Void {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Id {
    #[prost(string, tag = "1")]
    pub id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Users {
    #[prost(message, repeated, tag = "1")]
    pub users: Vec<User>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Events {
    #[prost(message, repeated, tag = "1")]
    pub events: Vec<Event>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DateRequest {
    #[prost(message, optional, tag = "1")]
    pub date: Option<Timestamp>,
}

impl DateRequest {
    pub fn new(date: DateTime<Utc>) -> Self {
        Self {
            date: Some(to_timestamp(date)),
        }
    }

    /// The reference instant of a windowed query.
    pub fn reference(&self) -> ProtocolResult<DateTime<Utc>> {
        required(self.date.as_ref(), "date")
    }
}

pub fn to_timestamp(dt: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: dt.timestamp(),
        nanos: dt.timestamp_subsec_nanos() as i32,
    }
}

pub fn from_timestamp(ts: &Timestamp, field: &'static str) -> ProtocolResult<DateTime<Utc>> {
    let nanos = u32::try_from(ts.nanos).map_err(|_| ProtocolError::InvalidTimestamp { field })?;
    DateTime::from_timestamp(ts.seconds, nanos).ok_or(ProtocolError::InvalidTimestamp { field })
}

fn required(ts: Option<&Timestamp>, field: &'static str) -> ProtocolResult<DateTime<Utc>> {
    let ts = ts.ok_or(ProtocolError::MissingField(field))?;
    from_timestamp(ts, field)
}

impl From<DomainUser> for User {
    fn from(u: DomainUser) -> Self {
        Self {
            id: u.id,
            first_name: u.first_name,
            last_name: u.last_name,
            email: u.email,
            age: u.age,
        }
    }
}

impl From<User> for NewUser {
    fn from(u: User) -> Self {
        NewUser {
            first_name: u.first_name,
            last_name: u.last_name,
            email: u.email,
            age: u.age,
        }
    }
}

impl From<DomainEvent> for Event {
    fn from(e: DomainEvent) -> Self {
        Self {
            id: e.id,
            title: e.title,
            description: e.description,
            beginning: Some(to_timestamp(e.beginning)),
            finish: Some(to_timestamp(e.finish)),
            notification: Some(to_timestamp(e.notification)),
            user_id: e.user_id,
        }
    }
}

impl TryFrom<Event> for NewEvent {
    type Error = ProtocolError;

    fn try_from(e: Event) -> Result<Self, Self::Error> {
        Ok(NewEvent {
            beginning: required(e.beginning.as_ref(), "beginning")?,
            finish: required(e.finish.as_ref(), "finish")?,
            notification: required(e.notification.as_ref(), "notification")?,
            title: e.title,
            description: e.description,
            user_id: e.user_id,
        })
    }
}

impl TryFrom<Event> for DomainEvent {
    type Error = ProtocolError;

    fn try_from(e: Event) -> Result<Self, Self::Error> {
        let id = e.id.clone();
        Ok(NewEvent::try_from(e)?.with_id(id))
    }
}

impl FromIterator<DomainEvent> for Events {
    fn from_iter<I: IntoIterator<Item = DomainEvent>>(iter: I) -> Self {
        Self {
            events: iter.into_iter().map(Event::from).collect(),
        }
    }
}

impl FromIterator<DomainUser> for Users {
    fn from_iter<I: IntoIterator<Item = DomainUser>>(iter: I) -> Self {
        Self {
            users: iter.into_iter().map(User::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use prost::Message;

    fn domain_event() -> DomainEvent {
        let at = Utc.with_ymd_and_hms(2025, 2, 5, 10, 0, 0).unwrap();
        DomainEvent {
            id: "e-1".to_string(),
            title: "Review".to_string(),
            description: "Quarterly".to_string(),
            beginning: at,
            finish: at + Duration::hours(2),
            notification: at - Duration::minutes(5) + Duration::milliseconds(250),
            user_id: "u-1".to_string(),
        }
    }

    #[test]
    fn event_survives_the_wire() {
        let message = Event::from(domain_event());
        let bytes = message.encode_to_vec();
        let decoded = Event::decode(bytes.as_slice()).unwrap();

        assert_eq!(DomainEvent::try_from(decoded).unwrap(), domain_event());
    }

    #[test]
    fn missing_timestamp_is_reported() {
        let mut message = Event::from(domain_event());
        message.finish = None;

        let err = NewEvent::try_from(message).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField("finish")));
    }

    #[test]
    fn negative_nanos_are_rejected() {
        let ts = Timestamp {
            seconds: 0,
            nanos: -1,
        };
        assert!(matches!(
            from_timestamp(&ts, "date"),
            Err(ProtocolError::InvalidTimestamp { field: "date" })
        ));
    }

    #[test]
    fn date_request_reference() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(DateRequest::new(at).reference().unwrap(), at);
        assert!(DateRequest::default().reference().is_err());
    }

    #[test]
    fn listings_collect_from_domain() {
        let events: Events = vec![domain_event()].into_iter().collect();
        assert_eq!(events.events.len(), 1);
        assert_eq!(events.events[0].title, "Review");
    }
}
