//! Calendar domain types.
//!
//! [`User`] and [`Event`] are the persisted entities. Their `New*`
//! counterparts carry the same fields minus the identifier, which storage
//! backends assign on creation. [`NotificationMessage`] is the transient
//! projection of an event handed to the message broker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::truncate_to_second;

/// A calendar user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Storage-assigned identifier.
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: u32,
}

/// A user that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: u32,
}

impl NewUser {
    /// Attaches an identifier, producing the stored form.
    pub fn with_id(self, id: impl Into<String>) -> User {
        User {
            id: id.into(),
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            age: self.age,
        }
    }
}

/// A calendar event owned by a user.
///
/// The notification time is informational: nothing requires it to precede
/// `beginning`, and `user_id` is not checked against existing users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Storage-assigned identifier.
    pub id: String,
    pub title: String,
    pub description: String,
    pub beginning: DateTime<Utc>,
    pub finish: DateTime<Utc>,
    /// When the owner should be alerted.
    pub notification: DateTime<Utc>,
    pub user_id: String,
}

impl Event {
    /// Returns a copy with the notification time truncated to whole seconds.
    pub fn normalized(mut self) -> Self {
        self.notification = truncate_to_second(self.notification);
        self
    }
}

/// An event that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub beginning: DateTime<Utc>,
    pub finish: DateTime<Utc>,
    pub notification: DateTime<Utc>,
    pub user_id: String,
}

impl NewEvent {
    /// Returns a copy with the notification time truncated to whole seconds.
    pub fn normalized(mut self) -> Self {
        self.notification = truncate_to_second(self.notification);
        self
    }

    /// Attaches an identifier, producing the stored form.
    pub fn with_id(self, id: impl Into<String>) -> Event {
        Event {
            id: id.into(),
            title: self.title,
            description: self.description,
            beginning: self.beginning,
            finish: self.finish,
            notification: self.notification,
            user_id: self.user_id,
        }
    }
}

/// Payload published for an event whose notification time has come.
///
/// Not persisted. It lives between the scheduler's publish and the sender's
/// acknowledgement, and may be delivered more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    /// Identifier of the originating event.
    pub id: String,
    pub title: String,
    pub description: String,
    pub notification: DateTime<Utc>,
}

impl From<&Event> for NotificationMessage {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id.clone(),
            title: event.title.clone(),
            description: event.description.clone(),
            notification: event.notification,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample_event() -> Event {
        let beginning = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        Event {
            id: "evt-1".to_string(),
            title: "Standup".to_string(),
            description: "Daily sync".to_string(),
            beginning,
            finish: beginning + Duration::minutes(15),
            notification: beginning - Duration::minutes(30),
            user_id: "user-1".to_string(),
        }
    }

    #[test]
    fn new_event_with_id_keeps_fields() {
        let event = sample_event();
        let draft = NewEvent {
            title: event.title.clone(),
            description: event.description.clone(),
            beginning: event.beginning,
            finish: event.finish,
            notification: event.notification,
            user_id: event.user_id.clone(),
        };
        assert_eq!(draft.with_id("evt-1"), event);
    }

    #[test]
    fn normalized_truncates_notification() {
        let mut event = sample_event();
        let exact = event.notification;
        event.notification = exact + Duration::milliseconds(420);

        let event = event.normalized();
        assert_eq!(event.notification, exact);
    }

    #[test]
    fn notification_message_projects_event() {
        let event = sample_event();
        let message = NotificationMessage::from(&event);

        assert_eq!(message.id, event.id);
        assert_eq!(message.title, event.title);
        assert_eq!(message.description, event.description);
        assert_eq!(message.notification, event.notification);
    }

    #[test]
    fn event_json_uses_camel_case() {
        insta::assert_json_snapshot!(sample_event(), @r###"
        {
          "id": "evt-1",
          "title": "Standup",
          "description": "Daily sync",
          "beginning": "2026-03-01T09:30:00Z",
          "finish": "2026-03-01T09:45:00Z",
          "notification": "2026-03-01T09:00:00Z",
          "userId": "user-1"
        }
        "###);
    }

    #[test]
    fn new_user_deserializes_from_json() {
        let json = r#"{"firstName":"Ada","lastName":"Lovelace","email":"ada@example.com","age":36}"#;
        let user: NewUser = serde_json::from_str(json).unwrap();

        assert_eq!(user.first_name, "Ada");
        assert_eq!(user.with_id("u-1").id, "u-1");
    }
}
