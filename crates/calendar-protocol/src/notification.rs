//! Notification payload codec.
//!
//! The scheduler publishes one JSON document per due event; the sender
//! decodes it back. The broker treats the bytes as opaque.

use calendar_core::NotificationMessage;

use crate::MAX_NOTIFICATION_SIZE;
use crate::error::{ProtocolError, ProtocolResult};

/// Content type announced when publishing an encoded notification.
pub const NOTIFICATION_CONTENT_TYPE: &str = "application/json";

/// Encodes a notification for publishing.
pub fn encode_notification(message: &NotificationMessage) -> ProtocolResult<Vec<u8>> {
    let body = serde_json::to_vec(message)?;
    if body.len() > MAX_NOTIFICATION_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: body.len(),
            max: MAX_NOTIFICATION_SIZE,
        });
    }
    Ok(body)
}

/// Decodes a notification received from the broker.
pub fn decode_notification(body: &[u8]) -> ProtocolResult<NotificationMessage> {
    if body.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    if body.len() > MAX_NOTIFICATION_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: body.len(),
            max: MAX_NOTIFICATION_SIZE,
        });
    }
    Ok(serde_json::from_slice(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn message() -> NotificationMessage {
        NotificationMessage {
            id: "evt-42".to_string(),
            title: "Dentist".to_string(),
            description: "Bring the forms".to_string(),
            notification: Utc.with_ymd_and_hms(2025, 2, 5, 8, 30, 0).unwrap(),
        }
    }

    #[test]
    fn wire_format() {
        let body = encode_notification(&message()).unwrap();
        insta::assert_snapshot!(
            String::from_utf8(body).unwrap(),
            @r###"{"id":"evt-42","title":"Dentist","description":"Bring the forms","notification":"2025-02-05T08:30:00Z"}"###
        );
    }

    #[test]
    fn decode_recovers_message() {
        let body = encode_notification(&message()).unwrap();
        assert_eq!(decode_notification(&body).unwrap(), message());
    }

    #[test]
    fn rejects_empty_payload() {
        assert!(matches!(
            decode_notification(&[]),
            Err(ProtocolError::EmptyMessage)
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            decode_notification(b"not json"),
            Err(ProtocolError::Serialization(_))
        ));
    }

    #[test]
    fn rejects_oversized_payload() {
        let mut big = message();
        big.description = "x".repeat(MAX_NOTIFICATION_SIZE);
        assert!(matches!(
            encode_notification(&big),
            Err(ProtocolError::MessageTooLarge { .. })
        ));

        let raw = vec![b' '; MAX_NOTIFICATION_SIZE + 1];
        assert!(matches!(
            decode_notification(&raw),
            Err(ProtocolError::MessageTooLarge { .. })
        ));
    }
}
