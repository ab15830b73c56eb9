//! Structural validation and expiry checks.
//!
//! Every check here is pure. A failed check is a value (a list of reasons or a
//! boolean), never an error, so callers decide explicitly what rejection means.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::message::ProtocolMessage;
use super::types::{MessageType, Priority};

/// Validate a built message. An empty list means the message is well formed.
pub fn validate(message: &ProtocolMessage) -> Vec<String> {
    let header = message.header();
    let payload = message.payload();
    let mut errors = Vec::new();

    if header.message_id.trim().is_empty() {
        errors.push("message_id must not be empty".to_string());
    }
    if header.sender_id.trim().is_empty() {
        errors.push("sender_id must not be empty".to_string());
    }
    if payload.action.trim().is_empty() {
        errors.push("payload.action must not be empty".to_string());
    }
    if !payload.data.is_object() {
        errors.push(format!(
            "payload.data must be a mapping, got {}",
            json_kind(&payload.data)
        ));
    }
    if header.ttl == Some(Duration::ZERO) {
        errors.push("ttl must be positive".to_string());
    }

    errors
}

/// Validate a raw canonical mapping before it is decoded.
///
/// Reports every problem found rather than stopping at the first one.
pub fn validate_wire(value: &Value) -> Vec<String> {
    let mut errors = Vec::new();

    let Some(root) = value.as_object() else {
        return vec![format!("message must be a mapping, got {}", json_kind(value))];
    };

    match root.get("header").and_then(Value::as_object) {
        None => errors.push("header must be a mapping".to_string()),
        Some(header) => {
            for field in ["message_id", "sender_id"] {
                require_non_empty(header.get(field), &format!("header.{}", field), &mut errors);
            }
            for field in ["receiver_id", "correlation_id"] {
                match header.get(field) {
                    None | Some(Value::Null) | Some(Value::String(_)) => {}
                    Some(other) => errors.push(format!(
                        "header.{} must be a string or null, got {}",
                        field,
                        json_kind(other)
                    )),
                }
            }
            match header.get("message_type").and_then(Value::as_str) {
                None => errors.push("header.message_type must be a string".to_string()),
                Some(name) => {
                    if let Err(e) = name.parse::<MessageType>() {
                        errors.push(format!("header.message_type: {}", e));
                    }
                }
            }
            match header.get("priority").and_then(Value::as_u64) {
                Some(level) if u8::try_from(level).is_ok_and(|l| Priority::try_from(l).is_ok()) => {}
                _ => errors.push("header.priority must be an integer in 1..=4".to_string()),
            }
            match header.get("timestamp").and_then(Value::as_str) {
                None => errors.push("header.timestamp must be an ISO-8601 string".to_string()),
                Some(ts) => {
                    if DateTime::parse_from_rfc3339(ts).is_err() {
                        errors.push(format!("header.timestamp '{}' is not ISO-8601", ts));
                    }
                }
            }
            match header.get("ttl_seconds") {
                None | Some(Value::Null) => {}
                Some(ttl) => match ttl.as_f64() {
                    Some(secs) if secs > 0.0 && secs.is_finite() => {}
                    _ => errors.push("header.ttl_seconds must be positive".to_string()),
                },
            }
        }
    }

    match root.get("payload").and_then(Value::as_object) {
        None => errors.push("payload must be a mapping".to_string()),
        Some(payload) => {
            require_non_empty(payload.get("action"), "payload.action", &mut errors);
            match payload.get("data") {
                None | Some(Value::Object(_)) => {}
                Some(other) => errors.push(format!(
                    "payload.data must be a mapping, got {}",
                    json_kind(other)
                )),
            }
            match payload.get("metadata") {
                None | Some(Value::Object(_)) => {}
                Some(other) => errors.push(format!(
                    "payload.metadata must be a mapping, got {}",
                    json_kind(other)
                )),
            }
        }
    }

    errors
}

/// True when the message's ttl has elapsed.
pub fn is_expired(message: &ProtocolMessage) -> bool {
    is_expired_at(message, Utc::now())
}

/// Expiry as seen at `now`: ttl present and `now - timestamp > ttl`.
pub fn is_expired_at(message: &ProtocolMessage, now: DateTime<Utc>) -> bool {
    let header = message.header();
    let Some(ttl) = header.ttl else {
        return false;
    };
    // A timestamp in the future has a negative age and cannot be expired.
    match (now - header.timestamp).to_std() {
        Ok(age) => age > ttl,
        Err(_) => false,
    }
}

fn require_non_empty(value: Option<&Value>, field: &str, errors: &mut Vec<String>) {
    match value.and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => {}
        Some(_) => errors.push(format!("{} must not be empty", field)),
        None => errors.push(format!("{} must be a string", field)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::builder::MessageBuilder;
    use crate::protocol::message::{MessageHeader, MessagePayload};
    use serde_json::json;

    fn message(sender: &str, action: &str, data: Value, ttl: Option<Duration>) -> ProtocolMessage {
        let header = MessageHeader {
            message_id: ulid::Ulid::new().to_string(),
            sender_id: sender.to_string(),
            receiver_id: None,
            message_type: MessageType::StatusUpdate,
            priority: Priority::Normal,
            timestamp: Utc::now(),
            correlation_id: None,
            ttl,
        };
        ProtocolMessage::new(header, MessagePayload::new(action, data))
    }

    #[test]
    fn test_valid_message() {
        let msg = message("ops", "status", json!({"ok": true}), Some(Duration::from_secs(5)));
        assert!(validate(&msg).is_empty());
    }

    #[test]
    fn test_reports_each_violation() {
        let msg = message("", " ", json!([1, 2]), Some(Duration::ZERO));
        let errors = validate(&msg);

        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.contains("sender_id")));
        assert!(errors.iter().any(|e| e.contains("action")));
        assert!(errors.iter().any(|e| e.contains("payload.data must be a mapping, got array")));
        assert!(errors.iter().any(|e| e.contains("ttl")));
    }

    #[test]
    fn test_empty_data_mapping_is_valid() {
        let msg = message("ops", "noop", json!({}), None);
        assert!(validate(&msg).is_empty());
    }

    #[test]
    fn test_expiry() {
        let msg = message("ops", "status", json!({}), Some(Duration::from_millis(100)));
        let created = msg.header().timestamp;

        assert!(!is_expired_at(&msg, created + chrono::Duration::milliseconds(50)));
        assert!(!is_expired_at(&msg, created + chrono::Duration::milliseconds(100)));
        assert!(is_expired_at(&msg, created + chrono::Duration::milliseconds(101)));
        assert!(!is_expired_at(&msg, created - chrono::Duration::seconds(10)));
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let msg = message("ops", "status", json!({}), None);
        assert!(!is_expired_at(&msg, Utc::now() + chrono::Duration::days(365)));
    }

    #[test]
    fn test_wire_validation_accepts_encoded_message() {
        let msg = MessageBuilder::task_request("lead", "coder", json!({"task": "fix"})).build();
        assert!(validate_wire(&msg.to_canonical().unwrap()).is_empty());
    }

    #[test]
    fn test_wire_validation_reports_problems() {
        let raw = json!({
            "header": {
                "message_id": "",
                "sender_id": "lead",
                "receiver_id": 42,
                "message_type": "delegation",
                "priority": 9,
                "timestamp": "yesterday",
                "ttl_seconds": 0
            },
            "payload": { "action": "fix", "data": "not a mapping" }
        });

        let errors = validate_wire(&raw);
        assert!(errors.iter().any(|e| e.contains("header.message_id")));
        assert!(errors.iter().any(|e| e.contains("header.receiver_id")));
        assert!(errors.iter().any(|e| e.contains("unknown message type 'delegation'")));
        assert!(errors.iter().any(|e| e.contains("header.priority")));
        assert!(errors.iter().any(|e| e.contains("header.timestamp")));
        assert!(errors.iter().any(|e| e.contains("ttl_seconds")));
        assert!(errors.iter().any(|e| e.contains("payload.data")));
        assert_eq!(errors.len(), 7);
    }

    #[test]
    fn test_wire_validation_non_mapping_root() {
        assert_eq!(validate_wire(&json!("hello")).len(), 1);
        assert_eq!(validate_wire(&json!({})).len(), 2);
    }
}
