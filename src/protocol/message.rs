//! Protocol messages and their canonical wire encoding.
//!
//! A [`ProtocolMessage`] pairs a [`MessageHeader`] (routing and metadata) with a
//! [`MessagePayload`] (action and body). Once built it is never mutated; code
//! that needs a different field builds a new message.
//!
//! The canonical encoding is the nested JSON mapping
//!
//! ```text
//! header:  { message_id, sender_id, receiver_id|null, message_type, priority(int),
//!            timestamp(ISO-8601), correlation_id|null, ttl_seconds|null }
//! payload: { action, data: {...}, metadata: {...} }
//! ```
//!
//! Any transport that carries this mapping can stand in for in-process delivery.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::types::{MessageType, Priority};
use crate::error::Result;

/// Routing and bookkeeping half of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Unique message ID (ULID)
    pub message_id: String,
    /// Sending agent
    pub sender_id: String,
    /// Receiving agent (None for broadcast)
    pub receiver_id: Option<String>,
    pub message_type: MessageType,
    pub priority: Priority,
    /// Creation instant
    pub timestamp: DateTime<Utc>,
    /// Links a response to the request it answers
    pub correlation_id: Option<String>,
    /// Maximum age before the message is dropped (None never expires).
    ///
    /// Encoded as fractional seconds: exact to the nanosecond up to roughly
    /// 104 days, and bounded by `u64::MAX` nanoseconds (about 584 years).
    #[serde(rename = "ttl_seconds", with = "ttl_seconds", default)]
    pub ttl: Option<Duration>,
}

/// Body half of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Operation the receiver is asked to perform
    pub action: String,
    /// Request / response body, always a JSON object on valid messages
    #[serde(default = "empty_object")]
    pub data: Value,
    /// Contextual annotations (sender role and the like)
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl MessagePayload {
    pub fn new(action: impl Into<String>, data: Value) -> Self {
        Self {
            action: action.into(),
            data,
            metadata: Map::new(),
        }
    }
}

/// A complete message: one header and one payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    header: MessageHeader,
    payload: MessagePayload,
}

impl ProtocolMessage {
    pub fn new(header: MessageHeader, payload: MessagePayload) -> Self {
        Self { header, payload }
    }

    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    pub fn payload(&self) -> &MessagePayload {
        &self.payload
    }

    pub fn into_parts(self) -> (MessageHeader, MessagePayload) {
        (self.header, self.payload)
    }

    pub fn id(&self) -> &str {
        &self.header.message_id
    }

    pub fn sender(&self) -> &str {
        &self.header.sender_id
    }

    pub fn receiver(&self) -> Option<&str> {
        self.header.receiver_id.as_deref()
    }

    pub fn message_type(&self) -> MessageType {
        self.header.message_type
    }

    pub fn priority(&self) -> Priority {
        self.header.priority
    }

    pub fn action(&self) -> &str {
        &self.payload.action
    }

    pub fn data(&self) -> &Value {
        &self.payload.data
    }

    /// True when the message has no specific receiver.
    pub fn is_broadcast(&self) -> bool {
        self.header.receiver_id.is_none()
    }

    /// Canonical mapping for wire transport.
    pub fn to_canonical(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Rebuild a message from its canonical mapping.
    pub fn from_canonical(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Canonical mapping serialized as a JSON string.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a JSON string holding the canonical mapping.
    pub fn decode(frame: &str) -> Result<Self> {
        Ok(serde_json::from_str(frame)?)
    }
}

pub(crate) fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// `ttl` travels as fractional seconds.
mod ttl_seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ttl: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match ttl {
            Some(ttl) => serializer.serialize_f64(ttl.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        let Some(secs) = Option::<f64>::deserialize(deserializer)? else {
            return Ok(None);
        };
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom(format!(
                "ttl_seconds must be a non-negative number, got {}",
                secs
            )));
        }
        // Round to whole nanoseconds so decimal values survive the f64 trip.
        let nanos = (secs * 1e9).round();
        if nanos >= u64::MAX as f64 {
            return Err(serde::de::Error::custom(format!(
                "ttl_seconds {} exceeds the supported range",
                secs
            )));
        }
        Ok(Some(Duration::from_nanos(nanos as u64)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ProtocolMessage {
        let header = MessageHeader {
            message_id: "01HZX3M4K5".to_string(),
            sender_id: "planner".to_string(),
            receiver_id: Some("coder".to_string()),
            message_type: MessageType::TaskRequest,
            priority: Priority::High,
            timestamp: Utc::now(),
            correlation_id: Some("req-7".to_string()),
            ttl: Some(Duration::from_millis(300)),
        };
        let mut payload = MessagePayload::new("write_tests", json!({"module": "queue", "count": 3}));
        payload.metadata.insert("sender_role".to_string(), json!("planner"));
        ProtocolMessage::new(header, payload)
    }

    #[test]
    fn test_canonical_shape() {
        let value = sample().to_canonical().unwrap();

        assert_eq!(value["header"]["message_type"], "task_request");
        assert_eq!(value["header"]["priority"], 3);
        assert_eq!(value["header"]["receiver_id"], "coder");
        assert!((value["header"]["ttl_seconds"].as_f64().unwrap() - 0.3).abs() < 1e-9);
        assert!(value["header"]["timestamp"].as_str().unwrap().contains('T'));
        assert_eq!(value["payload"]["action"], "write_tests");
        assert_eq!(value["payload"]["data"]["count"], 3);
        assert_eq!(value["payload"]["metadata"]["sender_role"], "planner");
    }

    #[test]
    fn test_round_trip_preserves_every_field() {
        let msg = sample();
        let decoded = ProtocolMessage::from_canonical(msg.to_canonical().unwrap()).unwrap();
        assert_eq!(decoded, msg);

        let decoded = ProtocolMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_broadcast_encodes_null_receiver() {
        let (mut header, payload) = sample().into_parts();
        header.receiver_id = None;
        header.ttl = None;
        let msg = ProtocolMessage::new(header, payload);

        let value = msg.to_canonical().unwrap();
        assert!(value["header"]["receiver_id"].is_null());
        assert!(value["header"]["ttl_seconds"].is_null());
        assert!(msg.is_broadcast());
    }

    #[test]
    fn test_decode_defaults_optional_fields() {
        let value = json!({
            "header": {
                "message_id": "m1",
                "sender_id": "a",
                "receiver_id": null,
                "message_type": "heartbeat",
                "priority": 1,
                "timestamp": "2024-05-01T12:00:00Z",
                "correlation_id": null
            },
            "payload": { "action": "ping" }
        });

        let msg = ProtocolMessage::from_canonical(value).unwrap();
        assert_eq!(msg.header().ttl, None);
        assert_eq!(msg.data(), &json!({}));
        assert!(msg.payload().metadata.is_empty());
    }

    #[test]
    fn test_decode_rejects_negative_ttl() {
        let mut value = sample().to_canonical().unwrap();
        value["header"]["ttl_seconds"] = json!(-1.5);
        assert!(ProtocolMessage::from_canonical(value).is_err());
    }

    #[test]
    fn test_ttl_range() {
        let mut value = sample().to_canonical().unwrap();
        value["header"]["ttl_seconds"] = json!(1e12);
        assert!(ProtocolMessage::from_canonical(value.clone()).is_err());

        value["header"]["ttl_seconds"] = json!(86_400.25);
        let msg = ProtocolMessage::from_canonical(value).unwrap();
        assert_eq!(msg.header().ttl, Some(Duration::from_millis(86_400_250)));
    }
}
