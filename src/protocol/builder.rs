//! Fluent construction of protocol messages.
//!
//! The builder only assembles; it never validates. Validation happens once, at
//! the point a message is sent or enqueued.

use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Map, Value};

use super::message::{empty_object, MessageHeader, MessagePayload, ProtocolMessage};
use super::types::{MessageType, Priority};

/// Builder for creating messages with a fluent API.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    sender_id: String,
    receiver_id: Option<String>,
    message_type: MessageType,
    action: String,
    data: Value,
    metadata: Map<String, Value>,
    priority: Priority,
    correlation_id: Option<String>,
    ttl: Option<Duration>,
}

impl MessageBuilder {
    /// Start building a message from an agent.
    pub fn new(sender_id: impl Into<String>, message_type: MessageType, action: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            receiver_id: None,
            message_type,
            action: action.into(),
            data: empty_object(),
            metadata: Map::new(),
            priority: Priority::Normal,
            correlation_id: None,
            ttl: None,
        }
    }

    /// Address to a single agent. Without a receiver the message is a broadcast.
    pub fn to(mut self, receiver_id: impl Into<String>) -> Self {
        self.receiver_id = Some(receiver_id.into());
        self
    }

    /// Address to a single agent or, with `None`, to every connected peer.
    pub fn receiver(mut self, receiver_id: Option<String>) -> Self {
        self.receiver_id = receiver_id;
        self
    }

    /// Set the request/response body.
    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Add a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Build the message with a fresh ID and the current time.
    pub fn build(self) -> ProtocolMessage {
        let header = MessageHeader {
            message_id: generate_id(),
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            message_type: self.message_type,
            priority: self.priority,
            timestamp: Utc::now(),
            correlation_id: self.correlation_id,
            ttl: self.ttl,
        };
        let payload = MessagePayload {
            action: self.action,
            data: self.data,
            metadata: self.metadata,
        };
        ProtocolMessage::new(header, payload)
    }

    /// A task request to one agent.
    pub fn task_request(sender_id: impl Into<String>, receiver_id: impl Into<String>, task: Value) -> Self {
        Self::new(sender_id, MessageType::TaskRequest, "execute_task")
            .to(receiver_id)
            .data(task)
    }

    /// The response to `request`, addressed back to its sender and correlated to it.
    pub fn task_response(request: &ProtocolMessage, sender_id: impl Into<String>, result: Value) -> Self {
        Self::new(sender_id, MessageType::TaskResponse, "task_result")
            .to(request.sender())
            .correlation_id(request.id())
            .priority(request.priority())
            .data(result)
    }

    /// A status broadcast.
    pub fn status_update(sender_id: impl Into<String>, status: impl Into<String>, details: Value) -> Self {
        Self::new(sender_id, MessageType::StatusUpdate, "status_update")
            .priority(Priority::Low)
            .data(json!({
                "status": status.into(),
                "details": details,
            }))
    }

    /// A liveness ping that is worthless once stale.
    pub fn heartbeat(sender_id: impl Into<String>) -> Self {
        Self::new(sender_id, MessageType::Heartbeat, "heartbeat")
            .priority(Priority::Low)
            .ttl(Duration::from_secs(30))
    }

    /// An error report about a previous message.
    pub fn error_report(
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        error: impl Into<String>,
        correlation_id: Option<String>,
    ) -> Self {
        let builder = Self::new(sender_id, MessageType::Error, "report_error")
            .to(receiver_id)
            .priority(Priority::High)
            .data(json!({ "error": error.into() }));
        match correlation_id {
            Some(id) => builder.correlation_id(id),
            None => builder,
        }
    }

    /// An invitation to collaborate on something.
    pub fn collaboration_request(
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        action: impl Into<String>,
        data: Value,
    ) -> Self {
        Self::new(sender_id, MessageType::CollaborationRequest, action)
            .to(receiver_id)
            .priority(Priority::High)
            .data(data)
    }

    /// An announcement to every connected peer.
    pub fn broadcast(sender_id: impl Into<String>, action: impl Into<String>, data: Value) -> Self {
        Self::new(sender_id, MessageType::Broadcast, action).data(data)
    }
}

pub(crate) fn generate_id() -> String {
    ulid::Ulid::new().to_string()
}
