//! Conversation tracking for teamwire.
//!
//! Handles:
//! - Conversations created locally and invitations received from peers
//! - The invitation body carried by `join_conversation` requests
//! - Cleanup of closed conversations

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::protocol::{MessageType, ProtocolMessage};

/// Action carried by conversation invitations.
pub const JOIN_CONVERSATION: &str = "join_conversation";

/// A conversation among a fixed set of agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: String,

    /// What the conversation is about
    pub topic: String,

    /// Agent that opened it
    pub creator: String,

    /// Agents named by the creator, in the order given
    pub participants: Vec<String>,

    /// Optional opening message
    pub initial_message: Option<Value>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Whether the conversation has been closed
    pub closed: bool,
}

impl Conversation {
    /// Create a new conversation. `participants` is kept as given, minus duplicates.
    pub fn new(
        id: impl Into<String>,
        topic: impl Into<String>,
        creator: impl Into<String>,
        participants: &[String],
        initial_message: Option<Value>,
    ) -> Self {
        let now = Utc::now();
        let mut conversation = Self {
            id: id.into(),
            topic: topic.into(),
            creator: creator.into(),
            participants: Vec::new(),
            initial_message,
            created_at: now,
            updated_at: now,
            closed: false,
        };
        for participant in participants {
            conversation.add_participant(participant);
        }
        conversation
    }

    /// Rebuild a conversation from a `join_conversation` invitation.
    pub fn from_invitation(message: &ProtocolMessage) -> Option<Self> {
        if message.message_type() != MessageType::CollaborationRequest
            || message.action() != JOIN_CONVERSATION
        {
            return None;
        }

        let data = message.data();
        let id = data.get("conversation_id")?.as_str()?;
        let topic = data.get("topic").and_then(Value::as_str).unwrap_or_default();
        let creator = data
            .get("creator")
            .and_then(Value::as_str)
            .unwrap_or(message.sender());
        let participants: Vec<String> = data
            .get("participants")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let initial_message = data.get("initial_message").filter(|v| !v.is_null()).cloned();

        Some(Self::new(id, topic, creator, &participants, initial_message))
    }

    /// Body of the invitation sent to every other participant.
    pub fn invitation_data(&self) -> Value {
        json!({
            "conversation_id": self.id,
            "topic": self.topic,
            "participants": self.participants,
            "creator": self.creator,
            "initial_message": self.initial_message,
        })
    }

    /// Add a participant agent.
    pub fn add_participant(&mut self, agent_id: &str) {
        if !self.includes(agent_id) {
            self.participants.push(agent_id.to_string());
        }
        self.updated_at = Utc::now();
    }

    pub fn includes(&self, agent_id: &str) -> bool {
        self.participants.iter().any(|p| p == agent_id)
    }

    /// Participants other than `agent_id`.
    pub fn others(&self, agent_id: &str) -> Vec<String> {
        self.participants
            .iter()
            .filter(|p| p.as_str() != agent_id)
            .cloned()
            .collect()
    }

    /// Mark conversation as closed.
    pub fn close(&mut self) {
        self.closed = true;
        self.updated_at = Utc::now();
    }
}

/// Manager for the conversations one agent knows about.
#[derive(Debug, Default)]
pub struct ConversationManager {
    conversations: HashMap<String, Conversation>,
}

impl ConversationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a conversation, replacing any previous one with the same ID.
    pub fn insert(&mut self, conversation: Conversation) {
        self.conversations.insert(conversation.id.clone(), conversation);
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Conversation> {
        self.conversations.remove(id)
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// List all open conversations, oldest first.
    pub fn list_active(&self) -> Vec<&Conversation> {
        let mut active: Vec<&Conversation> = self.conversations.values().filter(|c| !c.closed).collect();
        active.sort_by_key(|c| c.created_at);
        active
    }

    /// Drop closed conversations idle for longer than `max_age`.
    pub fn cleanup(&mut self, max_age: Duration) -> usize {
        let now = Utc::now();
        let before = self.conversations.len();

        self.conversations.retain(|_, conv| {
            let idle = (now - conv.updated_at).to_std().unwrap_or_default();
            !(conv.closed && idle > max_age)
        });

        before - self.conversations.len()
    }
}
