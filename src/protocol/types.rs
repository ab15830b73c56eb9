//! Message types and priorities for the collaboration protocol.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Message type classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Ask a peer to carry out a task
    TaskRequest,
    /// Result of a task request
    TaskResponse,
    /// Progress / state notification
    StatusUpdate,
    /// Invitation to collaborate (e.g. join a conversation)
    CollaborationRequest,
    /// Answer to a collaboration request
    CollaborationResponse,
    /// Liveness ping
    Heartbeat,
    /// Error report
    Error,
    /// Announcement to every connected peer
    Broadcast,
}

impl MessageType {
    pub const ALL: [MessageType; 8] = [
        MessageType::TaskRequest,
        MessageType::TaskResponse,
        MessageType::StatusUpdate,
        MessageType::CollaborationRequest,
        MessageType::CollaborationResponse,
        MessageType::Heartbeat,
        MessageType::Error,
        MessageType::Broadcast,
    ];

    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::TaskRequest => "task_request",
            MessageType::TaskResponse => "task_response",
            MessageType::StatusUpdate => "status_update",
            MessageType::CollaborationRequest => "collaboration_request",
            MessageType::CollaborationResponse => "collaboration_response",
            MessageType::Heartbeat => "heartbeat",
            MessageType::Error => "error",
            MessageType::Broadcast => "broadcast",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown message type '{}'", s))
    }
}

/// Message priority levels.
///
/// Encoded on the wire as its integer level (1..=4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    Low = 1,
    Normal = 2,
    High = 3,
    Urgent = 4,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

impl Priority {
    /// All levels, lowest first.
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::Urgent,
    ];

    /// Integer level used on the wire.
    pub fn level(&self) -> u8 {
        *self as u8
    }

    /// Zero-based lane index, lowest priority first.
    pub fn index(&self) -> usize {
        self.level() as usize - 1
    }

    pub fn name(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.level()
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            1 => Ok(Priority::Low),
            2 => Ok(Priority::Normal),
            3 => Ok(Priority::High),
            4 => Ok(Priority::Urgent),
            other => Err(format!("priority level {} out of range 1..=4", other)),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(level) = s.parse::<u8>() {
            return Priority::try_from(level);
        }
        Priority::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown priority '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_priority_wire_levels() {
        assert_eq!(serde_json::to_value(Priority::Urgent).unwrap(), 4);
        let p: Priority = serde_json::from_value(serde_json::json!(1)).unwrap();
        assert_eq!(p, Priority::Low);
        assert!(serde_json::from_value::<Priority>(serde_json::json!(7)).is_err());
    }

    #[test]
    fn test_priority_from_str() {
        assert_eq!("high".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!("URGENT".parse::<Priority>().unwrap(), Priority::Urgent);
        assert_eq!("2".parse::<Priority>().unwrap(), Priority::Normal);
        assert!("critical".parse::<Priority>().is_err());
    }

    #[test]
    fn test_message_type_names() {
        for t in MessageType::ALL {
            let json = serde_json::to_value(t).unwrap();
            assert_eq!(json, t.as_str());
            assert_eq!(t.as_str().parse::<MessageType>().unwrap(), t);
        }
        assert!("delegation".parse::<MessageType>().is_err());
    }
}
