//! Core module - queues, transports and the collaboration engine.
//!
//! This module contains the heart of teamwire's message processing:
//! - Bounded priority queue per agent
//! - Transports that deliver into a peer's queue
//! - Agent directory for discovery
//! - Conversation tracking
//! - The per-agent collaboration engine

pub mod collaboration;
pub mod conversation;
pub mod directory;
pub mod handler;
pub mod queue;
pub mod transport;

pub use collaboration::{CollaborationProtocol, MessageCounters, ProtocolConfig, ProtocolStats, SendOptions};
pub use conversation::{Conversation, ConversationManager};
pub use directory::AgentDirectory;
pub use handler::MessageHandler;
pub use queue::{MessageQueue, QueueConfig, QueueStats};
pub use transport::{DirectoryTransport, LocalTransport, MessageTransport, WireTransport};
