//! teamwire library root.
//!
//! Prioritized, validated messaging between collaborating agents: each agent
//! owns a bounded priority queue, talks to peers through pluggable transports
//! and dispatches incoming messages to per-type handlers.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod protocol;

pub use cli::Commands;
pub use config::{load_settings, Settings};
pub use core::{
    AgentDirectory, CollaborationProtocol, MessageHandler, MessageQueue, MessageTransport, ProtocolConfig,
    ProtocolStats, QueueConfig, SendOptions,
};
pub use error::{Error, Result};
pub use protocol::{MessageBuilder, MessageType, Priority, ProtocolMessage};
