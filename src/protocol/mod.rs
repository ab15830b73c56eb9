//! Message model for inter-agent collaboration.
//!
//! - Typed message kinds and priority levels
//! - Header/payload messages with a canonical wire encoding
//! - Pure validation and expiry checks
//! - A fluent builder for common message shapes

pub mod builder;
pub mod message;
pub mod types;
pub mod validator;

pub use builder::MessageBuilder;
pub use message::{MessageHeader, MessagePayload, ProtocolMessage};
pub use types::{MessageType, Priority};
pub use validator::{is_expired, is_expired_at, validate, validate_wire};
