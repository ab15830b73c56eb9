//! Error types for teamwire.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid message: {}", .0.join("; "))]
    InvalidMessage(Vec<String>),

    #[error("Peer not connected: {0}")]
    PeerNotConnected(String),

    #[error("Peer no longer available: {0}")]
    PeerUnavailable(String),

    #[error("Delivery to {peer} rejected: {reason}")]
    Rejected { peer: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Create a delivery rejection error.
    pub fn rejected(peer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            peer: peer.into(),
            reason: reason.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}
