//! Delivery of messages into a peer's queue.
//!
//! The engine never touches a peer's queue directly; it hands the message to the
//! transport registered for that peer. Transports decide HOW the message gets
//! there: a direct call, a directory lookup, or an encoded frame on a channel.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::directory::AgentDirectory;
use super::queue::MessageQueue;
use crate::error::{Error, Result};
use crate::protocol::{validate_wire, ProtocolMessage};

/// Transport layer for agent messages.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Hand a message to the peer. Errors mean the peer did not take it.
    async fn deliver(&self, message: ProtocolMessage) -> Result<()>;

    /// Transport name for logs.
    fn name(&self) -> &str;
}

/// Direct in-process delivery.
///
/// Holds only a weak reference, so a peer that goes away is not kept alive by
/// the agents that were talking to it.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    peer_id: String,
    queue: Weak<MessageQueue>,
}

impl LocalTransport {
    pub fn new(peer_id: impl Into<String>, queue: &Arc<MessageQueue>) -> Self {
        Self {
            peer_id: peer_id.into(),
            queue: Arc::downgrade(queue),
        }
    }
}

#[async_trait]
impl MessageTransport for LocalTransport {
    async fn deliver(&self, message: ProtocolMessage) -> Result<()> {
        let queue = self
            .queue
            .upgrade()
            .ok_or_else(|| Error::PeerUnavailable(self.peer_id.clone()))?;

        if queue.put(message).await {
            Ok(())
        } else {
            Err(Error::rejected(&self.peer_id, "queue refused the message"))
        }
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// Delivery through an [`AgentDirectory`], resolved on every send.
///
/// A peer is reachable exactly while it is registered.
#[derive(Debug, Clone)]
pub struct DirectoryTransport {
    peer_id: String,
    directory: AgentDirectory,
}

impl DirectoryTransport {
    pub fn new(peer_id: impl Into<String>, directory: AgentDirectory) -> Self {
        Self {
            peer_id: peer_id.into(),
            directory,
        }
    }
}

#[async_trait]
impl MessageTransport for DirectoryTransport {
    async fn deliver(&self, message: ProtocolMessage) -> Result<()> {
        let queue = self
            .directory
            .lookup(&self.peer_id)
            .await
            .ok_or_else(|| Error::PeerUnavailable(self.peer_id.clone()))?;

        if queue.put(message).await {
            Ok(())
        } else {
            Err(Error::rejected(&self.peer_id, "queue refused the message"))
        }
    }

    fn name(&self) -> &str {
        "directory"
    }
}

/// Delivery of canonical JSON frames over a channel.
///
/// Stands in for any byte-oriented link: the sending side only ever sees the
/// encoded frame, and the receiving bridge rebuilds the message from it.
#[derive(Debug, Clone)]
pub struct WireTransport {
    peer_id: String,
    frames: mpsc::Sender<String>,
}

impl WireTransport {
    pub fn new(peer_id: impl Into<String>, frames: mpsc::Sender<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            frames,
        }
    }

    /// Create a transport plus the task that decodes its frames into `queue`.
    ///
    /// The bridge ends when every sender is dropped or the queue goes away.
    pub fn bridge(
        peer_id: impl Into<String>,
        queue: &Arc<MessageQueue>,
        buffer: usize,
    ) -> (Self, JoinHandle<()>) {
        let peer_id = peer_id.into();
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let handle = tokio::spawn(run_bridge(peer_id.clone(), Arc::downgrade(queue), rx));
        (Self::new(peer_id, tx), handle)
    }
}

#[async_trait]
impl MessageTransport for WireTransport {
    async fn deliver(&self, message: ProtocolMessage) -> Result<()> {
        let frame = message.encode()?;
        self.frames
            .send(frame)
            .await
            .map_err(|_| Error::transport(format!("wire link to {} is closed", self.peer_id)))
    }

    fn name(&self) -> &str {
        "wire"
    }
}

async fn run_bridge(peer_id: String, queue: Weak<MessageQueue>, mut frames: mpsc::Receiver<String>) {
    while let Some(frame) = frames.recv().await {
        let Some(queue) = queue.upgrade() else {
            tracing::debug!("Wire bridge for {} stopping: queue dropped", peer_id);
            return;
        };

        let value: serde_json::Value = match serde_json::from_str(&frame) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Wire bridge for {} dropped unparseable frame: {}", peer_id, e);
                continue;
            }
        };

        let errors = validate_wire(&value);
        if !errors.is_empty() {
            tracing::warn!("Wire bridge for {} dropped invalid frame: {}", peer_id, errors.join("; "));
            continue;
        }

        match ProtocolMessage::from_canonical(value) {
            Ok(message) => {
                if !queue.put(message).await {
                    tracing::debug!("Wire bridge for {}: queue refused frame", peer_id);
                }
            }
            Err(e) => tracing::warn!("Wire bridge for {} could not decode frame: {}", peer_id, e),
        }
    }
    tracing::debug!("Wire bridge for {} closed", peer_id);
}
