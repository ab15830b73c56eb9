//! Agent directory for discovery.
//!
//! An explicit registry keyed by agent id. A peer is reachable while it is
//! registered and unreachable once deregistered; nothing depends on when the
//! peer's memory is actually released.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::queue::MessageQueue;

#[derive(Debug)]
struct DirectoryEntry {
    role: String,
    queue: Arc<MessageQueue>,
}

/// Shared lookup table from agent id to mailbox.
#[derive(Debug, Clone, Default)]
pub struct AgentDirectory {
    entries: Arc<RwLock<HashMap<String, DirectoryEntry>>>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an agent's mailbox.
    pub async fn register(&self, agent_id: impl Into<String>, role: impl Into<String>, queue: Arc<MessageQueue>) {
        let agent_id = agent_id.into();
        let role = role.into();
        tracing::debug!("Registered agent {} ({}) in directory", agent_id, role);
        self.entries
            .write()
            .await
            .insert(agent_id, DirectoryEntry { role, queue });
    }

    /// Remove an agent. Returns whether it was registered.
    pub async fn deregister(&self, agent_id: &str) -> bool {
        let removed = self.entries.write().await.remove(agent_id).is_some();
        if removed {
            tracing::debug!("Deregistered agent {} from directory", agent_id);
        }
        removed
    }

    pub async fn lookup(&self, agent_id: &str) -> Option<Arc<MessageQueue>> {
        self.entries
            .read()
            .await
            .get(agent_id)
            .map(|entry| entry.queue.clone())
    }

    pub async fn contains(&self, agent_id: &str) -> bool {
        self.entries.read().await.contains_key(agent_id)
    }

    pub async fn find_by_role(&self, role: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.role == role)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub async fn list_all(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_lookup() {
        let directory = AgentDirectory::new();
        directory
            .register("coder-1", "coder", Arc::new(MessageQueue::with_capacity(8)))
            .await;
        directory
            .register("coder-2", "coder", Arc::new(MessageQueue::with_capacity(8)))
            .await;
        directory
            .register("reviewer-1", "reviewer", Arc::new(MessageQueue::with_capacity(8)))
            .await;

        assert_eq!(directory.count().await, 3);
        assert!(directory.lookup("coder-1").await.is_some());
        assert!(directory.lookup("ghost").await.is_none());
        assert_eq!(directory.find_by_role("coder").await, ["coder-1", "coder-2"]);
        assert_eq!(directory.list_all().await, ["coder-1", "coder-2", "reviewer-1"]);
    }

    #[tokio::test]
    async fn test_deregister() {
        let directory = AgentDirectory::new();
        directory
            .register("coder", "coder", Arc::new(MessageQueue::with_capacity(8)))
            .await;

        assert!(directory.deregister("coder").await);
        assert!(!directory.deregister("coder").await);
        assert!(!directory.contains("coder").await);
    }
}
