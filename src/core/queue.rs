//! Priority message queue for teamwire.
//!
//! Each agent owns one queue made of four bounded FIFO lanes, one per priority
//! level. Consumers always drain the highest non-empty lane first. When the queue
//! is full, the oldest message of the lowest non-empty lane at or below the
//! incoming priority is evicted to make room.
//!
//! Expiry is checked on the way in and again on the way out, since messages age
//! while they wait.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::protocol::{is_expired, is_expired_at, validate, Priority, ProtocolMessage};

/// Default total capacity of an agent's queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

const LANES: usize = Priority::ALL.len();

/// Queue sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Total messages held across all lanes
    pub capacity: usize,
    /// Ceiling for each individual lane
    pub lane_capacity: usize,
}

impl QueueConfig {
    /// Split `capacity` evenly across the priority lanes, at least one slot each.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lane_capacity: (capacity / LANES).max(1),
        }
    }

    /// Override the per-lane ceiling.
    pub fn with_lane_capacity(mut self, lane_capacity: usize) -> Self {
        self.lane_capacity = lane_capacity;
        self
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[derive(Debug, Default)]
struct QueueState {
    lanes: [VecDeque<ProtocolMessage>; LANES],
    size: usize,
    evicted: u64,
    expired: u64,
    rejected: u64,
}

impl QueueState {
    /// Lowest non-empty lane at or below `lane`.
    fn eviction_victim(&self, lane: usize) -> Option<usize> {
        (0..=lane).find(|&l| !self.lanes[l].is_empty())
    }
}

/// Bounded multi-lane mailbox owned by one agent.
#[derive(Debug)]
pub struct MessageQueue {
    config: QueueConfig,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl MessageQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(QueueConfig::new(capacity))
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn lane_capacity(&self) -> usize {
        self.config.lane_capacity
    }

    /// Offer a message. Returns whether it was accepted.
    pub async fn put(&self, message: ProtocolMessage) -> bool {
        let errors = validate(&message);
        if !errors.is_empty() {
            tracing::warn!("Rejected message {}: {}", message.id(), errors.join("; "));
            self.state.lock().await.rejected += 1;
            return false;
        }

        if is_expired(&message) {
            tracing::debug!("Dropped message {}: expired before enqueue", message.id());
            self.state.lock().await.expired += 1;
            return false;
        }

        let lane = message.priority().index();
        let mut state = self.state.lock().await;

        if state.size >= self.config.capacity {
            let victim_lane = match state.eviction_victim(lane) {
                Some(l) if l == lane || state.lanes[lane].len() < self.config.lane_capacity => l,
                _ => {
                    tracing::warn!(
                        "Rejected message {}: queue full ({}/{}) and no lower-priority message to evict",
                        message.id(),
                        state.size,
                        self.config.capacity
                    );
                    state.rejected += 1;
                    return false;
                }
            };

            if let Some(victim) = state.lanes[victim_lane].pop_front() {
                state.size -= 1;
                state.evicted += 1;
                tracing::warn!(
                    "Evicted {} message {} to admit {} message {}",
                    victim.priority(),
                    victim.id(),
                    message.priority(),
                    message.id()
                );
            }
        }

        if state.lanes[lane].len() >= self.config.lane_capacity {
            tracing::warn!(
                "Rejected message {}: {} lane full ({})",
                message.id(),
                message.priority(),
                self.config.lane_capacity
            );
            state.rejected += 1;
            return false;
        }

        tracing::debug!("Enqueued {} message {}", message.priority(), message.id());
        state.lanes[lane].push_back(message);
        state.size += 1;
        drop(state);

        self.notify.notify_one();
        true
    }

    /// Take the oldest live message from the highest non-empty lane.
    ///
    /// Expired messages met along the way are discarded.
    pub async fn get(&self) -> Option<ProtocolMessage> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        for lane in (0..LANES).rev() {
            while let Some(message) = state.lanes[lane].pop_front() {
                state.size -= 1;
                if is_expired_at(&message, now) {
                    state.expired += 1;
                    tracing::debug!("Dropped message {}: expired in queue", message.id());
                    continue;
                }
                return Some(message);
            }
        }

        None
    }

    /// Like [`get`](Self::get), but waits up to `wait` for a message to arrive.
    ///
    /// Cancel-safe: dropping the future never loses a message.
    pub async fn next(&self, wait: Duration) -> Option<ProtocolMessage> {
        let deadline = Instant::now() + wait;

        loop {
            let notified = self.notify.notified();
            if let Some(message) = self.get().await {
                return Some(message);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    /// Total queued messages.
    pub async fn size(&self) -> usize {
        self.state.lock().await.size
    }

    pub async fn is_empty(&self) -> bool {
        self.size().await == 0
    }

    /// Per-lane occupancy and drop counters.
    pub async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        let lane = |p: Priority| state.lanes[p.index()].len();

        QueueStats {
            low: lane(Priority::Low),
            normal: lane(Priority::Normal),
            high: lane(Priority::High),
            urgent: lane(Priority::Urgent),
            total: state.size,
            capacity: self.config.capacity,
            lane_capacity: self.config.lane_capacity,
            evicted: state.evicted,
            expired: state.expired,
            rejected: state.rejected,
        }
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

/// Queue statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub low: usize,
    pub normal: usize,
    pub high: usize,
    pub urgent: usize,
    pub total: usize,
    pub capacity: usize,
    pub lane_capacity: usize,
    pub evicted: u64,
    pub expired: u64,
    pub rejected: u64,
}

impl fmt::Display for QueueStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Queue Stats:")?;
        writeln!(f, "  Urgent:   {}", self.urgent)?;
        writeln!(f, "  High:     {}", self.high)?;
        writeln!(f, "  Normal:   {}", self.normal)?;
        writeln!(f, "  Low:      {}", self.low)?;
        writeln!(f, "  Total:    {}/{}", self.total, self.capacity)?;
        write!(
            f,
            "  Dropped:  {} evicted, {} expired, {} rejected",
            self.evicted, self.expired, self.rejected
        )
    }
}
