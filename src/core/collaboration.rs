//! Per-agent collaboration protocol engine.
//!
//! A [`CollaborationProtocol`] is the addressable unit of communication: it owns
//! the agent's queue, a routing table of peers, one handler per message type and
//! a background task that drains the queue.
//!
//! Connections are one-way. `a.connect("b", &b)` lets `a` send to `b`; for `b` to
//! answer, `b` must connect to `a` as well.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use super::conversation::{Conversation, ConversationManager, JOIN_CONVERSATION};
use super::directory::AgentDirectory;
use super::handler::MessageHandler;
use super::queue::{MessageQueue, QueueConfig, QueueStats};
use super::transport::{DirectoryTransport, LocalTransport, MessageTransport};
use crate::error::Error;
use crate::protocol::builder::generate_id;
use crate::protocol::{validate, MessageBuilder, MessageType, Priority, ProtocolMessage};

/// Default wait of the consumption loop on an empty queue.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    pub queue: QueueConfig,
    pub poll_interval: Duration,
    pub default_priority: Priority,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            default_priority: Priority::Normal,
        }
    }
}

/// Optional knobs for [`CollaborationProtocol::send_with`].
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Falls back to the engine's default priority
    pub priority: Option<Priority>,
    pub correlation_id: Option<String>,
    pub ttl: Option<Duration>,
}

impl SendOptions {
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
    processed: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> MessageCounters {
        MessageCounters {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Running message counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCounters {
    pub sent: u64,
    pub received: u64,
    pub processed: u64,
    pub errors: u64,
}

/// Snapshot of an engine for dashboards and tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolStats {
    pub employee_id: String,
    pub role: String,
    pub running: bool,
    #[serde(flatten)]
    pub messages: MessageCounters,
    pub queue: QueueStats,
    pub connections: usize,
    pub conversations: usize,
}

struct Inner {
    employee_id: String,
    role: String,
    config: ProtocolConfig,
    queue: Arc<MessageQueue>,
    connections: RwLock<HashMap<String, Arc<dyn MessageTransport>>>,
    handlers: RwLock<HashMap<MessageType, Arc<dyn MessageHandler>>>,
    conversations: RwLock<ConversationManager>,
    counters: Counters,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// One agent's end of the collaboration protocol.
///
/// Cloning is cheap and yields another handle to the same agent, which is how
/// handlers get hold of the engine to send replies.
#[derive(Clone)]
pub struct CollaborationProtocol {
    inner: Arc<Inner>,
}

impl CollaborationProtocol {
    pub fn new(employee_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self::with_config(employee_id, role, ProtocolConfig::default())
    }

    pub fn with_config(employee_id: impl Into<String>, role: impl Into<String>, config: ProtocolConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                employee_id: employee_id.into(),
                role: role.into(),
                queue: Arc::new(MessageQueue::new(config.queue)),
                config,
                connections: RwLock::new(HashMap::new()),
                handlers: RwLock::new(HashMap::new()),
                conversations: RwLock::new(ConversationManager::new()),
                counters: Counters::default(),
                running: AtomicBool::new(false),
                shutdown,
                task: Mutex::new(None),
            }),
        }
    }

    pub fn employee_id(&self) -> &str {
        &self.inner.employee_id
    }

    pub fn role(&self) -> &str {
        &self.inner.role
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.inner.config
    }

    /// This agent's mailbox.
    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.inner.queue
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Install the handler for a message type, replacing any previous one.
    pub async fn register_handler(&self, message_type: MessageType, handler: impl MessageHandler + 'static) {
        let replaced = self
            .inner
            .handlers
            .write()
            .await
            .insert(message_type, Arc::new(handler))
            .is_some();
        if replaced {
            tracing::debug!("{}: replaced handler for {}", self.inner.employee_id, message_type);
        } else {
            tracing::debug!("{}: registered handler for {}", self.inner.employee_id, message_type);
        }
    }

    /// Remove the handler for a message type. Returns whether one was installed.
    pub async fn unregister_handler(&self, message_type: MessageType) -> bool {
        self.inner.handlers.write().await.remove(&message_type).is_some()
    }

    /// Route messages for `peer_id` straight into `peer`'s queue.
    ///
    /// Only a weak reference to the peer is kept.
    pub async fn connect(&self, peer_id: impl Into<String>, peer: &CollaborationProtocol) {
        let peer_id = peer_id.into();
        let transport = LocalTransport::new(peer_id.clone(), &peer.inner.queue);
        self.connect_transport(peer_id, Arc::new(transport)).await;
    }

    /// Route messages for `peer_id` through a directory lookup at send time.
    pub async fn connect_via(&self, peer_id: impl Into<String>, directory: &AgentDirectory) {
        let peer_id = peer_id.into();
        let transport = DirectoryTransport::new(peer_id.clone(), directory.clone());
        self.connect_transport(peer_id, Arc::new(transport)).await;
    }

    /// Route messages for `peer_id` through any transport.
    pub async fn connect_transport(&self, peer_id: impl Into<String>, transport: Arc<dyn MessageTransport>) {
        let peer_id = peer_id.into();
        tracing::info!(
            "{}: connected to {} via {} transport",
            self.inner.employee_id,
            peer_id,
            transport.name()
        );
        self.inner.connections.write().await.insert(peer_id, transport);
    }

    /// Drop the route to `peer_id`. Returns whether it existed.
    pub async fn disconnect(&self, peer_id: &str) -> bool {
        let removed = self.inner.connections.write().await.remove(peer_id).is_some();
        if removed {
            tracing::info!("{}: disconnected from {}", self.inner.employee_id, peer_id);
        }
        removed
    }

    pub async fn is_connected(&self, peer_id: &str) -> bool {
        self.inner.connections.read().await.contains_key(peer_id)
    }

    pub async fn connected_peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.inner.connections.read().await.keys().cloned().collect();
        peers.sort();
        peers
    }

    /// Make this agent reachable through `directory`.
    pub async fn register_in(&self, directory: &AgentDirectory) {
        directory
            .register(&self.inner.employee_id, &self.inner.role, self.inner.queue.clone())
            .await;
    }

    /// Start the consumption loop. Does nothing if it is already running.
    pub async fn start(&self) {
        let mut task = self.inner.task.lock().await;
        if task.is_some() {
            tracing::debug!("{}: already running", self.inner.employee_id);
            return;
        }

        self.inner.shutdown.send_replace(false);
        let shutdown = self.inner.shutdown.subscribe();
        self.inner.running.store(true, Ordering::SeqCst);
        *task = Some(tokio::spawn(run_loop(self.inner.clone(), shutdown)));

        tracing::info!("{} ({}) started", self.inner.employee_id, self.inner.role);
    }

    /// Stop the consumption loop and wait for it to finish.
    ///
    /// A handler that is mid-flight is aborted and counted as an error; once this
    /// returns no message is being processed. Must not be awaited from inside one
    /// of this agent's own handlers. Does nothing if the loop is not running.
    pub async fn stop(&self) {
        let mut task = self.inner.task.lock().await;
        let Some(handle) = task.take() else {
            return;
        };

        self.inner.shutdown.send_replace(true);
        match handle.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => tracing::error!("{}: consumption loop panicked: {}", self.inner.employee_id, e),
        }
        self.inner.running.store(false, Ordering::SeqCst);

        tracing::info!("{} ({}) stopped", self.inner.employee_id, self.inner.role);
    }

    /// Send with default options. See [`send_with`](Self::send_with).
    pub async fn send(
        &self,
        receiver_id: Option<&str>,
        message_type: MessageType,
        action: impl Into<String>,
        data: Value,
    ) -> String {
        self.send_with(receiver_id, message_type, action, data, SendOptions::default())
            .await
    }

    /// Build and deliver a message; returns its ID.
    ///
    /// With a receiver the message goes to that peer only; without one it goes
    /// to every connected peer. Delivery is fire-and-forget: failures are logged
    /// and counted in `errors`, never returned.
    pub async fn send_with(
        &self,
        receiver_id: Option<&str>,
        message_type: MessageType,
        action: impl Into<String>,
        data: Value,
        options: SendOptions,
    ) -> String {
        let mut builder = MessageBuilder::new(&self.inner.employee_id, message_type, action)
            .receiver(receiver_id.map(str::to_string))
            .data(data)
            .metadata("sender_role", self.inner.role.clone())
            .priority(options.priority.unwrap_or(self.inner.config.default_priority));
        if let Some(id) = options.correlation_id {
            builder = builder.correlation_id(id);
        }
        if let Some(ttl) = options.ttl {
            builder = builder.ttl(ttl);
        }

        self.deliver(builder.build()).await
    }

    /// Answer `request`, correlated to it and at its priority.
    pub async fn reply(
        &self,
        request: &ProtocolMessage,
        message_type: MessageType,
        action: impl Into<String>,
        data: Value,
    ) -> String {
        let options = SendOptions::default()
            .with_priority(request.priority())
            .with_correlation_id(request.id());
        self.send_with(Some(request.sender()), message_type, action, data, options)
            .await
    }

    /// Open a conversation and invite every participant other than this agent.
    ///
    /// The invitation carries `participants` as given (duplicates removed) and
    /// names this agent separately as `creator`.
    pub async fn create_conversation(
        &self,
        participants: &[String],
        topic: &str,
        initial_message: Option<Value>,
    ) -> String {
        let id = format!("conv_{}", generate_id().to_lowercase());
        let conversation = Conversation::new(
            id.clone(),
            topic,
            self.inner.employee_id.clone(),
            participants,
            initial_message,
        );
        let invitees = conversation.others(&self.inner.employee_id);
        let invitation = conversation.invitation_data();
        self.inner.conversations.write().await.insert(conversation);

        for invitee in &invitees {
            self.send_with(
                Some(invitee.as_str()),
                MessageType::CollaborationRequest,
                JOIN_CONVERSATION,
                invitation.clone(),
                SendOptions::default().with_priority(Priority::High),
            )
            .await;
        }

        tracing::info!(
            "{}: opened conversation {} on '{}' with {} invitee(s)",
            self.inner.employee_id,
            id,
            topic,
            invitees.len()
        );
        id
    }

    /// Record a conversation this agent was invited to. Returns its ID.
    pub async fn accept_invitation(&self, message: &ProtocolMessage) -> Option<String> {
        let conversation = Conversation::from_invitation(message)?;
        let id = conversation.id.clone();
        self.inner.conversations.write().await.insert(conversation);
        tracing::debug!("{}: joined conversation {}", self.inner.employee_id, id);
        Some(id)
    }

    pub async fn conversation(&self, id: &str) -> Option<Conversation> {
        self.inner.conversations.read().await.get(id).cloned()
    }

    /// Mark a conversation closed. Returns whether it was known.
    pub async fn close_conversation(&self, id: &str) -> bool {
        let mut conversations = self.inner.conversations.write().await;
        let Some(conversation) = conversations.get_mut(id) else {
            return false;
        };
        conversation.close();
        tracing::debug!("{}: closed conversation {}", self.inner.employee_id, id);
        true
    }

    /// Forget a conversation right away.
    pub async fn leave_conversation(&self, id: &str) -> Option<Conversation> {
        let left = self.inner.conversations.write().await.remove(id);
        if left.is_some() {
            tracing::debug!("{}: left conversation {}", self.inner.employee_id, id);
        }
        left
    }

    /// Drop closed conversations idle for longer than `max_age`.
    pub async fn cleanup_conversations(&self, max_age: Duration) -> usize {
        let removed = self.inner.conversations.write().await.cleanup(max_age);
        if removed > 0 {
            tracing::debug!("{}: cleaned up {} conversation(s)", self.inner.employee_id, removed);
        }
        removed
    }

    /// Open conversations, oldest first.
    pub async fn conversations(&self) -> Vec<Conversation> {
        self.inner
            .conversations
            .read()
            .await
            .list_active()
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn stats(&self) -> ProtocolStats {
        ProtocolStats {
            employee_id: self.inner.employee_id.clone(),
            role: self.inner.role.clone(),
            running: self.is_running(),
            messages: self.inner.counters.snapshot(),
            queue: self.inner.queue.stats().await,
            connections: self.inner.connections.read().await.len(),
            conversations: self.inner.conversations.read().await.len(),
        }
    }

    async fn deliver(&self, message: ProtocolMessage) -> String {
        let id = message.id().to_string();
        Counters::bump(&self.inner.counters.sent);

        let errors = validate(&message);
        if !errors.is_empty() {
            self.inner.record_error(&Error::InvalidMessage(errors), &id);
            return id;
        }

        let targets: Vec<(String, Arc<dyn MessageTransport>)> = match message.receiver() {
            Some(peer) => {
                let transport = self.inner.connections.read().await.get(peer).cloned();
                match transport {
                    Some(transport) => vec![(peer.to_string(), transport)],
                    None => {
                        self.inner.record_error(&Error::PeerNotConnected(peer.to_string()), &id);
                        return id;
                    }
                }
            }
            None => self
                .inner
                .connections
                .read()
                .await
                .iter()
                .map(|(peer, transport)| (peer.clone(), transport.clone()))
                .collect(),
        };

        if targets.is_empty() {
            tracing::debug!("{}: broadcast {} reached no peers", self.inner.employee_id, id);
        }

        for (peer, transport) in targets {
            match transport.deliver(message.clone()).await {
                Ok(()) => tracing::debug!(
                    "{}: delivered {} {} to {}",
                    self.inner.employee_id,
                    message.message_type(),
                    id,
                    peer
                ),
                Err(e) => self.inner.record_error(&e, &id),
            }
        }

        id
    }
}

impl fmt::Debug for CollaborationProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollaborationProtocol")
            .field("employee_id", &self.inner.employee_id)
            .field("role", &self.inner.role)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Inner {
    fn record_error(&self, error: &Error, message_id: &str) {
        Counters::bump(&self.counters.errors);
        tracing::warn!("{}: message {} not delivered: {}", self.employee_id, message_id, error);
    }

    async fn dispatch(&self, message: ProtocolMessage, shutdown: &mut watch::Receiver<bool>) {
        Counters::bump(&self.counters.received);

        let message_type = message.message_type();
        let handler = self.handlers.read().await.get(&message_type).cloned();
        let Some(handler) = handler else {
            tracing::warn!(
                "{}: no handler for {} message {} from {}, dropping",
                self.employee_id,
                message_type,
                message.id(),
                message.sender()
            );
            return;
        };

        let message_id = message.id().to_string();
        // Run the handler as its own task so a panic is contained, but wait for it
        // so this agent still processes one message at a time.
        let mut task = tokio::spawn(async move { handler.handle(message).await });
        let outcome = tokio::select! {
            biased;
            outcome = &mut task => outcome,
            _ = shutdown_requested(shutdown) => {
                task.abort();
                let _ = (&mut task).await;
                Counters::bump(&self.counters.errors);
                tracing::warn!(
                    "{}: handler for {} cancelled on {} by shutdown",
                    self.employee_id,
                    message_type,
                    message_id
                );
                return;
            }
        };

        match outcome {
            Ok(Ok(())) => {
                Counters::bump(&self.counters.processed);
                tracing::debug!("{}: processed {} {}", self.employee_id, message_type, message_id);
            }
            Ok(Err(e)) => {
                Counters::bump(&self.counters.errors);
                tracing::error!(
                    "{}: handler for {} failed on {}: {:#}",
                    self.employee_id,
                    message_type,
                    message_id,
                    e
                );
            }
            Err(e) => {
                Counters::bump(&self.counters.errors);
                tracing::error!(
                    "{}: handler for {} aborted on {}: {}",
                    self.employee_id,
                    message_type,
                    message_id,
                    e
                );
            }
        }
    }
}

async fn run_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    tracing::debug!("{}: consumption loop running", inner.employee_id);

    loop {
        if *shutdown.borrow() {
            break;
        }

        let next = tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            next = inner.queue.next(inner.config.poll_interval) => next,
        };

        match next {
            Some(message) => inner.dispatch(message, &mut shutdown).await,
            None => tokio::task::yield_now().await,
        }
    }

    tracing::debug!("{}: consumption loop finished", inner.employee_id);
}

/// Resolves once `stop` has raised the shutdown flag.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            // The sender lives in `Inner`, which this loop keeps alive.
            std::future::pending::<()>().await;
        }
    }
}
