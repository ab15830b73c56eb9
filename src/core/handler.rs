//! Message handlers invoked by an agent's consumption loop.

use std::future::Future;

use async_trait::async_trait;

use crate::protocol::ProtocolMessage;

/// Handles every dequeued message of one type.
///
/// An `Err` (or a panic) is logged and counted by the engine; it never stops
/// the loop.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: ProtocolMessage) -> anyhow::Result<()>;
}

/// Any `async` closure taking the message works as a handler.
#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(ProtocolMessage) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, message: ProtocolMessage) -> anyhow::Result<()> {
        (self)(message).await
    }
}
