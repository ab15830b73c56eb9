//! Multi-agent scenarios across the public API.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use teamwire::core::WireTransport;
use teamwire::{
    CollaborationProtocol, MessageBuilder, MessageQueue, MessageType, Priority, ProtocolConfig, ProtocolMessage,
    QueueConfig, SendOptions,
};

fn config() -> ProtocolConfig {
    ProtocolConfig {
        poll_interval: Duration::from_millis(10),
        ..ProtocolConfig::default()
    }
}

async fn recorder(engine: &CollaborationProtocol, message_type: MessageType) -> mpsc::UnboundedReceiver<ProtocolMessage> {
    let (tx, rx) = mpsc::unbounded_channel();
    engine
        .register_handler(message_type, move |msg: ProtocolMessage| {
            let tx = tx.clone();
            async move {
                tx.send(msg)?;
                anyhow::Ok(())
            }
        })
        .await;
    rx
}

#[tokio::test]
async fn test_queued_messages_handled_by_priority() {
    let a = CollaborationProtocol::with_config("a", "lead", config());
    let b = CollaborationProtocol::with_config("b", "worker", config());
    a.connect("b", &b).await;
    let mut handled = recorder(&b, MessageType::TaskRequest).await;

    for (action, priority) in [("low", Priority::Low), ("urgent", Priority::Urgent), ("normal", Priority::Normal)] {
        a.send_with(
            Some("b"),
            MessageType::TaskRequest,
            action,
            json!({}),
            SendOptions::default().with_priority(priority),
        )
        .await;
    }
    b.start().await;

    let mut order = Vec::new();
    for _ in 0..3 {
        let msg = timeout(Duration::from_secs(2), handled.recv()).await.unwrap().unwrap();
        order.push(msg.action().to_string());
    }
    b.stop().await;

    assert_eq!(order, ["urgent", "normal", "low"]);
}

#[tokio::test]
async fn test_task_request_and_response() {
    let lead = CollaborationProtocol::with_config("lead", "manager", config());
    let coder = CollaborationProtocol::with_config("coder", "engineer", config());
    lead.connect("coder", &coder).await;
    coder.connect("lead", &lead).await;

    let responder = coder.clone();
    coder
        .register_handler(MessageType::TaskRequest, move |msg: ProtocolMessage| {
            let responder = responder.clone();
            async move {
                let result = json!({"echo": msg.data()["task"]});
                responder.reply(&msg, MessageType::TaskResponse, "task_result", result).await;
                anyhow::Ok(())
            }
        })
        .await;
    let mut responses = recorder(&lead, MessageType::TaskResponse).await;

    lead.start().await;
    coder.start().await;

    let request_id = lead
        .send(Some("coder"), MessageType::TaskRequest, "execute_task", json!({"task": "write docs"}))
        .await;
    let response = timeout(Duration::from_secs(2), responses.recv()).await.unwrap().unwrap();

    lead.stop().await;
    coder.stop().await;

    assert_eq!(response.sender(), "coder");
    assert_eq!(response.header().correlation_id.as_deref(), Some(request_id.as_str()));
    assert_eq!(response.data()["echo"], "write docs");

    let lead_stats = lead.stats().await;
    assert_eq!(lead_stats.messages.sent, 1);
    assert_eq!(lead_stats.messages.processed, 1);
    assert_eq!(lead_stats.messages.errors, 0);
}

#[tokio::test]
async fn test_expired_message_never_handled() {
    let a = CollaborationProtocol::with_config("a", "lead", config());
    let b = CollaborationProtocol::with_config("b", "worker", config());
    a.connect("b", &b).await;

    a.send_with(
        Some("b"),
        MessageType::StatusUpdate,
        "status",
        json!({}),
        SendOptions::default().with_ttl(Duration::from_millis(10)),
    )
    .await;
    assert_eq!(b.queue().size().await, 1);

    sleep(Duration::from_millis(50)).await;
    assert!(b.queue().get().await.is_none());
    assert_eq!(b.queue().stats().await.expired, 1);
}

#[tokio::test]
async fn test_backpressure_keeps_urgent_traffic() {
    let queue = MessageQueue::new(QueueConfig::new(1).with_lane_capacity(1));

    assert!(queue.put(MessageBuilder::broadcast("a", "chatter", json!({})).build()).await);
    let alarm = MessageBuilder::error_report("a", "b", "disk full", None)
        .priority(Priority::Urgent)
        .build();
    assert!(queue.put(alarm).await);

    assert_eq!(queue.size().await, 1);
    assert_eq!(queue.get().await.unwrap().priority(), Priority::Urgent);
    assert_eq!(queue.stats().await.evicted, 1);
}

#[tokio::test]
async fn test_wire_transport_between_engines() {
    let lead = CollaborationProtocol::with_config("lead", "manager", config());
    let coder = CollaborationProtocol::with_config("coder", "engineer", config());
    let mut handled = recorder(&coder, MessageType::CollaborationRequest).await;

    let (transport, _bridge) = WireTransport::bridge("coder", coder.queue(), 16);
    lead.connect_transport("coder", Arc::new(transport)).await;
    coder.start().await;

    lead.send_with(
        Some("coder"),
        MessageType::CollaborationRequest,
        "pair_review",
        json!({"pr": 42}),
        SendOptions::default().with_priority(Priority::High).with_ttl(Duration::from_secs(30)),
    )
    .await;

    let msg = timeout(Duration::from_secs(2), handled.recv()).await.unwrap().unwrap();
    coder.stop().await;

    assert_eq!(msg.action(), "pair_review");
    assert_eq!(msg.priority(), Priority::High);
    assert_eq!(msg.data()["pr"], 42);
    assert_eq!(msg.header().ttl, Some(Duration::from_secs(30)));
    assert_eq!(msg.payload().metadata["sender_role"], "manager");
}

#[tokio::test]
async fn test_conversation_invitations_accepted() {
    let lead = CollaborationProtocol::with_config("lead", "manager", config());
    let coder = CollaborationProtocol::with_config("coder", "engineer", config());
    lead.connect("coder", &coder).await;

    let joiner = coder.clone();
    let (tx, mut joined) = mpsc::unbounded_channel();
    coder
        .register_handler(MessageType::CollaborationRequest, move |msg: ProtocolMessage| {
            let (joiner, tx) = (joiner.clone(), tx.clone());
            async move {
                if let Some(id) = joiner.accept_invitation(&msg).await {
                    tx.send(id)?;
                }
                anyhow::Ok(())
            }
        })
        .await;
    coder.start().await;

    let id = lead
        .create_conversation(&["coder".to_string()], "incident review", None)
        .await;
    let joined_id = timeout(Duration::from_secs(2), joined.recv()).await.unwrap().unwrap();
    coder.stop().await;

    assert_eq!(joined_id, id);
    let conversation = coder.conversation(&id).await.unwrap();
    assert_eq!(conversation.creator, "lead");
    assert_eq!(conversation.participants, ["coder"]);
    assert!(!conversation.includes("lead"));
    assert_eq!(coder.stats().await.conversations, 1);
}
