use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::platform::InboundMessage;

/// A message handed from a channel to the processing pipeline
#[derive(Debug, Clone, Serialize)]
pub struct BusMessage {
    pub id: Uuid,
    /// Channel the message came from (e.g. "telegram")
    pub channel: String,
    pub sender_id: String,
    pub chat_id: String,
    pub content: String,
    pub received_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl BusMessage {
    pub fn from_inbound(channel: &str, msg: &InboundMessage) -> Self {
        // "<id>|<username>", or just "<id>" when the sender has no username
        let sender_id = match &msg.sender_username {
            Some(username) => format!("{}|{}", msg.sender_id, username),
            None => msg.sender_id.to_string(),
        };

        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            sender_id,
            chat_id: msg.chat_id.to_string(),
            content: msg.text.clone(),
            received_at: Utc::now(),
            metadata: serde_json::json!({
                "message_id": msg.message_id,
                "user_id": msg.sender_id,
                "username": msg.sender_username,
                "is_group": msg.chat_type != crate::platform::ChatType::Private,
                "reply_to_user_id": msg.replied_to_user_id,
            }),
        }
    }
}

/// Sink for inbound messages admitted by a channel
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish_inbound(&self, msg: BusMessage) -> Result<()>;
}

/// In-process bus backed by a bounded queue
#[derive(Clone)]
pub struct QueueBus {
    tx: mpsc::Sender<BusMessage>,
}

/// Receiving end of a [`QueueBus`]
pub struct InboundReceiver {
    rx: mpsc::Receiver<BusMessage>,
}

impl QueueBus {
    pub fn new(capacity: usize) -> (Self, InboundReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, InboundReceiver { rx })
    }
}

#[async_trait]
impl MessageBus for QueueBus {
    async fn publish_inbound(&self, msg: BusMessage) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .context("Failed to publish inbound message: queue closed")
    }
}

impl InboundReceiver {
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.rx.recv().await
    }
}

/// Drain the inbound queue until every sender is gone.
/// This is where the handler pipeline picks messages up.
pub async fn run_consumer(mut receiver: InboundReceiver) {
    while let Some(msg) = receiver.recv().await {
        info!(
            "Inbound [{}] chat {} from {}: {}",
            msg.channel, msg.chat_id, msg.sender_id, msg.content
        );
    }
    info!("Inbound queue closed");
}
