use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use teloxide::prelude::*;
use tracing::{debug, error, info, warn};

use crate::admission::{self, BotIdentity};
use crate::bus::{BusMessage, MessageBus};
use crate::config::TelegramConfig;
use crate::platform::{ChatType, InboundMessage};

const CHANNEL_NAME: &str = "telegram";

/// Normalize a Telegram message for admission.
/// Returns None for messages without a sender (e.g. channel posts).
pub fn normalize(msg: &Message) -> Option<InboundMessage> {
    let user = msg.from.as_ref()?;

    let text = msg
        .text()
        .or_else(|| msg.caption())
        .unwrap_or_default()
        .to_string();

    let chat_type = if msg.chat.is_private() {
        ChatType::Private
    } else if msg.chat.is_group() || msg.chat.is_supergroup() {
        ChatType::Group
    } else {
        ChatType::Other
    };

    let replied_to_user_id = msg
        .reply_to_message()
        .and_then(|reply| reply.from.as_ref())
        .map(|author| author.id.0);

    Some(InboundMessage {
        text,
        chat_type,
        replied_to_user_id,
        sender_id: user.id.0,
        sender_username: user.username.clone(),
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
    })
}

/// Telegram side of the relay: filters inbound messages and publishes the
/// admitted ones to the bus
pub struct TelegramChannel {
    config: TelegramConfig,
    identity: RwLock<BotIdentity>,
    bus: Arc<dyn MessageBus>,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            config,
            identity: RwLock::new(BotIdentity::Uninitialized),
            bus,
        }
    }

    /// Current identity. A poisoned lock reads as uninitialized.
    pub fn identity(&self) -> BotIdentity {
        self.identity
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn set_identity(&self, identity: BotIdentity) {
        match self.identity.write() {
            Ok(mut guard) => *guard = identity,
            Err(poisoned) => *poisoned.into_inner() = identity,
        }
    }

    /// Ask Telegram who we are and record the result
    pub async fn handshake(&self, bot: &Bot) -> Result<()> {
        let me = bot
            .get_me()
            .await
            .context("Failed to fetch bot identity from Telegram")?;

        let identity = BotIdentity::from_handshake(me.user.username.as_deref(), me.user.id.0);
        match &identity {
            BotIdentity::Ready { username, id } => {
                info!("Telegram bot connected as @{} ({})", username, id)
            }
            BotIdentity::Uninitialized => {
                warn!("Telegram bot {} has no username; all messages will be dropped", me.user.id.0)
            }
        }
        self.set_identity(identity);
        Ok(())
    }

    /// Sender allowlist check, applied before admission
    pub fn is_sender_allowed(&self, msg: &InboundMessage) -> bool {
        self.config.is_allowed(msg.sender_id)
    }

    /// Run the admission filter for one message
    pub fn admit(&self, msg: &InboundMessage) -> bool {
        if !self.is_sender_allowed(msg) {
            debug!("Dropping message {} from {}: sender not allowed", msg.message_id, msg.sender_id);
            return false;
        }

        let identity = self.identity();
        match admission::check_admission(msg, &self.config.group_policy, &identity) {
            Ok(()) => true,
            Err(reason) => {
                debug!(
                    "Dropping message {} in chat {}: {}",
                    msg.message_id, msg.chat_id, reason
                );
                false
            }
        }
    }

    /// Publish an admitted message to the bus
    pub async fn forward(&self, msg: &InboundMessage) -> Result<()> {
        info!(
            "Telegram message from {} in chat {}: {}",
            msg.sender_id, msg.chat_id, msg.text
        );
        self.bus
            .publish_inbound(BusMessage::from_inbound(CHANNEL_NAME, msg))
            .await
    }
}

/// Connect to Telegram and relay admitted messages until the dispatcher stops
pub async fn run(channel: Arc<TelegramChannel>) -> Result<()> {
    let bot = Bot::new(&channel.config.bot_token);

    info!("Starting Telegram platform...");
    channel.handshake(&bot).await?;

    let handler = Update::filter_message()
        .filter_map(|msg: Message| normalize(&msg))
        .filter(|incoming: InboundMessage, channel: Arc<TelegramChannel>| {
            channel.admit(&incoming)
        })
        .endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![channel])
        .default_handler(|upd| async move {
            debug!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(
    incoming: InboundMessage,
    channel: Arc<TelegramChannel>,
) -> ResponseResult<()> {
    if let Err(e) = channel.forward(&incoming).await {
        error!("Error forwarding message: {:#}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{InboundReceiver, QueueBus};
    use crate::config::GroupPolicy;
    use serde_json::json;

    fn channel(
        group_policy: GroupPolicy,
        allowed_user_ids: Vec<u64>,
    ) -> (TelegramChannel, InboundReceiver) {
        let (bus, receiver) = QueueBus::new(8);
        let config = TelegramConfig {
            bot_token: "fake-token".to_string(),
            group_policy,
            allowed_user_ids,
        };
        let channel = TelegramChannel::new(config, Arc::new(bus));
        channel.set_identity(BotIdentity::Ready {
            username: "testbot".to_string(),
            id: 999,
        });
        (channel, receiver)
    }

    fn group_message(extra: serde_json::Value) -> Message {
        let mut value = json!({
            "message_id": 42,
            "date": 1,
            "chat": { "id": -1001, "type": "group", "title": "Team" },
            "from": {
                "id": 123,
                "is_bot": false,
                "first_name": "Alice",
                "username": "alice"
            }
        });
        if let (Some(obj), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                obj.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(value).expect("deserialize group message")
    }

    #[test]
    fn test_normalize_private_text() {
        let msg: Message = serde_json::from_value(json!({
            "message_id": 1,
            "date": 1,
            "chat": { "id": 123, "type": "private", "first_name": "Alice" },
            "from": { "id": 123, "is_bot": false, "first_name": "Alice" },
            "text": "hello"
        }))
        .expect("deserialize private message");

        let incoming = normalize(&msg).unwrap();
        assert_eq!(incoming.text, "hello");
        assert_eq!(incoming.chat_type, ChatType::Private);
        assert_eq!(incoming.replied_to_user_id, None);
        assert_eq!(incoming.sender_id, 123);
        assert_eq!(incoming.sender_username, None);
        assert_eq!(incoming.chat_id, 123);
        assert_eq!(incoming.message_id, 1);
    }

    #[test]
    fn test_normalize_group_reply() {
        let msg = group_message(json!({
            "text": "I agree",
            "reply_to_message": {
                "message_id": 41,
                "date": 1,
                "chat": { "id": -1001, "type": "group", "title": "Team" },
                "from": { "id": 999, "is_bot": true, "first_name": "Test", "username": "testbot" },
                "text": "Shall we ship it?"
            }
        }));

        let incoming = normalize(&msg).unwrap();
        assert_eq!(incoming.chat_type, ChatType::Group);
        assert_eq!(incoming.replied_to_user_id, Some(999));
        assert_eq!(incoming.sender_username.as_deref(), Some("alice"));
    }

    #[test]
    fn test_normalize_uses_caption_when_no_text() {
        let msg = group_message(json!({
            "photo": [{
                "file_id": "photo-id",
                "file_unique_id": "photo-unique",
                "file_size": 100,
                "width": 10,
                "height": 10
            }],
            "caption": "look @testbot"
        }));

        let incoming = normalize(&msg).unwrap();
        assert_eq!(incoming.text, "look @testbot");
    }

    #[test]
    fn test_normalize_media_without_caption_has_empty_text() {
        let msg = group_message(json!({
            "photo": [{
                "file_id": "photo-id",
                "file_unique_id": "photo-unique",
                "file_size": 100,
                "width": 10,
                "height": 10
            }]
        }));

        let incoming = normalize(&msg).unwrap();
        assert_eq!(incoming.text, "");
    }

    #[test]
    fn test_normalize_supergroup_is_group() {
        let msg: Message = serde_json::from_value(json!({
            "message_id": 7,
            "date": 1,
            "chat": { "id": -100200, "type": "supergroup", "title": "Big team" },
            "from": { "id": 5, "is_bot": false, "first_name": "Bob" },
            "text": "hi"
        }))
        .expect("deserialize supergroup message");

        assert_eq!(normalize(&msg).unwrap().chat_type, ChatType::Group);
    }

    #[test]
    fn test_identity_starts_uninitialized() {
        let (bus, _receiver) = QueueBus::new(1);
        let config = TelegramConfig {
            bot_token: "fake-token".to_string(),
            group_policy: GroupPolicy::Open,
            allowed_user_ids: vec![],
        };
        let channel = TelegramChannel::new(config, Arc::new(bus));
        assert_eq!(channel.identity(), BotIdentity::Uninitialized);

        let msg = normalize(&group_message(json!({ "text": "hello" }))).unwrap();
        assert!(!channel.admit(&msg));
    }

    #[test]
    fn test_admit_follows_group_policy() {
        let (open, _rx) = channel(GroupPolicy::Open, vec![]);
        let (mention, _rx2) = channel(GroupPolicy::Mention, vec![]);

        let plain = normalize(&group_message(json!({ "text": "hello everyone" }))).unwrap();
        let addressed =
            normalize(&group_message(json!({ "text": "hey @testbot what do you think?" }))).unwrap();

        assert!(open.admit(&plain));
        assert!(!mention.admit(&plain));
        assert!(mention.admit(&addressed));
    }

    #[test]
    fn test_admit_rejects_sender_outside_allowlist() {
        let (channel, _rx) = channel(GroupPolicy::Open, vec![7]);
        let msg = normalize(&group_message(json!({ "text": "hello" }))).unwrap();
        assert!(!channel.admit(&msg));
    }

    #[tokio::test]
    async fn test_forward_publishes_to_bus() {
        let (channel, mut receiver) = channel(GroupPolicy::Mention, vec![]);
        let msg = normalize(&group_message(json!({ "text": "hey @testbot" }))).unwrap();

        assert!(channel.admit(&msg));
        channel.forward(&msg).await.unwrap();

        let published = receiver.recv().await.unwrap();
        assert_eq!(published.channel, "telegram");
        assert_eq!(published.content, "hey @testbot");
        assert_eq!(published.chat_id, "-1001");
    }
}
