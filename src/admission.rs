use crate::config::GroupPolicy;
use crate::platform::{ChatType, InboundMessage};

/// The bot's own platform identity, learned from the handshake at startup
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BotIdentity {
    /// Handshake has not completed yet
    #[default]
    Uninitialized,
    Ready {
        /// Handle used for @mention matching (without the leading '@')
        username: String,
        /// Used for reply-target matching
        id: u64,
    },
}

impl BotIdentity {
    /// Build an identity from handshake data.
    /// A missing or empty username leaves the identity uninitialized.
    pub fn from_handshake(username: Option<&str>, id: u64) -> Self {
        match username {
            Some(name) if !name.is_empty() => BotIdentity::Ready {
                username: name.to_string(),
                id,
            },
            _ => BotIdentity::Uninitialized,
        }
    }
}

/// Reason an inbound message was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    IdentityUnset,
    UnrecognizedPolicy(String),
    NotAddressed,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::IdentityUnset => write!(f, "bot identity not established"),
            Rejection::UnrecognizedPolicy(p) => write!(f, "unrecognized group policy '{}'", p),
            Rejection::NotAddressed => write!(f, "bot was not mentioned or replied to"),
        }
    }
}

/// Decide whether a message enters the processing pipeline.
///
/// Returns `Ok(())` to admit, or `Err(reason)` when the message should be
/// silently dropped. Never performs I/O.
pub fn check_admission(
    message: &InboundMessage,
    policy: &GroupPolicy,
    identity: &BotIdentity,
) -> Result<(), Rejection> {
    let (username, id) = match identity {
        BotIdentity::Ready { username, id } => (username, *id),
        BotIdentity::Uninitialized => return Err(Rejection::IdentityUnset),
    };

    if message.chat_type == ChatType::Private {
        return Ok(());
    }

    match policy {
        GroupPolicy::Open => Ok(()),
        GroupPolicy::Mention => {
            let mentioned = message.text.contains(&format!("@{}", username));
            let replied_to_bot = message.replied_to_user_id == Some(id);
            if mentioned || replied_to_bot {
                Ok(())
            } else {
                Err(Rejection::NotAddressed)
            }
        }
        GroupPolicy::Unrecognized(value) => Err(Rejection::UnrecognizedPolicy(value.clone())),
    }
}

#[allow(dead_code)]
pub fn should_admit(message: &InboundMessage, policy: &GroupPolicy, identity: &BotIdentity) -> bool {
    check_admission(message, policy, identity).is_ok()
}
