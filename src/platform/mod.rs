pub mod telegram;

/// Kind of conversation a message arrived in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatType {
    /// One-to-one conversation with the bot
    Private,
    /// Group or supergroup
    Group,
    /// Any other multi-party context (e.g. channels)
    Other,
}

/// A normalized message received from the platform
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Message text, or the media caption when there is no text. Empty if neither.
    pub text: String,
    pub chat_type: ChatType,
    /// User ID of the author of the message being replied to
    pub replied_to_user_id: Option<u64>,
    /// Platform-specific user ID of the sender
    pub sender_id: u64,
    pub sender_username: Option<String>,
    /// Platform-specific chat ID
    pub chat_id: i64,
    pub message_id: i32,
}
