use async_trait::async_trait;
use thiserror::Error;

/// Identifies a message for replies and deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle {
    /// Chat the message lives in.
    pub chat_id: i64,
    /// Message id within the chat.
    pub message_id: i32,
}

impl MessageHandle {
    /// Create a handle.
    #[must_use]
    pub const fn new(chat_id: i64, message_id: i32) -> Self {
        Self {
            chat_id,
            message_id,
        }
    }
}

/// How outgoing text is interpreted by the chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    /// Sent as-is.
    Plain,
    /// Telegram-flavoured HTML.
    Html,
}

/// What the bot may do in a chat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdminCapabilities {
    /// The bot is an administrator (or the owner).
    pub is_admin: bool,
    /// The bot may delete messages of other members.
    pub can_delete_messages: bool,
}

/// Chat platform failure.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The platform rejected the request or could not be reached.
    #[error("transport error: {0}")]
    Transport(String),
}

impl GatewayError {
    /// Machine-readable reason code.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport_error",
        }
    }
}

/// Outbound capabilities the moderation engine needs from a chat platform.
///
/// Implementations decide about retries; callers treat every error as the
/// capability being absent for this message.
#[async_trait]
pub trait ChatGateway: Send + Sync + 'static {
    /// User id of the bot itself.
    async fn get_self_id(&self) -> Result<i64, GatewayError>;

    /// The bot's current rights in `chat_id`, queried live.
    async fn get_admin_capabilities(&self, chat_id: i64)
        -> Result<AdminCapabilities, GatewayError>;

    /// Send `text` to `chat_id`, optionally as a reply.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        format: TextFormat,
        reply_to: Option<i32>,
    ) -> Result<MessageHandle, GatewayError>;

    /// Delete a message.
    async fn delete_message(&self, handle: MessageHandle) -> Result<(), GatewayError>;
}
