//! Resilient messaging utilities with automatic retry for Telegram API operations.
//!
//! Sends are retried on failure using exponential backoff with jitter.
//! Deletions are not: a message that is already gone stays gone.
//!
//! # Usage
//!
//! ```ignore
//! use xgate_transport_telegram::bot::resilient::send_message_resilient;
//!
//! let msg = send_message_resilient(&bot, chat_id, "Hello!", Some(ParseMode::Html), None).await?;
//! ```

use crate::utils::retry_telegram_operation;
use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatId, Message, MessageId, ParseMode, ReplyParameters};
use tracing::debug;

/// Send a message with automatic retry on failures.
///
/// # Arguments
///
/// * `bot` - The Telegram bot instance
/// * `chat_id` - Target chat ID
/// * `text` - Message text to send
/// * `parse_mode` - Optional parse mode
/// * `reply_to` - Message to reply to, if any
///
/// # Errors
///
/// Returns the last error once all retries are exhausted.
pub async fn send_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
    parse_mode: Option<ParseMode>,
    reply_to: Option<MessageId>,
) -> Result<Message> {
    let text = text.into();
    retry_telegram_operation(|| async {
        let mut req = bot.send_message(chat_id, text.clone());
        if let Some(pm) = parse_mode {
            req = req.parse_mode(pm);
        }
        if let Some(id) = reply_to {
            req = req.reply_parameters(ReplyParameters::new(id));
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
    })
    .await
}

/// Reply to `msg` in its chat with HTML text.
///
/// # Errors
///
/// Returns the last error once all retries are exhausted.
pub async fn reply_html(bot: &Bot, msg: &Message, html: impl Into<String>) -> Result<Message> {
    send_message_resilient(bot, msg.chat.id, html, Some(ParseMode::Html), Some(msg.id)).await
}

/// Delete a message once, without retrying.
///
/// # Errors
///
/// Returns an error if Telegram refuses the deletion.
pub async fn delete_message_once(bot: &Bot, chat_id: ChatId, msg_id: MessageId) -> Result<()> {
    bot.delete_message(chat_id, msg_id).await.map_err(|e| {
        debug!("Telegram delete error: {e}");
        anyhow::anyhow!("Telegram delete error: {e}")
    })?;
    Ok(())
}
