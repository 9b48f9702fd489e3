use crate::bot::resilient::{delete_message_once, send_message_resilient};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode, UserId};
use tokio::sync::OnceCell;
use xgate_runtime::{AdminCapabilities, ChatGateway, GatewayError, MessageHandle, TextFormat};

/// [`ChatGateway`] backed by the Telegram Bot API.
///
/// Admin rights are queried on every call. Only the bot's own id is cached.
pub struct TelegramGateway {
    bot: Bot,
    me: OnceCell<i64>,
}

impl TelegramGateway {
    /// Wrap a bot handle.
    #[must_use]
    pub fn new(bot: Bot) -> Self {
        Self {
            bot,
            me: OnceCell::new(),
        }
    }
}

fn transport(e: impl std::fmt::Display) -> GatewayError {
    GatewayError::Transport(e.to_string())
}

#[async_trait]
impl ChatGateway for TelegramGateway {
    async fn get_self_id(&self) -> Result<i64, GatewayError> {
        self.me
            .get_or_try_init(|| async {
                let me = self.bot.get_me().await.map_err(transport)?;
                Ok::<_, GatewayError>(me.id.0.cast_signed())
            })
            .await
            .copied()
    }

    async fn get_admin_capabilities(
        &self,
        chat_id: i64,
    ) -> Result<AdminCapabilities, GatewayError> {
        let me = self.get_self_id().await?;
        let member = self
            .bot
            .get_chat_member(ChatId(chat_id), UserId(me.cast_unsigned()))
            .await
            .map_err(transport)?;

        Ok(AdminCapabilities {
            is_admin: member.kind.is_privileged(),
            can_delete_messages: member.kind.can_delete_messages(),
        })
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        format: TextFormat,
        reply_to: Option<i32>,
    ) -> Result<MessageHandle, GatewayError> {
        let parse_mode = match format {
            TextFormat::Plain => None,
            TextFormat::Html => Some(ParseMode::Html),
        };
        let sent = send_message_resilient(
            &self.bot,
            ChatId(chat_id),
            text,
            parse_mode,
            reply_to.map(MessageId),
        )
        .await
        .map_err(transport)?;

        Ok(MessageHandle::new(sent.chat.id.0, sent.id.0))
    }

    async fn delete_message(&self, handle: MessageHandle) -> Result<(), GatewayError> {
        delete_message_once(&self.bot, ChatId(handle.chat_id), MessageId(handle.message_id))
            .await
            .map_err(transport)
    }
}
