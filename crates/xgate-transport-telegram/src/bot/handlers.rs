use crate::bot::resilient::{reply_html, send_message_resilient};
use crate::bot::views;
use crate::config::BotSettings;
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use teloxide::{
    prelude::*,
    types::{Chat, ChatMemberUpdated, ParseMode},
    utils::command::BotCommands,
};
use tracing::{error, info, warn};
use xgate_core::config::CoreSettings;
use xgate_core::moderation::{ChatKind, IncomingMessage, Sender};
use xgate_runtime::{diagnose, ModerationEngine};

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Supported commands for the bot
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Show the moderation rules
    #[command(description = "Show the moderation rules.")]
    Start,
    /// Show the command list
    #[command(description = "Show this help.")]
    Help,
    /// Show the caller's weekly usage
    #[command(description = "Show your weekly link usage.")]
    Stats,
    /// Check the bot's setup in this group
    #[command(description = "Check the bot setup in this group.")]
    Diagnose,
    /// Reload the configuration file
    #[command(description = "Reload configuration (operators only).")]
    Reload,
}

/// Map a Telegram chat kind onto the moderation model.
#[must_use]
pub fn chat_kind(chat: &Chat) -> ChatKind {
    if chat.is_group() {
        ChatKind::Group
    } else if chat.is_supergroup() {
        ChatKind::Supergroup
    } else if chat.is_channel() {
        ChatKind::Channel
    } else {
        ChatKind::Private
    }
}

/// Transport-neutral view of a Telegram message.
///
/// Only the text body is considered; captions are not moderated.
#[must_use]
pub fn incoming_from_message(msg: &Message) -> IncomingMessage {
    IncomingMessage {
        chat_id: msg.chat.id.0,
        chat_kind: chat_kind(&msg.chat),
        message_id: msg.id.0,
        sender: msg
            .from
            .as_ref()
            .map(|u| Sender::new(u.id.0.cast_signed(), u.full_name())),
        text: msg.text().map(str::to_string),
    }
}

/// Handle the `/start` command.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn start(bot: Bot, msg: Message, engine: Arc<ModerationEngine>) -> Result<()> {
    let config = engine.config().snapshot();
    reply_html(&bot, &msg, views::start_text(&config)).await?;
    Ok(())
}

/// Handle the `/help` command.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn help(bot: Bot, msg: Message) -> Result<()> {
    send_message_resilient(
        &bot,
        msg.chat.id,
        Command::descriptions().to_string(),
        None,
        Some(msg.id),
    )
    .await?;
    Ok(())
}

/// Handle the `/stats` command: the caller's usage in this group.
///
/// # Errors
///
/// Returns an error if the event log cannot be read or the reply cannot be sent.
pub async fn stats(bot: Bot, msg: Message, engine: Arc<ModerationEngine>) -> Result<()> {
    if !chat_kind(&msg.chat).is_group() {
        reply_html(&bot, &msg, views::GROUP_ONLY).await?;
        return Ok(());
    }
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };

    let config = engine.config().snapshot();
    let status = engine
        .limiter()
        .status(user.id.0.cast_signed(), msg.chat.id.0, &config, Utc::now())
        .await?;

    reply_html(&bot, &msg, views::stats_text(&status)).await?;
    Ok(())
}

/// Handle the `/diagnose` command.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn diagnose_chat(bot: Bot, msg: Message, engine: Arc<ModerationEngine>) -> Result<()> {
    if !chat_kind(&msg.chat).is_group() {
        reply_html(
            &bot,
            &msg,
            "❌ This bot only works in groups!\n\nPlease add me to a group first.",
        )
        .await?;
        return Ok(());
    }

    let report = diagnose(
        engine.gateway().as_ref(),
        engine.store().as_ref(),
        engine.config().snapshot(),
        msg.chat.id.0,
    )
    .await;
    info!(
        chat_id = msg.chat.id.0,
        operational = report.is_operational(),
        "Diagnostics requested"
    );

    reply_html(&bot, &msg, views::diagnostic_text(&report)).await?;
    Ok(())
}

/// Handle the `/reload` command: re-read the configuration and swap it in.
///
/// Only moderation rules and message templates take effect; storage and
/// notice settings need a restart.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn reload(
    bot: Bot,
    msg: Message,
    engine: Arc<ModerationEngine>,
    settings: Arc<BotSettings>,
) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    if !settings.telegram.operator_ids().contains(&user_id) {
        warn!(user_id, "Reload refused for non-operator");
        reply_html(&bot, &msg, views::NOT_AN_OPERATOR).await?;
        return Ok(());
    }

    match CoreSettings::new() {
        Ok(core) => {
            let config = core.moderation_config();
            let max = config.max_links_per_week;
            engine.config().replace(config);
            info!(user_id, max_links_per_week = max, "Configuration reloaded");
            reply_html(
                &bot,
                &msg,
                format!("✅ Configuration reloaded (max {max} links per week)."),
            )
            .await?;
        }
        Err(e) => {
            error!(user_id, error = %e, "Configuration reload failed");
            reply_html(
                &bot,
                &msg,
                "❌ Reload failed, the previous configuration stays active. See logs.",
            )
            .await?;
        }
    }
    Ok(())
}

/// Greet a group when the bot is added to it.
///
/// # Errors
///
/// Returns an error if the greeting cannot be sent.
pub async fn welcome(
    bot: Bot,
    update: ChatMemberUpdated,
    engine: Arc<ModerationEngine>,
) -> Result<()> {
    let was_present = update.old_chat_member.kind.is_member()
        || update.old_chat_member.kind.is_administrator();
    let is_present = update.new_chat_member.kind.is_member()
        || update.new_chat_member.kind.is_administrator();
    if was_present || !is_present {
        return Ok(());
    }

    info!(chat_id = update.chat.id.0, "Added to a chat");
    let config = engine.config().snapshot();
    send_message_resilient(
        &bot,
        update.chat.id,
        views::welcome_text(&config),
        Some(ParseMode::Html),
        None,
    )
    .await?;
    Ok(())
}
