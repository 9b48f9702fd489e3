use crate::bot;
use crate::bot::handlers::{incoming_from_message, Command};
use crate::bot::TelegramGateway;
use crate::config::BotSettings;
use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::ChatMemberUpdated;
use tracing::{debug, error, info, warn};
use xgate_core::storage::{EventStore, SqliteEventStore};
use xgate_runtime::{ChatGateway, ConfigHandle, ModerationEngine};

/// Run the Telegram transport runtime.
///
/// Updates of one chat are handled one at a time (teloxide's default
/// distribution), so counting and recording links never race within a chat.
pub async fn run_bot(settings: Arc<BotSettings>) {
    let store = init_storage(&settings).await;
    prune_expired(store.as_ref(), settings.core.storage.retention_days).await;

    let bot = Bot::new(settings.telegram.token());
    let engine = init_engine(&bot, &settings, store.clone());
    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![engine.clone(), settings])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Shutting down, removing pending notices...");
    engine.notices().shutdown().await;
    store.close().await;
}

async fn init_storage(settings: &BotSettings) -> Arc<SqliteEventStore> {
    match SqliteEventStore::open(&settings.core.storage).await {
        Ok(s) => {
            info!("Event log initialized.");
            if let Err(e) = s.check_connection().await {
                error!("Event log connection check returned error: {}", e);
            }
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to initialize event log: {}", e);
            std::process::exit(1);
        }
    }
}

async fn prune_expired(store: &SqliteEventStore, retention_days: u32) {
    let cutoff = Utc::now() - TimeDelta::days(i64::from(retention_days));
    match store.prune(cutoff).await {
        Ok(0) => debug!("No expired link records"),
        Ok(deleted) => info!("Cleaned up {} old link records", deleted),
        Err(e) => warn!("Failed to prune old link records: {}", e),
    }
}

fn init_engine(
    bot: &Bot,
    settings: &BotSettings,
    store: Arc<SqliteEventStore>,
) -> Arc<ModerationEngine> {
    let gateway: Arc<dyn ChatGateway> = Arc::new(TelegramGateway::new(bot.clone()));
    let store: Arc<dyn EventStore> = store;
    let config = Arc::new(ConfigHandle::new(settings.core.moderation_config()));

    info!(
        "Moderation engine ready (max {} links/week, context {}, notices removed after {}s)",
        settings.core.rules.max_links_per_week,
        if settings.core.rules.require_context {
            "required"
        } else {
            "optional"
        },
        settings.core.notices.delete_after_secs
    );

    Arc::new(ModerationEngine::new(
        gateway,
        store,
        config,
        settings.core.notices.delay(),
    ))
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_my_chat_member().endpoint(handle_my_chat_member))
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(
                    dptree::filter(|msg: Message| msg.text().is_some())
                        .endpoint(handle_group_message),
                ),
        )
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    engine: Arc<ModerationEngine>,
    settings: Arc<BotSettings>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => bot::handlers::start(bot, msg, engine).await,
        Command::Help => bot::handlers::help(bot, msg).await,
        Command::Stats => bot::handlers::stats(bot, msg, engine).await,
        Command::Diagnose => bot::handlers::diagnose_chat(bot, msg, engine).await,
        Command::Reload => bot::handlers::reload(bot, msg, engine, settings).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_group_message(
    msg: Message,
    engine: Arc<ModerationEngine>,
) -> Result<(), teloxide::RequestError> {
    let incoming = incoming_from_message(&msg);
    match engine.handle(&incoming).await {
        Ok(decision) => debug!(
            chat_id = incoming.chat_id,
            message_id = incoming.message_id,
            decision = decision.label(),
            "Message moderated"
        ),
        Err(e) => error!(
            chat_id = incoming.chat_id,
            message_id = incoming.message_id,
            error = %e,
            "Moderation failed"
        ),
    }
    respond(())
}

async fn handle_my_chat_member(
    bot: Bot,
    update: ChatMemberUpdated,
    engine: Arc<ModerationEngine>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::welcome(bot, update, engine).await {
        error!("Welcome handler error: {}", e);
    }
    respond(())
}
