use crate::config_handle::ConfigHandle;
use crate::gateway::{ChatGateway, MessageHandle, TextFormat};
use crate::notices::NoticeScheduler;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use xgate_core::config::ModerationConfig;
use xgate_core::limiter::RateLimiter;
use xgate_core::moderation::{
    decide, screen, triage, Candidate, Decision, IncomingMessage, MessageFacts,
};
use xgate_core::storage::{EventStore, LinkEvent, StorageError};

/// Reply sent when the bot cannot delete messages in a group.
pub const PERMISSION_SETUP_HTML: &str = "⚠️ <b>I need admin permissions to moderate links!</b>\n\n\
<b>Quick fix:</b>\n\
1. Tap the group name at the top\n\
2. Tap 'Edit' or the settings icon\n\
3. Tap 'Administrators'\n\
4. Add me as an administrator\n\
5. Enable 'Delete Messages' ✓\n\n\
After setup, type /diagnose to verify!";

/// Failures that abort a moderation decision.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The event log could not be read or written.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Applies the moderation chain to incoming messages.
///
/// Shared behind an `Arc`; every message is handled independently.
/// Counting and recording for the same user and chat are not serialized
/// here: two messages handled concurrently may both see the same count.
/// The Telegram runner avoids this by dispatching each chat sequentially.
pub struct ModerationEngine {
    gateway: Arc<dyn ChatGateway>,
    limiter: RateLimiter,
    config: Arc<ConfigHandle>,
    notices: NoticeScheduler,
}

impl ModerationEngine {
    /// Assemble an engine. Transient notices are removed after `notice_delay`.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        store: Arc<dyn EventStore>,
        config: Arc<ConfigHandle>,
        notice_delay: Duration,
    ) -> Self {
        let notices = NoticeScheduler::new(Arc::clone(&gateway), notice_delay);
        Self {
            gateway,
            limiter: RateLimiter::new(store),
            config,
            notices,
        }
    }

    /// Chat platform in use.
    #[must_use]
    pub fn gateway(&self) -> &Arc<dyn ChatGateway> {
        &self.gateway
    }

    /// Quota evaluator.
    #[must_use]
    pub const fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Event log.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EventStore> {
        self.limiter.store()
    }

    /// Live configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<ConfigHandle> {
        &self.config
    }

    /// Transient notice scheduler.
    #[must_use]
    pub const fn notices(&self) -> &NoticeScheduler {
        &self.notices
    }

    /// Moderate one message and apply the outcome.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` if the event log fails. No notice is
    /// sent for a message whose links could not be recorded.
    pub async fn handle(&self, message: &IncomingMessage) -> Result<Decision, EngineError> {
        let Some(candidate) = triage(message) else {
            return Ok(Decision::Ignored);
        };

        let config = self.config.snapshot();
        let user_id = candidate.sender.user_id;
        let chat_id = message.chat_id;
        debug!(user_id, chat_id, links = candidate.links.len(), "Target links found");

        let can_delete = self.can_delete(chat_id).await;
        let now = Utc::now();

        let current_count = match screen(candidate.text, &candidate.links, can_delete, &config) {
            Ok(_) => self.limiter.current_count(user_id, chat_id, now).await?,
            Err(_) => 0,
        };

        let decision = decide(
            &MessageFacts {
                text: candidate.text,
                links: &candidate.links,
                can_delete,
                current_count,
            },
            &config,
        );

        self.apply(message, &candidate, &decision, &config, now)
            .await?;
        Ok(decision)
    }

    async fn can_delete(&self, chat_id: i64) -> bool {
        match self.gateway.get_admin_capabilities(chat_id).await {
            Ok(caps) => caps.can_delete_messages,
            Err(e) => {
                warn!(chat_id, error = %e, "Failed to query bot permissions");
                false
            }
        }
    }

    async fn apply(
        &self,
        message: &IncomingMessage,
        candidate: &Candidate<'_>,
        decision: &Decision,
        config: &ModerationConfig,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let user_id = candidate.sender.user_id;
        let chat_id = message.chat_id;

        match decision {
            Decision::Ignored => {}
            Decision::PermissionDenied => {
                warn!(chat_id, "Bot lacks delete permission");
                self.send(
                    chat_id,
                    PERMISSION_SETUP_HTML,
                    Some(message.message_id),
                )
                .await;
            }
            Decision::ContextMissing { context_len } => {
                info!(user_id, chat_id, context_len, "Link without context");
                let text = config
                    .no_context_message
                    .render(&[("min", &config.min_context_length)]);
                self.reject(message, candidate, &text).await;
            }
            Decision::RateLimited { quota } => {
                info!(
                    user_id,
                    chat_id,
                    current_count = quota.current_count,
                    "Weekly link quota exceeded"
                );
                let text = config
                    .rate_limit_message
                    .render(&[("max", &config.max_links_per_week)]);
                self.reject(message, candidate, &text).await;
            }
            Decision::Allowed { links, quota } => {
                let events: Vec<LinkEvent> = links
                    .iter()
                    .map(|link| LinkEvent::new(user_id, chat_id, link.as_str(), now))
                    .collect();
                if let Err(e) = self.store().record_all(&events).await {
                    error!(user_id, chat_id, error = %e, "Failed to record links");
                    return Err(e.into());
                }

                info!(
                    user_id,
                    chat_id,
                    links = links.len(),
                    remaining = quota.remaining,
                    "Links accepted"
                );

                if quota.remaining <= 1 {
                    let text = config
                        .approaching_limit_message
                        .render(&[("remaining", &quota.remaining)]);
                    let html = html_escape::encode_text(&text);
                    if let Some(notice) = self.send(chat_id, &html, Some(message.message_id)).await
                    {
                        self.notices.schedule_removal(notice);
                    }
                }
            }
        }
        Ok(())
    }

    /// Delete the offending message, then post a transient warning.
    /// Nothing is posted if the deletion fails.
    async fn reject(&self, message: &IncomingMessage, candidate: &Candidate<'_>, text: &str) {
        let original = MessageHandle::new(message.chat_id, message.message_id);
        if let Err(e) = self.gateway.delete_message(original).await {
            error!(
                chat_id = message.chat_id,
                message_id = message.message_id,
                error = %e,
                "Failed to delete message"
            );
            return;
        }

        let warning = format!(
            "{}: {}",
            candidate.sender.mention_html(),
            html_escape::encode_text(text)
        );
        if let Some(notice) = self.send(message.chat_id, &warning, None).await {
            self.notices.schedule_removal(notice);
        }
    }

    async fn send(&self, chat_id: i64, html: &str, reply_to: Option<i32>) -> Option<MessageHandle> {
        match self
            .gateway
            .send_message(chat_id, html, TextFormat::Html, reply_to)
            .await
        {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(chat_id, error = %e, "Failed to send notice");
                None
            }
        }
    }
}
