//! Transport-neutral message model and the moderation decision chain.
//!
//! The chain is linear and terminal on the first branch that applies:
//! permission, then context, then quota. [`decide`] is pure; applying its
//! outcome (deleting, warning, recording) is the caller's job.

use crate::config::ModerationConfig;
use crate::limiter::QuotaCheck;
use crate::links;

/// Kind of chat a message was posted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    /// One-to-one chat with the bot.
    Private,
    /// Basic group.
    Group,
    /// Supergroup.
    Supergroup,
    /// Broadcast channel.
    Channel,
}

impl ChatKind {
    /// Only groups and supergroups are moderated.
    #[must_use]
    pub const fn is_group(self) -> bool {
        matches!(self, Self::Group | Self::Supergroup)
    }
}

/// Author of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    /// Platform user id.
    pub user_id: i64,
    /// Name shown in mentions.
    pub display_name: String,
}

impl Sender {
    /// Create a sender.
    #[must_use]
    pub fn new(user_id: i64, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
        }
    }

    /// HTML mention with the display name escaped.
    ///
    /// # Examples
    ///
    /// ```
    /// use xgate_core::moderation::Sender;
    ///
    /// let sender = Sender::new(42, "<Ann & Bob>");
    /// assert_eq!(
    ///     sender.mention_html(),
    ///     r#"<a href="tg://user?id=42">&lt;Ann &amp; Bob&gt;</a>"#
    /// );
    /// ```
    #[must_use]
    pub fn mention_html(&self) -> String {
        format!(
            r#"<a href="tg://user?id={}">{}</a>"#,
            self.user_id,
            html_escape::encode_text(&self.display_name)
        )
    }
}

/// A chat message as seen by the moderation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Chat the message was posted in.
    pub chat_id: i64,
    /// Kind of that chat.
    pub chat_kind: ChatKind,
    /// Message id within the chat.
    pub message_id: i32,
    /// Author, when identifiable.
    pub sender: Option<Sender>,
    /// Text body, when present.
    pub text: Option<String>,
}

/// A message that passed triage: it is in a group, has an author and text,
/// and carries at least one target link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate<'a> {
    /// Author of the message.
    pub sender: &'a Sender,
    /// Text body.
    pub text: &'a str,
    /// Target links in order of appearance, never empty.
    pub links: Vec<String>,
}

/// First step of the chain. `None` means the message is ignored and no
/// gateway or store call is made for it.
#[must_use]
pub fn triage(message: &IncomingMessage) -> Option<Candidate<'_>> {
    if !message.chat_kind.is_group() {
        return None;
    }
    let sender = message.sender.as_ref()?;
    let text = message.text.as_deref()?;
    let links = links::extract(text);
    if links.is_empty() {
        return None;
    }
    Some(Candidate {
        sender,
        text,
        links,
    })
}

/// Live inputs for a decision about one message.
#[derive(Debug, Clone, Copy)]
pub struct MessageFacts<'a> {
    /// Message text.
    pub text: &'a str,
    /// Target links found in the text.
    pub links: &'a [String],
    /// Whether the bot can currently delete messages in the chat.
    pub can_delete: bool,
    /// Links already counted for the author in the quota window.
    pub current_count: u32,
}

/// Outcome of moderating one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Not subject to moderation.
    Ignored,
    /// The bot cannot delete messages in the chat.
    PermissionDenied,
    /// Not enough text around the links.
    ContextMissing {
        /// Measured context length in characters.
        context_len: usize,
    },
    /// The weekly quota would be exceeded.
    RateLimited {
        /// Quota evaluation that rejected the message.
        quota: QuotaCheck,
    },
    /// Accepted.
    Allowed {
        /// Links to record, all or the first depending on `count_per_link`.
        links: Vec<String>,
        /// Quota evaluation after accepting the message.
        quota: QuotaCheck,
    },
}

impl Decision {
    /// Short label used in logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::PermissionDenied => "permission_denied",
            Self::ContextMissing { .. } => "context_missing",
            Self::RateLimited { .. } => "rate_limited",
            Self::Allowed { .. } => "allowed",
        }
    }

    /// Whether the original message has to be removed.
    #[must_use]
    pub const fn is_violation(&self) -> bool {
        matches!(self, Self::ContextMissing { .. } | Self::RateLimited { .. })
    }
}

/// Links a message charges against the quota.
#[must_use]
pub fn links_to_record(links: &[String], config: &ModerationConfig) -> Vec<String> {
    if config.count_per_link {
        links.to_vec()
    } else {
        links.iter().take(1).cloned().collect()
    }
}

/// The part of the chain that needs no stored state.
///
/// Returns the candidate count to check against the quota, or the decision
/// when an earlier branch already applies. Callers use it to skip the store
/// read when the outcome does not depend on it.
///
/// # Errors
///
/// The `Err` variant carries the terminal decision; it is not a failure.
pub fn screen(
    text: &str,
    links: &[String],
    can_delete: bool,
    config: &ModerationConfig,
) -> Result<u32, Decision> {
    if links.is_empty() {
        return Err(Decision::Ignored);
    }
    if !can_delete {
        return Err(Decision::PermissionDenied);
    }
    if config.require_context {
        let context_len = links::context_length(text);
        if context_len < config.min_context_length {
            return Err(Decision::ContextMissing { context_len });
        }
    }
    let candidate = if config.count_per_link { links.len() } else { 1 };
    Ok(u32::try_from(candidate).unwrap_or(u32::MAX))
}

/// Run the whole decision chain.
#[must_use]
pub fn decide(facts: &MessageFacts<'_>, config: &ModerationConfig) -> Decision {
    let candidate = match screen(facts.text, facts.links, facts.can_delete, config) {
        Ok(candidate) => candidate,
        Err(decision) => return decision,
    };

    let quota = QuotaCheck::evaluate(facts.current_count, candidate, config.max_links_per_week);
    if quota.allowed {
        Decision::Allowed {
            links: links_to_record(facts.links, config),
            quota,
        }
    } else {
        Decision::RateLimited { quota }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTEXT: &str = "this thread explains the release notes in detail";

    fn links(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://x.com/u/status/{i}")).collect()
    }

    fn text_with(links: &[String]) -> String {
        format!("{CONTEXT} {}", links.join(" "))
    }

    fn message(kind: ChatKind, text: Option<&str>) -> IncomingMessage {
        IncomingMessage {
            chat_id: -100,
            chat_kind: kind,
            message_id: 7,
            sender: Some(Sender::new(1, "Ann")),
            text: text.map(str::to_string),
        }
    }

    #[test]
    fn test_triage_ignores_non_candidates() {
        let with_link = "look https://x.com/a";
        assert!(triage(&message(ChatKind::Private, Some(with_link))).is_none());
        assert!(triage(&message(ChatKind::Channel, Some(with_link))).is_none());
        assert!(triage(&message(ChatKind::Group, None)).is_none());
        assert!(triage(&message(ChatKind::Group, Some("no links here"))).is_none());

        let mut anonymous = message(ChatKind::Supergroup, Some(with_link));
        anonymous.sender = None;
        assert!(triage(&anonymous).is_none());
    }

    #[test]
    fn test_triage_accepts_group_links() {
        let msg = message(ChatKind::Supergroup, Some("a https://x.com/a b https://fixupx.com/b"));
        let candidate = triage(&msg).expect("candidate");
        assert_eq!(candidate.sender.user_id, 1);
        assert_eq!(candidate.links, vec!["https://x.com/a", "https://fixupx.com/b"]);
    }

    #[test]
    fn test_permission_is_checked_first() {
        let links = links(1);
        let facts = MessageFacts {
            text: &links[0],
            links: &links,
            can_delete: false,
            current_count: 99,
        };
        assert_eq!(decide(&facts, &ModerationConfig::default()), Decision::PermissionDenied);
    }

    #[test]
    fn test_context_missing_reports_length() {
        let links = links(1);
        let text = format!("ten chars! {}", links[0]);
        let facts = MessageFacts {
            text: &text,
            links: &links,
            can_delete: true,
            current_count: 0,
        };
        assert_eq!(
            decide(&facts, &ModerationConfig::default()),
            Decision::ContextMissing { context_len: 10 }
        );
    }

    #[test]
    fn test_context_not_required() {
        let links = links(1);
        let config = ModerationConfig {
            require_context: false,
            ..ModerationConfig::default()
        };
        let facts = MessageFacts {
            text: &links[0],
            links: &links,
            can_delete: true,
            current_count: 0,
        };
        assert!(matches!(decide(&facts, &config), Decision::Allowed { .. }));
    }

    #[test]
    fn test_allowed_counts_every_link() {
        let links = links(2);
        let text = text_with(&links);
        let facts = MessageFacts {
            text: &text,
            links: &links,
            can_delete: true,
            current_count: 0,
        };
        let decision = decide(&facts, &ModerationConfig::default());
        assert_eq!(
            decision,
            Decision::Allowed {
                links: links.clone(),
                quota: QuotaCheck {
                    allowed: true,
                    current_count: 0,
                    remaining: 1
                }
            }
        );
    }

    #[test]
    fn test_rate_limited_over_quota() {
        let links = links(2);
        let text = text_with(&links);
        let facts = MessageFacts {
            text: &text,
            links: &links,
            can_delete: true,
            current_count: 2,
        };
        let decision = decide(&facts, &ModerationConfig::default());
        assert!(decision.is_violation());
        assert_eq!(
            decision,
            Decision::RateLimited {
                quota: QuotaCheck {
                    allowed: false,
                    current_count: 2,
                    remaining: 0
                }
            }
        );
    }

    #[test]
    fn test_message_counts_once_without_count_per_link() {
        let links = links(3);
        let text = text_with(&links);
        let config = ModerationConfig {
            count_per_link: false,
            ..ModerationConfig::default()
        };
        let facts = MessageFacts {
            text: &text,
            links: &links,
            can_delete: true,
            current_count: 2,
        };
        match decide(&facts, &config) {
            Decision::Allowed { links: recorded, quota } => {
                assert_eq!(recorded, vec![links[0].clone()]);
                assert_eq!(quota.remaining, 0);
            }
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[test]
    fn test_no_links_is_ignored() {
        let facts = MessageFacts {
            text: CONTEXT,
            links: &[],
            can_delete: false,
            current_count: 0,
        };
        assert_eq!(decide(&facts, &ModerationConfig::default()), Decision::Ignored);
    }
}
