//! Configuration and settings management
//!
//! Loads moderation rules, message templates and storage settings from
//! `config.yml` (or the file named by `XGATE_CONFIG`) and the environment.

use config::{Config, ConfigError, Environment, File};
use lazy_regex::lazy_regex;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;

/// Config file looked up when `XGATE_CONFIG` is unset (extension optional).
pub const DEFAULT_CONFIG_PATH: &str = "config";
/// Default weekly link quota per user and chat.
pub const DEFAULT_MAX_LINKS_PER_WEEK: u32 = 3;
/// Default minimum number of context characters.
pub const DEFAULT_MIN_CONTEXT_LENGTH: usize = 30;
/// Default database file.
pub const DEFAULT_DB_PATH: &str = "bot_data.db";
/// Link events older than this many days are pruned at startup.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;
/// Default size of the SQLite connection pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
/// Transient notices are removed after this many seconds.
pub const DEFAULT_NOTICE_DELAY_SECS: u64 = 10;

static PLACEHOLDER: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"\{([a-z_]+)\}");

/// A message template with named `{placeholder}` slots.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct MessageTemplate(String);

impl MessageTemplate {
    /// Wrap a raw template string.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// Raw template text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Substitute named placeholders. Unknown placeholders are kept verbatim.
    ///
    /// # Examples
    ///
    /// ```
    /// use xgate_core::config::MessageTemplate;
    ///
    /// let t = MessageTemplate::new("limit is {max}, {unknown} stays");
    /// assert_eq!(t.render(&[("max", &3)]), "limit is 3, {unknown} stays");
    /// ```
    #[must_use]
    pub fn render(&self, values: &[(&str, &dyn Display)]) -> String {
        PLACEHOLDER
            .replace_all(&self.0, |caps: &regex::Captures<'_>| {
                values
                    .iter()
                    .find(|(name, _)| *name == &caps[1])
                    .map_or_else(|| caps[0].to_string(), |(_, value)| value.to_string())
            })
            .into_owned()
    }
}

/// Moderation rules section (`rules:`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RulesSettings {
    /// Maximum accepted target links per user, chat and trailing week.
    #[serde(default = "default_max_links_per_week")]
    pub max_links_per_week: u32,
    /// Whether links must come with surrounding text.
    #[serde(default = "default_true")]
    pub require_context: bool,
    /// Minimum context length in characters, links excluded.
    #[serde(default = "default_min_context_length")]
    pub min_context_length: usize,
    /// Count every link of a message, or the whole message as one.
    #[serde(default = "default_true")]
    pub count_per_link: bool,
}

impl Default for RulesSettings {
    fn default() -> Self {
        Self {
            max_links_per_week: DEFAULT_MAX_LINKS_PER_WEEK,
            require_context: true,
            min_context_length: DEFAULT_MIN_CONTEXT_LENGTH,
            count_per_link: true,
        }
    }
}

/// User-facing message templates (`messages:`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessageTemplates {
    /// Sent when the weekly quota is exceeded. Placeholder: `{max}`.
    #[serde(default = "default_rate_limit_message")]
    pub rate_limit: MessageTemplate,
    /// Sent when a link lacks context. Placeholder: `{min}`.
    #[serde(default = "default_no_context_message")]
    pub no_context: MessageTemplate,
    /// Sent when one or zero links remain. Placeholder: `{remaining}`.
    #[serde(default = "default_approaching_limit_message")]
    pub approaching_limit: MessageTemplate,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            rate_limit: default_rate_limit_message(),
            no_context: default_no_context_message(),
            approaching_limit: default_approaching_limit_message(),
        }
    }
}

/// Link event log settings (`storage:`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSettings {
    /// SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Events older than this are pruned at startup.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Connection pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            retention_days: DEFAULT_RETENTION_DAYS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// Transient notice settings (`notices:`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NoticeSettings {
    /// Delay before a transient notice is deleted.
    #[serde(default = "default_notice_delay_secs")]
    pub delete_after_secs: u64,
}

impl Default for NoticeSettings {
    fn default() -> Self {
        Self {
            delete_after_secs: DEFAULT_NOTICE_DELAY_SECS,
        }
    }
}

impl NoticeSettings {
    /// Delay as a [`Duration`].
    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_secs(self.delete_after_secs)
    }
}

/// Everything the moderation core reads from configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CoreSettings {
    /// Moderation rules.
    #[serde(default)]
    pub rules: RulesSettings,
    /// Message templates.
    #[serde(default)]
    pub messages: MessageTemplates,
    /// Event log settings.
    #[serde(default)]
    pub storage: StorageSettings,
    /// Transient notice settings.
    #[serde(default)]
    pub notices: NoticeSettings,
}

/// The immutable configuration a moderation decision is made against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationConfig {
    /// Maximum accepted target links per user, chat and trailing week.
    pub max_links_per_week: u32,
    /// Whether links must come with surrounding text.
    pub require_context: bool,
    /// Minimum context length in characters.
    pub min_context_length: usize,
    /// Count every link of a message, or the whole message as one.
    pub count_per_link: bool,
    /// Sent when the weekly quota is exceeded.
    pub rate_limit_message: MessageTemplate,
    /// Sent when a link lacks context.
    pub no_context_message: MessageTemplate,
    /// Sent when one or zero links remain.
    pub approaching_limit_message: MessageTemplate,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        CoreSettings::default().moderation_config()
    }
}

/// Build the layered configuration source.
///
/// Order (later wins): config file, `XGATE__SECTION__KEY` environment
/// variables, then `TELEGRAM_BOT_TOKEN` and `DB_PATH`.
///
/// # Errors
///
/// Returns a `ConfigError` if a source cannot be read or parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let config_path =
        std::env::var("XGATE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    Config::builder()
        .add_source(File::with_name(&config_path).required(false))
        .add_source(
            Environment::with_prefix("XGATE")
                .separator("__")
                .try_parsing(true)
                .ignore_empty(true),
        )
        .set_override_option("telegram.bot_token", env_non_empty("TELEGRAM_BOT_TOKEN"))?
        .set_override_option("storage.path", env_non_empty("DB_PATH"))?
        .build()
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl CoreSettings {
    /// Load and validate settings from file and environment.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a value is out of range.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_config(build_config()?)
    }

    /// Deserialize and validate settings from an already built source.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if deserialization fails or a value is out of range.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Self = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rules.max_links_per_week == 0 {
            return Err(ConfigError::Message(
                "rules.max_links_per_week must be greater than 0".into(),
            ));
        }
        if self.storage.max_connections == 0 {
            return Err(ConfigError::Message(
                "storage.max_connections must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Snapshot of the moderation-relevant part of the settings.
    #[must_use]
    pub fn moderation_config(&self) -> ModerationConfig {
        ModerationConfig {
            max_links_per_week: self.rules.max_links_per_week,
            require_context: self.rules.require_context,
            min_context_length: self.rules.min_context_length,
            count_per_link: self.rules.count_per_link,
            rate_limit_message: self.messages.rate_limit.clone(),
            no_context_message: self.messages.no_context.clone(),
            approaching_limit_message: self.messages.approaching_limit.clone(),
        }
    }
}

const fn default_max_links_per_week() -> u32 {
    DEFAULT_MAX_LINKS_PER_WEEK
}

const fn default_true() -> bool {
    true
}

const fn default_min_context_length() -> usize {
    DEFAULT_MIN_CONTEXT_LENGTH
}

fn default_rate_limit_message() -> MessageTemplate {
    MessageTemplate::new("⚠️ You've hit your weekly limit ({max} X links per week)")
}

fn default_no_context_message() -> MessageTemplate {
    MessageTemplate::new("⚠️ X links require context (minimum {min} characters)")
}

fn default_approaching_limit_message() -> MessageTemplate {
    MessageTemplate::new("ℹ️ You have {remaining} X link(s) remaining this week")
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

const fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}

const fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

const fn default_notice_delay_secs() -> u64 {
    DEFAULT_NOTICE_DELAY_SECS
}
