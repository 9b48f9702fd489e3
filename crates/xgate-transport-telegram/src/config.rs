//! Telegram transport settings.

use config::{Config, ConfigError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use xgate_core::config::CoreSettings;

/// Placeholder shipped in the example config; treated as a missing token.
pub const TOKEN_PLACEHOLDER: &str = "YOUR_BOT_TOKEN_HERE";

/// Initial delay between retries of a Telegram API call.
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Upper bound for the retry delay.
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;
/// Number of retries after the first attempt.
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;

/// Telegram transport settings (`telegram:` section).
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TelegramSettings {
    /// Telegram Bot API token.
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Comma-separated list of user IDs allowed to reload the configuration.
    #[serde(rename = "operator_ids", default)]
    pub operator_ids_str: Option<String>,
}

#[derive(Deserialize)]
struct TelegramSection {
    #[serde(default)]
    telegram: TelegramSettings,
}

/// Combined settings used by the Telegram transport layer.
#[derive(Clone)]
pub struct BotSettings {
    /// Moderation, storage and notice settings.
    pub core: Arc<CoreSettings>,
    /// Telegram-specific settings.
    pub telegram: Arc<TelegramSettings>,
}

impl BotSettings {
    /// Create a new combined settings bundle.
    #[must_use]
    pub fn new(core: CoreSettings, telegram: TelegramSettings) -> Self {
        Self {
            core: Arc::new(core),
            telegram: Arc::new(telegram),
        }
    }
}

impl TelegramSettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or the bot token is missing.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_config(xgate_core::config::build_config()?)
    }

    /// Extract and validate the `telegram:` section of a built source.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if deserialization fails or the bot token is missing.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let section: TelegramSection = config.try_deserialize()?;
        section.telegram.validate()?;
        Ok(section.telegram)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.bot_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() && token != TOKEN_PLACEHOLDER => Ok(()),
            _ => Err(ConfigError::Message(
                "telegram.bot_token is not set (config file or TELEGRAM_BOT_TOKEN)".into(),
            )),
        }
    }

    /// The bot token, empty if unset.
    #[must_use]
    pub fn token(&self) -> &str {
        self.bot_token.as_deref().map_or("", str::trim)
    }

    /// Returns a set of user IDs allowed to run operator commands.
    #[must_use]
    pub fn operator_ids(&self) -> HashSet<i64> {
        self.operator_ids_str
            .as_ref()
            .map(|s| {
                s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                    .filter(|token| !token.is_empty())
                    .filter_map(|id| id.parse::<i64>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}
