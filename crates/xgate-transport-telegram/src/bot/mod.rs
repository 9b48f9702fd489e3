/// `ChatGateway` implementation over the Bot API
pub mod gateway;
/// Command and message handlers
pub mod handlers;
/// Resilient messaging with automatic retry for Telegram API operations
pub mod resilient;
/// HTML texts for commands and service messages
pub mod views;

pub use gateway::TelegramGateway;
