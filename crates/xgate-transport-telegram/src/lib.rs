#![deny(missing_docs)]
//! Telegram transport adapter for X-Gate.

/// Telegram-specific bot/transport implementation.
pub mod bot;
/// Telegram transport configuration.
pub mod config;
/// Telegram runtime entrypoint.
pub mod runner;
/// Retry helpers for Telegram API calls.
pub mod utils;
