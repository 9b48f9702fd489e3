#![deny(missing_docs)]
//! X-Gate core library.
//!
//! Link detection, quota accounting and the moderation decision chain,
//! plus the persistent link event log.

/// Configuration management.
pub mod config;
/// Quota evaluation over the link event log.
pub mod limiter;
/// Target link extraction and context measurement.
pub mod links;
/// Message model and the pure moderation decision chain.
pub mod moderation;
/// Link event log (SQLite).
pub mod storage;
