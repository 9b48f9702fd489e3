#![deny(missing_docs)]
//! X-Gate runtime.
//!
//! Transport-agnostic moderation engine and the services around it.

/// Atomically replaceable moderation configuration.
pub mod config_handle;
/// Setup checks for a chat.
pub mod diagnostics;
/// Per-message moderation engine.
pub mod engine;
/// Chat platform capability trait.
pub mod gateway;
/// Deferred removal of transient notices.
pub mod notices;

pub use config_handle::ConfigHandle;
pub use diagnostics::{diagnose, DiagnosticReport, PermissionState, StorageState};
pub use engine::{EngineError, ModerationEngine};
pub use gateway::{AdminCapabilities, ChatGateway, GatewayError, MessageHandle, TextFormat};
pub use notices::{NoticeScheduler, PendingNotice};
