use crate::gateway::ChatGateway;
use std::sync::Arc;
use tracing::warn;
use xgate_core::config::ModerationConfig;
use xgate_core::storage::EventStore;

/// What the bot may do in the diagnosed chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionState {
    /// Administrator with the delete right; moderation is active.
    CanDelete,
    /// Administrator, but the delete right is missing.
    AdminWithoutDelete,
    /// Plain member.
    NotAdmin,
    /// The platform could not be asked.
    Unknown {
        /// Machine-readable reason code.
        reason: &'static str,
    },
}

/// Health of the event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageState {
    /// Reachable.
    Healthy,
    /// Not reachable.
    Unavailable {
        /// Machine-readable reason code.
        reason: &'static str,
    },
}

/// Result of [`diagnose`].
#[derive(Debug, Clone)]
pub struct DiagnosticReport {
    /// Bot rights in the chat.
    pub permission: PermissionState,
    /// Event log health.
    pub storage: StorageState,
    /// Configuration in effect.
    pub config: Arc<ModerationConfig>,
}

impl DiagnosticReport {
    /// Whether messages in the chat are being moderated.
    #[must_use]
    pub fn is_operational(&self) -> bool {
        self.permission == PermissionState::CanDelete && self.storage == StorageState::Healthy
    }
}

/// Check the bot's setup in `chat_id`. Never fails: problems are reported.
pub async fn diagnose(
    gateway: &dyn ChatGateway,
    store: &dyn EventStore,
    config: Arc<ModerationConfig>,
    chat_id: i64,
) -> DiagnosticReport {
    let permission = match gateway.get_admin_capabilities(chat_id).await {
        Ok(caps) if caps.can_delete_messages => PermissionState::CanDelete,
        Ok(caps) if caps.is_admin => PermissionState::AdminWithoutDelete,
        Ok(_) => PermissionState::NotAdmin,
        Err(e) => {
            warn!(chat_id, error = %e, "Diagnostics: permission query failed");
            PermissionState::Unknown { reason: e.reason() }
        }
    };

    let storage = match store.check_connection().await {
        Ok(()) => StorageState::Healthy,
        Err(e) => {
            warn!(chat_id, error = %e, "Diagnostics: storage check failed");
            StorageState::Unavailable { reason: e.reason() }
        }
    };

    DiagnosticReport {
        permission,
        storage,
        config,
    }
}
