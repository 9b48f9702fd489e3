use std::sync::{Arc, PoisonError, RwLock};
use xgate_core::config::ModerationConfig;

/// Shared, atomically replaceable moderation configuration.
///
/// Readers take a snapshot once per decision and keep it even if the
/// configuration is replaced meanwhile.
#[derive(Debug)]
pub struct ConfigHandle {
    current: RwLock<Arc<ModerationConfig>>,
}

impl ConfigHandle {
    /// Wrap the initial configuration.
    #[must_use]
    pub fn new(config: ModerationConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// The configuration in effect right now.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ModerationConfig> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Install `config` and return the one it replaces.
    pub fn replace(&self, config: ModerationConfig) -> Arc<ModerationConfig> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(config))
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(ModerationConfig::default())
    }
}
