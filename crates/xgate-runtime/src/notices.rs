use crate::gateway::{ChatGateway, MessageHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

/// Deletes transient notices after a fixed delay.
///
/// Each removal runs on its own Tokio task; scheduling never blocks.
#[derive(Clone)]
pub struct NoticeScheduler {
    gateway: Arc<dyn ChatGateway>,
    delay: Duration,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

/// A scheduled removal that has not necessarily run yet.
#[derive(Debug, Clone)]
pub struct PendingNotice {
    handle: MessageHandle,
    cancel: CancellationToken,
}

impl PendingNotice {
    /// The notice to be removed.
    #[must_use]
    pub const fn handle(&self) -> MessageHandle {
        self.handle
    }

    /// Keep the notice; the pending removal is dropped.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether [`cancel`](Self::cancel) was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl NoticeScheduler {
    /// Create a scheduler deleting through `gateway` after `delay`.
    #[must_use]
    pub fn new(gateway: Arc<dyn ChatGateway>, delay: Duration) -> Self {
        Self {
            gateway,
            delay,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Configured removal delay.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Number of removals still running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Delete `handle` once the delay has elapsed.
    ///
    /// After [`shutdown`](Self::shutdown) the message is deleted right away.
    /// Deletion failures are logged at debug level and otherwise ignored.
    pub fn schedule_removal(&self, handle: MessageHandle) -> PendingNotice {
        let cancel = CancellationToken::new();
        let pending = PendingNotice {
            handle,
            cancel: cancel.clone(),
        };

        let gateway = Arc::clone(&self.gateway);
        let shutdown = self.shutdown.clone();
        let delay = self.delay;

        self.tracker.spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(chat_id = handle.chat_id, message_id = handle.message_id, "Notice removal cancelled");
                    return;
                }
                () = shutdown.cancelled() => {}
                () = tokio::time::sleep(delay) => {}
            }

            if let Err(e) = gateway.delete_message(handle).await {
                debug!(
                    chat_id = handle.chat_id,
                    message_id = handle.message_id,
                    error = %e,
                    "Failed to remove notice"
                );
            }
        });

        pending
    }

    /// Remove every pending notice now and wait for all removal tasks.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}
