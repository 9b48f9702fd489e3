//! Sliding-window quota evaluation.
//!
//! The window is the trailing seven days ending at evaluation time. It is
//! recomputed from the event log on every call and never cached.

use crate::config::ModerationConfig;
use crate::storage::{EventStore, StorageError};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;

/// Length of the quota window in days.
pub const QUOTA_WINDOW_DAYS: i64 = 7;

/// The quota window as a duration.
#[must_use]
pub fn quota_window() -> TimeDelta {
    TimeDelta::days(QUOTA_WINDOW_DAYS)
}

/// Outcome of checking a candidate against the weekly quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaCheck {
    /// Whether the candidate fits in the quota.
    pub allowed: bool,
    /// Links already counted in the window, candidate excluded.
    pub current_count: u32,
    /// Links left after accepting the candidate; 0 when rejected.
    pub remaining: u32,
}

impl QuotaCheck {
    /// Pure quota arithmetic. Reaching the maximum exactly is allowed.
    ///
    /// # Examples
    ///
    /// ```
    /// use xgate_core::limiter::QuotaCheck;
    ///
    /// assert!(QuotaCheck::evaluate(2, 1, 3).allowed);
    /// assert_eq!(QuotaCheck::evaluate(2, 1, 3).remaining, 0);
    /// assert!(!QuotaCheck::evaluate(3, 1, 3).allowed);
    /// ```
    #[must_use]
    pub const fn evaluate(current_count: u32, candidate: u32, max: u32) -> Self {
        // Widened so an overflowing sum still compares above any max.
        let total = current_count as u64 + candidate as u64;
        if total > max as u64 {
            Self {
                allowed: false,
                current_count,
                remaining: 0,
            }
        } else {
            Self {
                allowed: true,
                current_count,
                // total <= max, so neither subtraction can underflow.
                remaining: max - current_count - candidate,
            }
        }
    }
}

/// Quota usage report for a user in a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaStatus {
    /// Links counted in the current window.
    pub count: u32,
    /// Configured weekly maximum.
    pub max: u32,
    /// Links still available.
    pub remaining: u32,
    /// When the oldest counted link leaves the window.
    pub next_slot_at: Option<DateTime<Utc>>,
}

/// Weekly quota over the link event log.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn EventStore>,
}

impl RateLimiter {
    /// Create a limiter reading from `store`.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// The underlying event log.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Start of the window ending at `now`.
    #[must_use]
    pub fn window_start(now: DateTime<Utc>) -> DateTime<Utc> {
        now - quota_window()
    }

    /// Links counted for a user in a chat in the window ending at `now`.
    ///
    /// # Errors
    ///
    /// Returns a `StorageError` if the event log cannot be read.
    pub async fn current_count(
        &self,
        user_id: i64,
        chat_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u32, StorageError> {
        self.store
            .count_since(user_id, chat_id, Self::window_start(now))
            .await
    }

    /// Check whether `candidate` more links fit in the quota.
    ///
    /// The caller decides what a candidate is (every link, or the whole
    /// message as one).
    ///
    /// # Errors
    ///
    /// Returns a `StorageError` if the event log cannot be read.
    pub async fn evaluate(
        &self,
        user_id: i64,
        chat_id: i64,
        candidate: u32,
        config: &ModerationConfig,
        now: DateTime<Utc>,
    ) -> Result<QuotaCheck, StorageError> {
        let current = self.current_count(user_id, chat_id, now).await?;
        Ok(QuotaCheck::evaluate(
            current,
            candidate,
            config.max_links_per_week,
        ))
    }

    /// Usage report, including when the next slot frees up.
    ///
    /// # Errors
    ///
    /// Returns a `StorageError` if the event log cannot be read.
    pub async fn status(
        &self,
        user_id: i64,
        chat_id: i64,
        config: &ModerationConfig,
        now: DateTime<Utc>,
    ) -> Result<QuotaStatus, StorageError> {
        let events = self
            .store
            .events_since(user_id, chat_id, Self::window_start(now))
            .await?;
        let count = u32::try_from(events.len()).unwrap_or(u32::MAX);
        Ok(QuotaStatus {
            count,
            max: config.max_links_per_week,
            remaining: config.max_links_per_week.saturating_sub(count),
            next_slot_at: events.first().map(|e| e.timestamp + quota_window()),
        })
    }
}
