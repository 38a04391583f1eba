//! Tracks remote API quota state and decides when and how long to wait.

use chrono::{DateTime, Utc};
use core::time::Duration;

const LOG_TARGET: &str = "     guard";

/// Extra wait beyond the reported reset time, absorbing clock skew between
/// this machine and the API servers.
pub const RESET_SAFETY_MARGIN: Duration = Duration::from_secs(5);

/// Quota metadata reported by the remote service alongside a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub remaining: usize,
    pub reset_at: DateTime<Utc>,
}

/// Last known quota state, refreshed from response metadata after every
/// remote call.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimitGuard {
    remaining: Option<usize>,
    reset_at: Option<DateTime<Utc>>,
}

impl RateLimitGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh quota state from response metadata, when the response carried
    /// any.
    pub fn observe(&mut self, info: Option<RateLimitInfo>) {
        if let Some(info) = info {
            log::trace!(target: LOG_TARGET, "{} API calls remaining, window resets at {}", info.remaining, info.reset_at);
            self.remaining = Some(info.remaining);
            self.reset_at = Some(info.reset_at);
        }
    }

    /// Record a quota rejection reported by the remote service.
    pub fn mark_exhausted(&mut self, info: RateLimitInfo) {
        self.remaining = Some(0);
        self.reset_at = Some(info.reset_at);
    }

    /// Forget the spent quota after its window has been waited out. The next
    /// response's metadata re-establishes the real state.
    pub fn assume_reset(&mut self) {
        self.remaining = None;
        self.reset_at = None;
    }

    /// The quota is known to be spent and its window has not reset yet.
    /// Unknown state reports not exhausted; the next call settles it.
    pub fn is_exhausted(&self, now: DateTime<Utc>) -> bool {
        self.remaining == Some(0) && self.reset_at.is_some_and(|reset_at| now < reset_at)
    }

    /// How long to suspend before the quota window resets, from `now`.
    pub fn wait_duration(&self, now: DateTime<Utc>) -> Duration {
        let until_reset = self.reset_at.map_or(Duration::ZERO, |reset_at| {
            (reset_at - now).to_std().unwrap_or(Duration::ZERO)
        });

        until_reset + RESET_SAFETY_MARGIN
    }

    pub const fn remaining(&self) -> Option<usize> {
        self.remaining
    }

    pub const fn reset_at(&self) -> Option<DateTime<Utc>> {
        self.reset_at
    }
}
