use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

/// A stored payload and the instant it stops being valid.
///
/// `expires_at` is `None` when `stored_at + ttl` does not fit in an
/// `Instant`; such an entry never expires.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    payload: Bytes,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    pub(crate) fn new(payload: Bytes, ttl: Duration, now: Instant) -> Self {
        Self {
            payload,
            expires_at: now.checked_add(ttl),
        }
    }

    pub(crate) fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }

    pub(crate) fn payload(&self) -> &Bytes {
        &self.payload
    }
}
