//! Response caching: storage engines and the pieces the caching middleware
//! is assembled from.
//!
//! A cache entry is addressed by the request target exactly as it arrived
//! (see [`cache_key`]) and holds an opaque byte payload until its time-to-live
//! runs out. Everything here is in-process and in-memory; nothing survives a
//! restart.
//!
//! ## Storage engines
//!
//! - [`MemoryStorage`]: unbounded, sharded by key hash, reader/writer locked.
//! - [`LruStorage`]: bounded by entry count, least-recently-used eviction.
//!
//! Both share one contract: an entry is returned by [`Storage::get`] only
//! while `now < stored_at + ttl`. Past that instant it reads as absent whether
//! or not it has been physically removed yet.
//!
//! ## Capture and replay
//!
//! [`ResponseRecorder`] is a [`ResponseSink`](crate::http::ResponseSink) that
//! records what a handler produced into a [`CapturedResponse`], which can be
//! replayed onto the real outgoing response.
//!
//! ## Concurrency
//!
//! Two concurrent misses for the same key both run the wrapped handler and
//! both store; the last write wins. There is no request coalescing.

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::Request;

mod bounded;
mod capture;
mod entry;
mod error;
mod memory;
mod ttl;

pub use bounded::LruStorage;
pub use capture::{CapturedResponse, ResponseRecorder};
pub use error::CacheError;
pub use memory::MemoryStorage;
pub use ttl::{Ttl, parse_ttl};

/// Key → payload store with per-entry expiration.
///
/// Implementations are shared across request tasks behind an
/// `Arc<dyn Storage>`, so every method takes `&self` and must be safe to call
/// concurrently. None of them fail: a missing or expired entry is `None`,
/// never an error.
pub trait Storage: Send + Sync {
    /// Returns the payload stored under `key` if it has not yet expired.
    fn get(&self, key: &str) -> Option<Bytes>;

    /// Inserts or replaces the entry for `key`, expiring `ttl` from now.
    fn set(&self, key: &str, payload: Bytes, ttl: Duration);

    /// Physically removes every expired entry and returns how many went.
    fn purge_expired(&self) -> usize;

    /// Number of entries currently held, including expired ones not yet purged.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a cache hit sends back to the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayMode {
    /// Only the body is stored. A hit is served as a plain `200` with the
    /// serving layer's default headers; the original status and headers are
    /// not restored.
    #[default]
    BodyOnly,
    /// Status, headers, and body are stored and a hit replays all three.
    FullResponse,
}

/// Derives the cache key for `request`: the request target (path and query
/// string) verbatim, with no normalization.
///
/// ```
/// use pagecache::{Request, cache::cache_key};
///
/// let (req, _) = Request::parse(b"GET /a?y=2&x=1 HTTP/1.1\r\n\r\n").unwrap();
/// assert_eq!(cache_key(&req), "/a?y=2&x=1");
/// ```
pub fn cache_key(request: &Request) -> String {
    request.uri().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_of(raw: &str) -> String {
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        cache_key(&req)
    }

    #[test]
    fn key_is_case_and_order_sensitive() {
        let a = key_of("GET /a?x=1&y=2 HTTP/1.1\r\n\r\n");
        let b = key_of("GET /a?y=2&x=1 HTTP/1.1\r\n\r\n");
        let c = key_of("GET /A?x=1&y=2 HTTP/1.1\r\n\r\n");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn key_ignores_method() {
        let get = key_of("GET /same HTTP/1.1\r\n\r\n");
        let post = key_of("POST /same HTTP/1.1\r\n\r\n");
        assert_eq!(get, post);
    }

    #[test]
    fn replay_mode_serde_names() {
        let mode: ReplayMode = serde_json::from_str("\"full_response\"").unwrap();
        assert_eq!(mode, ReplayMode::FullResponse);
        assert_eq!(serde_json::to_string(&ReplayMode::BodyOnly).unwrap(), "\"body_only\"");
    }
}
