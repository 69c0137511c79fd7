//! Cache configuration, loadable from JSON.
//!
//! ```json
//! {
//!   "capacity": 10000,
//!   "sweep_interval": "30s",
//!   "replay": "body_only",
//!   "store_error_responses": true,
//!   "routes": [
//!     { "path": "/withCache", "ttl": "10s" }
//!   ]
//! }
//! ```
//!
//! Every field is optional. Route TTLs are deliberately not validated on
//! load: like TTLs passed to [`cached`](crate::middleware::cached), a bad
//! one only shows up as "page not cached" warnings once requests arrive.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{LruStorage, MemoryStorage, ReplayMode, Storage};
use crate::middleware::ResponseCache;

/// Errors produced while loading or applying a [`CacheConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid cache config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("capacity must be at least 1")]
    ZeroCapacity,

    #[error("shards must be at least 1")]
    ZeroShards,

    #[error("invalid sweep_interval {value:?}: {source}")]
    InvalidSweepInterval {
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("sweep_interval must be greater than zero")]
    ZeroSweepInterval,
}

/// A path and the TTL string its responses are cached for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteTtl {
    pub path: String,
    pub ttl: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Entry limit. `None` selects the unbounded [`MemoryStorage`].
    pub capacity: Option<usize>,
    /// Lock shards for the unbounded store.
    pub shards: usize,
    /// How often expired entries are physically purged. `None` disables the sweeper.
    pub sweep_interval: Option<String>,
    pub replay: ReplayMode,
    pub store_error_responses: bool,
    pub routes: Vec<RouteTtl>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: None,
            shards: MemoryStorage::DEFAULT_SHARDS,
            sweep_interval: None,
            replay: ReplayMode::BodyOnly,
            store_error_responses: true,
            routes: Vec::new(),
        }
    }
}

impl CacheConfig {
    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == Some(0) {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.shards == 0 {
            return Err(ConfigError::ZeroShards);
        }
        self.sweep_interval()?;
        Ok(())
    }

    pub fn sweep_interval(&self) -> Result<Option<Duration>, ConfigError> {
        let Some(raw) = self.sweep_interval.as_deref() else {
            return Ok(None);
        };
        let interval = humantime::parse_duration(raw.trim()).map_err(|source| {
            ConfigError::InvalidSweepInterval {
                value: raw.to_owned(),
                source,
            }
        })?;
        if interval.is_zero() {
            return Err(ConfigError::ZeroSweepInterval);
        }
        Ok(Some(interval))
    }

    /// Builds the store this config describes.
    pub fn build_storage(&self) -> Result<Arc<dyn Storage>, ConfigError> {
        match self.capacity {
            Some(capacity) => {
                let capacity = NonZeroUsize::new(capacity).ok_or(ConfigError::ZeroCapacity)?;
                Ok(Arc::new(LruStorage::new(capacity)))
            }
            None if self.shards == 0 => Err(ConfigError::ZeroShards),
            None => Ok(Arc::new(MemoryStorage::with_shards(self.shards))),
        }
    }

    /// Returns the configured TTL string for `path`, if the path is listed.
    pub fn ttl_for(&self, path: &str) -> Option<&str> {
        self.routes
            .iter()
            .find(|route| route.path == path)
            .map(|route| route.ttl.as_str())
    }

    /// A [`ResponseCache`] over `store` with this config's replay policy.
    pub fn response_cache(&self, ttl: &str, store: Arc<dyn Storage>) -> ResponseCache {
        ResponseCache::new(ttl, store)
            .replay_mode(self.replay)
            .store_error_responses(self.store_error_responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = CacheConfig::from_json("{}").unwrap();
        assert_eq!(config, CacheConfig::default());
        assert_eq!(config.sweep_interval().unwrap(), None);
    }

    #[test]
    fn full_document() {
        let config = CacheConfig::from_json(
            r#"{
                "capacity": 2,
                "sweep_interval": "30s",
                "replay": "full_response",
                "store_error_responses": false,
                "routes": [{ "path": "/withCache", "ttl": "10s" }]
            }"#,
        )
        .unwrap();
        assert_eq!(config.capacity, Some(2));
        assert_eq!(config.sweep_interval().unwrap(), Some(Duration::from_secs(30)));
        assert_eq!(config.replay, ReplayMode::FullResponse);
        assert_eq!(config.ttl_for("/withCache"), Some("10s"));
        assert_eq!(config.ttl_for("/withoutCache"), None);
    }

    #[test]
    fn bad_route_ttl_is_accepted_at_load() {
        let config =
            CacheConfig::from_json(r#"{"routes":[{"path":"/x","ttl":"banana"}]}"#).unwrap();
        assert_eq!(config.ttl_for("/x"), Some("banana"));
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            CacheConfig::from_json(r#"{"capacity":0}"#),
            Err(ConfigError::ZeroCapacity)
        ));
        assert!(matches!(
            CacheConfig::from_json(r#"{"shards":0}"#),
            Err(ConfigError::ZeroShards)
        ));
        assert!(matches!(
            CacheConfig::from_json(r#"{"sweep_interval":"often"}"#),
            Err(ConfigError::InvalidSweepInterval { .. })
        ));
        assert!(matches!(
            CacheConfig::from_json(r#"{"sweep_interval":"0s"}"#),
            Err(ConfigError::ZeroSweepInterval)
        ));
        assert!(matches!(
            CacheConfig::from_json(r#"{"ttl":"10s"}"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn build_storage_picks_engine() {
        let unbounded = CacheConfig::default().build_storage().unwrap();
        let bounded = CacheConfig {
            capacity: Some(1),
            ..CacheConfig::default()
        }
        .build_storage()
        .unwrap();

        for key in ["a", "b"] {
            unbounded.set(key, bytes::Bytes::from_static(b"x"), Duration::from_secs(60));
            bounded.set(key, bytes::Bytes::from_static(b"x"), Duration::from_secs(60));
        }
        assert_eq!(unbounded.len(), 2);
        assert_eq!(bounded.len(), 1);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = CacheConfig::from_path("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
