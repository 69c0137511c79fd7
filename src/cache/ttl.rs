use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use super::CacheError;

/// Parses a TTL string such as `"10s"`, `"5m"`, or `"1h 30m"`.
///
/// # Errors
///
/// Returns [`CacheError::InvalidTtl`] when `raw` is not a duration.
///
/// ```
/// use std::time::Duration;
/// use pagecache::cache::parse_ttl;
///
/// assert_eq!(parse_ttl("5m").unwrap(), Duration::from_secs(300));
/// assert!(parse_ttl("banana").is_err());
/// ```
pub fn parse_ttl(raw: &str) -> Result<Duration, CacheError> {
    humantime::parse_duration(raw.trim()).map_err(|source| CacheError::InvalidTtl {
        ttl: raw.to_owned(),
        source,
    })
}

/// A route's time-to-live, kept as written and parsed on first use.
///
/// Registering a route never fails because of its TTL. The string is parsed
/// the first time a response needs storing, and that outcome (duration or
/// error) is reused for every later request.
#[derive(Debug)]
pub struct Ttl {
    raw: String,
    parsed: OnceLock<Result<Duration, CacheError>>,
}

impl Ttl {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            parsed: OnceLock::new(),
        }
    }

    /// Returns the parsed duration, parsing on the first call.
    pub fn duration(&self) -> Result<Duration, &CacheError> {
        match self.parsed.get_or_init(|| parse_ttl(&self.raw)) {
            Ok(ttl) => Ok(*ttl),
            Err(e) => Err(e),
        }
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_units() {
        assert_eq!(parse_ttl("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_ttl("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_ttl("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_ttl(" 2m ").unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn garbage_is_rejected() {
        for raw in ["banana", "", "10", "-5s"] {
            let err = parse_ttl(raw).unwrap_err();
            assert!(matches!(err, CacheError::InvalidTtl { ref ttl, .. } if ttl == raw));
        }
    }

    #[test]
    fn ttl_parses_lazily_and_remembers() {
        let ttl = Ttl::new("banana");
        assert!(ttl.parsed.get().is_none());
        assert!(ttl.duration().is_err());
        assert!(ttl.parsed.get().is_some());
        assert!(ttl.duration().is_err());
        assert_eq!(ttl.to_string(), "banana");

        let ttl = Ttl::new("10s");
        assert_eq!(ttl.duration().unwrap(), Duration::from_secs(10));
    }
}
