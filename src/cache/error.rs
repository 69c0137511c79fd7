use thiserror::Error;

/// Errors raised by the response cache.
///
/// None of these abort a request: an invalid TTL means the response is served
/// but not stored, and an undecodable stored payload is treated as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid cache TTL {ttl:?}: {source}")]
    InvalidTtl {
        ttl: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("stored response is malformed: {0}")]
    MalformedPayload(#[from] httparse::Error),

    #[error("stored response is truncated")]
    IncompletePayload,

    #[error("stored response has unsupported status code {0}")]
    UnknownStatus(u16),
}
