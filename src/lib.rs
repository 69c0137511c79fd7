//! # pagecache
//!
//! In-memory HTTP response caching for an async HTTP/1.1 server.
//!
//! A cached route answers its first request by running the real handler and
//! recording the response body under the request target (path plus query).
//! Until the entry's TTL runs out, later requests for the same target are
//! answered from memory without touching the handler.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use pagecache::{MemoryStorage, Response, Router, Server, StatusCode, cached};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStorage::new());
//!
//!     let mut router = Router::new();
//!     router.get(
//!         "/report",
//!         cached("10s", store, |_ctx| async {
//!             Response::new(StatusCode::Ok).body("expensive page")
//!         }),
//!     );
//!
//!     Server::bind("127.0.0.1:8080").await?.serve(router).await?;
//!     Ok(())
//! }
//! ```

pub mod background;
pub mod cache;
pub mod config;
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;

pub use background::Sweeper;
pub use cache::{LruStorage, MemoryStorage, ReplayMode, Storage};
pub use config::{CacheConfig, ConfigError};
pub use http::{Headers, Method, Request, Response, ResponseSink, StatusCode};
pub use middleware::{CacheMiddleware, ResponseCache, cached, cached_with};
pub use router::Router;
pub use server::{Server, ServerError};
