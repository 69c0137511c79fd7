//! The caching middleware: serve from the store when possible, otherwise run
//! the handler, capture its output, and store it.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::{Middleware, Next};
use crate::cache::{CapturedResponse, ReplayMode, ResponseRecorder, Storage, Ttl, cache_key};
use crate::context::Context;
use crate::router::{IntoHandler, ResponseFuture};
use crate::Response;

/// Request interception over one [`Storage`] with one TTL.
///
/// For each request:
///
/// 1. The key is the request target verbatim ([`cache_key`]).
/// 2. A stored payload is a **hit**. In [`ReplayMode::BodyOnly`] it is sent
///    as the body of a plain `200` with no stored headers; in
///    [`ReplayMode::FullResponse`] the stored status and headers come back too.
/// 3. Otherwise the inner handler runs against a [`ResponseRecorder`], and the
///    captured headers, status, and body are copied to the outgoing response.
/// 4. The payload is stored for the TTL. An unparseable TTL skips this step
///    with a warning; the client still gets the handler's response.
///
/// No store lock is held while the inner handler runs. Concurrent misses on
/// one key each run the handler; the last store wins.
pub struct ResponseCache {
    store: Arc<dyn Storage>,
    ttl: Ttl,
    replay: ReplayMode,
    store_error_responses: bool,
}

impl ResponseCache {
    /// `ttl` is not checked here; see [`Ttl`].
    pub fn new(ttl: impl Into<String>, store: Arc<dyn Storage>) -> Self {
        Self {
            store,
            ttl: Ttl::new(ttl),
            replay: ReplayMode::default(),
            store_error_responses: true,
        }
    }

    #[must_use]
    pub fn replay_mode(mut self, replay: ReplayMode) -> Self {
        self.replay = replay;
        self
    }

    /// Whether 4xx/5xx responses are stored. Defaults to `true`.
    #[must_use]
    pub fn store_error_responses(mut self, enabled: bool) -> Self {
        self.store_error_responses = enabled;
        self
    }

    pub fn ttl(&self) -> &Ttl {
        &self.ttl
    }

    /// Serves `ctx` from the store, or through `inner` on a miss.
    pub async fn handle<F, Fut>(&self, ctx: Context, inner: F) -> Response
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Response>,
    {
        let key = cache_key(ctx.request());

        if let Some(payload) = self.store.get(&key) {
            if let Some(response) = self.replay_hit(&key, payload) {
                debug!(key = %key, "cache hit");
                return response;
            }
        }

        let mut recorder = ResponseRecorder::new();
        inner(ctx).await.write_to(&mut recorder);
        let captured = recorder.finish();

        let mut outgoing = Response::default();
        captured.replay(&mut outgoing);

        self.persist(&key, &captured);
        outgoing
    }

    fn replay_hit(&self, key: &str, payload: Bytes) -> Option<Response> {
        match self.replay {
            ReplayMode::BodyOnly => Some(Response::default().body_bytes(payload)),
            ReplayMode::FullResponse => match CapturedResponse::decode(&payload) {
                Ok(captured) => Some(captured.into_response()),
                Err(e) => {
                    warn!(key = %key, error = %e, "ignoring undecodable cache entry");
                    None
                }
            },
        }
    }

    fn persist(&self, key: &str, captured: &CapturedResponse) {
        if captured.status().is_error() && !self.store_error_responses {
            debug!(key = %key, status = captured.status().as_u16(), "error response not cached");
            return;
        }

        match self.ttl.duration() {
            Ok(ttl) => {
                let payload = match self.replay {
                    ReplayMode::BodyOnly => captured.body().clone(),
                    ReplayMode::FullResponse => captured.encode(),
                };
                self.store.set(key, payload, ttl);
                info!(key = %key, ttl = %self.ttl, "new page cached");
            }
            Err(e) => warn!(key = %key, error = %e, "page not cached"),
        }
    }
}

/// Wraps a route handler so its responses are cached for `ttl`.
///
/// An invalid `ttl` (say `"banana"`) is not reported here. Every request
/// still gets the handler's response, nothing is stored, and each miss
/// logs a warning.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use pagecache::{Router, Response, StatusCode};
/// use pagecache::cache::MemoryStorage;
/// use pagecache::middleware::cached;
///
/// let store = Arc::new(MemoryStorage::new());
/// let mut router = Router::new();
/// router.get("/withCache", cached("10s", store, |_ctx| async {
///     Response::new(StatusCode::Ok).body("slow page")
/// }));
/// ```
pub fn cached<H>(
    ttl: &str,
    store: Arc<dyn Storage>,
    handler: H,
) -> impl Fn(Context) -> ResponseFuture + Send + Sync + 'static
where
    H: IntoHandler,
{
    cached_with(ResponseCache::new(ttl, store), handler)
}

/// Like [`cached`], with a preconfigured [`ResponseCache`].
pub fn cached_with<H>(
    cache: ResponseCache,
    handler: H,
) -> impl Fn(Context) -> ResponseFuture + Send + Sync + 'static
where
    H: IntoHandler,
{
    let cache = Arc::new(cache);
    let handler = Arc::new(handler);
    move |ctx: Context| {
        let cache = Arc::clone(&cache);
        let handler = Arc::clone(&handler);
        let fut: ResponseFuture =
            Box::pin(async move { cache.handle(ctx, |ctx| handler.call(ctx)).await });
        fut
    }
}

/// [`ResponseCache`] as a [`Middleware`] layer.
///
/// Every route behind the layer shares its store, TTL, and replay mode. Keys
/// stay the request target only, so two routes that answer the same target
/// for different methods share one entry.
pub struct CacheMiddleware {
    cache: Arc<ResponseCache>,
}

impl CacheMiddleware {
    pub fn new(cache: ResponseCache) -> Self {
        Self {
            cache: Arc::new(cache),
        }
    }
}

impl Middleware for CacheMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
        let cache = Arc::clone(&self.cache);
        Box::pin(async move { cache.handle(ctx, |ctx| next.run(ctx)).await })
    }
}
