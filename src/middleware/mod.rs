//! Middleware pipeline: composable before/after request handler logic.
//!
//! Each middleware receives the request [`Context`] and a [`Next`] cursor into
//! the rest of the chain. It may pass the request through, answer it directly
//! (short-circuit), or decorate the downstream response.
//!
//! ## Provided middleware
//!
//! - [`LoggerMiddleware`]: one `tracing` line per request.
//! - [`CacheMiddleware`]: the response cache as a router-wide layer.
//!
//! For caching a single route, wrap its handler with [`cached`] instead.

use std::sync::Arc;
use tokio::time::Instant;

use crate::router::ResponseFuture;
use crate::{Response, context::Context};

mod cache;

pub use cache::{CacheMiddleware, ResponseCache, cached, cached_with};

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so each middleware can forward a
/// request at most once.
pub struct Next {
    middlewares: Vec<MiddlewareHandler>,
    index: usize,
}

/// A type-erased, reference-counted middleware function.
pub type MiddlewareHandler = Arc<dyn Fn(Context, Next) -> ResponseFuture + Send + Sync + 'static>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

impl Next {
    pub fn new(middlewares: Vec<MiddlewareHandler>) -> Self {
        Self {
            middlewares,
            index: 0,
        }
    }

    /// Invokes the next middleware in the chain and returns its response.
    ///
    /// An exhausted chain answers `500 Internal Server Error`: the last entry
    /// is expected to be an endpoint that never calls `run`.
    pub async fn run(mut self, ctx: Context) -> Response {
        if self.index < self.middlewares.len() {
            let handler = Arc::clone(&self.middlewares[self.index]);
            self.index += 1;
            handler(ctx, self).await
        } else {
            Response::new(crate::StatusCode::InternalServerError)
                .body("No response generated by middleware pipeline")
        }
    }
}

/// The core trait for all middleware.
///
/// Middleware is shared across Tokio tasks, so implementations must be
/// `Send + Sync` and must return a `Send` future that owns everything it
/// touches.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture;
}

/// Logs `METHOD /target - STATUS (duration)` after each response.
///
/// The target includes the query string, i.e. the same string the response
/// cache keys on, so log lines and cache entries can be matched up.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().to_string();
            let target = ctx.request().uri().to_string();

            let response = next.run(ctx).await;

            tracing::info!(
                "{} {} - {} ({:?})",
                method,
                target,
                response.status().as_u16(),
                start.elapsed()
            );

            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Request, StatusCode};

    fn ctx(target: &str) -> Context {
        let raw = format!("GET {target} HTTP/1.1\r\n\r\n");
        Context::new(Request::parse(raw.as_bytes()).unwrap().0)
    }

    #[tokio::test]
    async fn empty_chain_is_500() {
        let res = Next::new(vec![]).run(ctx("/")).await;
        assert_eq!(res.status(), StatusCode::InternalServerError);
    }

    #[tokio::test]
    async fn logger_passes_response_through() {
        let endpoint: MiddlewareHandler = Arc::new(|_ctx: Context, _next: Next| {
            Box::pin(async { Response::new(StatusCode::Accepted).body("ok") }) as ResponseFuture
        });
        let chain = vec![from_middleware(Arc::new(LoggerMiddleware)), endpoint];
        let res = Next::new(chain).run(ctx("/log?me=1")).await;
        assert_eq!(res.status(), StatusCode::Accepted);
        assert_eq!(res.body_ref(), b"ok");
    }
}
