//! Request routing: map URL patterns and HTTP methods to handler functions.
//!
//! | Pattern              | Example match              | Captured params                 |
//! |----------------------|----------------------------|---------------------------------|
//! | `/users`             | `/users`                   | *(none)*                        |
//! | `/users/:id`         | `/users/42`                | `id → "42"`                     |
//! | `/files/*`           | `/files/docs/readme.txt`   | `wildcard → "/docs/readme.txt"` |
//!
//! Trailing slashes are normalized on both patterns and incoming paths. Routes
//! are matched in registration order; the first match wins. Matching looks at
//! the path only, never the query string, so `/page?a=1` and `/page?a=2` reach
//! the same handler (and, when it is cached, two different cache entries).
//!
//! Middleware added with [`Router::layer`] wraps every matched route.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::middleware::{Middleware, MiddlewareHandler, Next, from_middleware};
use crate::{Method, Request, Response, StatusCode};

/// The boxed future every type-erased handler returns.
pub type ResponseFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Type-erased, shareable async handler.
pub type Handler = Arc<dyn Fn(Context) -> ResponseFuture + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this through the blanket impl, including
/// the closures returned by [`cached`](crate::middleware::cached).
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> ResponseFuture;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> ResponseFuture {
        Box::pin((self)(ctx))
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter(String),
}

#[derive(Debug, Clone)]
enum Pattern {
    // `/users`
    Exact(String),
    // `/users/:id`
    Parameterized { segments: Vec<Segment> },
    // `/files/*`, stored without the `/*`
    Wildcard(String),
}

fn trim_trailing_slash(path: &str) -> &str {
    if path != "/" {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

impl Pattern {
    fn parse(pattern: &str) -> Self {
        let pattern = trim_trailing_slash(pattern);

        if let Some(prefix) = pattern.strip_suffix("/*") {
            return Pattern::Wildcard(prefix.to_string());
        }

        if pattern.contains(':') {
            let segments = pattern
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| match s.strip_prefix(':') {
                    Some(name) => Segment::Parameter(name.to_string()),
                    None => Segment::Static(s.to_string()),
                })
                .collect();
            return Pattern::Parameterized { segments };
        }

        Pattern::Exact(pattern.to_string())
    }

    fn matches(&self, path: &str) -> Option<PathParams> {
        let path = trim_trailing_slash(path);

        match self {
            Pattern::Exact(p) => (p == path).then(PathParams::new),
            Pattern::Parameterized { segments } => {
                let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                if segments.len() != path_segments.len() {
                    return None;
                }

                let mut params = PathParams::new();
                for (seg, path_seg) in segments.iter().zip(path_segments) {
                    match seg {
                        Segment::Static(s) if s != path_seg => return None,
                        Segment::Static(_) => {}
                        Segment::Parameter(name) => {
                            params.insert(name.clone(), path_seg.to_string());
                        }
                    }
                }
                Some(params)
            }
            Pattern::Wildcard(prefix) => {
                let suffix = path.strip_prefix(prefix.as_str())?;
                let mut params = PathParams::new();
                params.insert("wildcard".to_string(), suffix.to_string());
                Some(params)
            }
        }
    }
}

struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

impl Route {
    fn matches(&self, method: &Method, path: &str) -> Option<PathParams> {
        if &self.method == method {
            self.pattern.matches(path)
        } else {
            None
        }
    }
}

/// HTTP request router.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use pagecache::{Router, Response, StatusCode};
/// use pagecache::cache::MemoryStorage;
/// use pagecache::middleware::cached;
///
/// let store = Arc::new(MemoryStorage::new());
/// let mut router = Router::new();
///
/// router.get("/ping", |_ctx| async { Response::new(StatusCode::Ok) });
/// router.get(
///     "/report",
///     cached("5m", store, |_ctx| async {
///         Response::new(StatusCode::Ok).body("expensive")
///     }),
/// );
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    middlewares: Vec<MiddlewareHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    pub fn put(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Put, path, handler);
    }

    pub fn delete(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Delete, path, handler);
    }

    /// Registers `handler` for `method` requests matching `path`.
    pub fn route_method(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        self.add_route(method, path, handler);
    }

    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.routes.push(Route {
            method,
            pattern: Pattern::parse(path),
            handler,
        });
    }

    /// Appends a middleware layer. Layers run in the order they were added,
    /// outermost first, around whichever route matched.
    pub fn layer<M>(&mut self, middleware: M)
    where
        M: Middleware + 'static,
    {
        self.middlewares.push(from_middleware(Arc::new(middleware)));
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatches `request` to the first matching route, through any layers.
    /// Unmatched requests get a bare `404 Not Found` without running layers.
    pub async fn route(&self, request: Request) -> Response {
        let path = request.path();

        for route in &self.routes {
            if let Some(params) = route.matches(request.method(), path) {
                let ctx = Context::with_params(request, params);
                if self.middlewares.is_empty() {
                    return (route.handler)(ctx).await;
                }

                let endpoint = Arc::clone(&route.handler);
                let mut chain = self.middlewares.clone();
                chain.push(Arc::new(move |ctx: Context, _next: Next| endpoint(ctx)));
                return Next::new(chain).run(ctx).await;
            }
        }

        Response::new(StatusCode::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn make_request(method: &str, target: &str) -> Request {
        let raw = format!("{method} {target} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    #[test]
    fn pattern_parse_variants() {
        assert!(matches!(Pattern::parse("/"), Pattern::Exact(s) if s == "/"));
        assert!(matches!(Pattern::parse("/users/"), Pattern::Exact(s) if s == "/users"));
        assert!(matches!(Pattern::parse("/files/*"), Pattern::Wildcard(s) if s == "/files"));
        match Pattern::parse("/users/:id/posts/:post_id") {
            Pattern::Parameterized { segments } => {
                assert_eq!(segments.len(), 4);
                assert!(matches!(&segments[1], Segment::Parameter(s) if s == "id"));
                assert!(matches!(&segments[2], Segment::Static(s) if s == "posts"));
            }
            other => panic!("expected Parameterized, got {other:?}"),
        }
    }

    #[test]
    fn pattern_matching() {
        assert!(Pattern::parse("/users").matches("/users/").is_some());
        assert!(Pattern::parse("/users").matches("/posts").is_none());

        let params = Pattern::parse("/users/:id").matches("/users/42").unwrap();
        assert_eq!(params.get("id"), Some("42"));
        assert!(Pattern::parse("/users/:id").matches("/posts/42").is_none());
        assert!(Pattern::parse("/users/:id").matches("/users/42/extra").is_none());

        let params = Pattern::parse("/files/*").matches("/files/docs/readme.txt").unwrap();
        assert_eq!(params.get("wildcard"), Some("/docs/readme.txt"));
    }

    #[tokio::test]
    async fn unmatched_returns_404() {
        let mut router = Router::new();
        router.get("/hello", |_ctx| async { Response::new(StatusCode::Ok) });
        assert_eq!(router.route(make_request("GET", "/world")).await.status(), StatusCode::NotFound);
        assert_eq!(router.route(make_request("POST", "/hello")).await.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn query_string_does_not_affect_matching() {
        let mut router = Router::new();
        router.get("/page", |ctx: Context| async move {
            let q = ctx.request().query_param("n").unwrap_or("").to_owned();
            Response::new(StatusCode::Ok).body(q)
        });
        let res = router.route(make_request("GET", "/page?n=7")).await;
        assert_eq!(res.body_ref(), b"7");
    }

    #[tokio::test]
    async fn first_matching_route_wins() {
        let mut router = Router::new();
        router.get("/path", |_ctx| async { Response::new(StatusCode::Ok) });
        router.get("/path", |_ctx| async { Response::new(StatusCode::Accepted) });
        assert_eq!(router.len(), 2);
        assert_eq!(router.route(make_request("GET", "/path")).await.status(), StatusCode::Ok);
    }

    struct Tagging(&'static str, Arc<AtomicUsize>);

    impl Middleware for Tagging {
        fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
            let tag = self.0;
            let seen = Arc::clone(&self.1);
            Box::pin(async move {
                seen.fetch_add(1, Ordering::SeqCst);
                let mut res = next.run(ctx).await;
                res.add_header("X-Layer", tag);
                res
            })
        }
    }

    #[tokio::test]
    async fn layers_wrap_matched_routes_in_order() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut router = Router::new();
        router.layer(Tagging("outer", Arc::clone(&seen)));
        router.layer(Tagging("inner", Arc::clone(&seen)));
        router.get("/x", |_ctx| async { Response::new(StatusCode::Ok) });

        let res = router.route(make_request("GET", "/x")).await;
        let layers: Vec<_> = res.headers().get_all("x-layer").collect();
        assert_eq!(layers, vec!["inner", "outer"]);
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        router.route(make_request("GET", "/missing")).await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
