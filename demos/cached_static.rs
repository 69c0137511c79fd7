//! Two slow static pages, one cached and one not.
//!
//! ```text
//! cargo run --example cached_static
//! curl -i http://127.0.0.1:8080/withoutCache   # two seconds, every time
//! curl -i http://127.0.0.1:8080/withCache      # two seconds, then instant for 10s
//! ```
//!
//! Set `PAGECACHE_CONFIG` to a JSON cache config to change the store, the
//! sweep interval, or the `/withCache` TTL. `PAGECACHE_ADDR` overrides the
//! listen address. Log verbosity follows `RUST_LOG`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pagecache::context::Context;
use pagecache::middleware::LoggerMiddleware;
use pagecache::{CacheConfig, Response, Router, Server, StatusCode, Sweeper, cached_with};
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_TTL: &str = "10s";
const RENDER_DELAY: Duration = Duration::from_secs(2);

async fn slow_page(dir: &'static str) -> Response {
    tokio::time::sleep(RENDER_DELAY).await;

    let path: PathBuf = [env!("CARGO_MANIFEST_DIR"), "demos", "static", dir, "index.html"]
        .iter()
        .collect();
    match tokio::fs::read(&path).await {
        Ok(html) => Response::new(StatusCode::Ok)
            .header("Content-Type", "text/html; charset=utf-8")
            .body_bytes(html),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "page missing");
            Response::new(StatusCode::NotFound).body("Not Found")
        }
    }
}

fn load_config() -> Result<CacheConfig, Box<dyn std::error::Error>> {
    match std::env::var_os("PAGECACHE_CONFIG") {
        Some(path) => Ok(CacheConfig::from_path(path)?),
        None => Ok(CacheConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    let store = config.build_storage()?;
    let _sweeper = config
        .sweep_interval()?
        .map(|every| Sweeper::spawn(Arc::clone(&store), every));

    let ttl = config.ttl_for("/withCache").unwrap_or(DEFAULT_TTL);

    let mut router = Router::new();
    router.layer(LoggerMiddleware);
    router.get("/withoutCache", |_ctx: Context| slow_page("withoutCache"));
    router.get(
        "/withCache",
        cached_with(
            config.response_cache(ttl, Arc::clone(&store)),
            |_ctx: Context| slow_page("withCache"),
        ),
    );

    let addr = std::env::var("PAGECACHE_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_owned());
    let server = Server::bind(&addr).await?;
    println!("Listening on http://{}", server.local_addr());
    server.serve(router).await?;
    Ok(())
}
