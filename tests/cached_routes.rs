use std::future::{Ready, ready};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pagecache::context::Context;
use pagecache::{MemoryStorage, Response, Router, Server, StatusCode, Storage, cached};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn start(router: Router) -> SocketAddr {
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    tokio::spawn(server.serve(router));
    addr
}

async fn get(addr: SocketAddr, target: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request =
        format!("GET {target} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    String::from_utf8(raw).unwrap()
}

fn body(response: &str) -> &str {
    response.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or("")
}

fn counting_page(calls: Arc<AtomicUsize>) -> impl Fn(Context) -> Ready<Response> + Send + Sync {
    move |ctx: Context| {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        ready(
            Response::new(StatusCode::Ok)
                .header("Content-Type", "text/html")
                .body(format!("<p>{} #{n}</p>", ctx.request().uri())),
        )
    }
}

#[tokio::test]
async fn second_request_is_served_from_cache() {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(MemoryStorage::new());

    let mut router = Router::new();
    router.get("/withCache", cached("10s", store.clone(), counting_page(calls.clone())));
    let addr = start(router).await;

    let miss = get(addr, "/withCache").await;
    let hit = get(addr, "/withCache").await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(body(&miss), "<p>/withCache #1</p>");
    assert_eq!(body(&hit), body(&miss));
    assert_eq!(store.len(), 1);

    // Only the body is replayed; the handler's content type is not.
    assert!(miss.to_ascii_lowercase().contains("content-type: text/html"));
    assert!(hit.to_ascii_lowercase().contains("content-type: text/plain"));
    assert!(hit.starts_with("HTTP/1.1 200 OK\r\n"));
}

#[tokio::test]
async fn query_string_is_part_of_the_key() {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(MemoryStorage::new());

    let mut router = Router::new();
    router.get("/page", cached("1m", store.clone(), counting_page(calls.clone())));
    let addr = start(router).await;

    get(addr, "/page?x=1").await;
    get(addr, "/page?x=2").await;
    let again = get(addr, "/page?x=1").await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(body(&again), "<p>/page?x=1 #1</p>");
    assert!(store.get("/page?x=1").is_some());
    assert!(store.get("/page?x=2").is_some());
}

#[tokio::test]
async fn bad_ttl_still_serves_every_request() {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(MemoryStorage::new());

    let mut router = Router::new();
    router.get("/x", cached("banana", store.clone(), counting_page(calls.clone())));
    let addr = start(router).await;

    let first = get(addr, "/x").await;
    let second = get(addr, "/x").await;

    assert!(first.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body(&first), "<p>/x #1</p>");
    assert_eq!(body(&second), "<p>/x #2</p>");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(store.is_empty());
}

#[tokio::test]
async fn uncached_route_runs_every_time() {
    let calls = Arc::new(AtomicUsize::new(0));

    let mut router = Router::new();
    router.get("/withoutCache", counting_page(calls.clone()));
    let addr = start(router).await;

    get(addr, "/withoutCache").await;
    let second = get(addr, "/withoutCache").await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(body(&second), "<p>/withoutCache #2</p>");
}
