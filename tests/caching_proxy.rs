//! End-to-end tests: a real proxy in front of a raw TCP upstream.

mod common;

use axum::http::{Method, Uri};
use caching_proxy::cache::{CacheKey, CachedResponse};
use common::{client, config_for, start_programmable_backend, start_proxy, MockResponse};

fn target(upstream: &common::MockUpstream, path: &str) -> String {
    format!("{}?__host={}&__proto=http", path, upstream.addr)
}

#[tokio::test]
async fn test_miss_then_hit_fetches_upstream_once() {
    let upstream = start_programmable_backend(|_| {
        MockResponse::new(200, r#"{"name":"x"}"#)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "https://upstream.example")
    })
    .await;
    let proxy = start_proxy(config_for(&upstream)).await;
    let url = proxy.url(&target(&upstream, "/repos/x"));

    let first = client().get(&url).send().await.unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(first.headers()["x-cache"], "miss");
    assert!(first.headers().get("access-control-allow-origin").is_none());
    assert_eq!(first.headers()["content-type"], "application/json");
    assert_eq!(first.text().await.unwrap(), r#"{"name":"x"}"#);

    let second = client().get(&url).send().await.unwrap();
    assert_eq!(second.status(), 200);
    assert_eq!(second.headers()["x-cache"], "hit");
    assert!(second.headers().get("access-control-allow-origin").is_none());
    assert_eq!(second.text().await.unwrap(), r#"{"name":"x"}"#);

    assert_eq!(upstream.hits(), 1);
    assert_eq!(proxy.server_cache.len(), 1);
    proxy.stop();
}

#[tokio::test]
async fn test_upstream_sees_clean_request() {
    let upstream = start_programmable_backend(|_| MockResponse::new(200, "ok")).await;
    let proxy = start_proxy(config_for(&upstream)).await;

    let url = proxy.url(&format!(
        "/repos/x?page=2&__host={}&__proto=http&per_page=5",
        upstream.addr
    ));
    let response = client()
        .get(&url)
        .header("Cookie", "session=secret")
        .header("If-None-Match", "\"abc\"")
        .header("Cache-Control", "no-cache")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let requests = upstream.requests();
    assert_eq!(requests.len(), 1);
    let head = requests[0].to_ascii_lowercase();
    assert!(head.starts_with("get /repos/x?page=2&per_page=5 http/1.1"), "{}", head);
    assert!(!head.contains("__host"));
    assert!(!head.contains("__proto"));
    assert!(!head.contains("cookie:"));
    assert!(!head.contains("if-none-match:"));
    assert!(!head.contains("cache-control:"));
    assert!(head.contains(&format!("host: {}", upstream.addr)));
    proxy.stop();
}

#[tokio::test]
async fn test_not_found_is_never_cached() {
    let upstream = start_programmable_backend(|_| MockResponse::new(404, "missing")).await;
    let proxy = start_proxy(config_for(&upstream)).await;
    let url = proxy.url(&target(&upstream, "/repos/gone"));

    for _ in 0..2 {
        let response = client().get(&url).send().await.unwrap();
        assert_eq!(response.status(), 404);
        assert_eq!(response.headers()["x-cache"], "miss");
        assert_eq!(response.text().await.unwrap(), "missing");
    }

    assert_eq!(upstream.hits(), 2);
    assert!(proxy.server_cache.is_empty());
    proxy.stop();
}

#[tokio::test]
async fn test_empty_body_is_not_cached() {
    let upstream = start_programmable_backend(|_| MockResponse::new(200, "")).await;
    let proxy = start_proxy(config_for(&upstream)).await;
    let url = proxy.url(&target(&upstream, "/empty"));

    for _ in 0..2 {
        let response = client().get(&url).send().await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["x-cache"], "miss");
    }

    assert_eq!(upstream.hits(), 2);
    assert!(proxy.server_cache.is_empty());
    proxy.stop();
}

#[tokio::test]
async fn test_disallowed_host_is_not_forwarded() {
    let upstream = start_programmable_backend(|_| MockResponse::new(200, "ok")).await;
    let proxy = start_proxy(config_for(&upstream)).await;

    let response = client()
        .get(proxy.url("/repos/x?__host=evil.example&__proto=http"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
    assert_eq!(upstream.hits(), 0);
    assert!(proxy.server_cache.is_empty());
    proxy.stop();
}

#[tokio::test]
async fn test_reject_unknown_hosts_answers_bad_request() {
    let upstream = start_programmable_backend(|_| MockResponse::new(200, "ok")).await;
    let mut config = config_for(&upstream);
    config.upstream.reject_unknown_hosts = true;
    let proxy = start_proxy(config).await;

    let missing = client().get(proxy.url("/repos/x")).send().await.unwrap();
    assert_eq!(missing.status(), 400);

    let denied = client()
        .get(proxy.url("/repos/x?__host=evil.example"))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 400);

    assert_eq!(upstream.hits(), 0);
    proxy.stop();
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    // Bind then drop to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);

    let mut config = caching_proxy::ProxyConfig::default();
    config.upstream.allowed_hosts = vec![dead.to_string()];
    let proxy = start_proxy(config).await;

    let response = client()
        .get(proxy.url(&format!("/repos/x?__host={}&__proto=http", dead)))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
    assert!(proxy.server_cache.is_empty());
    proxy.stop();
}

#[tokio::test]
async fn test_distinct_queries_are_cached_separately() {
    let upstream = start_programmable_backend(|head| {
        if head.contains("page=2") {
            MockResponse::new(200, "page two")
        } else {
            MockResponse::new(200, "page one")
        }
    })
    .await;
    let proxy = start_proxy(config_for(&upstream)).await;

    let one = proxy.url(&format!("/items?page=1&__host={}&__proto=http", upstream.addr));
    let two = proxy.url(&format!("/items?page=2&__host={}&__proto=http", upstream.addr));

    assert_eq!(client().get(&one).send().await.unwrap().text().await.unwrap(), "page one");
    assert_eq!(client().get(&two).send().await.unwrap().text().await.unwrap(), "page two");
    assert_eq!(client().get(&one).send().await.unwrap().text().await.unwrap(), "page one");

    assert_eq!(upstream.hits(), 2);
    assert_eq!(proxy.server_cache.len(), 2);
    proxy.stop();
}

#[tokio::test]
async fn test_hop_by_hop_request_headers_not_forwarded() {
    let upstream = start_programmable_backend(|_| MockResponse::new(200, "ok")).await;
    let proxy = start_proxy(config_for(&upstream)).await;

    let response = client()
        .get(proxy.url(&target(&upstream, "/repos/x")))
        .header("Proxy-Authorization", "Basic abc")
        .header("Connection", "keep-alive, X-Private")
        .header("X-Private", "secret")
        .header("Keep-Alive", "timeout=5")
        .header("Accept", "application/json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let requests = upstream.requests();
    assert_eq!(requests.len(), 1);
    let head = requests[0].to_ascii_lowercase();
    assert!(!head.contains("proxy-authorization"), "{}", head);
    assert!(!head.contains("x-private"), "{}", head);
    assert!(!head.contains("keep-alive: timeout=5"), "{}", head);
    assert!(head.contains("accept: application/json"), "{}", head);
    proxy.stop();
}

#[tokio::test]
async fn test_hop_by_hop_response_headers_not_cached() {
    let upstream = start_programmable_backend(|_| {
        MockResponse::new(200, "payload")
            .header("Keep-Alive", "timeout=5")
            .header("Upgrade", "h2c")
    })
    .await;
    let proxy = start_proxy(config_for(&upstream)).await;
    let url = proxy.url(&target(&upstream, "/repos/x"));

    for expected in ["miss", "hit"] {
        let response = client().get(&url).send().await.unwrap();
        assert_eq!(response.headers()["x-cache"], expected);
        assert!(response.headers().get("keep-alive").is_none());
        assert!(response.headers().get("upgrade").is_none());
        assert_eq!(response.text().await.unwrap(), "payload");
    }
    assert_eq!(upstream.hits(), 1);

    let host = upstream.addr.to_string();
    let uri: Uri = format!("http://{}/repos/x", host).parse().unwrap();
    let stored = proxy
        .server_cache
        .get(&CacheKey::new(&Method::GET, &host, &uri))
        .expect("snapshot stored");
    let snapshot = CachedResponse::decode(&stored).unwrap();
    for name in ["connection", "keep-alive", "upgrade"] {
        assert!(snapshot.headers.iter().all(|field| field.name != name), "{} cached", name);
    }
    assert!(!snapshot.close);
    proxy.stop();
}

#[tokio::test]
async fn test_encoded_body_passes_through_undecoded() {
    let upstream = start_programmable_backend(|_| {
        MockResponse::new(200, "not-really-gzip").header("Content-Encoding", "gzip")
    })
    .await;
    let proxy = start_proxy(config_for(&upstream)).await;
    let url = proxy.url(&target(&upstream, "/archive"));

    for _ in 0..2 {
        let response = client().get(&url).send().await.unwrap();
        assert_eq!(response.headers()["content-encoding"], "gzip");
        assert_eq!(response.bytes().await.unwrap().as_ref(), b"not-really-gzip");
    }

    let host = upstream.addr.to_string();
    let uri: Uri = format!("http://{}/archive", host).parse().unwrap();
    let stored = proxy
        .server_cache
        .get(&CacheKey::new(&Method::GET, &host, &uri))
        .expect("snapshot stored");
    assert!(!CachedResponse::decode(&stored).unwrap().uncompressed);
    proxy.stop();
}
