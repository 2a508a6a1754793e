// tests/http_local.rs
//
// Real strategies and the retry loop against a loopback axum server.
// Nothing leaves 127.0.0.1.

mod common;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, routing::get, Router};
use chrono::Duration as ChronoDuration;

use discovery_aggregator::config::fetch::FetchSettings;
use discovery_aggregator::ingest::http::{build_client, send_with_retry, RetryPolicy};
use discovery_aggregator::ingest::providers::{
    FeedStrategy, GithubTrendingStrategy, ProxyRenderStrategy, SearchStrategy,
};
use discovery_aggregator::ingest::types::FetchStrategy;
use discovery_aggregator::registry::StrategyKind;

use common::{manual_clock, source};

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

fn fast_settings() -> FetchSettings {
    FetchSettings {
        retries: 2,
        backoff: Duration::ZERO,
        ..FetchSettings::default()
    }
}

fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name))
        .expect("fixture")
}

/// Router that answers 503 for the first `failures` hits, then `body`.
fn flaky(failures: usize, body: String, hits: Arc<AtomicUsize>) -> Router {
    Router::new().fallback(move || {
        let hits = hits.clone();
        let body = body.clone();
        async move {
            let n = hits.fetch_add(1, Ordering::SeqCst);
            if n < failures {
                (StatusCode::SERVICE_UNAVAILABLE, String::from("busy"))
            } else {
                (StatusCode::OK, body)
            }
        }
    })
}

#[tokio::test]
async fn retry_recovers_within_budget() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = serve(flaky(2, "ok".into(), hits.clone())).await;
    let settings = fast_settings();
    let client = build_client(&settings).unwrap();
    let url = format!("http://{addr}/thing");

    let resp = send_with_retry(
        || client.get(&url),
        RetryPolicy::new(&settings, Duration::from_secs(5)),
        "flaky",
    )
    .await
    .expect("third attempt succeeds");
    assert_eq!(resp.text().await.unwrap(), "ok");
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_gives_up_with_last_status() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = serve(flaky(10, "ok".into(), hits.clone())).await;
    let settings = FetchSettings {
        retries: 1,
        ..fast_settings()
    };
    let client = build_client(&settings).unwrap();
    let url = format!("http://{addr}/thing");

    let err = send_with_retry(
        || client.get(&url),
        RetryPolicy::new(&settings, Duration::from_secs(5)),
        "flaky",
    )
    .await
    .expect_err("always 503");
    assert_eq!(err.to_string(), "flaky status 503");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn feed_results_are_cached_until_ttl() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = serve(flaky(0, fixture("sample_rss.xml"), hits.clone())).await;
    let settings = fast_settings();
    let clock = manual_clock();
    let strategy = FeedStrategy::new(build_client(&settings).unwrap(), &settings, clock.clone());

    let mut src = source("eng", 0.5, &["tech"], vec![]);
    src.url = format!("http://{addr}/feed.xml");

    let first = strategy.execute(&src, 3).await.expect("feed");
    assert!(!first.from_cache);
    assert_eq!(first.items.len(), 2, "link-less entry is dropped");
    assert_eq!(first.items[0].source_id, "eng");

    let second = strategy.execute(&src, 3).await.expect("feed");
    assert!(second.from_cache);
    assert_eq!(second.items, first.items);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    clock.advance(ChronoDuration::minutes(11));
    let third = strategy.execute(&src, 3).await.expect("feed");
    assert!(!third.from_cache);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn proxy_render_goes_through_the_proxy_base() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = serve(flaky(0, fixture("rendered_page.md"), hits.clone())).await;
    let settings = FetchSettings {
        proxy_base: format!("http://{addr}/"),
        ..fast_settings()
    };
    let strategy = ProxyRenderStrategy::new(build_client(&settings).unwrap(), &settings);

    let mut src = source("example-blog", 0.5, &["ai"], vec![]);
    src.strategy = StrategyKind::ProxyRender;
    src.url = "https://blog.example.ai/".into();

    let batch = strategy.execute(&src, 4).await.expect("render");
    assert_eq!(batch.items.len(), 2);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn trending_api_payload_is_mapped() {
    let payload = fixture("github_trending.json");
    let app = Router::new().route(
        "/repositories",
        get(move || {
            let body = payload.clone();
            async move { ([("content-type", "application/json")], body) }
        }),
    );
    let addr = serve(app).await;
    let settings = fast_settings();
    let strategy = GithubTrendingStrategy::new(build_client(&settings).unwrap(), &settings);

    let mut src = source("github-trending", 0.5, &["github"], vec![]);
    src.strategy = StrategyKind::GithubTrending;
    src.url = format!("http://{addr}/repositories");

    let batch = strategy.execute(&src, 1).await.expect("trending");
    let titles: Vec<_> = batch.items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, vec!["tokio-rs/axum", "someone/tool"]);
}

#[tokio::test]
async fn empty_feed_is_not_cached() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let full = fixture("sample_rss.xml");
    let app = Router::new().fallback(move || {
        let hits = counter.clone();
        let full = full.clone();
        async move {
            if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                String::from(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>x</title></channel></rss>"#)
            } else {
                full
            }
        }
    });
    let addr = serve(app).await;
    let settings = fast_settings();
    let strategy = FeedStrategy::new(build_client(&settings).unwrap(), &settings, manual_clock());

    let mut src = source("eng", 0.5, &["tech"], vec![]);
    src.url = format!("http://{addr}/feed.xml");

    let first = strategy.execute(&src, 3).await.expect("empty feed still parses");
    assert!(first.items.is_empty());

    let second = strategy.execute(&src, 3).await.expect("feed");
    assert!(!second.from_cache);
    assert_eq!(second.items.len(), 2);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn empty_search_response_is_not_cached() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let full = fixture("search_results.json");
    let app = Router::new().fallback(move || {
        let hits = counter.clone();
        let full = full.clone();
        async move {
            let body = if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                String::from(r#"{"search_metadata":{"status":"Success"}}"#)
            } else {
                full
            };
            ([("content-type", "application/json")], body)
        }
    });
    let addr = serve(app).await;
    let settings = FetchSettings {
        serpapi_key: Some("serp-test".into()),
        ..fast_settings()
    };
    let strategy = SearchStrategy::new(build_client(&settings).unwrap(), &settings, manual_clock());

    let mut src = source("chip-search", 0.5, &["tech"], vec![]);
    src.strategy = StrategyKind::Search;
    src.url = format!("http://{addr}/search.json");

    let first = strategy.execute(&src, 3).await.expect("empty payload still parses");
    assert!(first.items.is_empty());

    let second = strategy.execute(&src, 3).await.expect("search");
    assert!(!second.from_cache);
    assert_eq!(second.items.len(), 2);
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    let third = strategy.execute(&src, 3).await.expect("search");
    assert!(third.from_cache);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}
