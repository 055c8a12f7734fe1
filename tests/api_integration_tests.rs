//! Integration Tests for API Endpoints
//!
//! Tests full request/response cycle for each endpoint against the memory
//! cache backend and an in-memory catalog.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use market_cache::{
    api::create_router,
    cache::{CacheClient, ClientOptions, MemoryBackend, QueryCache},
    market::{AggregationEngine, InMemoryCatalog, Listing},
    AppState,
};
use serde_json::Value;
use tower::ServiceExt;

// == Helper Functions ==

fn listing(id: i64) -> Listing {
    Listing {
        id,
        name: if id % 2 == 0 {
            format!("Hand Saw {}", id)
        } else {
            format!("Novel {}", id)
        },
        price: (id * 3 % 50) as f64,
        seller_id: format!("seller-{}", id % 7),
        category: if id % 2 == 0 { "tools" } else { "books" }.to_string(),
        description: None,
        created_at: None,
    }
}

struct TestApp {
    router: Router,
    catalog: Arc<InMemoryCatalog>,
    backend: Arc<MemoryBackend>,
    client: CacheClient,
}

async fn create_test_app(count: i64) -> TestApp {
    let backend = Arc::new(MemoryBackend::new());
    let client = CacheClient::new(backend.clone(), ClientOptions::default());
    client.connect().await.unwrap();

    let catalog = Arc::new(InMemoryCatalog::new((1..=count).map(listing).collect()));
    let engine = AggregationEngine::new(catalog.clone(), QueryCache::new(client.clone()));

    TestApp {
        router: create_router(AppState::new(engine)),
        catalog,
        backend,
        client,
    }
}

async fn send(app: &TestApp, method: &str, uri: &str) -> (StatusCode, Value) {
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// == Listings Endpoint Tests ==

#[tokio::test]
async fn test_listings_pagination_scenario() {
    let app = create_test_app(55).await;

    let (status, first) = send(&app, "GET", "/listings?page=1&page_size=20").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["result"]["items"].as_array().unwrap().len(), 20);
    assert_eq!(first["result"]["total_pages"], 3);
    assert_eq!(first["stats"]["total_items"], 55);

    let (_, third) = send(&app, "GET", "/listings?page=3&page_size=20").await;
    assert_eq!(third["result"]["items"].as_array().unwrap().len(), 15);

    let (status, fourth) = send(&app, "GET", "/listings?page=4&page_size=20").await;
    assert_eq!(status, StatusCode::OK);
    assert!(fourth["result"]["items"].as_array().unwrap().is_empty());
    assert_eq!(fourth["result"]["total_pages"], 3);
}

#[tokio::test]
async fn test_listings_are_price_ordered() {
    let app = create_test_app(30).await;

    let (_, body) = send(&app, "GET", "/listings?page_size=30").await;
    let items = body["result"]["items"].as_array().unwrap();
    let keys: Vec<(f64, i64)> = items
        .iter()
        .map(|item| (item["price"].as_f64().unwrap(), item["id"].as_i64().unwrap()))
        .collect();

    assert!(keys
        .windows(2)
        .all(|w| w[0].0 > w[1].0 || (w[0].0 == w[1].0 && w[0].1 < w[1].1)));
}

#[tokio::test]
async fn test_listings_filters() {
    let app = create_test_app(40).await;

    let (status, body) = send(&app, "GET", "/listings?category=tools&q=saw&max_price=30").await;
    assert_eq!(status, StatusCode::OK);

    let items = body["result"]["items"].as_array().unwrap();
    assert!(!items.is_empty());
    assert!(items.iter().all(|item| {
        item["category"] == "tools" && item["price"].as_f64().unwrap() <= 30.0
    }));
    assert_eq!(body["stats"]["total_items"].as_u64().unwrap(), items.len() as u64);
}

#[tokio::test]
async fn test_filter_order_shares_cache_entries() {
    let app = create_test_app(20).await;

    send(&app, "GET", "/listings?category=tools&page=2&page_size=5").await;
    let keys_after_first = app.client.info().await.key_count;

    send(&app, "GET", "/listings?page_size=5&page=2&category=tools").await;
    let info = app.client.info().await;

    assert_eq!(info.key_count, keys_after_first);
    assert_eq!(info.hits, 3);
}

#[tokio::test]
async fn test_invalid_pagination_is_bad_request() {
    let app = create_test_app(5).await;

    for uri in [
        "/listings?page=0",
        "/listings?page_size=0",
        "/listings?page_size=500",
        "/listings?min_price=10&max_price=1",
    ] {
        let (status, body) = send(&app, "GET", uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(body["error"].as_str().unwrap().contains("Invalid request"));
    }
}

// == Stats Endpoint Tests ==

#[tokio::test]
async fn test_stats_endpoint() {
    let app = create_test_app(21).await;

    let (status, body) = send(&app, "GET", "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_items"], 21);
    assert_eq!(body["distinct_sellers"], 7);
}

#[tokio::test]
async fn test_stats_for_empty_result_are_zero() {
    let app = create_test_app(10).await;

    let (status, body) = send(&app, "GET", "/stats?category=furniture").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_items"], 0);
    assert_eq!(body["distinct_sellers"], 0);
}

#[tokio::test]
async fn test_stats_agree_with_listings() {
    let app = create_test_app(33).await;

    let (_, view) = send(&app, "GET", "/listings?category=books").await;
    app.catalog.upsert(listing(101)).await;
    let (_, stats) = send(&app, "GET", "/stats?category=books").await;

    assert_eq!(stats["total_items"], view["result"]["total_items"]);
}

// == Invalidation Endpoint Tests ==

#[tokio::test]
async fn test_invalidate_then_refresh() {
    let app = create_test_app(10).await;

    send(&app, "GET", "/listings").await;
    app.catalog.upsert(listing(11)).await;

    let (status, body) = send(&app, "DELETE", "/listings/cache").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["invalidated"], 3);

    let (_, view) = send(&app, "GET", "/listings").await;
    assert_eq!(view["result"]["total_items"], 11);
    assert_eq!(view["stats"]["total_items"], 11);
}

// == Health Endpoint Tests ==

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app(1).await;

    let (status, body) = send(&app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["cache"]["state"], "connected");
    assert!(body["timestamp"].is_string());
}

// == Degraded Mode Tests ==

#[tokio::test]
async fn test_cache_outage_still_serves_correct_results() {
    let app = create_test_app(25).await;
    let (_, healthy) = send(&app, "GET", "/listings?page=2&page_size=10").await;

    app.backend.set_available(false);
    let (status, degraded) = send(&app, "GET", "/listings?page=2&page_size=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(degraded, healthy);

    let (status, health) = send(&app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");

    app.client.disconnect().await;
}
