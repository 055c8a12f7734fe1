//! API Routes
//!
//! Configures the Axum router with all marketplace endpoints.

use axum::{
    routing::{delete, get},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    health_handler, invalidate_handler, listings_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/listings", get(listings_handler))
        .route("/listings/cache", delete(invalidate_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheClient, ClientOptions, MemoryBackend, QueryCache};
    use crate::market::{AggregationEngine, InMemoryCatalog};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::util::ServiceExt;

    async fn create_test_app() -> Router {
        let client = CacheClient::new(Arc::new(MemoryBackend::new()), ClientOptions::default());
        client.connect().await.unwrap();
        let engine = AggregationEngine::new(
            Arc::new(InMemoryCatalog::default()),
            QueryCache::new(client),
        );
        create_router(AppState::new(engine))
    }

    async fn status_of(method: &str, uri: &str) -> StatusCode {
        create_test_app()
            .await
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        assert_eq!(status_of("GET", "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_listings_endpoint() {
        assert_eq!(status_of("GET", "/listings?page=1").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        assert_eq!(status_of("GET", "/stats?category=tools").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalidate_endpoint() {
        assert_eq!(status_of("DELETE", "/listings/cache").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_page_is_bad_request() {
        assert_eq!(
            status_of("GET", "/listings?page=0").await,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_unknown_route() {
        assert_eq!(status_of("GET", "/get/key").await, StatusCode::NOT_FOUND);
    }
}
