//! API Handlers
//!
//! HTTP request handlers for each marketplace endpoint.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};

use crate::cache::CacheClient;
use crate::error::Result;
use crate::market::{AggregationEngine, MarketStats, MarketplaceView};
use crate::models::{HealthResponse, InvalidateResponse, ListingsQuery};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AggregationEngine>,
    /// Client behind the engine's query cache, kept for health reporting
    pub cache: CacheClient,
}

impl AppState {
    pub fn new(engine: AggregationEngine) -> Self {
        let cache = engine.cache().client().clone();
        Self {
            engine: Arc::new(engine),
            cache,
        }
    }
}

/// Handler for GET /listings
///
/// Returns one page of listings together with the market stats for the
/// same filters.
pub async fn listings_handler(
    State(state): State<AppState>,
    Query(query): Query<ListingsQuery>,
) -> Result<Json<MarketplaceView>> {
    let view = state
        .engine
        .get_marketplace_view(query.filters(), query.page(), query.page_size)
        .await?;

    Ok(Json(view))
}

/// Handler for GET /stats
pub async fn stats_handler(
    State(state): State<AppState>,
    Query(query): Query<ListingsQuery>,
) -> Result<Json<MarketStats>> {
    let stats = state.engine.get_market_stats(query.filters()).await?;
    Ok(Json(stats))
}

/// Handler for DELETE /listings/cache
///
/// Drops every cached page and count for the given filters.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Query(query): Query<ListingsQuery>,
) -> Result<Json<InvalidateResponse>> {
    let invalidated = state
        .engine
        .invalidate(query.filters(), query.page_size)
        .await?;

    Ok(Json(InvalidateResponse { invalidated }))
}

/// Handler for GET /health
///
/// Always answers 200: a cache outage slows requests but does not fail them.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::from_cache(state.cache.info().await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ClientOptions, MemoryBackend, QueryCache};
    use crate::error::MarketError;
    use crate::market::{InMemoryCatalog, Listing};

    async fn test_state(count: i64) -> (AppState, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let client = CacheClient::new(backend.clone(), ClientOptions::default());
        client.connect().await.unwrap();

        let catalog = InMemoryCatalog::new(
            (1..=count)
                .map(|id| Listing {
                    id,
                    name: format!("Item {}", id),
                    price: id as f64,
                    seller_id: format!("seller-{}", id % 3),
                    category: "tools".to_string(),
                    description: None,
                    created_at: None,
                })
                .collect(),
        );
        let engine = AggregationEngine::new(Arc::new(catalog), QueryCache::new(client));
        (AppState::new(engine), backend)
    }

    #[tokio::test]
    async fn test_listings_handler() {
        let (state, _) = test_state(25).await;
        let query = ListingsQuery {
            page: Some(2),
            ..Default::default()
        };

        let view = listings_handler(State(state), Query(query)).await.unwrap();
        assert_eq!(view.result.items.len(), 5);
        assert_eq!(view.result.total_pages, 2);
        assert_eq!(view.stats.total_items, 25);
        assert_eq!(view.stats.distinct_sellers, 3);
    }

    #[tokio::test]
    async fn test_listings_handler_rejects_bad_page_size() {
        let (state, _) = test_state(5).await;
        let query = ListingsQuery {
            page_size: Some(0),
            ..Default::default()
        };

        let result = listings_handler(State(state), Query(query)).await;
        assert!(matches!(result, Err(MarketError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let (state, _) = test_state(10).await;
        let query = ListingsQuery {
            min_price: Some(6.0),
            ..Default::default()
        };

        let stats = stats_handler(State(state), Query(query)).await.unwrap();
        assert_eq!(stats.total_items, 5);
    }

    #[tokio::test]
    async fn test_invalidate_handler() {
        let (state, _) = test_state(10).await;
        listings_handler(State(state.clone()), Query(ListingsQuery::default()))
            .await
            .unwrap();

        let response = invalidate_handler(State(state), Query(ListingsQuery::default()))
            .await
            .unwrap();
        assert_eq!(response.invalidated, 3);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let (state, backend) = test_state(1).await;

        let response = health_handler(State(state.clone())).await;
        assert_eq!(response.status, "healthy");

        backend.set_available(false);
        state.cache.ping().await;

        let response = health_handler(State(state.clone())).await;
        assert_eq!(response.status, "degraded");
        assert!(!response.cache.connected);
        state.cache.disconnect().await;
    }
}
