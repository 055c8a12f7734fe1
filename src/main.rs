//! Market Cache - cache-backed query aggregation for a listings marketplace
//!
//! Serves paginated listings and market statistics over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use market_cache::api::{create_router, AppState};
use market_cache::cache::CacheClient;
use market_cache::config::{Config, DataSourceSettings};
use market_cache::market::{AggregationEngine, InMemoryCatalog, ListingSource, RestListingSource};

/// Main entry point for the marketplace service.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache client and connect (failure leaves it degraded)
/// 4. Build the listing source and the aggregation engine
/// 5. Start HTTP server on configured port
/// 6. On SIGINT/SIGTERM, drain and disconnect the cache
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "market_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Market Cache service");

    let config = Config::from_env();
    info!(
        "Configuration loaded: backend={:?}, cache={}:{}/{}, page_ttl={:?}, stats_ttl={:?}, port={}",
        config.cache.backend,
        config.cache.host,
        config.cache.port,
        config.cache.db,
        config.ttl.page,
        config.ttl.stats,
        config.server_port
    );

    let cache = CacheClient::from_settings(&config.cache).context("invalid cache settings")?;
    if let Err(e) = cache.connect().await {
        warn!(error = %e, "Starting without cache, requests go straight to the data source");
    }

    let source = build_source(&config.data_source).await?;
    let engine = AggregationEngine::from_config(source, cache.clone(), &config);
    let app = create_router(AppState::new(engine));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    cache.disconnect().await;
    info!("Server shutdown complete");
    Ok(())
}

/// REST source when a base URL is configured, otherwise the in-memory catalog.
async fn build_source(settings: &DataSourceSettings) -> anyhow::Result<Arc<dyn ListingSource>> {
    if settings.base_url.is_some() {
        let source = RestListingSource::from_settings(settings)?;
        info!("Using REST listing source");
        return Ok(Arc::new(source));
    }

    let catalog = match &settings.listings_file {
        Some(path) => InMemoryCatalog::from_json_file(path)
            .await
            .with_context(|| format!("cannot load listings from {}", path))?,
        None => {
            warn!("No data source configured, serving an empty catalog");
            InMemoryCatalog::default()
        }
    };
    Ok(Arc::new(catalog))
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
