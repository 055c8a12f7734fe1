//! Aggregation engine.
//!
//! A marketplace request is answered from three cached sub-queries: the
//! page items, the total item count and the distinct seller count. The
//! count key depends on the filters only, so a page and the statistics for
//! the same filters always report the same total. When a page disagrees
//! with that total the engine drops the request's keys and rebuilds them
//! from the source.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{CacheClient, KeyGenerator, QueryCache, QueryKey};
use crate::config::{Config, PaginationSettings, QueryKind, TtlPolicy};
use crate::error::{MarketError, Result};
use crate::market::{
    expected_page_len, sort_listings, total_pages, Listing, ListingFilters, ListingSource,
    MarketStats, MarketplaceView, PaginatedResult,
};

const PAGE_NAMESPACE: &str = "listings:page";
const COUNT_NAMESPACE: &str = "listings:count";
const SELLERS_NAMESPACE: &str = "listings:sellers";

#[derive(Serialize)]
struct PageParams<'a> {
    #[serde(flatten)]
    filters: &'a ListingFilters,
    page: u32,
    page_size: u32,
}

/// A validated page request and the keys derived for it.
struct PageRequest {
    filters: ListingFilters,
    page: u32,
    page_size: u32,
    count_key: QueryKey,
    sellers_key: QueryKey,
    page_key: QueryKey,
}

/// Figures gathered for one request before they are assembled.
struct Snapshot {
    total_items: u64,
    distinct_sellers: Option<u64>,
    items: Vec<Listing>,
}

// == Aggregation Engine ==
pub struct AggregationEngine {
    source: Arc<dyn ListingSource>,
    cache: QueryCache,
    keys: KeyGenerator,
    ttl: TtlPolicy,
    pagination: PaginationSettings,
}

impl AggregationEngine {
    /// Creates an engine with default TTLs, pagination bounds and no key prefix.
    pub fn new(source: Arc<dyn ListingSource>, cache: QueryCache) -> Self {
        Self {
            source,
            cache,
            keys: KeyGenerator::default(),
            ttl: TtlPolicy::default(),
            pagination: PaginationSettings::default(),
        }
    }

    pub fn from_config(source: Arc<dyn ListingSource>, client: CacheClient, config: &Config) -> Self {
        Self::new(source, QueryCache::new(client))
            .with_keys(KeyGenerator::new(config.cache.key_prefix.clone()))
            .with_ttl(config.ttl)
            .with_pagination(config.pagination)
    }

    pub fn with_keys(mut self, keys: KeyGenerator) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_ttl(mut self, ttl: TtlPolicy) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_pagination(mut self, pagination: PaginationSettings) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn pagination(&self) -> PaginationSettings {
        self.pagination
    }

    /// Applies the default page size and enforces `1..=max_page_size`.
    pub fn resolve_page_size(&self, page_size: Option<u32>) -> Result<u32> {
        let size = page_size.unwrap_or(self.pagination.default_page_size);
        if size == 0 || size > self.pagination.max_page_size {
            return Err(MarketError::InvalidRequest(format!(
                "page_size must be between 1 and {}",
                self.pagination.max_page_size
            )));
        }
        Ok(size)
    }

    // == Keys ==
    // Derived from the filters as given; requests normalize them first.

    pub fn count_key(&self, filters: &ListingFilters) -> Result<QueryKey> {
        self.keys.generate(COUNT_NAMESPACE, filters)
    }

    pub fn sellers_key(&self, filters: &ListingFilters) -> Result<QueryKey> {
        self.keys.generate(SELLERS_NAMESPACE, filters)
    }

    pub fn page_key(&self, filters: &ListingFilters, page: u32, page_size: u32) -> Result<QueryKey> {
        self.keys.generate(
            PAGE_NAMESPACE,
            &PageParams {
                filters,
                page,
                page_size,
            },
        )
    }

    // == Consumer Operations ==
    /// One page of listings with `total_pages` derived from the cached count.
    pub async fn get_marketplace_page(
        &self,
        filters: ListingFilters,
        page: u32,
        page_size: Option<u32>,
    ) -> Result<PaginatedResult> {
        let request = self.prepare(filters, page, page_size)?;

        let (total_items, items) =
            tokio::try_join!(self.cached_count(&request), self.cached_page(&request))?;

        let snapshot = self
            .reconcile(
                &request,
                Snapshot {
                    total_items,
                    distinct_sellers: None,
                    items,
                },
            )
            .await?;

        Ok(PaginatedResult::new(
            snapshot.items,
            request.page,
            request.page_size,
            snapshot.total_items,
        ))
    }

    /// Item and seller counts for a filter shape.
    pub async fn get_market_stats(&self, filters: ListingFilters) -> Result<MarketStats> {
        let filters = filters.normalized();
        filters.validate()?;

        let count_key = self.count_key(&filters)?;
        let sellers_key = self.sellers_key(&filters)?;

        let (total_items, distinct_sellers) = tokio::try_join!(
            self.cached_total(&count_key, &filters),
            self.cached_sellers(&sellers_key, &filters)
        )?;

        Ok(MarketStats {
            total_items,
            distinct_sellers,
        })
    }

    /// A page and its statistics, both built from the same item count.
    pub async fn get_marketplace_view(
        &self,
        filters: ListingFilters,
        page: u32,
        page_size: Option<u32>,
    ) -> Result<MarketplaceView> {
        let request = self.prepare(filters, page, page_size)?;

        let (total_items, distinct_sellers, items) = tokio::try_join!(
            self.cached_count(&request),
            self.cached_sellers(&request.sellers_key, &request.filters),
            self.cached_page(&request)
        )?;

        let snapshot = self
            .reconcile(
                &request,
                Snapshot {
                    total_items,
                    distinct_sellers: Some(distinct_sellers),
                    items,
                },
            )
            .await?;

        let stats = MarketStats {
            total_items: snapshot.total_items,
            distinct_sellers: snapshot.distinct_sellers.unwrap_or(distinct_sellers),
        };

        Ok(MarketplaceView {
            result: PaginatedResult::new(
                snapshot.items,
                request.page,
                request.page_size,
                snapshot.total_items,
            ),
            stats,
        })
    }

    /// Drops the count, seller and page keys cached for a filter shape.
    ///
    /// Pages `1..=total_pages` are dropped, using the cached count when
    /// present and the source count otherwise. Returns how many keys existed.
    pub async fn invalidate(&self, filters: ListingFilters, page_size: Option<u32>) -> Result<usize> {
        let filters = filters.normalized();
        filters.validate()?;
        let page_size = self.resolve_page_size(page_size)?;

        let count_key = self.count_key(&filters)?;
        let total_items = match self.cache.lookup::<u64>(count_key.as_str()).await {
            Some(total) => total,
            None => self.source.fetch_total_count(&filters).await?,
        };

        let last_page = u32::try_from(total_pages(total_items, page_size))
            .unwrap_or(u32::MAX)
            .max(1);

        let mut keys = vec![count_key, self.sellers_key(&filters)?];
        for page in 1..=last_page {
            keys.push(self.page_key(&filters, page, page_size)?);
        }

        let mut removed = 0;
        for key in &keys {
            if self.cache.invalidate(key.as_str()).await {
                removed += 1;
            }
        }

        info!(removed, pages = last_page, "Listing cache invalidated");
        Ok(removed)
    }

    // == Internals ==
    fn prepare(&self, filters: ListingFilters, page: u32, page_size: Option<u32>) -> Result<PageRequest> {
        let filters = filters.normalized();
        filters.validate()?;

        if page == 0 {
            return Err(MarketError::InvalidRequest(
                "page must be at least 1".to_string(),
            ));
        }
        let page_size = self.resolve_page_size(page_size)?;

        Ok(PageRequest {
            count_key: self.count_key(&filters)?,
            sellers_key: self.sellers_key(&filters)?,
            page_key: self.page_key(&filters, page, page_size)?,
            filters,
            page,
            page_size,
        })
    }

    async fn cached_count(&self, request: &PageRequest) -> Result<u64> {
        self.cached_total(&request.count_key, &request.filters).await
    }

    async fn cached_total(&self, key: &QueryKey, filters: &ListingFilters) -> Result<u64> {
        self.cache
            .get_or_fetch(
                key.as_str(),
                || self.source.fetch_total_count(filters),
                self.ttl.ttl_for(QueryKind::TotalCount),
            )
            .await
    }

    async fn cached_sellers(&self, key: &QueryKey, filters: &ListingFilters) -> Result<u64> {
        self.cache
            .get_or_fetch(
                key.as_str(),
                || self.source.fetch_distinct_seller_count(filters),
                self.ttl.ttl_for(QueryKind::SellerCount),
            )
            .await
    }

    async fn cached_page(&self, request: &PageRequest) -> Result<Vec<Listing>> {
        self.cache
            .get_or_fetch(
                request.page_key.as_str(),
                || self.fetch_sorted_page(request),
                self.ttl.ttl_for(QueryKind::Page),
            )
            .await
    }

    async fn fetch_sorted_page(&self, request: &PageRequest) -> Result<Vec<Listing>> {
        let mut items = self
            .source
            .fetch_page(&request.filters, request.page, request.page_size)
            .await?;
        sort_listings(&mut items);
        Ok(items)
    }

    /// Checks the page against the count and rebuilds both on disagreement.
    async fn reconcile(&self, request: &PageRequest, snapshot: Snapshot) -> Result<Snapshot> {
        let expected = expected_page_len(snapshot.total_items, request.page, request.page_size);
        if snapshot.items.len() == expected {
            return Ok(snapshot);
        }

        warn!(
            page = request.page,
            page_size = request.page_size,
            total_items = snapshot.total_items,
            expected,
            actual = snapshot.items.len(),
            "Page disagrees with item count, refreshing from source"
        );

        for key in [&request.count_key, &request.sellers_key, &request.page_key] {
            self.cache.invalidate(key.as_str()).await;
        }

        let with_sellers = snapshot.distinct_sellers.is_some();
        let (total_items, mut items, distinct_sellers) = tokio::try_join!(
            self.source.fetch_total_count(&request.filters),
            self.fetch_sorted_page(request),
            async {
                if with_sellers {
                    self.source
                        .fetch_distinct_seller_count(&request.filters)
                        .await
                        .map(Some)
                } else {
                    Ok(None)
                }
            }
        )?;

        let expected = expected_page_len(total_items, request.page, request.page_size);
        if items.len() < expected {
            return Err(MarketError::DataSource(format!(
                "page {} returned {} items, expected {} of {}",
                request.page,
                items.len(),
                expected,
                total_items
            )));
        }
        if items.len() > expected {
            debug!(dropped = items.len() - expected, "Truncating oversized page");
            items.truncate(expected);
        }

        self.cache
            .put(
                request.count_key.as_str(),
                &total_items,
                self.ttl.ttl_for(QueryKind::TotalCount),
            )
            .await;
        self.cache
            .put(
                request.page_key.as_str(),
                &items,
                self.ttl.ttl_for(QueryKind::Page),
            )
            .await;
        if let Some(sellers) = distinct_sellers {
            self.cache
                .put(
                    request.sellers_key.as_str(),
                    &sellers,
                    self.ttl.ttl_for(QueryKind::SellerCount),
                )
                .await;
        }

        Ok(Snapshot {
            total_items,
            distinct_sellers,
            items,
        })
    }
}
