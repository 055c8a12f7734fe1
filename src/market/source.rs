//! Listing data sources.
//!
//! The aggregation engine reads listings through [`ListingSource`]. The
//! in-memory catalog backs tests and single-node deployments; the REST
//! source lives in `rest.rs`.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{MarketError, Result};
use crate::market::{page_offset, sort_listings, Listing, ListingFilters};

/// Query interface of the external listing store.
///
/// Pages must be ordered by price descending with ties broken by ascending
/// id, so that page windows are stable between requests.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Listings on a one-based page.
    async fn fetch_page(
        &self,
        filters: &ListingFilters,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Listing>>;

    /// Number of listings matching the filters.
    async fn fetch_total_count(&self, filters: &ListingFilters) -> Result<u64>;

    /// Number of distinct sellers among matching listings.
    async fn fetch_distinct_seller_count(&self, filters: &ListingFilters) -> Result<u64>;
}

// == In-Memory Catalog ==
/// Listing store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    listings: RwLock<Vec<Listing>>,
}

impl InMemoryCatalog {
    pub fn new(listings: Vec<Listing>) -> Self {
        Self {
            listings: RwLock::new(listings),
        }
    }

    /// Loads listings from a JSON array file.
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            MarketError::DataSource(format!("cannot read {}: {}", path.display(), e))
        })?;
        let listings: Vec<Listing> = serde_json::from_str(&raw)?;

        info!(count = listings.len(), path = %path.display(), "Listings loaded");
        Ok(Self::new(listings))
    }

    /// Adds or replaces a listing by id.
    pub async fn upsert(&self, listing: Listing) {
        let mut listings = self.listings.write().await;
        match listings.iter_mut().find(|l| l.id == listing.id) {
            Some(existing) => *existing = listing,
            None => listings.push(listing),
        }
    }

    /// Removes a listing, returning whether it existed.
    pub async fn remove(&self, id: i64) -> bool {
        let mut listings = self.listings.write().await;
        let before = listings.len();
        listings.retain(|l| l.id != id);
        listings.len() != before
    }

    pub async fn len(&self) -> usize {
        self.listings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.listings.read().await.is_empty()
    }

    async fn matching(&self, filters: &ListingFilters) -> Vec<Listing> {
        self.listings
            .read()
            .await
            .iter()
            .filter(|l| filters.matches(l))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ListingSource for InMemoryCatalog {
    async fn fetch_page(
        &self,
        filters: &ListingFilters,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Listing>> {
        let mut matching = self.matching(filters).await;
        sort_listings(&mut matching);

        let offset = usize::try_from(page_offset(page, page_size)).unwrap_or(usize::MAX);
        Ok(matching
            .into_iter()
            .skip(offset)
            .take(page_size as usize)
            .collect())
    }

    async fn fetch_total_count(&self, filters: &ListingFilters) -> Result<u64> {
        let listings = self.listings.read().await;
        Ok(listings.iter().filter(|l| filters.matches(l)).count() as u64)
    }

    async fn fetch_distinct_seller_count(&self, filters: &ListingFilters) -> Result<u64> {
        let listings = self.listings.read().await;
        let sellers: HashSet<&str> = listings
            .iter()
            .filter(|l| filters.matches(l))
            .map(|l| l.seller_id.as_str())
            .collect();
        Ok(sellers.len() as u64)
    }
}
