//! Marketplace data types: listings, filters, pages and statistics.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MarketError, Result};

// == Listing ==
/// An item-for-sale projection, owned by the data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub seller_id: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Price descending, ties by ascending id.
pub fn compare_listings(a: &Listing, b: &Listing) -> Ordering {
    b.price.total_cmp(&a.price).then_with(|| a.id.cmp(&b.id))
}

/// Sorts listings into marketplace order.
pub fn sort_listings(listings: &mut [Listing]) {
    listings.sort_by(compare_listings);
}

// == Listing Filters ==
/// Filter criteria shared by the page, count and seller sub-queries.
///
/// Absent criteria are skipped during serialization, so they never reach
/// the cache key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    /// Case-insensitive substring of the listing name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl ListingFilters {
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_seller(mut self, seller_id: impl Into<String>) -> Self {
        self.seller_id = Some(seller_id.into());
        self
    }

    pub fn with_price_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_price = min;
        self.max_price = max;
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Trims text criteria and drops empty ones so equivalent requests share keys.
    pub fn normalized(self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        Self {
            category: clean(self.category),
            seller_id: clean(self.seller_id),
            min_price: self.min_price,
            max_price: self.max_price,
            search: clean(self.search),
        }
    }

    /// Rejects non-finite or inverted price bounds.
    pub fn validate(&self) -> Result<()> {
        for (name, bound) in [("min_price", self.min_price), ("max_price", self.max_price)] {
            if bound.is_some_and(|v| !v.is_finite()) {
                return Err(MarketError::InvalidRequest(format!(
                    "{} must be a finite number",
                    name
                )));
            }
        }

        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return Err(MarketError::InvalidRequest(format!(
                    "min_price {} exceeds max_price {}",
                    min, max
                )));
            }
        }
        Ok(())
    }

    /// Returns whether a listing satisfies every present criterion.
    pub fn matches(&self, listing: &Listing) -> bool {
        if self.category.as_ref().is_some_and(|c| *c != listing.category) {
            return false;
        }
        if self.seller_id.as_ref().is_some_and(|s| *s != listing.seller_id) {
            return false;
        }
        if self.min_price.is_some_and(|min| listing.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| listing.price > max) {
            return false;
        }
        if let Some(search) = &self.search {
            if !listing.name.to_lowercase().contains(&search.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

// == Pagination Arithmetic ==
/// `ceil(total_items / page_size)`; zero when there are no items.
pub fn total_pages(total_items: u64, page_size: u32) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total_items.div_ceil(u64::from(page_size))
}

/// Zero-based offset of the first item on a one-based page.
pub fn page_offset(page: u32, page_size: u32) -> u64 {
    u64::from(page.saturating_sub(1)) * u64::from(page_size)
}

/// Number of items a page must hold given the total.
pub fn expected_page_len(total_items: u64, page: u32, page_size: u32) -> usize {
    let offset = page_offset(page, page_size);
    if page == 0 || offset >= total_items {
        return 0;
    }
    (total_items - offset).min(u64::from(page_size)) as usize
}

// == Paginated Result ==
/// One page of listings with the totals it was computed against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedResult {
    pub items: Vec<Listing>,
    pub page: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub total_pages: u64,
}

impl PaginatedResult {
    pub fn new(items: Vec<Listing>, page: u32, page_size: u32, total_items: u64) -> Self {
        Self {
            items,
            page,
            page_size,
            total_items,
            total_pages: total_pages(total_items, page_size),
        }
    }

    /// True when the requested page lies past the last page.
    pub fn is_out_of_range(&self) -> bool {
        u64::from(self.page) > self.total_pages
    }

    pub fn has_next_page(&self) -> bool {
        u64::from(self.page) < self.total_pages
    }
}

// == Market Stats ==
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketStats {
    pub total_items: u64,
    pub distinct_sellers: u64,
}

/// A page together with the statistics for the same filter shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketplaceView {
    pub result: PaginatedResult,
    pub stats: MarketStats,
}
