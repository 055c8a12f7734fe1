//! Request DTOs for the marketplace API
//!
//! Query strings accepted by the listing, stats and invalidation endpoints.

use serde::Deserialize;

use crate::market::ListingFilters;

/// Query string for `GET /listings`, `GET /stats` and `DELETE /listings/cache`.
///
/// `page` is only read by `/listings`; `page_size` by `/listings` and the
/// invalidation endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingsQuery {
    pub category: Option<String>,
    pub seller_id: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    /// Name search
    pub q: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ListingsQuery {
    /// Filter criteria carried by the query.
    pub fn filters(&self) -> ListingFilters {
        ListingFilters {
            category: self.category.clone(),
            seller_id: self.seller_id.clone(),
            min_price: self.min_price,
            max_price: self.max_price,
            search: self.q.clone(),
        }
    }

    /// Requested page, defaulting to the first.
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1)
    }
}
