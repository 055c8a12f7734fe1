//! Market Module
//!
//! Listing data model, the data sources listings are read from, and the
//! aggregation engine that serves cached pages and statistics.

mod engine;
mod models;
mod rest;
mod source;

pub use engine::AggregationEngine;
pub use models::{
    compare_listings, expected_page_len, page_offset, sort_listings, total_pages, Listing,
    ListingFilters, MarketStats, MarketplaceView, PaginatedResult,
};
pub use rest::{filter_query, parse_content_range, RestListingSource};
pub use source::{InMemoryCatalog, ListingSource};
