//! REST listing source.
//!
//! Talks to a PostgREST-style interface exposing a `listings` resource:
//! filters map to `column=op.value` query pairs, ordering and paging to
//! `order`/`offset`/`limit`, and exact counts come back in the
//! `Content-Range` header when `Prefer: count=exact` is sent. Servers may
//! cap rows per response, so seller rows are read in batches until the
//! reported total is covered.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::debug;

use crate::config::DataSourceSettings;
use crate::error::{MarketError, Result};
use crate::market::{page_offset, ListingFilters, ListingSource, Listing};

const RESOURCE: &str = "listings";
const ORDER: &str = "price.desc,id.asc";
const SELLER_ORDER: &str = "seller_id.asc,id.asc";
const SELLER_BATCH: u64 = 1000;

// == REST Listing Source ==
#[derive(Debug, Clone)]
pub struct RestListingSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct SellerRow {
    seller_id: String,
}

impl RestListingSource {
    /// Builds a source from settings; requires `base_url`.
    pub fn from_settings(settings: &DataSourceSettings) -> Result<Self> {
        let base_url = settings.base_url.clone().ok_or_else(|| {
            MarketError::InvalidRequest("data source base url is not configured".to_string())
        })?;

        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| MarketError::Internal(format!("cannot build http client: {}", e)))?;

        Ok(Self::new(client, base_url, settings.api_key.clone()))
    }

    pub fn new(client: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request(&self) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, RESOURCE);
        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request
                .header("apikey", key)
                .header(header::AUTHORIZATION, format!("Bearer {}", key));
        }
        request
    }

    async fn send(request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MarketError::DataSource(format!(
                "listing query failed with {}: {}",
                status, body
            )));
        }
        Ok(response)
    }

    fn content_range_total(response: &Response) -> Result<u64> {
        response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| {
                MarketError::DataSource("response carried no Content-Range total".to_string())
            })
    }
}

/// Translates filters into `column=op.value` query pairs.
pub fn filter_query(filters: &ListingFilters) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if let Some(category) = &filters.category {
        query.push(("category", format!("eq.{}", category)));
    }
    if let Some(seller) = &filters.seller_id {
        query.push(("seller_id", format!("eq.{}", seller)));
    }
    if let Some(min) = filters.min_price {
        query.push(("price", format!("gte.{}", min)));
    }
    if let Some(max) = filters.max_price {
        query.push(("price", format!("lte.{}", max)));
    }
    if let Some(search) = &filters.search {
        query.push(("name", format!("ilike.*{}*", search)));
    }
    query
}

/// Extracts the total from a `Content-Range` value such as `0-19/55` or `*/0`.
pub fn parse_content_range(value: &str) -> Option<u64> {
    let (_, total) = value.trim().rsplit_once('/')?;
    total.parse().ok()
}

#[async_trait]
impl ListingSource for RestListingSource {
    async fn fetch_page(
        &self,
        filters: &ListingFilters,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Listing>> {
        let offset = page_offset(page, page_size);
        debug!(page, page_size, offset, "Fetching listing page");

        let request = self
            .request()
            .query(&[("select", "*"), ("order", ORDER)])
            .query(&[("offset", offset), ("limit", u64::from(page_size))])
            .query(&filter_query(filters));

        let listings = Self::send(request).await?.json::<Vec<Listing>>().await?;
        Ok(listings)
    }

    async fn fetch_total_count(&self, filters: &ListingFilters) -> Result<u64> {
        let request = self
            .request()
            .header("Prefer", "count=exact")
            .query(&[("select", "id"), ("limit", "1")])
            .query(&filter_query(filters));

        let response = Self::send(request).await?;
        Self::content_range_total(&response)
    }

    async fn fetch_distinct_seller_count(&self, filters: &ListingFilters) -> Result<u64> {
        let mut sellers = HashSet::new();
        let mut offset: u64 = 0;

        loop {
            let request = self
                .request()
                .header("Prefer", "count=exact")
                .query(&[("select", "seller_id"), ("order", SELLER_ORDER)])
                .query(&[("offset", offset), ("limit", SELLER_BATCH)])
                .query(&filter_query(filters));

            let response = Self::send(request).await?;
            let total = Self::content_range_total(&response)?;
            let rows = response.json::<Vec<SellerRow>>().await?;

            // Advance by what came back; the server may return fewer rows than asked
            let fetched = rows.len() as u64;
            sellers.extend(rows.into_iter().map(|row| row.seller_id));
            offset += fetched;

            if offset >= total {
                debug!(rows = offset, sellers = sellers.len(), "Counted distinct sellers");
                return Ok(sellers.len() as u64);
            }
            if fetched == 0 {
                return Err(MarketError::DataSource(format!(
                    "seller rows ended at {} of {}",
                    offset, total
                )));
            }
        }
    }
}
