//! API Module
//!
//! HTTP handlers and routing for the marketplace REST API.
//!
//! # Endpoints
//! - `GET /listings` - One page of listings with its market stats
//! - `GET /stats` - Item and seller counts for a filter shape
//! - `DELETE /listings/cache` - Drop cached pages and counts for a filter shape
//! - `GET /health` - Cache connection status

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
