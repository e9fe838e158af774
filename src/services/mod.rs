//! Service layer for catalog collection.
//!
//! This module contains the upstream-facing logic for:
//! - Request construction (`CatalogEndpoints`)
//! - Listing pagination (`PageFetcher`)
//! - Identifier extraction (`extract_ids`)
//! - Enrichment lookups (`DetailFetcher`)
//! - Snapshot collection across categories (`CatalogCollector`)

mod collector;
mod details;
mod endpoints;
pub mod extract;
mod pages;

pub use collector::{CatalogCollector, Collection};
pub use details::{DetailFetcher, parse_details};
pub use endpoints::CatalogEndpoints;
pub use extract::extract_ids;
pub use pages::{Page, PageCursor, PageFetcher};
