// src/lib.rs

//! Catalog synchronization library.
//!
//! Collects a paginated upstream catalog, reconciles it against a document
//! store and search index, and applies the delta through buffered bulk
//! writers.

pub mod error;
pub mod feed;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod transport;
pub mod utils;
