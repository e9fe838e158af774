// src/models/mod.rs

//! Domain models for the synchronization pipeline.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod item;
mod run;

// Re-export all public types
pub use config::{
    CatalogConfig, Config, ELASTICSEARCH_PASSWORD_ENV, FeedConfig, GuardConfig,
    SECURE_SESSION_ID_ENV, SESSION_ID_ENV, SearchConfig, Secrets, StoreConfig, WriterConfig,
};
pub use item::{CatalogItem, Category, PersistedRecord, Snapshot};
pub use run::{CategoryStats, RunReport, RunState, WriteStats};
