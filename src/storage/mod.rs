//! Storage abstractions for the downstream sinks.
//!
//! Two sinks receive writes:
//! - a document store holding one collection per source, keyed by item id
//! - a full-text search index over titles
//!
//! ## Backends
//!
//! ```text
//! DocumentStore  ── LocalDocumentStore   {root}/collections/{name}.ndjson
//!                └─ MemoryDocumentStore  process memory
//! SearchIndex    ── LocalSearchIndex     {root}/indexes/{name}.ndjson
//!                ├─ ElasticsearchIndex   HTTP (_bulk, _search)
//!                └─ MemorySearchIndex    process memory
//! ```
//!
//! All implementations are safe for concurrent use by the writer pool.

pub mod elastic;
pub mod index;
mod journal;
pub mod local;
pub mod memory;

use async_trait::async_trait;
use serde_json::json;

use crate::error::Result;
use crate::models::{CatalogItem, PersistedRecord};

// Re-export for convenience
pub use elastic::ElasticsearchIndex;
pub use index::LocalSearchIndex;
pub use local::LocalDocumentStore;
pub use memory::{MemoryDocumentStore, MemorySearchIndex};

/// Canonical document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read every record of a collection. Missing collections are empty.
    async fn read_all(&self, collection: &str) -> Result<Vec<PersistedRecord>>;

    /// Insert or wholly replace records by id.
    async fn bulk_upsert(&self, collection: &str, records: &[PersistedRecord]) -> Result<()>;

    /// Delete records by id. Unknown ids are ignored.
    async fn bulk_delete(&self, collection: &str, ids: &[String]) -> Result<()>;
}

/// Full-text search index over catalog items.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Create the index with `schema` unless it already exists.
    async fn ensure_index(&self, name: &str, schema: &serde_json::Value) -> Result<()>;

    /// Index (insert or wholly replace) documents by id.
    async fn bulk_index(&self, name: &str, documents: &[CatalogItem]) -> Result<()>;

    /// Phrase search over titles, best matches first.
    async fn search(&self, name: &str, query: &str, limit: usize) -> Result<Vec<CatalogItem>>;
}

/// Mapping used when no schema file is configured.
pub fn default_title_schema() -> serde_json::Value {
    json!({
        "mappings": {
            "properties": {
                "id": { "type": "keyword" },
                "title": { "type": "text" },
                "year": { "type": "integer" },
                "attributes": {
                    "properties": {
                        "title_type": { "type": "keyword" },
                        "original_title": { "type": "text" },
                        "is_adult": { "type": "boolean" },
                        "genres": { "type": "keyword" },
                        "entity_type": { "type": "keyword" }
                    }
                }
            }
        }
    })
}
