//! In-process sinks, used for dry runs and tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::models::{CatalogItem, PersistedRecord};
use crate::storage::index::IndexFile;
use crate::storage::{DocumentStore, SearchIndex};

/// Document store kept entirely in memory.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, BTreeMap<String, PersistedRecord>>>>,
    write_calls: Arc<AtomicUsize>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a collection, replacing its contents.
    pub async fn seed(&self, collection: &str, records: Vec<PersistedRecord>) {
        let records = records
            .into_iter()
            .map(|r| (r.id().to_string(), r))
            .collect();
        self.collections
            .write()
            .await
            .insert(collection.to_string(), records);
    }

    /// Ids currently stored in a collection, sorted.
    pub async fn ids(&self, collection: &str) -> Vec<String> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn get(&self, collection: &str, id: &str) -> Option<PersistedRecord> {
        self.collections
            .read()
            .await
            .get(collection)
            .and_then(|records| records.get(id).cloned())
    }

    /// Number of bulk upsert/delete calls received.
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn read_all(&self, collection: &str) -> Result<Vec<PersistedRecord>> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn bulk_upsert(&self, collection: &str, records: &[PersistedRecord]) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        let mut collections = self.collections.write().await;
        let existing = collections.entry(collection.to_string()).or_default();
        for record in records {
            existing.insert(record.id().to_string(), record.clone());
        }
        Ok(())
    }

    async fn bulk_delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(existing) = self.collections.write().await.get_mut(collection) {
            for id in ids {
                existing.remove(id);
            }
        }
        Ok(())
    }
}

/// Search index kept entirely in memory.
#[derive(Clone, Default)]
pub struct MemorySearchIndex {
    indexes: Arc<RwLock<HashMap<String, IndexFile>>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn exists(&self, name: &str) -> bool {
        self.indexes.read().await.contains_key(name)
    }

    pub async fn document_count(&self, name: &str) -> usize {
        self.indexes
            .read()
            .await
            .get(name)
            .map_or(0, |file| file.documents.len())
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn ensure_index(&self, name: &str, schema: &serde_json::Value) -> Result<()> {
        self.indexes
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| IndexFile {
                schema: schema.clone(),
                ..IndexFile::default()
            });
        Ok(())
    }

    async fn bulk_index(&self, name: &str, documents: &[CatalogItem]) -> Result<()> {
        let mut indexes = self.indexes.write().await;
        let file = indexes.entry(name.to_string()).or_default();
        for item in documents {
            file.insert(item.clone());
        }
        Ok(())
    }

    async fn search(&self, name: &str, query: &str, limit: usize) -> Result<Vec<CatalogItem>> {
        self.indexes
            .read()
            .await
            .get(name)
            .map(|file| file.search(query, limit))
            .ok_or_else(|| AppError::store(format!("index {name}"), "index does not exist"))
    }
}
