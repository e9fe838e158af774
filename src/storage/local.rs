//! Local filesystem document store.
//!
//! Each collection is an append-only journal of upserts and deletes. A flush
//! appends its batch; `read_all` replays the journal and compacts it down to
//! the live records once superseded entries pile up.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! └── collections/
//!     ├── netflix_titles.ndjson
//!     └── imdb_titles.ndjson
//!
//! {"upsert":{"id":"80100172","title":"Dark",...,"updated_at":"..."}}
//! {"delete":"80057281"}
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::PersistedRecord;
use crate::storage::{DocumentStore, journal};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Entry {
    Upsert(PersistedRecord),
    Delete(String),
}

/// Local filesystem storage backend.
#[derive(Clone)]
pub struct LocalDocumentStore {
    root_dir: PathBuf,
    /// One lock per collection journal
    locks: Arc<std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl LocalDocumentStore {
    /// Create a new store rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            locks: Arc::new(std::sync::Mutex::new(HashMap::new())),
        }
    }

    fn journal_path(&self, collection: &str) -> Result<PathBuf> {
        if collection.is_empty()
            || !collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(AppError::validation(format!(
                "invalid collection name '{collection}'"
            )));
        }
        Ok(self
            .root_dir
            .join("collections")
            .join(format!("{collection}.ndjson")))
    }

    fn lock_for(&self, collection: &str) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| AppError::store(collection, "lock table poisoned"))?;
        Ok(Arc::clone(locks.entry(collection.to_string()).or_default()))
    }

    /// Append one flush worth of entries under the collection lock.
    async fn append(&self, collection: &str, entries: &[Entry]) -> Result<()> {
        let path = self.journal_path(collection)?;
        let lock = self.lock_for(collection)?;
        let _guard = lock.lock().await;

        journal::append(&path, entries)
            .await
            .map_err(|e| AppError::store(collection, e))
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn read_all(&self, collection: &str) -> Result<Vec<PersistedRecord>> {
        let path = self.journal_path(collection)?;
        let lock = self.lock_for(collection)?;
        let _guard = lock.lock().await;

        let Some(entries) = journal::replay::<Entry>(&path).await? else {
            log::warn!("No {} found, treating collection as empty", path.display());
            return Ok(Vec::new());
        };

        let total = entries.len();
        let mut live: BTreeMap<String, PersistedRecord> = BTreeMap::new();
        for entry in entries {
            match entry {
                Entry::Upsert(record) => {
                    live.insert(record.id().to_string(), record);
                }
                Entry::Delete(id) => {
                    live.remove(&id);
                }
            }
        }

        if total > live.len() {
            log::debug!(
                "Compacting {}: {} entries -> {} records",
                path.display(),
                total,
                live.len()
            );
            let compacted: Vec<Entry> = live.values().cloned().map(Entry::Upsert).collect();
            journal::rewrite(&path, &compacted)
                .await
                .map_err(|e| AppError::store(collection, e))?;
        }

        Ok(live.into_values().collect())
    }

    async fn bulk_upsert(&self, collection: &str, records: &[PersistedRecord]) -> Result<()> {
        let entries: Vec<Entry> = records.iter().cloned().map(Entry::Upsert).collect();
        self.append(collection, &entries).await
    }

    async fn bulk_delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        let entries: Vec<Entry> = ids.iter().cloned().map(Entry::Delete).collect();
        self.append(collection, &entries).await
    }
}
