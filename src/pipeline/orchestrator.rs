//! Bulk write orchestration across the document store and the search index.
//!
//! Each sink gets its own writer pool. Upserts go to both; deletes only to
//! the document store. The index is ensured before the first operation is
//! queued.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{PersistedRecord, WriteStats, WriterConfig};
use crate::pipeline::writer::{BulkWriter, FlushTarget, WriteOp};
use crate::pipeline::Delta;
use crate::storage::{DocumentStore, SearchIndex, default_title_schema};

/// Totals of one apply, per sink.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub store: WriteStats,
    pub index: WriteStats,
}

/// Flushes batches into one document-store collection.
struct StoreTarget {
    store: Arc<dyn DocumentStore>,
    collection: String,
    name: String,
}

#[async_trait]
impl FlushTarget for StoreTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn flush(&self, batch: Vec<WriteOp>) -> Result<()> {
        let now = Utc::now();
        let mut upserts = Vec::new();
        let mut deletes = Vec::new();
        for op in batch {
            match op {
                WriteOp::Upsert(item) => upserts.push(PersistedRecord::new(item, now)),
                WriteOp::Delete(id) => deletes.push(id),
            }
        }

        if !upserts.is_empty() {
            self.store.bulk_upsert(&self.collection, &upserts).await?;
        }
        if !deletes.is_empty() {
            self.store.bulk_delete(&self.collection, &deletes).await?;
        }
        Ok(())
    }
}

/// Flushes upserts into the search index.
struct IndexTarget {
    index: Arc<dyn SearchIndex>,
    index_name: String,
    name: String,
}

#[async_trait]
impl FlushTarget for IndexTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn flush(&self, batch: Vec<WriteOp>) -> Result<()> {
        let documents: Vec<_> = batch
            .into_iter()
            .filter_map(|op| match op {
                WriteOp::Upsert(item) => Some(item),
                WriteOp::Delete(_) => None,
            })
            .collect();
        if documents.is_empty() {
            return Ok(());
        }
        self.index.bulk_index(&self.index_name, &documents).await
    }
}

/// Applies deltas and feeds through the writer pools.
#[derive(Clone)]
pub struct BulkWriteOrchestrator {
    store: Arc<dyn DocumentStore>,
    index: Option<Arc<dyn SearchIndex>>,
    index_name: String,
    schema: serde_json::Value,
    config: WriterConfig,
}

impl BulkWriteOrchestrator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        index: Option<Arc<dyn SearchIndex>>,
        index_name: impl Into<String>,
        config: WriterConfig,
    ) -> Self {
        Self {
            store,
            index,
            index_name: index_name.into(),
            schema: default_title_schema(),
            config,
        }
    }

    /// Use `schema` instead of the default mapping when creating the index.
    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = schema;
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Create the search index if it does not exist. No-op without an index.
    pub async fn ensure_index(&self) -> Result<()> {
        match &self.index {
            Some(index) => index.ensure_index(&self.index_name, &self.schema).await,
            None => Ok(()),
        }
    }

    /// Apply a delta to `collection` and the index.
    pub async fn apply(
        &self,
        delta: &Delta,
        collection: &str,
        cancel: &CancellationToken,
    ) -> Result<ApplyReport> {
        let ops = delta
            .to_upsert
            .iter()
            .cloned()
            .map(WriteOp::Upsert)
            .chain(delta.to_delete.iter().cloned().map(WriteOp::Delete));

        log::info!(
            "Applying {} upserts and {} deletes to {}",
            delta.to_upsert.len(),
            delta.to_delete.len(),
            collection
        );
        self.write(collection, futures::stream::iter(ops), cancel)
            .await
    }

    /// Upsert every item of a stream. Nothing is deleted.
    pub async fn upsert_stream<S>(
        &self,
        collection: &str,
        items: S,
        cancel: &CancellationToken,
    ) -> Result<ApplyReport>
    where
        S: Stream<Item = crate::models::CatalogItem> + Send,
    {
        self.write(collection, items.map(WriteOp::Upsert), cancel)
            .await
    }

    async fn write<S>(
        &self,
        collection: &str,
        ops: S,
        cancel: &CancellationToken,
    ) -> Result<ApplyReport>
    where
        S: Stream<Item = WriteOp> + Send,
    {
        self.ensure_index().await?;

        let store_writer = BulkWriter::spawn(
            Arc::new(StoreTarget {
                store: Arc::clone(&self.store),
                collection: collection.to_string(),
                name: format!("collection {collection}"),
            }),
            &self.config,
            cancel.clone(),
        );
        let index_writer = self.index.as_ref().map(|index| {
            BulkWriter::spawn(
                Arc::new(IndexTarget {
                    index: Arc::clone(index),
                    index_name: self.index_name.clone(),
                    name: format!("index {}", self.index_name),
                }),
                &self.config,
                cancel.clone(),
            )
        });

        let mut ops = std::pin::pin!(ops);
        let mut queue_result = Ok(());
        while let Some(op) = ops.next().await {
            if cancel.is_cancelled() {
                queue_result = Err(AppError::cancelled(format!("writes to {collection}")));
                break;
            }
            if let (Some(writer), WriteOp::Upsert(_)) = (&index_writer, &op) {
                if let Err(e) = writer.send(op.clone()).await {
                    queue_result = Err(e);
                    break;
                }
            }
            if let Err(e) = store_writer.send(op).await {
                queue_result = Err(e);
                break;
            }
        }

        // Worker errors name the failed flush; prefer them over queue errors.
        let store = store_writer.finish().await?;
        let index = match index_writer {
            Some(writer) => writer.finish().await?,
            None => WriteStats::default(),
        };
        queue_result?;

        log::info!(
            "Wrote {} ops to {} in {} flushes, {} docs to index",
            store.written,
            collection,
            store.flushes,
            index.written
        );
        Ok(ApplyReport { store, index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CatalogItem, Snapshot};
    use crate::pipeline::reconcile;
    use crate::storage::{MemoryDocumentStore, MemorySearchIndex};

    struct BrokenStore;

    #[async_trait]
    impl DocumentStore for BrokenStore {
        async fn read_all(&self, _collection: &str) -> Result<Vec<PersistedRecord>> {
            Ok(Vec::new())
        }

        async fn bulk_upsert(&self, collection: &str, _records: &[PersistedRecord]) -> Result<()> {
            Err(AppError::store(collection, "quota exceeded"))
        }

        async fn bulk_delete(&self, _collection: &str, _ids: &[String]) -> Result<()> {
            Ok(())
        }
    }

    fn config() -> WriterConfig {
        WriterConfig {
            workers: 3,
            flush_bytes: 200,
            flush_interval_ms: 50,
            queue_capacity: 4,
        }
    }

    fn items(ids: &[&str]) -> Vec<CatalogItem> {
        ids.iter()
            .map(|id| CatalogItem::new(*id, format!("Title {id}"), 2000))
            .collect()
    }

    #[tokio::test]
    async fn test_apply_converges_store_and_index() {
        let store = MemoryDocumentStore::new();
        let index = MemorySearchIndex::new();
        let old: Vec<PersistedRecord> = items(&["A", "B", "C"])
            .into_iter()
            .map(|item| PersistedRecord::new(item, Utc::now()))
            .collect();
        store.seed("titles", old.clone()).await;

        let orchestrator = BulkWriteOrchestrator::new(
            Arc::new(store.clone()),
            Some(Arc::new(index.clone())),
            "titles",
            config(),
        );
        let new = Snapshot::from_items(items(&["B", "C", "D"]));
        let delta = reconcile(&new, &old);

        let report = orchestrator
            .apply(&delta, "titles", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(store.ids("titles").await, vec!["B", "C", "D"]);
        assert!(index.exists("titles").await);
        assert_eq!(index.document_count("titles").await, 3);
        assert_eq!(report.store.written, 4);
        assert_eq!(report.index.written, 3);

        // Second pass finds nothing left to delete
        let persisted = store.read_all("titles").await.unwrap();
        assert!(reconcile(&new, &persisted).to_delete.is_empty());
    }

    #[tokio::test]
    async fn test_apply_without_index() {
        let store = MemoryDocumentStore::new();
        let orchestrator =
            BulkWriteOrchestrator::new(Arc::new(store.clone()), None, "titles", config());
        let delta = Delta {
            to_upsert: items(&["1", "2"]),
            to_delete: vec![],
        };

        let report = orchestrator
            .apply(&delta, "titles", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.index, WriteStats::default());
        assert_eq!(store.ids("titles").await, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_store_failure_aborts_apply() {
        let orchestrator =
            BulkWriteOrchestrator::new(Arc::new(BrokenStore), None, "titles", config());
        let delta = Delta {
            to_upsert: items(&["1", "2", "3", "4", "5", "6", "7", "8"]),
            to_delete: vec![],
        };

        let err = orchestrator
            .apply(&delta, "titles", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Store { .. }));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_cancelled_apply_writes_nothing() {
        let store = MemoryDocumentStore::new();
        let orchestrator =
            BulkWriteOrchestrator::new(Arc::new(store.clone()), None, "titles", config());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let delta = Delta {
            to_upsert: items(&["1"]),
            to_delete: vec![],
        };
        let err = orchestrator.apply(&delta, "titles", &cancel).await.unwrap_err();

        assert!(matches!(err, AppError::Cancelled(_)));
        assert!(store.ids("titles").await.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_stream_never_deletes() {
        let store = MemoryDocumentStore::new();
        store
            .seed(
                "feed",
                vec![PersistedRecord::new(CatalogItem::new("old", "Old", 1), Utc::now())],
            )
            .await;
        let orchestrator =
            BulkWriteOrchestrator::new(Arc::new(store.clone()), None, "titles", config());

        let stream = futures::stream::iter(items(&["x", "y"]));
        let report = orchestrator
            .upsert_stream("feed", stream, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.store.written, 2);
        assert_eq!(store.ids("feed").await, vec!["old", "x", "y"]);
    }
}
