// src/services/collector.rs

//! Catalog collector service.
//!
//! Walks every configured category page by page, resolves each page's ids in
//! enrichment batches and merges the categories into one snapshot.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::stream::{self, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{CatalogConfig, CatalogItem, Category, CategoryStats, Snapshot};
use crate::services::{CatalogEndpoints, DetailFetcher, PageFetcher};
use crate::transport::Transport;

/// Result of collecting every category.
#[derive(Debug, Default)]
pub struct Collection {
    pub snapshot: Snapshot,
    pub categories: Vec<CategoryStats>,
}

/// Service collecting the full catalog snapshot.
pub struct CatalogCollector {
    pages: PageFetcher,
    details: DetailFetcher,
    page_size: usize,
    max_pages: usize,
    concurrency: usize,
    collected: AtomicUsize,
}

impl CatalogCollector {
    /// Create a collector sharing one transport for listing and enrichment.
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoints: CatalogEndpoints,
        config: &CatalogConfig,
    ) -> Self {
        let endpoints = Arc::new(endpoints);
        Self {
            pages: PageFetcher::new(Arc::clone(&transport), Arc::clone(&endpoints)),
            details: DetailFetcher::new(transport, endpoints, config.enrichment_batch_size),
            page_size: config.page_size,
            max_pages: config.max_pages,
            concurrency: config.category_concurrency.max(1),
            collected: AtomicUsize::new(0),
        }
    }

    /// Items collected so far across all categories.
    pub fn collected(&self) -> usize {
        self.collected.load(Ordering::Relaxed)
    }

    /// Collect all categories and merge them, keeping the first item per id.
    ///
    /// Any category failure aborts the whole collection.
    pub async fn collect(
        &self,
        categories: &[Category],
        cancel: &CancellationToken,
    ) -> Result<Collection> {
        let per_category: Vec<(Vec<CatalogItem>, CategoryStats)> = stream::iter(categories)
            .map(|category| self.collect_category(category, cancel))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let mut stats = Vec::with_capacity(per_category.len());
        let mut all_items = Vec::new();
        for (items, category_stats) in per_category {
            all_items.extend(items);
            stats.push(category_stats);
        }

        let raw_count = all_items.len();
        let snapshot = Snapshot::from_items(all_items);
        log::info!(
            "Collected {} unique items ({} before cross-category dedup)",
            snapshot.len(),
            raw_count
        );

        Ok(Collection {
            snapshot,
            categories: stats,
        })
    }

    /// Collect a single category.
    pub async fn collect_category(
        &self,
        category: &Category,
        cancel: &CancellationToken,
    ) -> Result<(Vec<CatalogItem>, CategoryStats)> {
        let label = category.label();
        log::info!("Fetching titles from category {}", label);

        let mut cursor = self.pages.cursor(category, self.page_size, self.max_pages);
        let mut items = Vec::new();
        let mut id_count = 0;

        while let Some(page) = cursor.next_page(cancel).await? {
            id_count += page.ids.len();

            for batch in page.ids.chunks(self.details.batch_limit()) {
                if cancel.is_cancelled() {
                    return Err(AppError::cancelled(format!(
                        "enrichment {} offset {}",
                        label, page.offset
                    )));
                }
                let enriched = self.details.fetch_details(batch).await.map_err(|e| {
                    e.with_context(format!("category {} offset {}", label, page.offset))
                })?;
                self.collected.fetch_add(enriched.len(), Ordering::Relaxed);
                items.extend(enriched);
            }

            log::info!(
                "{}: page {} at offset {} -> {} ids, {} items in category, {} total",
                label,
                page.number,
                page.offset,
                page.ids.len(),
                items.len(),
                self.collected()
            );
        }

        log::info!("Fetched {} titles from category {}", items.len(), label);

        let stats = CategoryStats {
            category: label,
            pages: cursor.pages_fetched(),
            ids: id_count,
            items: items.len(),
        };
        Ok((items, stats))
    }
}
