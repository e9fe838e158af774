//! Large-feed load: stream a TSV export into the feed collection and index.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::feed::TsvFeed;
use crate::models::{CatalogItem, WriteStats};
use crate::pipeline::BulkWriteOrchestrator;

/// Totals of one feed load.
#[derive(Debug, Clone, Default)]
pub struct FeedReport {
    /// Rows decoded into items
    pub read: usize,
    /// Rows skipped as undecodable
    pub failed: usize,
    pub store: WriteStats,
    pub index: WriteStats,
}

/// Read `path` (plain or `.gz`) on a blocking thread and upsert every
/// decodable row.
///
/// The reader feeds a bounded channel, so memory stays flat regardless of
/// the feed size.
pub async fn run_feed_load(
    orchestrator: &BulkWriteOrchestrator,
    path: &Path,
    delimiter: char,
    collection: &str,
    queue_capacity: usize,
    cancel: &CancellationToken,
) -> Result<FeedReport> {
    let (sender, mut receiver) = mpsc::channel::<CatalogItem>(queue_capacity.max(1));
    let progress = Arc::new(AtomicUsize::new(0));

    let reader = {
        let path = path.to_path_buf();
        let cancel = cancel.clone();
        let progress = Arc::clone(&progress);
        tokio::task::spawn_blocking(move || -> Result<(usize, usize)> {
            let mut feed = TsvFeed::open(&path, delimiter)?;
            while let Some(item) = feed.next() {
                if cancel.is_cancelled() {
                    break;
                }
                // Receiver gone means the writer side failed; its error wins.
                if sender.blocking_send(item).is_err() {
                    break;
                }
                let count = progress.fetch_add(1, Ordering::Relaxed) + 1;
                if count % 100_000 == 0 {
                    log::info!("Read {} feed rows ({} skipped)", count, feed.failed());
                }
            }
            if let Some(e) = feed.take_error() {
                return Err(e.with_context(format!("feed {}", path.display())));
            }
            Ok((feed.read(), feed.failed()))
        })
    };

    let items = futures::stream::poll_fn(move |cx| receiver.poll_recv(cx));
    let applied = orchestrator.upsert_stream(collection, items, cancel).await;

    let (read, failed) = reader
        .await
        .map_err(|e| AppError::decode(format!("feed {}", path.display()), e))??;
    let applied = applied?;
    if cancel.is_cancelled() {
        return Err(AppError::cancelled("feed load"));
    }

    log::info!(
        "Loaded feed {}: {} rows, {} skipped",
        path.display(),
        read,
        failed
    );
    Ok(FeedReport {
        read,
        failed,
        store: applied.store,
        index: applied.index,
    })
}
