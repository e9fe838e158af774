//! Buffered bulk writer.
//!
//! A fixed pool of workers drains one bounded queue of [`WriteOp`]s. Each
//! worker owns its buffer and flushes it to a [`FlushTarget`] when either
//! trigger fires:
//!
//! ```text
//! send ──▶ [bounded queue] ──▶ worker 1 ─ buffer ─┐
//!                          ├─▶ worker 2 ─ buffer ─┼─▶ FlushTarget::flush
//!                          └─▶ worker N ─ buffer ─┘
//!
//! flush when: buffered bytes >= flush_bytes
//!         or: flush_interval elapsed since the first buffered op
//!         or: queue closed (final flush)
//! ```
//!
//! The first failed flush stops every worker; already-flushed batches stay
//! written.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{CatalogItem, WriteStats, WriterConfig};

/// A single queued write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Upsert(CatalogItem),
    Delete(String),
}

impl WriteOp {
    /// Approximate encoded size, used for the byte trigger.
    pub fn size_bytes(&self) -> usize {
        match self {
            Self::Upsert(item) => serde_json::to_vec(item).map_or(item.title.len(), |b| b.len()),
            Self::Delete(id) => id.len(),
        }
    }
}

/// Destination of flushed batches.
#[async_trait]
pub trait FlushTarget: Send + Sync {
    /// Short name used in logs and error context.
    fn name(&self) -> &str;

    /// Commit one batch. An error aborts the whole write.
    async fn flush(&self, batch: Vec<WriteOp>) -> Result<()>;
}

#[derive(Default)]
struct Counters {
    queued: AtomicUsize,
    written: AtomicUsize,
    failed: AtomicUsize,
    flushes: AtomicUsize,
    bytes: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> WriteStats {
        WriteStats {
            queued: self.queued.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy)]
struct Thresholds {
    flush_bytes: usize,
    flush_interval: Duration,
}

/// Spawns writer pools.
pub struct BulkWriter;

impl BulkWriter {
    /// Start `config.workers` workers flushing into `target`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        target: Arc<dyn FlushTarget>,
        config: &WriterConfig,
        cancel: CancellationToken,
    ) -> WriterHandle {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(Counters::default());
        let abort = CancellationToken::new();
        let thresholds = Thresholds {
            flush_bytes: config.flush_bytes.max(1),
            flush_interval: config.flush_interval(),
        };

        let mut workers = JoinSet::new();
        for worker_id in 0..config.workers.max(1) {
            let worker = Worker {
                id: worker_id,
                receiver: Arc::clone(&receiver),
                target: Arc::clone(&target),
                counters: Arc::clone(&counters),
                thresholds,
                cancel: cancel.clone(),
                abort: abort.clone(),
            };
            workers.spawn(worker.run());
        }

        log::debug!(
            "Started {} writer workers for {}",
            config.workers.max(1),
            target.name()
        );

        WriterHandle {
            sender,
            workers,
            counters,
            abort,
            target_name: target.name().to_string(),
        }
    }
}

/// Producer side of a running writer pool.
pub struct WriterHandle {
    sender: mpsc::Sender<WriteOp>,
    workers: JoinSet<Result<()>>,
    counters: Arc<Counters>,
    abort: CancellationToken,
    target_name: String,
}

impl WriterHandle {
    /// Queue one operation, waiting while the queue is full.
    ///
    /// Fails once the pool has stopped; call [`finish`](Self::finish) to
    /// obtain the underlying error.
    pub async fn send(&self, op: WriteOp) -> Result<()> {
        if self.abort.is_cancelled() {
            return Err(self.stopped());
        }
        self.sender.send(op).await.map_err(|_| self.stopped())?;
        self.counters.queued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Close the queue, wait for the final flushes and return the totals.
    ///
    /// Returns the first flush error if any worker failed.
    pub async fn finish(self) -> Result<WriteStats> {
        let Self {
            sender,
            mut workers,
            counters,
            target_name,
            ..
        } = self;
        drop(sender);

        let mut first_error = None;
        while let Some(joined) = workers.join_next().await {
            let outcome = joined
                .map_err(|e| AppError::store(&target_name, format!("writer task failed: {e}")))
                .and_then(|result| result);
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(counters.snapshot()),
        }
    }

    fn stopped(&self) -> AppError {
        AppError::store(&self.target_name, "writer stopped after a failed flush")
    }
}

struct Worker {
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<WriteOp>>>,
    target: Arc<dyn FlushTarget>,
    counters: Arc<Counters>,
    thresholds: Thresholds,
    cancel: CancellationToken,
    abort: CancellationToken,
}

enum Event {
    Op(WriteOp),
    Closed,
    Deadline,
    Aborted,
}

impl Worker {
    async fn run(self) -> Result<()> {
        let mut buffer: Vec<WriteOp> = Vec::new();
        let mut buffered_bytes = 0;
        let mut deadline: Option<Instant> = None;

        loop {
            let event = tokio::select! {
                _ = self.abort.cancelled() => Event::Aborted,
                op = recv(&self.receiver) => match op {
                    Some(op) => Event::Op(op),
                    None => Event::Closed,
                },
                _ = wait_for(deadline) => Event::Deadline,
            };

            match event {
                Event::Aborted => return Ok(()),
                Event::Op(op) => {
                    buffered_bytes += op.size_bytes();
                    buffer.push(op);
                    deadline.get_or_insert_with(|| Instant::now() + self.thresholds.flush_interval);

                    if buffered_bytes >= self.thresholds.flush_bytes {
                        self.flush(&mut buffer, buffered_bytes, "size").await?;
                        buffered_bytes = 0;
                        deadline = None;
                    }
                }
                Event::Deadline => {
                    self.flush(&mut buffer, buffered_bytes, "interval").await?;
                    buffered_bytes = 0;
                    deadline = None;
                }
                Event::Closed => {
                    if !buffer.is_empty() {
                        self.flush(&mut buffer, buffered_bytes, "final").await?;
                    }
                    return Ok(());
                }
            }
        }
    }

    async fn flush(&self, buffer: &mut Vec<WriteOp>, bytes: usize, trigger: &str) -> Result<()> {
        let batch = std::mem::take(buffer);
        let count = batch.len();
        if count == 0 {
            return Ok(());
        }

        if self.cancel.is_cancelled() {
            self.counters.failed.fetch_add(count, Ordering::Relaxed);
            self.abort.cancel();
            return Err(AppError::cancelled(format!("{} flush", self.target.name())));
        }

        match self.target.flush(batch).await {
            Ok(()) => {
                self.counters.written.fetch_add(count, Ordering::Relaxed);
                self.counters.flushes.fetch_add(1, Ordering::Relaxed);
                self.counters.bytes.fetch_add(bytes, Ordering::Relaxed);
                log::debug!(
                    "Worker {} flushed {} ops ({} bytes, {}) to {}",
                    self.id,
                    count,
                    bytes,
                    trigger,
                    self.target.name()
                );
                Ok(())
            }
            Err(e) => {
                self.counters.failed.fetch_add(count, Ordering::Relaxed);
                self.abort.cancel();
                log::error!(
                    "Worker {} failed to flush {} ops to {}: {}",
                    self.id,
                    count,
                    self.target.name(),
                    e
                );
                Err(e.with_context(format!("{} flush of {} ops", self.target.name(), count)))
            }
        }
    }
}

async fn recv(receiver: &Mutex<mpsc::Receiver<WriteOp>>) -> Option<WriteOp> {
    receiver.lock().await.recv().await
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingTarget {
        batches: StdMutex<Vec<Vec<WriteOp>>>,
        fail: bool,
    }

    impl RecordingTarget {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().unwrap().iter().map(Vec::len).collect()
        }
    }

    #[async_trait]
    impl FlushTarget for RecordingTarget {
        fn name(&self) -> &str {
            "recording"
        }

        async fn flush(&self, batch: Vec<WriteOp>) -> Result<()> {
            if self.fail {
                return Err(AppError::store("recording", "rejected"));
            }
            self.batches.lock().unwrap().push(batch);
            Ok(())
        }
    }

    fn config(workers: usize, flush_bytes: usize, flush_interval_ms: u64) -> WriterConfig {
        WriterConfig {
            workers,
            flush_bytes,
            flush_interval_ms,
            queue_capacity: 16,
        }
    }

    fn upsert(id: &str) -> WriteOp {
        WriteOp::Upsert(CatalogItem::new(id, "title", 2000))
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_flushes_small_buffer_without_more_input() {
        let target = Arc::new(RecordingTarget::default());
        let handle = BulkWriter::spawn(
            target.clone(),
            &config(1, 1_000_000, 100),
            CancellationToken::new(),
        );

        handle.send(upsert("1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(target.batch_sizes().is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(target.batch_sizes(), vec![1]);

        let stats = handle.finish().await.unwrap();
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.written, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_trigger_flushes_before_interval() {
        let target = Arc::new(RecordingTarget::default());
        let handle = BulkWriter::spawn(
            target.clone(),
            &config(1, 1, 3_600_000),
            CancellationToken::new(),
        );

        for id in ["1", "2", "3"] {
            handle.send(upsert(id)).await.unwrap();
        }
        tokio::task::yield_now().await;
        let stats = handle.finish().await.unwrap();

        assert_eq!(target.batch_sizes(), vec![1, 1, 1]);
        assert_eq!(stats.queued, 3);
        assert_eq!(stats.flushes, 3);
    }

    #[tokio::test]
    async fn test_close_flushes_remaining_ops() {
        let target = Arc::new(RecordingTarget::default());
        let handle = BulkWriter::spawn(
            target.clone(),
            &config(4, 1_000_000, 3_600_000),
            CancellationToken::new(),
        );

        for i in 0..20 {
            handle.send(upsert(&i.to_string())).await.unwrap();
        }
        handle.send(WriteOp::Delete("gone".into())).await.unwrap();
        let stats = handle.finish().await.unwrap();

        assert_eq!(target.batch_sizes().iter().sum::<usize>(), 21);
        assert_eq!(stats.written, 21);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_failed_flush_aborts_write() {
        let target = Arc::new(RecordingTarget::failing());
        let handle = BulkWriter::spawn(target, &config(2, 1, 3_600_000), CancellationToken::new());

        let _ = handle.send(upsert("1")).await;
        let err = handle.finish().await.unwrap_err();

        assert!(matches!(err, AppError::Store { .. }));
        assert!(err.to_string().contains("recording flush of 1 ops"));
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_flush() {
        let target = Arc::new(RecordingTarget::default());
        let cancel = CancellationToken::new();
        let handle = BulkWriter::spawn(target.clone(), &config(1, 1_000_000, 3_600_000), cancel.clone());

        handle.send(upsert("1")).await.unwrap();
        cancel.cancel();
        let err = handle.finish().await.unwrap_err();

        assert!(matches!(err, AppError::Cancelled(_)));
        assert!(target.batch_sizes().is_empty());
    }

    #[test]
    fn test_op_size_tracks_payload() {
        let small = upsert("1");
        let large = WriteOp::Upsert(CatalogItem::new("1", "x".repeat(500), 2000));
        assert!(large.size_bytes() > small.size_bytes() + 400);
        assert_eq!(WriteOp::Delete("abc".into()).size_bytes(), 3);
    }
}
