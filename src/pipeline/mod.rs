//! Pipeline stages after collection.
//!
//! - `reconcile`: Diff a snapshot against the persisted state
//! - `SnapshotGuard`: Refuse suspicious deltas
//! - `BulkWriter`: Dual-trigger buffered writer pool
//! - `BulkWriteOrchestrator`: Fan writes out to the store and the index
//! - `SyncRunner`: Full run state machine
//! - `run_feed_load`: Upsert-only load of a large feed

mod feed;
mod guard;
mod orchestrator;
mod reconcile;
mod sync;
pub mod writer;

pub use feed::{FeedReport, run_feed_load};
pub use guard::{GuardVerdict, SnapshotGuard};
pub use orchestrator::{ApplyReport, BulkWriteOrchestrator};
pub use reconcile::{Delta, reconcile};
pub use sync::{RunOutcome, SyncMode, SyncRunner, run_sync};
pub use writer::{BulkWriter, FlushTarget, WriteOp, WriterHandle};
