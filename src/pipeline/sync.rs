//! Synchronization run: collect, reconcile, guard, write.
//!
//! ```text
//! Idle ─▶ Collecting ─▶ Reconciling ─▶ Writing ─▶ Done
//!             │              │  └─(plan)─▶ Done     │
//!             └──────────────┴──────▶ Failed ◀──────┘
//! ```

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{Category, RunReport, RunState};
use crate::pipeline::{BulkWriteOrchestrator, Delta, SnapshotGuard, reconcile};
use crate::services::CatalogCollector;
use crate::utils::log;

/// Whether a run writes its delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Collect, reconcile and apply
    Apply,
    /// Collect and reconcile only
    Plan,
}

/// Result of one run: the report is always produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    pub result: Result<Delta>,
}

/// Drives a single synchronization run.
///
/// Runs are single-flight; callers must not start two concurrently.
pub struct SyncRunner {
    collector: CatalogCollector,
    orchestrator: BulkWriteOrchestrator,
    guard: SnapshotGuard,
    categories: Vec<Category>,
    collection: String,
}

impl SyncRunner {
    pub fn new(
        collector: CatalogCollector,
        orchestrator: BulkWriteOrchestrator,
        guard: SnapshotGuard,
        categories: Vec<Category>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            collector,
            orchestrator,
            guard,
            categories,
            collection: collection.into(),
        }
    }

    /// Execute one run, recording progress into the report.
    pub async fn run(&self, mode: SyncMode, cancel: &CancellationToken) -> RunOutcome {
        let mut report = RunReport::started(Utc::now());
        let result = self.execute(mode, cancel, &mut report).await;

        if let Err(e) = &result {
            ::log::error!("Sync failed while {}: {}", report.state, e);
            report.error = Some(e.to_string());
            advance(&mut report, RunState::Failed);
        }
        report.end_time = Some(Utc::now());

        RunOutcome { report, result }
    }

    async fn execute(
        &self,
        mode: SyncMode,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> Result<Delta> {
        log::step(1, 4, "Collecting catalog");
        advance(report, RunState::Collecting);
        let collection = self.collector.collect(&self.categories, cancel).await?;
        report.categories = collection.categories;
        report.snapshot_count = collection.snapshot.len();
        for stats in &report.categories {
            log::sub_item(
                false,
                &format!(
                    "{}: {} pages, {} ids, {} items",
                    stats.category, stats.pages, stats.ids, stats.items
                ),
            );
        }

        log::step(2, 4, "Reconciling with persisted state");
        advance(report, RunState::Reconciling);
        let previous = self
            .orchestrator
            .store()
            .read_all(&self.collection)
            .await
            .map_err(|e| e.with_context(format!("read {}", self.collection)))?;
        report.previous_count = previous.len();

        let delta = reconcile(&collection.snapshot, &previous);
        report.upsert_count = delta.to_upsert.len();
        report.delete_count = delta.to_delete.len();
        log::sub_item(
            true,
            &format!(
                "{} upserts, {} deletes ({} persisted)",
                report.upsert_count, report.delete_count, report.previous_count
            ),
        );

        log::step(3, 4, "Checking snapshot guard");
        self.guard.validate(&delta, previous.len())?;

        if mode == SyncMode::Plan {
            log::step(4, 4, "Plan only, nothing written");
            advance(report, RunState::Done);
            return Ok(delta);
        }

        if delta.is_empty() {
            log::step(4, 4, "Nothing to write");
            advance(report, RunState::Done);
            return Ok(delta);
        }

        if cancel.is_cancelled() {
            return Err(AppError::cancelled("reconciliation"));
        }

        log::step(4, 4, "Writing delta");
        advance(report, RunState::Writing);
        let applied = self.orchestrator.apply(&delta, &self.collection, cancel).await?;
        report.store_writes = applied.store;
        report.index_writes = applied.index;

        advance(report, RunState::Done);
        Ok(delta)
    }
}

/// Apply a full run, surfacing failures as errors.
pub async fn run_sync(runner: &SyncRunner, cancel: &CancellationToken) -> Result<RunReport> {
    let RunOutcome { report, result } = runner.run(SyncMode::Apply, cancel).await;
    result.map(|_| report)
}

fn advance(report: &mut RunReport, next: RunState) {
    if report.state.can_transition_to(next) {
        ::log::debug!("Run state {} -> {}", report.state, next);
        report.state = next;
    } else {
        ::log::warn!("Ignoring illegal run transition {} -> {}", report.state, next);
    }
}
