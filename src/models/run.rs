//! Synchronization run state and reporting.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of one synchronization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Collecting,
    Reconciling,
    Writing,
    Done,
    Failed,
}

impl RunState {
    /// Whether `next` is a legal successor of `self`.
    ///
    /// `Reconciling -> Done` is taken by dry runs, which never write.
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, Collecting)
                | (Collecting, Reconciling)
                | (Collecting, Failed)
                | (Reconciling, Writing)
                | (Reconciling, Done)
                | (Reconciling, Failed)
                | (Writing, Done)
                | (Writing, Failed)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Collecting => "collecting",
            RunState::Reconciling => "reconciling",
            RunState::Writing => "writing",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Items collected from a single category.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryStats {
    pub category: String,
    pub pages: usize,
    pub ids: usize,
    pub items: usize,
}

/// Counters for one bulk write.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WriteStats {
    /// Operations handed to the writer
    pub queued: usize,
    /// Operations committed by successful flushes
    pub written: usize,
    /// Operations in buffers whose flush failed
    pub failed: usize,
    /// Number of successful flushes
    pub flushes: usize,
    /// Bytes committed by successful flushes
    pub bytes: usize,
}

impl WriteStats {
    pub fn merge(&mut self, other: &WriteStats) {
        self.queued += other.queued;
        self.written += other.written;
        self.failed += other.failed;
        self.flushes += other.flushes;
        self.bytes += other.bytes;
    }
}

/// Summary persisted after each run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub state: RunState,
    #[serde(default)]
    pub categories: Vec<CategoryStats>,
    pub snapshot_count: usize,
    pub previous_count: usize,
    pub upsert_count: usize,
    pub delete_count: usize,
    #[serde(default)]
    pub store_writes: WriteStats,
    #[serde(default)]
    pub index_writes: WriteStats,
    #[serde(default)]
    pub error: Option<String>,
}

impl RunReport {
    pub fn started(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            end_time: None,
            state: RunState::Idle,
            categories: Vec::new(),
            snapshot_count: 0,
            previous_count: 0,
            upsert_count: 0,
            delete_count: 0,
            store_writes: WriteStats::default(),
            index_writes: WriteStats::default(),
            error: None,
        }
    }

    /// Elapsed seconds, if the run has finished.
    pub fn duration_secs(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_seconds())
    }
}
