//! Snapshot guard.
//!
//! Refuses to apply a delta that would wipe out most of the persisted state,
//! which is what an upstream outage returning empty pages looks like.

use crate::error::{AppError, Result};
use crate::models::GuardConfig;
use crate::pipeline::Delta;

/// Outcome of a guard check.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardVerdict {
    /// Safe to proceed with the write
    Safe { delete_count: usize, previous_count: usize },
    /// Nothing persisted yet
    ColdStart { snapshot_count: usize },
    /// New snapshot is empty while the store is not
    EmptySnapshot { previous_count: usize },
    /// Too large a share of the store would be deleted
    Triggered {
        delete_count: usize,
        previous_count: usize,
        delete_percent: f64,
    },
}

/// Guard evaluated between reconciliation and writing.
#[derive(Debug, Clone, Default)]
pub struct SnapshotGuard {
    config: GuardConfig,
}

impl SnapshotGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self { config }
    }

    /// Classify a delta against the size of the persisted state.
    pub fn check(&self, delta: &Delta, previous_count: usize) -> GuardVerdict {
        let delete_count = delta.to_delete.len();

        if previous_count == 0 {
            return GuardVerdict::ColdStart {
                snapshot_count: delta.to_upsert.len(),
            };
        }

        if delta.to_upsert.is_empty() && self.config.refuse_empty_snapshot {
            return GuardVerdict::EmptySnapshot { previous_count };
        }

        if let Some(max_percent) = self.config.max_delete_percent {
            let delete_percent = delete_count as f64 / previous_count as f64 * 100.0;
            if delete_percent > f64::from(max_percent) {
                return GuardVerdict::Triggered {
                    delete_count,
                    previous_count,
                    delete_percent,
                };
            }
        }

        GuardVerdict::Safe {
            delete_count,
            previous_count,
        }
    }

    /// Return an error when the delta must not be applied.
    pub fn validate(&self, delta: &Delta, previous_count: usize) -> Result<()> {
        match self.check(delta, previous_count) {
            GuardVerdict::Safe {
                delete_count,
                previous_count,
            } => {
                log::info!(
                    "Snapshot guard: SAFE ({} deletes of {} records)",
                    delete_count,
                    previous_count
                );
                Ok(())
            }
            GuardVerdict::ColdStart { snapshot_count } => {
                log::info!(
                    "Snapshot guard: COLD START ({} items, nothing persisted)",
                    snapshot_count
                );
                Ok(())
            }
            GuardVerdict::EmptySnapshot { previous_count } => {
                log::error!(
                    "Snapshot guard: TRIGGERED! empty snapshot would delete all {} records",
                    previous_count
                );
                Err(AppError::SnapshotGuard {
                    previous_count,
                    delete_count: delta.to_delete.len(),
                    reason: "empty snapshot".to_string(),
                })
            }
            GuardVerdict::Triggered {
                delete_count,
                previous_count,
                delete_percent,
            } => {
                let max = self.config.max_delete_percent.unwrap_or_default();
                log::error!(
                    "Snapshot guard: TRIGGERED! {} of {} records ({:.1}% > {}% threshold)",
                    delete_count,
                    previous_count,
                    delete_percent,
                    max
                );
                Err(AppError::SnapshotGuard {
                    previous_count,
                    delete_count,
                    reason: format!("{delete_percent:.1}% exceeds {max}%"),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CatalogItem;

    fn delta(upserts: usize, deletes: usize) -> Delta {
        Delta {
            to_upsert: (0..upserts)
                .map(|i| CatalogItem::new(i.to_string(), "t", 2000))
                .collect(),
            to_delete: (0..deletes).map(|i| format!("old-{i}")).collect(),
        }
    }

    #[test]
    fn test_cold_start_allows_anything() {
        let guard = SnapshotGuard::default();
        assert!(matches!(
            guard.check(&delta(0, 0), 0),
            GuardVerdict::ColdStart { snapshot_count: 0 }
        ));
        assert!(guard.validate(&delta(5, 0), 0).is_ok());
    }

    #[test]
    fn test_empty_snapshot_is_refused_by_default() {
        let guard = SnapshotGuard::new(GuardConfig::default());
        let err = guard.validate(&delta(0, 10), 10).unwrap_err();
        assert!(matches!(err, AppError::SnapshotGuard { delete_count: 10, .. }));
    }

    #[test]
    fn test_empty_snapshot_allowed_when_disabled() {
        let guard = SnapshotGuard::new(GuardConfig {
            refuse_empty_snapshot: false,
            max_delete_percent: None,
        });
        assert!(guard.validate(&delta(0, 10), 10).is_ok());
    }

    #[test]
    fn test_delete_percent_threshold() {
        let guard = SnapshotGuard::new(GuardConfig {
            refuse_empty_snapshot: true,
            max_delete_percent: Some(20),
        });

        assert!(guard.validate(&delta(80, 20), 100).is_ok());
        let verdict = guard.check(&delta(70, 30), 100);
        assert!(matches!(verdict, GuardVerdict::Triggered { delete_count: 30, .. }));
        assert!(guard.validate(&delta(70, 30), 100).is_err());
    }

    #[test]
    fn test_threshold_off_by_default() {
        let guard = SnapshotGuard::default();
        assert!(guard.validate(&delta(1, 99), 100).is_ok());
    }
}
