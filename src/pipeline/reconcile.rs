//! Reconciliation between a fresh snapshot and the persisted state.
//!
//! Whole-collection diff: everything in the new snapshot is upserted, and
//! every persisted id missing from it is deleted.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::models::{CatalogItem, PersistedRecord, Snapshot};

/// Writes needed to converge the persisted state onto a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Every item of the new snapshot, applied as whole-record replacement
    pub to_upsert: Vec<CatalogItem>,
    /// Persisted ids absent from the new snapshot
    pub to_delete: Vec<String>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.to_upsert.is_empty() && self.to_delete.is_empty()
    }
}

/// Compute the delta in O(n + m) time.
///
/// `to_delete` keeps the order in which ids appear in `old`, without repeats.
pub fn reconcile(new: &Snapshot, old: &[PersistedRecord]) -> Delta {
    let new_ids = new.ids();

    let mut seen = HashSet::with_capacity(old.len());
    let to_delete = old
        .iter()
        .map(PersistedRecord::id)
        .filter(|id| !new_ids.contains(id))
        .filter(|id| seen.insert(*id))
        .map(String::from)
        .collect();

    Delta {
        to_upsert: new.items().to_vec(),
        to_delete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(ids: &[&str]) -> Snapshot {
        Snapshot::from_items(ids.iter().map(|id| CatalogItem::new(*id, *id, 2000)))
    }

    fn persisted(ids: &[&str]) -> Vec<PersistedRecord> {
        ids.iter()
            .map(|id| PersistedRecord::new(CatalogItem::new(*id, "old", 1999), Utc::now()))
            .collect()
    }

    #[test]
    fn test_reconcile_basic_scenario() {
        let delta = reconcile(&snapshot(&["B", "C", "D"]), &persisted(&["A", "B", "C"]));

        assert_eq!(delta.to_delete, vec!["A"]);
        let upserts: Vec<&str> = delta.to_upsert.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(upserts, vec!["B", "C", "D"]);
    }

    #[test]
    fn test_upserts_and_deletes_are_disjoint() {
        let delta = reconcile(
            &snapshot(&["1", "2", "3", "7"]),
            &persisted(&["2", "4", "5", "7", "9"]),
        );

        let upserts: HashSet<&str> = delta.to_upsert.iter().map(|i| i.id.as_str()).collect();
        assert!(delta.to_delete.iter().all(|id| !upserts.contains(id.as_str())));
        assert_eq!(delta.to_delete, vec!["4", "5", "9"]);
    }

    #[test]
    fn test_reconcile_is_idempotent_after_apply() {
        let new = snapshot(&["B", "C", "D"]);
        let first = reconcile(&new, &persisted(&["A", "B", "C"]));

        // State after applying the first delta
        let mut state: Vec<&str> = vec!["A", "B", "C"];
        state.retain(|id| !first.to_delete.iter().any(|d| d == id));
        for item in &first.to_upsert {
            if !state.contains(&item.id.as_str()) {
                state.push(&item.id);
            }
        }

        let second = reconcile(&new, &persisted(&state));
        assert!(second.to_delete.is_empty());
        assert_eq!(second.to_upsert, new.items());
    }

    #[test]
    fn test_empty_sides() {
        let delta = reconcile(&Snapshot::default(), &persisted(&["A", "A"]));
        assert_eq!(delta.to_delete, vec!["A"]);
        assert!(delta.to_upsert.is_empty());

        let delta = reconcile(&snapshot(&["A"]), &[]);
        assert!(delta.to_delete.is_empty());
        assert_eq!(delta.to_upsert.len(), 1);
        assert!(reconcile(&Snapshot::default(), &[]).is_empty());
    }
}
