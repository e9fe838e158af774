//! Catalog item, persisted record and snapshot types.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A title as produced by the collection pipeline.
///
/// Identity is `id` alone: two items sharing an `id` are the same entity
/// regardless of their other fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogItem {
    /// Stable identifier, unique within its source
    pub id: String,

    /// Display title
    pub title: String,

    /// Release year (0 when the source does not report one)
    #[serde(default)]
    pub year: i32,

    /// Optional descriptive fields (genres, original title, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl CatalogItem {
    /// Create an item without attributes.
    pub fn new(id: impl Into<String>, title: impl Into<String>, year: i32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            year,
            attributes: BTreeMap::new(),
        }
    }

    /// Attach a descriptive attribute.
    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Document-store representation of a [`CatalogItem`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedRecord {
    #[serde(flatten)]
    pub item: CatalogItem,

    /// When the record was last written
    pub last_updated: DateTime<Utc>,
}

impl PersistedRecord {
    pub fn new(item: CatalogItem, last_updated: DateTime<Utc>) -> Self {
        Self { item, last_updated }
    }

    pub fn id(&self) -> &str {
        &self.item.id
    }
}

/// A source-defined partition of the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    /// Identifier sent upstream (e.g. a genre id)
    pub id: String,

    /// Human-readable label used in logs
    #[serde(default)]
    pub name: String,
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Label for log lines and error context.
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            self.id.clone()
        } else {
            format!("{} ({})", self.name, self.id)
        }
    }
}

/// Every item visible upstream at collection time, unique by `id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    items: Vec<CatalogItem>,
}

impl Snapshot {
    /// Build a snapshot, keeping the first occurrence of each `id`.
    pub fn from_items(items: impl IntoIterator<Item = CatalogItem>) -> Self {
        let mut seen = HashSet::new();
        let items = items
            .into_iter()
            .filter(|item| seen.insert(item.id.clone()))
            .collect();
        Self { items }
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Set of ids in this snapshot.
    pub fn ids(&self) -> HashSet<&str> {
        self.items.iter().map(|item| item.id.as_str()).collect()
    }
}
