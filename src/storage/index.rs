//! File-backed full-text index over catalog titles.
//!
//! Maps normalized title tokens to item ids, the same way a search engine's
//! inverted index does, so that title searches work without a running
//! search cluster.
//!
//! On disk an index is a journal: the schema, then one line per indexed
//! document. Postings are rebuilt in memory when the journal is replayed.
//!
//! ```text
//! {root}/indexes/titles.ndjson
//! {"schema":{...}}
//! {"document":{"id":"80100172","title":"Dark",...}}
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{AppError, Result};
use crate::models::CatalogItem;
use crate::storage::{SearchIndex, default_title_schema, journal};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Entry {
    Schema(serde_json::Value),
    Document(CatalogItem),
}

/// In-memory form of a single index.
#[derive(Debug, Clone, Default)]
pub struct IndexFile {
    pub schema: serde_json::Value,
    pub documents: BTreeMap<String, CatalogItem>,
    pub postings: BTreeMap<String, BTreeSet<String>>,
}

impl IndexFile {
    fn with_schema(schema: serde_json::Value) -> Self {
        Self {
            schema,
            ..Self::default()
        }
    }

    /// Insert or wholly replace a document, keeping postings consistent.
    pub fn insert(&mut self, item: CatalogItem) {
        if let Some(previous) = self.documents.remove(&item.id) {
            for token in tokenize(&previous.title) {
                if let Some(ids) = self.postings.get_mut(&token) {
                    ids.remove(&previous.id);
                    if ids.is_empty() {
                        self.postings.remove(&token);
                    }
                }
            }
        }

        for token in tokenize(&item.title) {
            self.postings
                .entry(token)
                .or_default()
                .insert(item.id.clone());
        }
        self.documents.insert(item.id.clone(), item);
    }

    /// Documents whose title contains every query token as a contiguous run.
    ///
    /// Exact title matches rank first, then shorter titles, then by id.
    pub fn search(&self, query: &str, limit: usize) -> Vec<CatalogItem> {
        let terms = tokenize(query);
        let Some((first, rest)) = terms.split_first() else {
            return Vec::new();
        };

        let Some(mut candidates) = self.postings.get(first).cloned() else {
            return Vec::new();
        };
        for term in rest {
            match self.postings.get(term) {
                Some(ids) => candidates.retain(|id| ids.contains(id)),
                None => return Vec::new(),
            }
        }

        let mut hits: Vec<(bool, usize, &CatalogItem)> = candidates
            .iter()
            .filter_map(|id| self.documents.get(id))
            .filter_map(|item| {
                let tokens = tokenize(&item.title);
                contains_run(&tokens, &terms).then_some((
                    tokens == terms,
                    tokens.len(),
                    item,
                ))
            })
            .collect();

        hits.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then(a.1.cmp(&b.1))
                .then_with(|| a.2.id.cmp(&b.2.id))
        });
        hits.into_iter()
            .take(limit)
            .map(|(_, _, item)| item.clone())
            .collect()
    }
}

/// Search index persisted as one journal per index name.
#[derive(Clone)]
pub struct LocalSearchIndex {
    root_dir: PathBuf,
    indexes: Arc<Mutex<HashMap<String, IndexFile>>>,
}

impl LocalSearchIndex {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            indexes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(AppError::validation(format!("invalid index name '{name}'")));
        }
        Ok(self.root_dir.join("indexes").join(format!("{name}.ndjson")))
    }

    /// Replay an index journal, compacting re-indexed documents away.
    async fn load(&self, name: &str) -> Result<Option<IndexFile>> {
        let path = self.path(name)?;
        let Some(entries) = journal::replay::<Entry>(&path).await? else {
            return Ok(None);
        };

        let total = entries.len();
        let mut file = IndexFile::default();
        for entry in entries {
            match entry {
                Entry::Schema(schema) => file.schema = schema,
                Entry::Document(item) => file.insert(item),
            }
        }

        if total > file.documents.len() + 1 {
            log::debug!(
                "Compacting index {}: {} entries -> {} documents",
                name,
                total,
                file.documents.len()
            );
            self.create(name, &file).await?;
        }
        Ok(Some(file))
    }

    /// Write a fresh journal holding the schema and current documents.
    async fn create(&self, name: &str, file: &IndexFile) -> Result<()> {
        let path = self.path(name)?;
        let entries: Vec<Entry> = std::iter::once(Entry::Schema(file.schema.clone()))
            .chain(file.documents.values().cloned().map(Entry::Document))
            .collect();
        journal::rewrite(&path, &entries)
            .await
            .map_err(|e| AppError::store(format!("index {name}"), e))
    }
}

#[async_trait]
impl SearchIndex for LocalSearchIndex {
    async fn ensure_index(&self, name: &str, schema: &serde_json::Value) -> Result<()> {
        let mut indexes = self.indexes.lock().await;
        if indexes.contains_key(name) {
            return Ok(());
        }
        if let Some(existing) = self.load(name).await? {
            log::info!("Index {} already exists", name);
            indexes.insert(name.to_string(), existing);
            return Ok(());
        }

        let file = IndexFile::with_schema(schema.clone());
        self.create(name, &file).await?;
        log::info!("Created index {}", name);
        indexes.insert(name.to_string(), file);
        Ok(())
    }

    async fn bulk_index(&self, name: &str, documents: &[CatalogItem]) -> Result<()> {
        let mut indexes = self.indexes.lock().await;
        if !indexes.contains_key(name) {
            let file = match self.load(name).await? {
                Some(file) => file,
                None => {
                    let file = IndexFile::with_schema(default_title_schema());
                    self.create(name, &file).await?;
                    file
                }
            };
            indexes.insert(name.to_string(), file);
        }
        let Some(file) = indexes.get_mut(name) else {
            return Err(AppError::store(format!("index {name}"), "not loaded"));
        };

        for item in documents {
            file.insert(item.clone());
        }
        let entries: Vec<Entry> = documents.iter().cloned().map(Entry::Document).collect();
        journal::append(&self.path(name)?, &entries)
            .await
            .map_err(|e| AppError::store(format!("index {name}"), e))
    }

    async fn search(&self, name: &str, query: &str, limit: usize) -> Result<Vec<CatalogItem>> {
        let mut indexes = self.indexes.lock().await;
        if !indexes.contains_key(name) {
            match self.load(name).await? {
                Some(file) => {
                    indexes.insert(name.to_string(), file);
                }
                None => {
                    return Err(AppError::store(
                        format!("index {name}"),
                        "index does not exist",
                    ));
                }
            }
        }
        Ok(indexes
            .get(name)
            .map(|file| file.search(query, limit))
            .unwrap_or_default())
    }
}

/// Tokenize a title into normalized keywords.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .unicode_words()
        .filter(|word| !is_stopword(word))
        .map(String::from)
        .collect()
}

fn contains_run(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty()
        && haystack
            .windows(needle.len())
            .any(|window| window == needle)
}

/// Check if a word is a common English stopword.
fn is_stopword(word: &str) -> bool {
    const STOPWORDS: &[&str] = &[
        "the", "a", "an", "of", "and", "or", "to", "in", "on", "at", "for", "with", "by",
        "from", "as",
    ];
    STOPWORDS.contains(&word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn items() -> Vec<CatalogItem> {
        vec![
            CatalogItem::new("1", "The Dark Knight", 2008),
            CatalogItem::new("2", "Dark", 2017),
            CatalogItem::new("3", "Knight and Day", 2010),
            CatalogItem::new("4", "Knight Dark", 2000),
        ]
    }

    #[test]
    fn test_tokenize_drops_stopwords_and_case() {
        assert_eq!(tokenize("The Lord of the Rings"), vec!["lord", "rings"]);
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_phrase_search_requires_contiguous_terms() {
        let mut file = IndexFile::default();
        for item in items() {
            file.insert(item);
        }

        let hits: Vec<String> = file
            .search("dark knight", 10)
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(hits, vec!["1"]);
    }

    #[test]
    fn test_exact_and_shorter_titles_rank_first() {
        let mut file = IndexFile::default();
        for item in items() {
            file.insert(item);
        }

        let hits: Vec<String> = file.search("dark", 10).into_iter().map(|i| i.id).collect();
        assert_eq!(hits, vec!["2", "1", "4"]);
        assert_eq!(file.search("dark", 1).len(), 1);
        assert!(file.search("missing", 10).is_empty());
    }

    #[test]
    fn test_reindex_replaces_old_tokens() {
        let mut file = IndexFile::default();
        file.insert(CatalogItem::new("1", "Old Name", 2000));
        file.insert(CatalogItem::new("1", "New Name", 2001));

        assert!(file.search("old", 10).is_empty());
        assert_eq!(file.search("new name", 10)[0].year, 2001);
        assert!(!file.postings.contains_key("old"));
    }

    #[tokio::test]
    async fn test_persists_across_instances() {
        let tmp = TempDir::new().unwrap();
        let index = LocalSearchIndex::new(tmp.path());
        index
            .ensure_index("titles", &default_title_schema())
            .await
            .unwrap();
        index.bulk_index("titles", &items()).await.unwrap();

        let reopened = LocalSearchIndex::new(tmp.path());
        let hits = reopened.search("titles", "knight and day", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "3");
    }

    #[tokio::test]
    async fn test_ensure_index_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let index = LocalSearchIndex::new(tmp.path());
        index.ensure_index("titles", &default_title_schema()).await.unwrap();
        index.bulk_index("titles", &items()).await.unwrap();

        let reopened = LocalSearchIndex::new(tmp.path());
        reopened
            .ensure_index("titles", &default_title_schema())
            .await
            .unwrap();
        assert_eq!(reopened.search("titles", "dark", 10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_bulk_index_appends_and_reload_compacts() {
        let tmp = TempDir::new().unwrap();
        let journal_lines = || {
            std::fs::read_to_string(tmp.path().join("indexes").join("titles.ndjson"))
                .unwrap()
                .lines()
                .count()
        };

        let index = LocalSearchIndex::new(tmp.path());
        index.ensure_index("titles", &default_title_schema()).await.unwrap();
        index.bulk_index("titles", &items()).await.unwrap();
        index
            .bulk_index("titles", &[CatalogItem::new("2", "Dark Matter", 2024)])
            .await
            .unwrap();
        assert_eq!(journal_lines(), 6);

        let reopened = LocalSearchIndex::new(tmp.path());
        let hits = reopened.search("titles", "matter", 5).await.unwrap();
        assert_eq!(hits[0].id, "2");
        assert_eq!(journal_lines(), 5);
    }

    #[tokio::test]
    async fn test_search_missing_index_fails() {
        let tmp = TempDir::new().unwrap();
        let index = LocalSearchIndex::new(tmp.path());

        let err = index.search("nope", "dark", 10).await.unwrap_err();
        assert!(matches!(err, AppError::Store { .. }));
    }
}
