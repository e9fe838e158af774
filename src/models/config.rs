//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Category;
use crate::error::{AppError, Result};

/// Environment variable holding the upstream session cookie.
pub const SESSION_ID_ENV: &str = "CATALOG_SESSION_ID";
/// Environment variable holding the upstream secure session cookie.
pub const SECURE_SESSION_ID_ENV: &str = "CATALOG_SECURE_SESSION_ID";
/// Environment variable holding the Elasticsearch password.
pub const ELASTICSEARCH_PASSWORD_ENV: &str = "ELASTICSEARCH_PASSWORD";

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Upstream catalog API and collection behavior
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Bulk writer pool and flush thresholds
    #[serde(default)]
    pub writer: WriterConfig,

    /// Document store backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Search index backend
    #[serde(default)]
    pub search: SearchConfig,

    /// Safety checks applied before a delta is written
    #[serde(default)]
    pub guard: GuardConfig,

    /// Bibliographic feed input
    #[serde(default)]
    pub feed: FeedConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        let catalog = &self.catalog;
        if catalog.categories.is_empty() {
            return Err(AppError::validation("No categories defined"));
        }
        if catalog.page_size == 0 {
            return Err(AppError::validation("catalog.page_size must be > 0"));
        }
        if catalog.enrichment_batch_size == 0 {
            return Err(AppError::validation(
                "catalog.enrichment_batch_size must be > 0",
            ));
        }
        if catalog.max_pages == 0 {
            return Err(AppError::validation("catalog.max_pages must be > 0"));
        }
        if catalog.timeout_secs == 0 {
            return Err(AppError::validation("catalog.timeout_secs must be > 0"));
        }
        if catalog.user_agent.trim().is_empty() {
            return Err(AppError::validation("catalog.user_agent is empty"));
        }
        url::Url::parse(&catalog.listing_url)?;
        url::Url::parse(&catalog.details_url)?;

        if self.writer.workers == 0 {
            return Err(AppError::validation("writer.workers must be > 0"));
        }
        if self.writer.flush_bytes == 0 {
            return Err(AppError::validation("writer.flush_bytes must be > 0"));
        }
        if self.writer.flush_interval_ms == 0 {
            return Err(AppError::validation("writer.flush_interval_ms must be > 0"));
        }
        if self.writer.queue_capacity == 0 {
            return Err(AppError::validation("writer.queue_capacity must be > 0"));
        }

        if !matches!(self.store.backend.as_str(), "local" | "memory") {
            return Err(AppError::validation(format!(
                "Unknown store.backend '{}'",
                self.store.backend
            )));
        }
        if !matches!(
            self.search.backend.as_str(),
            "local" | "elasticsearch" | "disabled"
        ) {
            return Err(AppError::validation(format!(
                "Unknown search.backend '{}'",
                self.search.backend
            )));
        }
        if self.search.backend == "elasticsearch" {
            url::Url::parse(&self.search.url)?;
        }
        if let Some(feed_url) = &self.feed.url {
            url::Url::parse(feed_url)?;
        }
        if let Some(percent) = self.guard.max_delete_percent {
            if percent > 100 {
                return Err(AppError::validation(
                    "guard.max_delete_percent must be <= 100",
                ));
            }
        }
        Ok(())
    }

    /// Check that secrets needed by the configured backends are present.
    pub fn require_secrets(&self) -> Result<Secrets> {
        let session_id = require_env(SESSION_ID_ENV)?;
        let secure_session_id = require_env(SECURE_SESSION_ID_ENV)?;
        Ok(Secrets {
            session_id,
            secure_session_id,
            elasticsearch_password: self.search_password()?,
        })
    }

    /// Password for the search backend, when the backend needs one.
    pub fn search_password(&self) -> Result<Option<String>> {
        if self.search.backend == "elasticsearch" {
            Ok(Some(require_env(ELASTICSEARCH_PASSWORD_ENV)?))
        } else {
            Ok(None)
        }
    }
}

fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::config(format!(
            "{name} environment variable is required"
        ))),
    }
}

/// Credentials read from the environment.
#[derive(Clone, Default)]
pub struct Secrets {
    pub session_id: String,
    pub secure_session_id: String,
    pub elasticsearch_password: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("session_id", &"<redacted>")
            .field("secure_session_id", &"<redacted>")
            .field(
                "elasticsearch_password",
                &self.elasticsearch_password.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Upstream catalog API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Listing endpoint (paginated, embeds typed references)
    #[serde(default = "defaults::listing_url")]
    pub listing_url: String,

    /// Enrichment endpoint (one call per id batch)
    #[serde(default = "defaults::details_url")]
    pub details_url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Listing page size; the offset advances by `page_size + 1`
    #[serde(default = "defaults::page_size")]
    pub page_size: usize,

    /// Maximum ids per enrichment call
    #[serde(default = "defaults::enrichment_batch_size")]
    pub enrichment_batch_size: usize,

    /// Hard ceiling on pages per category
    #[serde(default = "defaults::max_pages")]
    pub max_pages: usize,

    /// Categories collected in parallel
    #[serde(default = "defaults::category_concurrency")]
    pub category_concurrency: usize,

    /// Categories making up the catalog
    #[serde(default = "defaults::categories")]
    pub categories: Vec<Category>,
}

impl CatalogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            listing_url: defaults::listing_url(),
            details_url: defaults::details_url(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            page_size: defaults::page_size(),
            enrichment_batch_size: defaults::enrichment_batch_size(),
            max_pages: defaults::max_pages(),
            category_concurrency: defaults::category_concurrency(),
            categories: defaults::categories(),
        }
    }
}

/// Bulk writer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Number of concurrent writer workers
    #[serde(default = "defaults::workers")]
    pub workers: usize,

    /// Flush a worker buffer once it holds this many bytes
    #[serde(default = "defaults::flush_bytes")]
    pub flush_bytes: usize,

    /// Flush a non-empty worker buffer after this long
    #[serde(default = "defaults::flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Bounded capacity of the shared operation queue
    #[serde(default = "defaults::queue_capacity")]
    pub queue_capacity: usize,
}

impl WriterConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            workers: defaults::workers(),
            flush_bytes: defaults::flush_bytes(),
            flush_interval_ms: defaults::flush_interval_ms(),
            queue_capacity: defaults::queue_capacity(),
        }
    }
}

/// Document store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// `local` (JSON files) or `memory`
    #[serde(default = "defaults::store_backend")]
    pub backend: String,

    /// Root directory for the local backend (relative to the data dir)
    #[serde(default = "defaults::store_root")]
    pub root: PathBuf,

    /// Collection reconciled against the catalog
    #[serde(default = "defaults::catalog_collection")]
    pub catalog_collection: String,

    /// Collection receiving feed upserts
    #[serde(default = "defaults::feed_collection")]
    pub feed_collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: defaults::store_backend(),
            root: defaults::store_root(),
            catalog_collection: defaults::catalog_collection(),
            feed_collection: defaults::feed_collection(),
        }
    }
}

/// Search index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// `local`, `elasticsearch` or `disabled`
    #[serde(default = "defaults::search_backend")]
    pub backend: String,

    /// Target index name
    #[serde(default = "defaults::index_name")]
    pub index: String,

    /// Elasticsearch base URL
    #[serde(default = "defaults::elasticsearch_url")]
    pub url: String,

    /// Elasticsearch user
    #[serde(default = "defaults::elasticsearch_username")]
    pub username: String,

    /// Optional JSON mapping file; the built-in title mapping is used otherwise
    #[serde(default)]
    pub schema_path: Option<PathBuf>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: defaults::search_backend(),
            index: defaults::index_name(),
            url: defaults::elasticsearch_url(),
            username: defaults::elasticsearch_username(),
            schema_path: None,
        }
    }
}

/// Checks run between reconciliation and writing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Refuse to wipe a non-empty store with an empty snapshot
    #[serde(default = "defaults::refuse_empty_snapshot")]
    pub refuse_empty_snapshot: bool,

    /// Refuse deltas deleting more than this share of prior records
    #[serde(default)]
    pub max_delete_percent: Option<u8>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            refuse_empty_snapshot: defaults::refuse_empty_snapshot(),
            max_delete_percent: None,
        }
    }
}

/// Bibliographic feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Local TSV export, plain or gzip-compressed
    #[serde(default = "defaults::feed_path")]
    pub path: PathBuf,

    /// Export to download into `path` before loading, e.g.
    /// `https://datasets.imdbws.com/title.basics.tsv.gz`
    #[serde(default)]
    pub url: Option<String>,

    /// Field delimiter
    #[serde(default = "defaults::feed_delimiter")]
    pub delimiter: char,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            path: defaults::feed_path(),
            url: None,
            delimiter: defaults::feed_delimiter(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    use super::Category;

    // Catalog defaults
    pub fn listing_url() -> String {
        "https://www.netflix.com/nq/website/memberapi/release/pathEvaluator?original_path=%2Fshakti%2Fmre%2FpathEvaluator".into()
    }
    pub fn details_url() -> String {
        "https://web.prod.cloud.netflix.com/graphql".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; catalog-sync/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn page_size() -> usize {
        100
    }
    pub fn enrichment_batch_size() -> usize {
        100
    }
    pub fn max_pages() -> usize {
        1000
    }
    pub fn category_concurrency() -> usize {
        2
    }
    pub fn categories() -> Vec<Category> {
        vec![
            Category::new("1365", "Movies"),
            Category::new("43040", "TV Shows"),
        ]
    }

    // Writer defaults
    pub fn workers() -> usize {
        10
    }
    pub fn flush_bytes() -> usize {
        5_000_000
    }
    pub fn flush_interval_ms() -> u64 {
        30_000
    }
    pub fn queue_capacity() -> usize {
        1024
    }

    // Store defaults
    pub fn store_backend() -> String {
        "local".into()
    }
    pub fn store_root() -> PathBuf {
        PathBuf::from("store")
    }
    pub fn catalog_collection() -> String {
        "netflix_titles".into()
    }
    pub fn feed_collection() -> String {
        "imdb_titles".into()
    }

    // Search defaults
    pub fn search_backend() -> String {
        "local".into()
    }
    pub fn index_name() -> String {
        "titles".into()
    }
    pub fn elasticsearch_url() -> String {
        "http://localhost:9200".into()
    }
    pub fn elasticsearch_username() -> String {
        "elastic".into()
    }

    // Guard defaults
    pub fn refuse_empty_snapshot() -> bool {
        true
    }

    // Feed defaults
    pub fn feed_path() -> PathBuf {
        PathBuf::from("title.basics.tsv")
    }
    pub fn feed_delimiter() -> char {
        '\t'
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.catalog.categories.len(), 2);
        assert_eq!(config.writer.workers, 10);
        assert_eq!(config.writer.flush_bytes, 5_000_000);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [catalog]
            page_size = 50
            categories = [{ id = "7424" }]

            [writer]
            workers = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.catalog.page_size, 50);
        assert_eq!(config.catalog.enrichment_batch_size, 100);
        assert_eq!(config.catalog.categories, vec![Category::new("7424", "")]);
        assert_eq!(config.writer.workers, 3);
        assert_eq!(config.writer.flush_interval_ms, 30_000);
        assert_eq!(config.store.catalog_collection, "netflix_titles");
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut config = Config::default();
        config.writer.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_backend() {
        let mut config = Config::default();
        config.search.backend = "solr".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn feed_url_is_optional_and_validated() {
        let config: Config = toml::from_str(
            r#"
            [feed]
            url = "https://datasets.imdbws.com/title.basics.tsv.gz"
            path = "title.basics.tsv.gz"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.feed.delimiter, '\t');
        assert!(Config::default().feed.url.is_none());

        let mut broken = config;
        broken.feed.url = Some("not a url".into());
        assert!(broken.validate().is_err());
    }

    #[test]
    fn load_or_default_falls_back() {
        let config = Config::load_or_default("/definitely/not/here.toml");
        assert_eq!(config.catalog.page_size, 100);
    }
}
