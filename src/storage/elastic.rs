//! Elasticsearch-backed search index.
//!
//! Talks to the cluster's REST API directly:
//! - `HEAD /{index}` / `PUT /{index}` to ensure the index exists
//! - `POST /_bulk` with NDJSON `index` actions keyed by item id
//! - `POST /{index}/_search` with a `match_phrase` query on `title`

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::{CatalogItem, SearchConfig};
use crate::storage::SearchIndex;

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_source")]
    source: CatalogItem,
}

/// Search index hosted on an Elasticsearch cluster.
#[derive(Clone)]
pub struct ElasticsearchIndex {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl ElasticsearchIndex {
    /// Use `client` (timeouts and user agent included) for every cluster call.
    pub fn new(client: reqwest::Client, config: &SearchConfig, password: impl Into<String>) -> Self {
        Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: password.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .basic_auth(&self.username, Some(&self.password))
    }

    async fn expect_success(response: reqwest::Response, context: &str) -> Result<Vec<u8>> {
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::store(context, e))?;
        if !status.is_success() {
            return Err(AppError::store(
                context,
                format!("status {}: {}", status.as_u16(), String::from_utf8_lossy(&body)),
            ));
        }
        Ok(body.to_vec())
    }
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    async fn ensure_index(&self, name: &str, schema: &serde_json::Value) -> Result<()> {
        let context = format!("index {name}");
        let response = self
            .request(reqwest::Method::HEAD, name)
            .send()
            .await
            .map_err(|e| AppError::store(&context, e))?;

        match response.status() {
            status if status.is_success() => {
                log::info!("Index {} already exists", name);
                return Ok(());
            }
            StatusCode::NOT_FOUND => {}
            status => {
                return Err(AppError::store(
                    &context,
                    format!("unexpected status {} checking existence", status.as_u16()),
                ));
            }
        }

        let response = self
            .request(reqwest::Method::PUT, name)
            .json(schema)
            .send()
            .await
            .map_err(|e| AppError::store(&context, e))?;
        Self::expect_success(response, &context).await?;
        log::info!("Created index {}", name);
        Ok(())
    }

    async fn bulk_index(&self, name: &str, documents: &[CatalogItem]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let context = format!("bulk index {name} ({} documents)", documents.len());
        let body = bulk_body(name, documents)?;

        let response = self
            .request(reqwest::Method::POST, "_bulk")
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::store(&context, e))?;
        let body = Self::expect_success(response, &context).await?;
        check_bulk_response(&body).map_err(|e| e.with_context(&context))
    }

    async fn search(&self, name: &str, query: &str, limit: usize) -> Result<Vec<CatalogItem>> {
        let context = format!("search {name}");
        let response = self
            .request(reqwest::Method::POST, &format!("{name}/_search"))
            .json(&search_body(query, limit))
            .send()
            .await
            .map_err(|e| AppError::store(&context, e))?;
        let body = Self::expect_success(response, &context).await?;

        let parsed: SearchResponse =
            serde_json::from_slice(&body).map_err(|e| AppError::decode(&context, e))?;
        Ok(parsed.hits.hits.into_iter().map(|hit| hit.source).collect())
    }
}

/// Build an NDJSON bulk body of `index` actions.
pub fn bulk_body(index: &str, documents: &[CatalogItem]) -> Result<String> {
    let mut body = String::new();
    for item in documents {
        let action = json!({ "index": { "_index": index, "_id": item.id } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(item)?);
        body.push('\n');
    }
    Ok(body)
}

/// Phrase query on titles.
pub fn search_body(query: &str, limit: usize) -> serde_json::Value {
    json!({
        "size": limit,
        "query": { "match_phrase": { "title": query } }
    })
}

/// Fail when any bulk item was rejected.
pub fn check_bulk_response(body: &[u8]) -> Result<()> {
    let parsed: BulkResponse =
        serde_json::from_slice(body).map_err(|e| AppError::decode("bulk response", e))?;
    if !parsed.errors {
        return Ok(());
    }

    let failed: Vec<String> = parsed
        .items
        .iter()
        .filter_map(|item| item.get("index"))
        .filter(|action| action.get("error").is_some())
        .map(|action| {
            format!(
                "{}: {}",
                action["_id"].as_str().unwrap_or("?"),
                action["error"]["reason"].as_str().unwrap_or("unknown")
            )
        })
        .collect();

    Err(AppError::store(
        "bulk response",
        format!("{} documents rejected: {}", failed.len(), failed.join("; ")),
    ))
}
