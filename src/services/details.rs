// src/services/details.rs

//! Enrichment fetcher: resolves id batches into catalog items.

use std::sync::Arc;

use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::CatalogItem;
use crate::services::CatalogEndpoints;
use crate::services::extract::normalize_id;
use crate::transport::Transport;

#[derive(Debug, Deserialize)]
struct DetailsEnvelope {
    #[serde(default)]
    data: Option<DetailsData>,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct DetailsData {
    #[serde(default, rename = "unifiedEntities")]
    unified_entities: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    #[serde(default, rename = "unifiedEntityId")]
    unified_entity_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "latestYear")]
    latest_year: Option<i32>,
    #[serde(default, rename = "__typename")]
    type_name: Option<String>,
}

impl RawEntity {
    /// Convert to an item, or `None` when id or title is missing.
    fn into_item(self) -> Option<CatalogItem> {
        let id = normalize_id(self.unified_entity_id.as_deref()?).to_string();
        let title = self.title?.trim().to_string();
        if id.is_empty() || title.is_empty() {
            return None;
        }

        let mut item = CatalogItem::new(id, title, self.latest_year.unwrap_or_default());
        if let Some(type_name) = self.type_name {
            item = item.with_attribute("entity_type", type_name);
        }
        Some(item)
    }
}

/// Fetches descriptive fields for bounded batches of ids.
#[derive(Clone)]
pub struct DetailFetcher {
    transport: Arc<dyn Transport>,
    endpoints: Arc<CatalogEndpoints>,
    batch_limit: usize,
}

impl DetailFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoints: Arc<CatalogEndpoints>,
        batch_limit: usize,
    ) -> Self {
        Self {
            transport,
            endpoints,
            batch_limit,
        }
    }

    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    /// Resolve one batch with a single upstream call.
    ///
    /// Records lacking an id or title, or with mistyped fields, are dropped;
    /// only a body that is not a details envelope fails the batch.
    pub async fn fetch_details(&self, ids: &[String]) -> Result<Vec<CatalogItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        if ids.len() > self.batch_limit {
            return Err(AppError::validation(format!(
                "details batch of {} exceeds limit {}",
                ids.len(),
                self.batch_limit
            )));
        }

        let context = batch_context(ids);
        let request = self.endpoints.details_request(ids);
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| e.with_context(&context))?;

        let items = parse_details(&response.body).map_err(|e| e.with_context(&context))?;
        if items.len() < ids.len() {
            log::debug!(
                "{}: {} of {} records usable",
                context,
                items.len(),
                ids.len()
            );
        }
        Ok(items)
    }
}

/// Decode an enrichment response body.
pub fn parse_details(body: &[u8]) -> Result<Vec<CatalogItem>> {
    let envelope: DetailsEnvelope =
        serde_json::from_slice(body).map_err(|e| AppError::decode("details response", e))?;

    let Some(data) = envelope.data else {
        let reason = envelope
            .errors
            .map(|errors| errors.to_string())
            .unwrap_or_else(|| "missing data".to_string());
        return Err(AppError::decode("details response", reason));
    };

    // Entities decode one by one; a malformed record only drops itself.
    Ok(data
        .unified_entities
        .into_iter()
        .filter_map(|entity| match serde_json::from_value::<RawEntity>(entity) {
            Ok(raw) => raw.into_item(),
            Err(e) => {
                log::debug!("Dropping undecodable details record: {}", e);
                None
            }
        })
        .collect())
}

fn batch_context(ids: &[String]) -> String {
    match (ids.first(), ids.last()) {
        (Some(first), Some(last)) if ids.len() > 1 => {
            format!("details batch {}..{} ({} ids)", first, last, ids.len())
        }
        (Some(first), _) => format!("details batch {first}"),
        _ => "details batch".to_string(),
    }
}
