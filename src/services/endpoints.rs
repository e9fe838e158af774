// src/services/endpoints.rs

//! Request construction for the catalog API.

use serde_json::json;

use crate::models::{CatalogConfig, Category, Secrets};
use crate::services::extract::VIDEO_PREFIX;
use crate::transport::{Body, Request};

/// Persisted GraphQL query returning title details.
const DETAILS_QUERY_ID: &str = "cea97958-c71c-4c3c-b94c-877fb3c9b89d";
const DETAILS_QUERY_VERSION: u32 = 102;

/// Numeric genre ids go out as JSON numbers, anything else as a string.
fn genre_key(id: &str) -> serde_json::Value {
    match id.parse::<u64>() {
        Ok(number) => json!(number),
        Err(_) => json!(id),
    }
}

/// Builds listing and enrichment requests for the catalog API.
#[derive(Clone)]
pub struct CatalogEndpoints {
    listing_url: String,
    details_url: String,
    cookie: String,
}

impl CatalogEndpoints {
    pub fn new(config: &CatalogConfig, secrets: &Secrets) -> Self {
        Self {
            listing_url: config.listing_url.clone(),
            details_url: config.details_url.clone(),
            cookie: format!(
                "SecureNetflixId={}; NetflixId={}",
                secrets.secure_session_id, secrets.session_id
            ),
        }
    }

    /// Listing request for `category` covering `offset..=offset + page_size`.
    pub fn page_request(&self, category: &Category, offset: usize, page_size: usize) -> Request {
        let path = json!([
            "genres",
            genre_key(&category.id),
            "su",
            {"from": offset, "to": offset + page_size},
            "reference",
            ["availability", "episodeCount", "queue", "summary"],
        ])
        .to_string();

        Request::post(
            &self.listing_url,
            Body::Multipart(vec![("path".to_string(), path)]),
        )
        .header("Cookie", &self.cookie)
        .context(format!("listing {} offset {}", category.label(), offset))
    }

    /// Enrichment request for a batch of bare ids.
    pub fn details_request(&self, ids: &[String]) -> Request {
        let entity_ids: Vec<String> = ids
            .iter()
            .map(|id| format!("{VIDEO_PREFIX}{id}"))
            .collect();

        let body = json!({
            "operationName": "MiniModalQuery",
            "variables": {
                "videoMerchEnabled": false,
                "fetchPromoVideoOverride": false,
                "hasPromoVideoOverride": false,
                "promoVideoId": 0,
                "videoMerchContext": "BROWSE",
                "isLiveEpisodic": false,
                "artworkContext": {},
                "textEvidenceUiContext": "BOB",
                "unifiedEntityIds": entity_ids,
            },
            "extensions": {
                "persistedQuery": {
                    "id": DETAILS_QUERY_ID,
                    "version": DETAILS_QUERY_VERSION,
                }
            }
        });

        Request::post(&self.details_url, Body::Json(body))
            .header("Cookie", &self.cookie)
            .context(format!("details batch of {}", ids.len()))
    }
}
