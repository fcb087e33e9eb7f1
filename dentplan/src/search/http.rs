//! HTTP semantic search client
//!
//! Talks to the pricing service's `/search` endpoint: POST `{query, top_k}`,
//! receives scored catalog rows.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::catalog::CatalogEntry;
use crate::config::SemanticConfig;

use super::{ScoredEntry, SearchError, SemanticSearch};

/// Semantic search over HTTP
pub struct HttpSemanticSearch {
    base_url: String,
    http: Client,
}

impl HttpSemanticSearch {
    /// Create a new client from configuration
    pub fn from_config(config: &SemanticConfig) -> Result<Self, SearchError> {
        debug!(base_url = %config.base_url, "from_config: called");
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(SearchError::Network)?;

        Ok(Self {
            base_url: config.base_url.clone(),
            http,
        })
    }
}

#[async_trait]
impl SemanticSearch for HttpSemanticSearch {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredEntry>, SearchError> {
        debug!(%query, %top_k, "search: called");
        let url = format!("{}/search", self.base_url);
        let body = serde_json::json!({
            "query": query,
            "top_k": top_k,
        });

        let response = self.http.post(url).json(&body).send().await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            debug!(%status, "search: API error");
            let message = response.text().await.unwrap_or_default();
            return Err(SearchError::Api { status, message });
        }

        let rows: Vec<SearchRow> = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;

        debug!(row_count = rows.len(), "search: success");
        Ok(rows
            .into_iter()
            .map(|row| ScoredEntry {
                entry: CatalogEntry {
                    code: row.code,
                    display_name: row.display_name,
                    base_price: row.base_price,
                    section: row.section,
                },
                score: row.score,
            })
            .collect())
    }
}

/// Wire shape served by the search endpoint
#[derive(Debug, Deserialize)]
struct SearchRow {
    code: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    base_price: f64,
    #[serde(default)]
    section: String,
    #[serde(default)]
    score: Option<f32>,
}
