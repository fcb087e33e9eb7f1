//! HTTP pricing backend
//!
//! Talks to the external pricing service's `/plan` endpoint. A 404 whose
//! detail names a code maps to `CodeNotFound`; everything else the operator
//! cannot fix maps to `Unavailable`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::PricingConfig;
use crate::plan::{Plan, PlanLine};

use super::{PricingBackend, PricingError};

const DEFAULT_TIMEOUT_MS: u64 = 15_000;

pub struct HttpPricingBackend {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct PlanRequest<'a> {
    codes: &'a [String],
}

#[derive(Deserialize)]
struct PlanRow {
    code: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    section: String,
    #[serde(default)]
    base_price: f64,
    #[serde(default = "one")]
    quantity: u32,
    #[serde(default)]
    line_total: f64,
}

fn one() -> u32 {
    1
}

#[derive(Deserialize)]
struct PlanResponse {
    items: Vec<PlanRow>,
    #[serde(default)]
    total: f64,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    detail: String,
}

impl HttpPricingBackend {
    pub fn from_config(config: &PricingConfig) -> Result<Self, PricingError> {
        let timeout_ms = if config.timeout_ms == 0 {
            DEFAULT_TIMEOUT_MS
        } else {
            config.timeout_ms
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| PricingError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Pull the offending code out of a 404 detail like
    /// "Код 123456 не найден"; fall back to the raw detail.
    fn code_from_detail(detail: &str, requested: &[String]) -> Option<String> {
        requested
            .iter()
            .find(|code| detail.contains(code.as_str()))
            .cloned()
    }
}

#[async_trait]
impl PricingBackend for HttpPricingBackend {
    async fn price_codes(&self, codes: &[String]) -> Result<Plan, PricingError> {
        let url = format!("{}/plan", self.base_url);
        debug!(%url, code_count = codes.len(), "price_codes: called");

        let response = self
            .client
            .post(&url)
            .json(&PlanRequest { codes })
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "price_codes: request failed");
                PricingError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            let body: ApiErrorBody = response
                .json()
                .await
                .unwrap_or(ApiErrorBody { detail: String::new() });
            let code = Self::code_from_detail(&body.detail, codes)
                .unwrap_or_else(|| body.detail.clone());
            return Err(PricingError::CodeNotFound(code));
        }
        if !status.is_success() {
            warn!(%status, "price_codes: non-success status");
            return Err(PricingError::Unavailable(format!("status {status}")));
        }

        let body: PlanResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "price_codes: malformed response");
            PricingError::Unavailable(e.to_string())
        })?;

        let lines: Vec<PlanLine> = body
            .items
            .into_iter()
            .map(|row| PlanLine {
                code: row.code,
                display_name: row.display_name,
                section: row.section,
                base_price: row.base_price,
                quantity: row.quantity,
                line_total: if row.line_total > 0.0 {
                    row.line_total
                } else {
                    row.base_price * row.quantity as f64
                },
            })
            .collect();

        let total = if body.total > 0.0 {
            body.total
        } else {
            lines.iter().map(|l| l.line_total).sum()
        };

        debug!(line_count = lines.len(), %total, "price_codes: priced");
        Ok(Plan { lines, total })
    }
}
