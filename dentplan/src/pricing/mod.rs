//! Batch pricing seam
//!
//! Given a list of codes (with multiplicity), a backend returns aggregated
//! priced rows for that batch. A missing code is user-correctable and aborts
//! the batch; transport failures are a separate, retry-by-re-prompt outcome.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::catalog::CatalogService;
use crate::plan::{Plan, PlanLine};

mod http;

pub use http::HttpPricingBackend;

/// Errors from batch pricing
#[derive(Debug, Error)]
pub enum PricingError {
    /// One requested code is not in the price list. The whole batch aborts
    /// and the code is reported verbatim to the operator.
    #[error("Код {0} не найден в прайсе")]
    CodeNotFound(String),

    /// The backend was unreachable, timed out, or answered 5xx. Recovered by
    /// re-prompting, never by silently retrying.
    #[error("Pricing backend unavailable: {0}")]
    Unavailable(String),
}

/// "Price these codes, return aggregated rows"
#[async_trait]
pub trait PricingBackend: Send + Sync {
    /// Price a code batch; each occurrence of a code counts one unit
    async fn price_codes(&self, codes: &[String]) -> Result<Plan, PricingError>;
}

/// In-process pricing against the catalog snapshot
///
/// Used by single-binary deployments and tests; shares the abort-on-missing
/// policy with every other pricing path.
pub struct SnapshotPricingBackend {
    catalog: Arc<CatalogService>,
}

impl SnapshotPricingBackend {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl PricingBackend for SnapshotPricingBackend {
    async fn price_codes(&self, codes: &[String]) -> Result<Plan, PricingError> {
        debug!(code_count = codes.len(), "price_codes: called");
        let snapshot = self.catalog.current();

        // Group by code preserving first-occurrence order
        let mut order: Vec<String> = Vec::new();
        let mut counts: std::collections::HashMap<String, u32> = std::collections::HashMap::new();
        for code in codes {
            if snapshot.get(code).is_none() {
                warn!(%code, "price_codes: code not found, aborting batch");
                return Err(PricingError::CodeNotFound(code.clone()));
            }
            let count = counts.entry(code.clone()).or_insert(0);
            if *count == 0 {
                order.push(code.clone());
            }
            *count += 1;
        }

        let mut lines = Vec::with_capacity(order.len());
        for code in &order {
            let entry = snapshot
                .get(code)
                .ok_or_else(|| PricingError::CodeNotFound(code.clone()))?;
            lines.push(PlanLine::from_entry(entry, counts[code]));
        }

        let total = lines.iter().map(|l| l.line_total).sum();
        debug!(line_count = lines.len(), %total, "price_codes: priced");
        Ok(Plan { lines, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_snapshot;

    fn backend() -> SnapshotPricingBackend {
        SnapshotPricingBackend::new(Arc::new(CatalogService::new(test_snapshot())))
    }

    #[tokio::test]
    async fn test_price_codes_counts_occurrences() {
        let plan = backend()
            .price_codes(&[
                "202208".to_string(),
                "800202".to_string(),
                "800202".to_string(),
            ])
            .await
            .unwrap();

        assert_eq!(plan.lines.len(), 2);
        assert_eq!(plan.lines[0].code, "202208");
        assert_eq!(plan.lines[1].quantity, 2);
        assert_eq!(plan.lines[1].line_total, 42000.0);
        assert_eq!(plan.total, 4500.0 + 42000.0);
    }

    #[tokio::test]
    async fn test_price_codes_missing_aborts_batch() {
        let result = backend().price_codes(&["202208".to_string(), "777".to_string()]).await;
        match result {
            Err(PricingError::CodeNotFound(code)) => assert_eq!(code, "777"),
            other => panic!("Expected CodeNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_price_codes_empty_batch() {
        let plan = backend().price_codes(&[]).await.unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.total, 0.0);
    }
}
