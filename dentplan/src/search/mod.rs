//! Semantic code search seam
//!
//! Maps free text to ranked catalog candidates via an external similarity
//! backend. The backend is behind the [`SemanticSearch`] trait so the
//! resolver can be exercised without a network.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::catalog::CatalogEntry;

mod http;

pub use http::HttpSemanticSearch;

/// One scored candidate row from semantic resolution
///
/// Alias-table hits carry no score; backend hits always do.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub entry: CatalogEntry,
    pub score: Option<f32>,
}

impl ScoredEntry {
    /// Wrap a catalog entry without a similarity score (alias path)
    pub fn unscored(entry: CatalogEntry) -> Self {
        debug!(code = %entry.code, "ScoredEntry::unscored: called");
        Self { entry, score: None }
    }

    /// Wrap a catalog entry with a backend similarity score
    pub fn scored(entry: CatalogEntry, score: f32) -> Self {
        debug!(code = %entry.code, %score, "ScoredEntry::scored: called");
        Self {
            entry,
            score: Some(score),
        }
    }
}

/// Errors from the semantic search backend
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Similarity search over the priced catalog
///
/// A reachable backend that finds nothing returns an empty vector; errors are
/// reserved for the backend being unusable.
#[async_trait]
pub trait SemanticSearch: Send + Sync {
    /// Return up to `top_k` scored candidates for a free-text query
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredEntry>, SearchError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mock semantic search for unit tests
    pub struct MockSemanticSearch {
        responses: Mutex<Vec<Result<Vec<ScoredEntry>, SearchError>>>,
        /// Artificial latency before answering, for timeout tests
        pub delay: Option<Duration>,
    }

    impl MockSemanticSearch {
        pub fn new(responses: Vec<Result<Vec<ScoredEntry>, SearchError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                delay: None,
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl SemanticSearch for MockSemanticSearch {
        async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<ScoredEntry>, SearchError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Ok(vec![]);
            }
            responses.remove(0)
        }
    }
}
