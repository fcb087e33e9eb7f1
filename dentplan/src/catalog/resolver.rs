//! Code resolution
//!
//! Two paths into the priced catalog: exact lookup over the in-process
//! snapshot, and semantic search over an external backend with the alias
//! table short-circuiting known phrase fragments (exact and free beats a
//! network round trip).

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::plan::CandidateSet;
use crate::search::{ScoredEntry, SemanticSearch};

use super::{CatalogEntry, CatalogService, Guideline, GuidelineBook};
use super::aliases::AliasTable;

/// Errors from code resolution
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A requested exact code is absent from the snapshot. The whole batch
    /// aborts; a plan must not silently drop a requested line.
    #[error("Код {0} не найден в прайсе")]
    CodeNotFound(String),

    /// The semantic backend timed out or failed. Distinct from "no match
    /// found", which is an empty candidate set.
    #[error("Semantic search unavailable: {0}")]
    Unavailable(String),
}

/// Resolves code tokens and free text against the current catalog snapshot
pub struct CatalogResolver {
    catalog: Arc<CatalogService>,
    aliases: AliasTable,
    guidelines: GuidelineBook,
    search: Arc<dyn SemanticSearch>,
    search_timeout: Duration,
    top_k: usize,
}

impl CatalogResolver {
    pub fn new(
        catalog: Arc<CatalogService>,
        aliases: AliasTable,
        guidelines: GuidelineBook,
        search: Arc<dyn SemanticSearch>,
        search_timeout: Duration,
        top_k: usize,
    ) -> Self {
        debug!(?search_timeout, %top_k, "CatalogResolver::new: called");
        Self {
            catalog,
            aliases,
            guidelines,
            search,
            search_timeout,
            top_k,
        }
    }

    /// Exact-match batch resolution
    ///
    /// Fails on the first missing token; the caller never receives a
    /// partially resolved batch.
    pub fn resolve(&self, tokens: &[String]) -> Result<Vec<CatalogEntry>, ResolveError> {
        debug!(token_count = tokens.len(), "resolve: called");
        let snapshot = self.catalog.current();
        let mut entries = Vec::with_capacity(tokens.len());
        for token in tokens {
            match snapshot.get(token) {
                Some(entry) => entries.push(entry.clone()),
                None => {
                    warn!(code = %token, "resolve: code not found, aborting batch");
                    return Err(ResolveError::CodeNotFound(token.clone()));
                }
            }
        }
        Ok(entries)
    }

    /// Free-text resolution: alias table first, semantic backend second
    ///
    /// A reachable backend with zero hits yields an empty candidate set;
    /// timeout and transport failure yield `Unavailable`.
    pub async fn search_semantic(&self, free_text: &str) -> Result<CandidateSet, ResolveError> {
        debug!(query = %free_text, "search_semantic: called");

        let alias_codes = self.aliases.matches(free_text);
        if !alias_codes.is_empty() {
            debug!(code_count = alias_codes.len(), "search_semantic: alias short-circuit");
            let snapshot = self.catalog.current();
            let candidates: Vec<ScoredEntry> = alias_codes
                .iter()
                .filter_map(|code| snapshot.get(code).cloned().map(ScoredEntry::unscored))
                .collect();
            if !candidates.is_empty() {
                return Ok(CandidateSet::new(free_text, candidates));
            }
            debug!("search_semantic: alias codes absent from snapshot, falling through");
        }

        let results = match tokio::time::timeout(self.search_timeout, self.search.search(free_text, self.top_k)).await
        {
            Ok(Ok(results)) => results,
            Ok(Err(e)) => {
                error!(query = %free_text, error = %e, "search_semantic: backend failure");
                return Err(ResolveError::Unavailable(e.to_string()));
            }
            Err(_) => {
                error!(query = %free_text, timeout = ?self.search_timeout, "search_semantic: backend timeout");
                return Err(ResolveError::Unavailable("semantic timeout".to_string()));
            }
        };

        // Drop duplicate and empty codes, first occurrence wins
        let mut seen = std::collections::HashSet::new();
        let candidates: Vec<ScoredEntry> = results
            .into_iter()
            .filter(|c| !c.entry.code.trim().is_empty() && seen.insert(c.entry.code.clone()))
            .collect();

        debug!(candidate_count = candidates.len(), "search_semantic: backend results");
        Ok(CandidateSet::new(free_text, candidates))
    }

    /// Guideline note covering a code, if any
    pub fn guideline_for(&self, code: &str) -> Option<&Guideline> {
        self.guidelines.match_code(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{test_snapshot, CatalogService};
    use crate::search::mock::MockSemanticSearch;
    use crate::search::SearchError;

    fn resolver(search: MockSemanticSearch) -> CatalogResolver {
        resolver_with_aliases(search, AliasTable::default())
    }

    fn resolver_with_aliases(search: MockSemanticSearch, aliases: AliasTable) -> CatalogResolver {
        CatalogResolver::new(
            Arc::new(CatalogService::new(test_snapshot())),
            aliases,
            GuidelineBook::default(),
            Arc::new(search),
            Duration::from_millis(200),
            5,
        )
    }

    #[test]
    fn test_resolve_exact_batch() {
        let resolver = resolver(MockSemanticSearch::new(vec![]));
        let entries = resolver
            .resolve(&["202208".to_string(), "800202".to_string()])
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].display_name, "Коронка e.max");
    }

    #[test]
    fn test_resolve_missing_code_aborts_whole_batch() {
        let resolver = resolver(MockSemanticSearch::new(vec![]));
        let result = resolver.resolve(&["202208".to_string(), "999999".to_string()]);
        match result {
            Err(ResolveError::CodeNotFound(code)) => assert_eq!(code, "999999"),
            other => panic!("Expected CodeNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_search_semantic_alias_short_circuit() {
        // Backend would error, but the alias path never reaches it
        let search = MockSemanticSearch::new(vec![Err(SearchError::InvalidResponse("not called".to_string()))]);
        let aliases = AliasTable::new(vec![("имплантат straumann".to_string(), vec!["809102".to_string()])]);
        let resolver = resolver_with_aliases(search, aliases);

        let set = resolver.search_semantic("Имплантат Straumann справа").await.unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.candidates[0].entry.code, "809102");
        assert!(set.candidates[0].score.is_none());
    }

    #[tokio::test]
    async fn test_search_semantic_dedupes_backend_results() {
        let snapshot = test_snapshot();
        let entry = snapshot.get("800202").unwrap().clone();
        let search = MockSemanticSearch::new(vec![Ok(vec![
            ScoredEntry::scored(entry.clone(), 0.9),
            ScoredEntry::scored(entry, 0.7),
        ])]);
        let resolver = resolver(search);

        let set = resolver.search_semantic("коронка").await.unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.candidates[0].score, Some(0.9));
    }

    #[tokio::test]
    async fn test_search_semantic_empty_is_not_an_error() {
        let resolver = resolver(MockSemanticSearch::new(vec![Ok(vec![])]));
        let set = resolver.search_semantic("несуществующая услуга").await.unwrap();
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_search_semantic_backend_failure_is_unavailable() {
        let search = MockSemanticSearch::new(vec![Err(SearchError::Api {
            status: 500,
            message: "boom".to_string(),
        })]);
        let resolver = resolver(search);

        let result = resolver.search_semantic("коронка").await;
        assert!(matches!(result, Err(ResolveError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_search_semantic_timeout_is_unavailable() {
        let search = MockSemanticSearch::new(vec![Ok(vec![])]).with_delay(Duration::from_secs(5));
        let resolver = resolver(search);

        let result = resolver.search_semantic("коронка").await;
        match result {
            Err(ResolveError::Unavailable(reason)) => assert!(reason.contains("timeout")),
            other => panic!("Expected Unavailable, got {:?}", other),
        }
    }
}
