//! Disambiguation candidate sets
//!
//! A semantic query that yields multiple catalog candidates parks them here
//! until the operator picks by 1-based position or cancels. One set per
//! session at a time; a newer ambiguous query replaces the old set wholesale.

use tracing::debug;

use crate::search::ScoredEntry;

/// Transient candidate list for one free-text query
#[derive(Debug, Clone)]
pub struct CandidateSet {
    /// The original free-text query
    pub query: String,
    /// Scored candidates, best first
    pub candidates: Vec<ScoredEntry>,
}

impl CandidateSet {
    pub fn new(query: impl Into<String>, candidates: Vec<ScoredEntry>) -> Self {
        let query = query.into();
        debug!(%query, candidate_count = candidates.len(), "CandidateSet::new: called");
        Self { query, candidates }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Map 1-based operator positions to candidate codes
    ///
    /// Out-of-range positions are silently dropped; the selection only counts
    /// as "not understood" when every index is invalid (empty result).
    pub fn select(&self, one_based: &[usize]) -> Vec<String> {
        debug!(indices = ?one_based, candidate_count = self.candidates.len(), "CandidateSet::select: called");
        one_based
            .iter()
            .filter_map(|idx| {
                if *idx == 0 {
                    debug!("CandidateSet::select: zero index dropped");
                    return None;
                }
                self.candidates.get(idx - 1).map(|c| c.entry.code.clone())
            })
            .collect()
    }
}
