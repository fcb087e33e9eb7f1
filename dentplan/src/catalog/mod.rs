//! Priced service catalog
//!
//! The catalog is an immutable snapshot of priced service rows keyed by code.
//! Sessions share one snapshot read-only; refreshing is an atomic swap so
//! in-flight resolutions keep a consistent view.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, info};

mod aliases;
mod guidelines;
mod resolver;

pub use aliases::AliasTable;
pub use guidelines::{Guideline, GuidelineBook};
pub use resolver::{CatalogResolver, ResolveError};

/// One billable catalog row. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Opaque service code, unique within a snapshot
    pub code: String,

    /// Human-readable service name
    pub display_name: String,

    /// Unit price
    pub base_price: f64,

    /// Price-list section label
    pub section: String,
}

/// Errors loading catalog data from disk
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog file not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed catalog line {line}: {source}")]
    MalformedLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Read-only snapshot of the priced catalog
///
/// Preserves file order for display purposes and indexes by code for exact
/// lookup.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    entries: Vec<CatalogEntry>,
    by_code: HashMap<String, usize>,
}

impl CatalogSnapshot {
    /// Build a snapshot from already-loaded entries
    ///
    /// Duplicate codes keep the first occurrence.
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        debug!(entry_count = entries.len(), "CatalogSnapshot::from_entries: called");
        let mut snapshot = Self::default();
        for entry in entries {
            if snapshot.by_code.contains_key(&entry.code) {
                debug!(code = %entry.code, "CatalogSnapshot::from_entries: duplicate code skipped");
                continue;
            }
            snapshot.by_code.insert(entry.code.clone(), snapshot.entries.len());
            snapshot.entries.push(entry);
        }
        snapshot
    }

    /// Load a snapshot from a JSONL file (one entry per line)
    pub fn load_jsonl<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "CatalogSnapshot::load_jsonl: called");
        if !path.exists() {
            return Err(CatalogError::NotFound(path.display().to_string()));
        }

        let reader = BufReader::new(fs::File::open(path)?);
        let mut entries = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: CatalogEntry =
                serde_json::from_str(&line).map_err(|source| CatalogError::MalformedLine { line: idx + 1, source })?;
            entries.push(entry);
        }

        info!(path = %path.display(), entry_count = entries.len(), "Loaded catalog snapshot");
        Ok(Self::from_entries(entries))
    }

    /// Exact lookup by code
    pub fn get(&self, code: &str) -> Option<&CatalogEntry> {
        self.by_code.get(code).map(|idx| &self.entries[*idx])
    }

    /// All entries in file order
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared handle to the current catalog snapshot
///
/// Readers clone the Arc and keep working against the snapshot they took;
/// `refresh` swaps the Arc without touching snapshots already handed out.
pub struct CatalogService {
    current: RwLock<Arc<CatalogSnapshot>>,
}

impl CatalogService {
    /// Wrap an initial snapshot
    pub fn new(snapshot: CatalogSnapshot) -> Self {
        debug!(entry_count = snapshot.len(), "CatalogService::new: called");
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Get the current snapshot
    pub fn current(&self) -> Arc<CatalogSnapshot> {
        self.current.read().expect("catalog lock poisoned").clone()
    }

    /// Swap in a new snapshot atomically
    pub fn refresh(&self, snapshot: CatalogSnapshot) {
        info!(entry_count = snapshot.len(), "CatalogService::refresh: swapping snapshot");
        *self.current.write().expect("catalog lock poisoned") = Arc::new(snapshot);
    }
}

#[cfg(test)]
pub(crate) fn test_snapshot() -> CatalogSnapshot {
    CatalogSnapshot::from_entries(vec![
        CatalogEntry {
            code: "202208".to_string(),
            display_name: "Лечение кариеса".to_string(),
            base_price: 4500.0,
            section: "Терапия".to_string(),
        },
        CatalogEntry {
            code: "800202".to_string(),
            display_name: "Коронка e.max".to_string(),
            base_price: 21000.0,
            section: "Ортопедия".to_string(),
        },
        CatalogEntry {
            code: "809102".to_string(),
            display_name: "Имплантация Straumann".to_string(),
            base_price: 55000.0,
            section: "Хирургия".to_string(),
        },
    ])
}
