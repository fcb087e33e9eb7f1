//! Service alias table
//!
//! Known phrase fragments map straight to service codes, short-circuiting the
//! semantic backend for queries the clinic already has canonical answers for.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Literal-substring alias table, matched case-insensitively
#[derive(Debug, Default)]
pub struct AliasTable {
    /// (lowercased phrase, mapped codes), in stable phrase order
    entries: Vec<(String, Vec<String>)>,
}

impl AliasTable {
    /// Build a table from phrase -> codes pairs
    pub fn new(pairs: impl IntoIterator<Item = (String, Vec<String>)>) -> Self {
        let entries = pairs
            .into_iter()
            .map(|(phrase, codes)| (phrase.to_lowercase(), codes))
            .collect();
        Self { entries }
    }

    /// Load the table from a YAML map; a missing file yields an empty table
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        debug!(path = %path.display(), "AliasTable::load: called");
        if !path.exists() {
            debug!("AliasTable::load: no alias file, using empty table");
            return Self::default();
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "AliasTable::load: read failed, using empty table");
                return Self::default();
            }
        };

        // BTreeMap keeps phrase order deterministic across loads
        let map: BTreeMap<String, Vec<String>> = match serde_yaml::from_str::<AliasFile>(&content) {
            Ok(file) => file.0,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "AliasTable::load: parse failed, using empty table");
                return Self::default();
            }
        };

        info!(path = %path.display(), alias_count = map.len(), "Loaded service aliases");
        Self::new(map)
    }

    /// Collect codes for every alias phrase contained in the query
    ///
    /// Matching is literal substring over the lowercased query. Duplicate
    /// codes keep their first occurrence.
    pub fn matches(&self, query: &str) -> Vec<String> {
        debug!(%query, "AliasTable::matches: called");
        let query_lower = query.to_lowercase();
        let mut seen = std::collections::HashSet::new();
        let mut codes = Vec::new();
        for (phrase, mapped) in &self.entries {
            if query_lower.contains(phrase.as_str()) {
                debug!(%phrase, "AliasTable::matches: phrase hit");
                for code in mapped {
                    if seen.insert(code.clone()) {
                        codes.push(code.clone());
                    }
                }
            }
        }
        codes
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct AliasFile(BTreeMap<String, Vec<String>>);

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> AliasTable {
        AliasTable::new(vec![
            ("имплантат straumann".to_string(), vec!["809102".to_string()]),
            (
                "коронка".to_string(),
                vec!["800202".to_string(), "800203".to_string()],
            ),
        ])
    }

    #[test]
    fn test_matches_case_insensitive_substring() {
        let codes = table().matches("Поставить Имплантат Straumann справа");
        assert_eq!(codes, vec!["809102"]);
    }

    #[test]
    fn test_matches_collects_all_phrases() {
        let codes = table().matches("коронка и имплантат straumann");
        assert_eq!(codes, vec!["809102", "800202", "800203"]);
    }

    #[test]
    fn test_no_match_returns_empty() {
        assert!(table().matches("вектор-терапия").is_empty());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let table = AliasTable::load("/nonexistent/aliases.yml");
        assert!(table.is_empty());
    }

    #[test]
    fn test_load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aliases.yml");
        fs::write(
            &path,
            "\"коронка e.max\":\n  - \"800202\"\n\"синус-лифтинг\":\n  - \"809110\"\n  - \"809111\"\n",
        )
        .unwrap();

        let table = AliasTable::load(&path);
        assert_eq!(table.matches("открытый синус-лифтинг"), vec!["809110", "809111"]);
    }
}
