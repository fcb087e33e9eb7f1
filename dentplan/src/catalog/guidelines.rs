//! Clinical guideline notes
//!
//! Guidelines annotate resolved catalog rows with a short recommendation and
//! a reference, keyed by the service codes they cover.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// One guideline entry covering a set of service codes
#[derive(Debug, Clone, Deserialize)]
pub struct Guideline {
    #[serde(default)]
    pub codes: Vec<String>,
    pub summary: String,
    #[serde(default)]
    pub reference: String,
}

/// Loaded guideline collection
#[derive(Debug, Default)]
pub struct GuidelineBook {
    entries: Vec<Guideline>,
}

impl GuidelineBook {
    pub fn new(entries: Vec<Guideline>) -> Self {
        Self { entries }
    }

    /// Load guidelines from a JSON array; a missing file yields an empty book
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        debug!(path = %path.display(), "GuidelineBook::load: called");
        if !path.exists() {
            debug!("GuidelineBook::load: no guidelines file, using empty book");
            return Self::default();
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "GuidelineBook::load: read failed, using empty book");
                return Self::default();
            }
        };

        match serde_json::from_str::<Vec<Guideline>>(&content) {
            Ok(entries) => {
                info!(path = %path.display(), guideline_count = entries.len(), "Loaded clinical guidelines");
                Self::new(entries)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "GuidelineBook::load: parse failed, using empty book");
                Self::default()
            }
        }
    }

    /// First guideline whose code list contains the given code
    pub fn match_code(&self, code: &str) -> Option<&Guideline> {
        self.entries.iter().find(|g| g.codes.iter().any(|c| c == code))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_code() {
        let book = GuidelineBook::new(vec![Guideline {
            codes: vec!["809102".to_string(), "809103".to_string()],
            summary: "КТ перед имплантацией".to_string(),
            reference: "СтАР 2023".to_string(),
        }]);

        assert_eq!(book.match_code("809103").unwrap().summary, "КТ перед имплантацией");
        assert!(book.match_code("202208").is_none());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let book = GuidelineBook::load("/nonexistent/guidelines.json");
        assert!(book.is_empty());
    }

    #[test]
    fn test_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guidelines.json");
        fs::write(
            &path,
            r#"[{"codes": ["809102"], "summary": "КТ перед имплантацией", "reference": "СтАР 2023"}]"#,
        )
        .unwrap();

        let book = GuidelineBook::load(&path);
        assert!(book.match_code("809102").is_some());
    }
}
