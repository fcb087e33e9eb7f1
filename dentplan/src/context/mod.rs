//! Operator context
//!
//! Holds the operator profile (who is dictating the plan) and the trail of
//! feedback they left on earlier drafts. Both feed the drafting prompt;
//! neither is allowed to block plan assembly, so every read degrades to
//! "no context" on failure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Feedback entries carried into a drafting prompt
pub const FEEDBACK_LIMIT: usize = 5;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Context store unavailable: {0}")]
    Unavailable(String),
}

/// Operator profile captured during setup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorProfile {
    pub operator_id: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub specialization: String,
    #[serde(default)]
    pub degree: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub experience_years: Option<u32>,
    /// Free-form drafting preferences ("короткие планы, без воды")
    #[serde(default)]
    pub preferences: String,
    /// Free-form persona override for the drafting prompt
    #[serde(default)]
    pub llm_prompt: Option<String>,
    /// Multiplier applied when this operator's clinic reprices, 1.0 = none
    #[serde(default)]
    pub pricing_bias: Option<f64>,
    /// Protocol notes keyed by section name
    #[serde(default)]
    pub protocol_overrides: HashMap<String, String>,
}

impl OperatorProfile {
    /// Human-readable one-liner, e.g.
    /// "врач ортопед, высшей категории, к.м.н., стаж 12 лет Иванов И.И."
    /// Fields answered "нет" during setup are skipped.
    pub fn display(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if !skipped(&self.specialization) {
            parts.push(format!("врач {}", self.specialization));
        }
        if !skipped(&self.category) {
            parts.push(format!("{} категории", self.category));
        }
        if !skipped(&self.degree) {
            parts.push(self.degree.clone());
        }
        if let Some(years) = self.experience_years {
            parts.push(format!("стаж {years} лет"));
        }
        let head = parts.join(", ");
        match (head.is_empty(), skipped(&self.full_name)) {
            (true, true) => "врач".to_string(),
            (true, false) => self.full_name.clone(),
            (false, true) => head,
            (false, false) => format!("{head} {}", self.full_name),
        }
    }
}

fn skipped(field: &str) -> bool {
    let trimmed = field.trim();
    trimmed.is_empty() || trimmed.to_lowercase() == "нет"
}

/// One verdict an operator left on a draft
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// The plan the verdict refers to, when one was drafted
    pub plan_id: Option<Uuid>,
    pub operator_id: String,
    pub accepted: bool,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub comments: String,
    /// Operator's edited plan, when they supplied one
    #[serde(default)]
    pub diff: Option<serde_json::Value>,
    pub recorded_at: DateTime<Utc>,
}

impl FeedbackRecord {
    /// Serialize for the drafting prompt:
    /// `accepted=true rating=4 comments=... diff=...`
    pub fn prompt_line(&self) -> String {
        let rating = self
            .rating
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        let diff = self
            .diff
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "accepted={} rating={} comments={} diff={}",
            self.accepted, rating, self.comments, diff
        )
    }
}

/// Everything drafting knows about an operator
#[derive(Debug, Clone, Default)]
pub struct OperatorContext {
    pub profile: Option<OperatorProfile>,
    /// Most recent first, at most [`FEEDBACK_LIMIT`] entries
    pub feedback: Vec<FeedbackRecord>,
}

#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn load_profile(&self, operator_id: &str) -> Result<Option<OperatorProfile>, ContextError>;
    async fn save_profile(&self, profile: &OperatorProfile) -> Result<(), ContextError>;
    async fn record_feedback(&self, record: &FeedbackRecord) -> Result<(), ContextError>;
    /// Most recent first, capped at `limit`
    async fn recent_feedback(
        &self,
        operator_id: &str,
        limit: usize,
    ) -> Result<Vec<FeedbackRecord>, ContextError>;
}

/// Gather profile and feedback, degrading each to empty on store failure.
/// Store errors are logged, never surfaced to the turn.
pub async fn collect(store: &dyn ContextStore, operator_id: &str) -> OperatorContext {
    debug!(%operator_id, "collect: called");
    let profile = match store.load_profile(operator_id).await {
        Ok(profile) => profile,
        Err(e) => {
            warn!(error = %e, "collect: profile load failed, proceeding without");
            None
        }
    };
    let feedback = match store.recent_feedback(operator_id, FEEDBACK_LIMIT).await {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "collect: feedback load failed, proceeding without");
            Vec::new()
        }
    };
    OperatorContext { profile, feedback }
}

/// In-memory store, one process lifetime
#[derive(Default)]
pub struct InMemoryContextStore {
    profiles: Mutex<HashMap<String, OperatorProfile>>,
    feedback: Mutex<Vec<FeedbackRecord>>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn load_profile(&self, operator_id: &str) -> Result<Option<OperatorProfile>, ContextError> {
        let profiles = self
            .profiles
            .lock()
            .map_err(|e| ContextError::Unavailable(e.to_string()))?;
        Ok(profiles.get(operator_id).cloned())
    }

    async fn save_profile(&self, profile: &OperatorProfile) -> Result<(), ContextError> {
        let mut profiles = self
            .profiles
            .lock()
            .map_err(|e| ContextError::Unavailable(e.to_string()))?;
        profiles.insert(profile.operator_id.clone(), profile.clone());
        Ok(())
    }

    async fn record_feedback(&self, record: &FeedbackRecord) -> Result<(), ContextError> {
        let mut feedback = self
            .feedback
            .lock()
            .map_err(|e| ContextError::Unavailable(e.to_string()))?;
        feedback.push(record.clone());
        Ok(())
    }

    async fn recent_feedback(
        &self,
        operator_id: &str,
        limit: usize,
    ) -> Result<Vec<FeedbackRecord>, ContextError> {
        let feedback = self
            .feedback
            .lock()
            .map_err(|e| ContextError::Unavailable(e.to_string()))?;
        Ok(feedback
            .iter()
            .rev()
            .filter(|r| r.operator_id == operator_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;

    /// Store whose every call fails, for degradation tests
    pub struct FailingContextStore;

    #[async_trait]
    impl ContextStore for FailingContextStore {
        async fn load_profile(
            &self,
            _operator_id: &str,
        ) -> Result<Option<OperatorProfile>, ContextError> {
            Err(ContextError::Unavailable("store offline".to_string()))
        }

        async fn save_profile(&self, _profile: &OperatorProfile) -> Result<(), ContextError> {
            Err(ContextError::Unavailable("store offline".to_string()))
        }

        async fn record_feedback(&self, _record: &FeedbackRecord) -> Result<(), ContextError> {
            Err(ContextError::Unavailable("store offline".to_string()))
        }

        async fn recent_feedback(
            &self,
            _operator_id: &str,
            _limit: usize,
        ) -> Result<Vec<FeedbackRecord>, ContextError> {
            Err(ContextError::Unavailable("store offline".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(operator: &str, comments: &str) -> FeedbackRecord {
        FeedbackRecord {
            plan_id: Some(Uuid::new_v4()),
            operator_id: operator.to_string(),
            accepted: true,
            rating: Some(4),
            comments: comments.to_string(),
            diff: None,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_profile_round_trip() {
        let store = InMemoryContextStore::new();
        let profile = OperatorProfile {
            operator_id: "op-1".to_string(),
            full_name: "Иванов И.И.".to_string(),
            specialization: "ортопед".to_string(),
            ..Default::default()
        };
        store.save_profile(&profile).await.unwrap();
        let loaded = store.load_profile("op-1").await.unwrap().unwrap();
        assert_eq!(loaded.specialization, "ортопед");
        assert!(store.load_profile("op-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recent_feedback_most_recent_first_capped() {
        let store = InMemoryContextStore::new();
        for i in 0..7 {
            store
                .record_feedback(&record("op-1", &format!("note {i}")))
                .await
                .unwrap();
        }
        store.record_feedback(&record("op-2", "other")).await.unwrap();

        let recent = store.recent_feedback("op-1", FEEDBACK_LIMIT).await.unwrap();
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].comments, "note 6");
        assert_eq!(recent[4].comments, "note 2");
    }

    #[tokio::test]
    async fn test_collect_degrades_to_empty() {
        let context = collect(&mock::FailingContextStore, "op-1").await;
        assert!(context.profile.is_none());
        assert!(context.feedback.is_empty());
    }

    #[test]
    fn test_display_skips_net_answers() {
        let profile = OperatorProfile {
            operator_id: "op-1".to_string(),
            full_name: "Иванов И.И.".to_string(),
            specialization: "ортопед".to_string(),
            degree: "нет".to_string(),
            category: "высшей".to_string(),
            experience_years: Some(12),
            ..Default::default()
        };
        assert_eq!(
            profile.display(),
            "врач ортопед, высшей категории, стаж 12 лет Иванов И.И."
        );
    }

    #[test]
    fn test_display_everything_skipped() {
        let profile = OperatorProfile {
            operator_id: "op-1".to_string(),
            ..Default::default()
        };
        assert_eq!(profile.display(), "врач");
    }

    #[test]
    fn test_prompt_line_without_rating_or_diff() {
        let mut r = record("op-1", "меньше этапов");
        r.rating = None;
        r.accepted = false;
        assert_eq!(
            r.prompt_line(),
            "accepted=false rating=- comments=меньше этапов diff=-"
        );
    }
}
