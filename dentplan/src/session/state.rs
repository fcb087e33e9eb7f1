//! Conversation states
//!
//! Closed enum; each variant carries only the scratch data that state needs.
//! Encounter-wide fields (patient, plan, draft) live on the `Session` itself.

use crate::plan::CandidateSet;

#[derive(Debug, Clone)]
pub enum SessionState {
    /// Profile setup sub-flow, entered on first contact or "обновить профиль"
    SetupName,
    SetupSpecialization {
        name: String,
    },
    SetupDegree {
        name: String,
        specialization: String,
    },
    SetupCategory {
        name: String,
        specialization: String,
        degree: String,
    },
    SetupExperience {
        name: String,
        specialization: String,
        degree: String,
        category: String,
    },
    AwaitingPatient,
    AwaitingCard,
    AwaitingIntake,
    AwaitingCodes,
    AwaitingDisambiguation {
        candidates: CandidateSet,
    },
    AwaitingConfirmation,
    FeedbackRating,
    FeedbackComment {
        accepted: bool,
    },
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::SetupName => "setup-name",
            SessionState::SetupSpecialization { .. } => "setup-specialization",
            SessionState::SetupDegree { .. } => "setup-degree",
            SessionState::SetupCategory { .. } => "setup-category",
            SessionState::SetupExperience { .. } => "setup-experience",
            SessionState::AwaitingPatient => "awaiting-patient",
            SessionState::AwaitingCard => "awaiting-card",
            SessionState::AwaitingIntake => "awaiting-intake",
            SessionState::AwaitingCodes => "awaiting-codes",
            SessionState::AwaitingDisambiguation { .. } => "awaiting-disambiguation",
            SessionState::AwaitingConfirmation => "awaiting-confirmation",
            SessionState::FeedbackRating => "feedback-rating",
            SessionState::FeedbackComment { .. } => "feedback-comment",
        }
    }
}
