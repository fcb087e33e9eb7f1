//! Narrative drafting
//!
//! Turns a priced plan plus operator context into patient-facing prose.
//! With a generation backend the prompt carries the operator's persona and
//! recent corrections; without one a deterministic template produces a
//! serviceable draft, so the pipeline never blocks on an external service.

use handlebars::Handlebars;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::context::OperatorContext;
use crate::llm::{GenerationClient, LlmError};
use crate::plan::Plan;

const FALLBACK_TEMPLATE: &str = "\
План лечения для пациента {{patient_name}}

Врач: {{operator}}
Услуги: {{codes}}
{{#if intake}}Жалобы и анамнез: {{intake}}
{{/if}}
Этапы лечения:
1. Консультация и диагностика
2. Лечение согласно кодам ({{codes}})
3. Контрольный визит

Итого: {{total}} руб.";

const DEFAULT_PERSONA: &str = "\
Ты ассистент стоматологической клиники. Составь понятный пациенту план \
лечения по перечисленным услугам. Пиши сдержанно и без медицинского жаргона, \
не выдумывай услуги сверх перечисленных.";

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("Generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("Template error: {0}")]
    Template(#[from] handlebars::TemplateError),

    #[error("Render error: {0}")]
    Render(#[from] handlebars::RenderError),
}

/// Everything a draft needs about one encounter
#[derive(Debug, Clone)]
pub struct DraftRequest {
    pub patient_name: String,
    pub card_info: String,
    pub intake: String,
    pub plan: Plan,
    pub context: OperatorContext,
}

pub struct NarrativeDrafter {
    backend: Option<Arc<dyn GenerationClient>>,
    registry: Handlebars<'static>,
}

impl NarrativeDrafter {
    pub fn new(backend: Option<Arc<dyn GenerationClient>>) -> Result<Self, DraftError> {
        let mut registry = Handlebars::new();
        registry.register_template_string("fallback", FALLBACK_TEMPLATE)?;
        Ok(Self { backend, registry })
    }

    /// One backend call per draft; any backend failure surfaces as
    /// `DraftError` and the caller decides how to degrade.
    pub async fn draft(&self, request: &DraftRequest) -> Result<String, DraftError> {
        debug!(
            patient = %request.patient_name,
            line_count = request.plan.lines.len(),
            "draft: called"
        );
        match &self.backend {
            Some(backend) => {
                let system = self.system_prompt(request);
                let user = self.user_prompt(request);
                let text = backend.generate(&system, &user).await.map_err(|e| {
                    warn!(error = %e, "draft: generation failed");
                    e
                })?;
                Ok(text)
            }
            None => self.fallback(request),
        }
    }

    /// Deterministic draft used when no backend is configured
    pub fn fallback(&self, request: &DraftRequest) -> Result<String, DraftError> {
        let operator = request
            .context
            .profile
            .as_ref()
            .map(|p| p.display())
            .unwrap_or_else(|| "врач".to_string());
        let rendered = self.registry.render(
            "fallback",
            &json!({
                "patient_name": request.patient_name,
                "operator": operator,
                "codes": request.plan.codes().join(", "),
                "intake": request.intake.trim(),
                "total": format!("{:.0}", request.plan.total),
            }),
        )?;
        Ok(rendered)
    }

    fn system_prompt(&self, request: &DraftRequest) -> String {
        request
            .context
            .profile
            .as_ref()
            .and_then(|p| p.llm_prompt.clone())
            .filter(|prompt| !prompt.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PERSONA.to_string())
    }

    fn user_prompt(&self, request: &DraftRequest) -> String {
        let mut sections = Vec::new();
        sections.push(format!("Пациент: {}", request.patient_name));
        if !request.card_info.trim().is_empty() {
            sections.push(format!("Карта: {}", request.card_info.trim()));
        }
        if !request.intake.trim().is_empty() {
            sections.push(format!("Жалобы и анамнез: {}", request.intake.trim()));
        }

        let lines: Vec<String> = request
            .plan
            .lines
            .iter()
            .map(|l| {
                format!(
                    "{} — {} x{} = {:.0} руб.",
                    l.code, l.display_name, l.quantity, l.line_total
                )
            })
            .collect();
        sections.push(format!("Услуги:\n{}", lines.join("\n")));
        sections.push(format!("Итого: {:.0} руб.", request.plan.total));

        if let Some(profile) = &request.context.profile {
            sections.push(format!("Врач: {}", profile.display()));
            if !profile.preferences.trim().is_empty() {
                sections.push(format!("Предпочтения врача: {}", profile.preferences.trim()));
            }
            if !profile.specialization.trim().is_empty() {
                sections.push(format!("Специализация: {}", profile.specialization.trim()));
            }
        }

        if !request.context.feedback.is_empty() {
            let corrections: Vec<String> = request
                .context
                .feedback
                .iter()
                .map(|record| record.prompt_line())
                .collect();
            sections.push(format!(
                "Недавние правки врача: {}",
                corrections.join(" | ")
            ));
        }

        sections.push("Составь план лечения для пациента.".to_string());
        sections.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_snapshot;
    use crate::context::{FeedbackRecord, OperatorProfile};
    use crate::llm::mock::MockGenerationClient;
    use crate::plan::PlanLine;
    use chrono::Utc;
    use std::time::Duration;

    fn plan() -> Plan {
        let snapshot = test_snapshot();
        let lines = vec![
            PlanLine::from_entry(snapshot.get("202208").unwrap(), 1),
            PlanLine::from_entry(snapshot.get("800202").unwrap(), 2),
        ];
        let total = lines.iter().map(|l| l.line_total).sum();
        Plan { lines, total }
    }

    fn request() -> DraftRequest {
        DraftRequest {
            patient_name: "Петров П.П.".to_string(),
            card_info: "карта 1042".to_string(),
            intake: "жалобы на боль".to_string(),
            plan: plan(),
            context: OperatorContext {
                profile: Some(OperatorProfile {
                    operator_id: "op-1".to_string(),
                    full_name: "Иванов И.И.".to_string(),
                    specialization: "ортопед".to_string(),
                    ..Default::default()
                }),
                feedback: vec![FeedbackRecord {
                    plan_id: None,
                    operator_id: "op-1".to_string(),
                    accepted: false,
                    rating: None,
                    comments: "короче".to_string(),
                    diff: None,
                    recorded_at: Utc::now(),
                }],
            },
        }
    }

    #[tokio::test]
    async fn test_fallback_draft_is_deterministic() {
        let drafter = NarrativeDrafter::new(None).unwrap();
        let first = drafter.draft(&request()).await.unwrap();
        let second = drafter.draft(&request()).await.unwrap();
        assert_eq!(first, second);
        assert!(first.contains("Петров П.П."));
        assert!(first.contains("202208, 800202"));
        assert!(first.contains("Консультация и диагностика"));
        assert!(first.contains("Контрольный визит"));
        assert!(first.contains("46500"));
    }

    #[tokio::test]
    async fn test_backend_draft_passes_through() {
        let backend = Arc::new(MockGenerationClient::new(vec![Ok(
            "Готовый план.".to_string()
        )]));
        let drafter = NarrativeDrafter::new(Some(backend)).unwrap();
        let text = drafter.draft(&request()).await.unwrap();
        assert_eq!(text, "Готовый план.");
    }

    #[tokio::test]
    async fn test_backend_failure_surfaces_as_draft_error() {
        let backend = Arc::new(MockGenerationClient::new(vec![Err(LlmError::Timeout(
            Duration::from_secs(25),
        ))]));
        let drafter = NarrativeDrafter::new(Some(backend)).unwrap();
        let result = drafter.draft(&request()).await;
        assert!(matches!(result, Err(DraftError::Generation(_))));
    }

    #[test]
    fn test_user_prompt_embeds_corrections_most_recent_first() {
        let drafter = NarrativeDrafter::new(None).unwrap();
        let mut req = request();
        req.context.feedback.insert(
            0,
            FeedbackRecord {
                plan_id: None,
                operator_id: "op-1".to_string(),
                accepted: true,
                rating: Some(5),
                comments: "отлично".to_string(),
                diff: None,
                recorded_at: Utc::now(),
            },
        );
        let prompt = drafter.user_prompt(&req);
        let first = prompt.find("accepted=true rating=5").unwrap();
        let second = prompt.find("accepted=false rating=-").unwrap();
        assert!(first < second);
        assert!(prompt.contains(" | "));
    }

    #[test]
    fn test_system_prompt_honours_override() {
        let drafter = NarrativeDrafter::new(None).unwrap();
        let mut req = request();
        assert_eq!(drafter.system_prompt(&req), DEFAULT_PERSONA);
        if let Some(profile) = req.context.profile.as_mut() {
            profile.llm_prompt = Some("Пиши кратко.".to_string());
        }
        assert_eq!(drafter.system_prompt(&req), "Пиши кратко.");
    }
}
