//! Turn handling
//!
//! One `Session` per conversation; `handle_turn` consumes one operator
//! message and returns the replies to print. Every failure path re-prompts
//! and leaves the session in a continuable state.

use chrono::Utc;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::catalog::CatalogResolver;
use crate::context::{self, ContextStore, FeedbackRecord, OperatorContext, OperatorProfile};
use crate::draft::{DraftRequest, NarrativeDrafter};
use crate::plan::{combine, CandidateSet, Plan};
use crate::pricing::{PricingBackend, PricingError};
use crate::validation::{run_rules, Finding, RuleContext};

use super::state::SessionState;

/// Words accepted as "finalize the plan"
pub const CONFIRM_WORDS: &[&str] = &[
    "да",
    "подтвердить",
    "завершить",
    "ок",
    "окей",
    "готово",
    "принять",
    "yes",
    "y",
    "done",
    "finish",
];

/// Words accepted as "I want changes"
pub const DECLINE_WORDS: &[&str] = &[
    "нет",
    "не",
    "неа",
    "изменить",
    "правки",
    "редактировать",
    "отклонить",
    "нужны правки",
];

/// Words accepted as "add more services"
pub const CONTINUE_WORDS: &[&str] = &["продолжить", "continue"];

const HELP_SNIPPETS: &[&str] = &[
    "Планирование синус-лифтинга: 'Открытый синус-лифтинг справа, имплантаты Straumann'",
    "Ортопедия: 'Две коронки e.max, одна коронка металлокерамика на 3.6'",
    "Детская стоматология: 'Лечение кариеса молочного зуба, герметизация фиссур'",
    "Ортодонтия: 'Брекет-система Damon, активация дуги'",
    "Пародонтология: 'Вектор-терапия, закрытый кюретаж 4 карманов'",
];

const ASSISTANT_UNAVAILABLE: &str = "🤖 Ассистент недоступен.";

/// One message back to the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply(pub String);

impl Reply {
    fn new(text: impl Into<String>) -> Self {
        Reply(text.into())
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shared services behind one session
pub struct SessionDeps {
    pub resolver: Arc<CatalogResolver>,
    pub pricing: Arc<dyn PricingBackend>,
    pub store: Arc<dyn ContextStore>,
    pub drafter: NarrativeDrafter,
}

pub struct Session {
    operator_id: String,
    deps: Arc<SessionDeps>,
    state: SessionState,
    profile: Option<OperatorProfile>,
    patient: String,
    card: String,
    intake: String,
    plan: Plan,
    plan_id: Option<Uuid>,
    first_seen: Vec<String>,
    draft: Option<String>,
    findings: Vec<Finding>,
}

impl Session {
    pub fn new(operator_id: impl Into<String>, deps: Arc<SessionDeps>) -> Self {
        Self {
            operator_id: operator_id.into(),
            deps,
            state: SessionState::SetupName,
            profile: None,
            patient: String::new(),
            card: String::new(),
            intake: String::new(),
            plan: Plan::default(),
            plan_id: None,
            first_seen: Vec::new(),
            draft: None,
            findings: Vec::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// First contact: greet, skipping profile setup when a usable profile
    /// is already stored.
    pub async fn start(&mut self) -> Vec<Reply> {
        debug!(operator_id = %self.operator_id, "start: called");
        match self.deps.store.load_profile(&self.operator_id).await {
            Ok(Some(profile)) if !profile.specialization.trim().is_empty() => {
                let name = profile.full_name.clone();
                self.profile = Some(profile);
                self.state = SessionState::AwaitingPatient;
                vec![Reply::new(format!(
                    "👋 Привет, {name}! Продолжаем. Укажи пациента (ФИО/ID)."
                ))]
            }
            Ok(_) => {
                self.state = SessionState::SetupName;
                vec![Reply::new(
                    "👋 Привет! Давай настроим профиль. Введи ФИО полностью.",
                )]
            }
            Err(e) => {
                warn!(error = %e, "start: profile load failed, running setup");
                self.state = SessionState::SetupName;
                vec![Reply::new(
                    "👋 Привет! Давай настроим профиль. Введи ФИО полностью.",
                )]
            }
        }
    }

    pub async fn handle_turn(&mut self, input: &str) -> Vec<Reply> {
        let trimmed = input.trim();
        let lowered = trimmed.to_lowercase();
        debug!(state = self.state.label(), input_len = trimmed.len(), "handle_turn: called");

        if let Some(replies) = self.handle_command(&lowered) {
            return replies;
        }

        let state = std::mem::replace(&mut self.state, SessionState::AwaitingCodes);
        match state {
            SessionState::SetupName => {
                self.state = SessionState::SetupSpecialization {
                    name: trimmed.to_string(),
                };
                vec![Reply::new(
                    "Укажи специализацию (например: стоматолог-ортопед).",
                )]
            }
            SessionState::SetupSpecialization { name } => {
                self.state = SessionState::SetupDegree {
                    name,
                    specialization: trimmed.to_string(),
                };
                vec![Reply::new(
                    "Ученая степень (например: к.м.н. или напиши 'нет').",
                )]
            }
            SessionState::SetupDegree {
                name,
                specialization,
            } => {
                self.state = SessionState::SetupCategory {
                    name,
                    specialization,
                    degree: trimmed.to_string(),
                };
                vec![Reply::new(
                    "Квалификационная категория (высшая/первая/вторая/нет).",
                )]
            }
            SessionState::SetupCategory {
                name,
                specialization,
                degree,
            } => {
                self.state = SessionState::SetupExperience {
                    name,
                    specialization,
                    degree,
                    category: trimmed.to_string(),
                };
                vec![Reply::new("Стаж (в годах).")]
            }
            SessionState::SetupExperience {
                name,
                specialization,
                degree,
                category,
            } => {
                let parsed = trimmed.replace(',', ".").parse::<f64>();
                match parsed {
                    Ok(years) if years >= 0.0 => {
                        let profile = OperatorProfile {
                            operator_id: self.operator_id.clone(),
                            full_name: name,
                            specialization,
                            degree,
                            category,
                            experience_years: Some(years.round() as u32),
                            ..Default::default()
                        };
                        if let Err(e) = self.deps.store.save_profile(&profile).await {
                            warn!(error = %e, "handle_turn: profile save failed");
                        }
                        let display = profile.display();
                        self.profile = Some(profile);
                        self.state = SessionState::AwaitingPatient;
                        vec![Reply::new(format!(
                            "✅ Профиль готов: {display}\nТеперь укажи пациента (ФИО/ID)."
                        ))]
                    }
                    _ => {
                        self.state = SessionState::SetupExperience {
                            name,
                            specialization,
                            degree,
                            category,
                        };
                        vec![Reply::new("Не понял стаж. Введи число, например 12 или 12.5")]
                    }
                }
            }
            SessionState::AwaitingPatient => {
                self.patient = trimmed.to_string();
                self.state = SessionState::AwaitingCard;
                vec![Reply::new("📄 Номер амбулаторной карты?")]
            }
            SessionState::AwaitingCard => {
                self.card = trimmed.to_string();
                self.state = SessionState::AwaitingIntake;
                vec![Reply::new("🎙 Надиктуй план лечения (голос или текст).")]
            }
            SessionState::AwaitingIntake => {
                self.intake = trimmed.to_string();
                self.state = SessionState::AwaitingCodes;
                vec![Reply::new(
                    "Отлично. Теперь отправь коды услуг или опиши словами (например: 'имплантат Straumann').",
                )]
            }
            SessionState::AwaitingCodes => self.handle_codes(trimmed).await,
            SessionState::AwaitingDisambiguation { candidates } => {
                self.handle_disambiguation(trimmed, &lowered, candidates).await
            }
            SessionState::AwaitingConfirmation => self.handle_confirmation(&lowered).await,
            SessionState::FeedbackRating => self.handle_feedback_rating(&lowered),
            SessionState::FeedbackComment { accepted } => {
                self.handle_feedback_comment(trimmed, accepted).await
            }
        }
    }

    /// Commands available from any state
    fn handle_command(&mut self, lowered: &str) -> Option<Vec<Reply>> {
        match lowered {
            "подсказки" | "help" => Some(vec![Reply::new(build_help_message())]),
            "обновить профиль" => {
                self.profile = None;
                self.state = SessionState::SetupName;
                Some(vec![Reply::new("Обновим профиль. Введи ФИО полностью.")])
            }
            "новый план" => {
                self.reset_encounter();
                self.state = SessionState::AwaitingPatient;
                Some(vec![Reply::new(
                    "🧑‍⚕️ Давай начнём новый план. Укажи пациента (ФИО/ID).",
                )])
            }
            "оценить план" => {
                if self.plan.is_empty() {
                    Some(vec![Reply::new(
                        "Пока нечего оценивать. Сначала сформируй план.",
                    )])
                } else {
                    self.state = SessionState::FeedbackRating;
                    Some(vec![Reply::new("Как оцениваешь текущий план?")])
                }
            }
            _ => None,
        }
    }

    async fn handle_codes(&mut self, input: &str) -> Vec<Reply> {
        let codes = parse_codes(input);
        if !codes.is_empty() {
            return self.process_codes(codes).await;
        }

        let mut replies = vec![Reply::new("⌛ Ищу услуги по описанию...")];
        match self.deps.resolver.search_semantic(input).await {
            Ok(set) if set.is_empty() => {
                self.state = SessionState::AwaitingCodes;
                replies.push(Reply::new(
                    "Не смог найти совпадения. Попробуй уточнить формулировку или указать код.",
                ));
                replies
            }
            Ok(set) => {
                replies.push(Reply::new(self.format_candidates(&set)));
                self.state = SessionState::AwaitingDisambiguation { candidates: set };
                replies
            }
            Err(e) => {
                warn!(error = %e, "handle_codes: semantic search unavailable");
                self.state = SessionState::AwaitingCodes;
                replies.push(Reply::new(
                    "⚠️ Семантический поиск временно недоступен. Попробуй ввести коды вручную или повтори запрос позже.",
                ));
                replies
            }
        }
    }

    fn format_candidates(&self, set: &CandidateSet) -> String {
        let mut options: Vec<String> = Vec::with_capacity(set.len());
        for (idx, candidate) in set.candidates.iter().enumerate() {
            let mut row = format!(
                "{}. {} — {} ({} ₽)",
                idx + 1,
                candidate.entry.code,
                candidate.entry.display_name,
                candidate.entry.base_price
            );
            if let Some(guideline) = self.deps.resolver.guideline_for(&candidate.entry.code) {
                row.push_str(&format!(
                    "\n   ℹ️ {} ({})",
                    guideline.summary, guideline.reference
                ));
            }
            options.push(row);
        }
        format!(
            "Нашёл подходящие позиции:\n{}\n\nНапиши номера через запятую (например: 1,3).",
            options.join("\n")
        )
    }

    async fn handle_disambiguation(
        &mut self,
        input: &str,
        lowered: &str,
        candidates: CandidateSet,
    ) -> Vec<Reply> {
        if lowered == "отмена" || lowered == "cancel" {
            self.state = SessionState::AwaitingCodes;
            return vec![Reply::new(
                "Окей, выбери коды заново или опиши услуги ещё раз.",
            )];
        }

        let indexes = parse_choice_indexes(input);
        if indexes.is_empty() {
            self.state = SessionState::AwaitingDisambiguation { candidates };
            return vec![Reply::new(
                "Не понял выбор. Укажи номера через запятую, например 1,2.",
            )];
        }

        let selected = candidates.select(&indexes);
        if selected.is_empty() {
            self.state = SessionState::AwaitingDisambiguation { candidates };
            return vec![Reply::new("Ни один номер не распознан. Повтори выбор.")];
        }

        self.process_codes(selected).await
    }

    /// Price → aggregate → context → draft → validate, one batch
    async fn process_codes(&mut self, codes: Vec<String>) -> Vec<Reply> {
        debug!(code_count = codes.len(), "process_codes: called");
        let mut replies = vec![Reply::new("⚙️ Считаю суммы по прайсу...")];

        let batch = match self.deps.pricing.price_codes(&codes).await {
            Ok(batch) => batch,
            Err(PricingError::CodeNotFound(code)) => {
                self.state = SessionState::AwaitingCodes;
                replies.push(Reply::new(format!(
                    "⚠️ Код {code} не найден в прайсе. Уточни услуги или выбери другие позиции."
                )));
                return replies;
            }
            Err(e) => {
                warn!(error = %e, "process_codes: pricing failed");
                self.state = SessionState::AwaitingCodes;
                replies.push(Reply::new(format!(
                    "Не удалось получить план: {e}. Повтори или измени коды."
                )));
                return replies;
            }
        };

        self.first_seen.extend(codes);
        self.plan = combine(&self.plan, &batch.lines, &self.first_seen);
        let plan_id = *self.plan_id.get_or_insert_with(Uuid::new_v4);
        debug!(%plan_id, total = %self.plan.total, "process_codes: plan updated");

        let context = context::collect(self.deps.store.as_ref(), &self.operator_id).await;
        let assistant = self.draft_and_validate(context).await;

        replies.push(Reply::new(format_plan(&self.plan)));
        replies.push(Reply::new(assistant));
        replies.push(Reply::new(
            "Продолжить добавление услуг или завершить план? Напиши 'продолжить' или 'завершить'.",
        ));
        self.state = SessionState::AwaitingConfirmation;
        replies
    }

    async fn draft_and_validate(&mut self, context: OperatorContext) -> String {
        let request = DraftRequest {
            patient_name: self.patient.clone(),
            card_info: self.card.clone(),
            intake: self.intake.clone(),
            plan: self.plan.clone(),
            context,
        };
        match self.deps.drafter.draft(&request).await {
            Ok(text) => {
                let ctx = RuleContext {
                    plan: &self.plan,
                    narrative: &text,
                };
                let findings = run_rules(&ctx);
                let block = format_assistant_block(&text, &findings);
                self.draft = Some(text);
                self.findings = findings;
                block
            }
            Err(e) => {
                warn!(error = %e, "draft_and_validate: drafting failed");
                self.draft = None;
                self.findings.clear();
                ASSISTANT_UNAVAILABLE.to_string()
            }
        }
    }

    async fn handle_confirmation(&mut self, lowered: &str) -> Vec<Reply> {
        if CONTINUE_WORDS.contains(&lowered) {
            self.state = SessionState::AwaitingCodes;
            return vec![Reply::new(
                "Ок, добавим ещё услуги. Напиши коды или опиши словами следующую часть плана.",
            )];
        }
        if CONFIRM_WORDS.contains(&lowered) {
            return self.finalize();
        }
        if DECLINE_WORDS.contains(&lowered) {
            self.state = SessionState::AwaitingIntake;
            return vec![Reply::new("🔁 Принято. Надиктуй правки или текст заново.")];
        }
        self.state = SessionState::AwaitingConfirmation;
        vec![Reply::new(
            "Не понял. Напиши 'продолжить' для добавления услуг, 'завершить' или 'да' для финализации, либо 'нет' чтобы внести правки.",
        )]
    }

    fn finalize(&mut self) -> Vec<Reply> {
        if self.plan.is_empty() {
            self.state = SessionState::AwaitingCodes;
            return vec![Reply::new(
                "План пустой. Добавь услуги или опиши их словами, чтобы я сформировал финальную версию.",
            )];
        }

        let artifact = self.render_artifact();
        let total = self.plan.total;
        self.reset_encounter();
        self.state = SessionState::AwaitingPatient;
        vec![
            Reply::new(artifact),
            Reply::new(format!("Готово. Итоговая сумма: {total:.2} ₽")),
            Reply::new("План сохранён. Укажи следующего пациента или нажми 'Новый план'."),
        ]
    }

    /// Plain-text artifact rendered on finalization
    fn render_artifact(&self) -> String {
        let operator = self
            .profile
            .as_ref()
            .map(|p| p.display())
            .unwrap_or_else(|| "врач".to_string());
        let plan_id = self
            .plan_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let mut sections = vec![
            format!("📋 План лечения №{plan_id}\nПациент: {}", self.patient),
            format!("Карта: {}", self.card),
            format!("Врач: {operator}"),
            format_plan(&self.plan),
        ];
        if let Some(draft) = &self.draft {
            sections.push(format!("🤖 Черновик ассистента:\n{draft}"));
        }
        sections.join("\n\n")
    }

    fn handle_feedback_rating(&mut self, lowered: &str) -> Vec<Reply> {
        match lowered {
            "назад" => {
                self.state = SessionState::AwaitingConfirmation;
                vec![Reply::new("Окей, возвращаемся к плану.")]
            }
            "принято" => {
                self.state = SessionState::FeedbackComment { accepted: true };
                vec![Reply::new(
                    "Оставь короткий комментарий (что особенно важно / что доработать).",
                )]
            }
            "нужны правки" => {
                self.state = SessionState::FeedbackComment { accepted: false };
                vec![Reply::new(
                    "Оставь короткий комментарий (что особенно важно / что доработать).",
                )]
            }
            _ => {
                self.state = SessionState::FeedbackRating;
                vec![Reply::new("Пиши 'Принято' или 'Нужны правки'.")]
            }
        }
    }

    async fn handle_feedback_comment(&mut self, input: &str, accepted: bool) -> Vec<Reply> {
        if input.to_lowercase() == "назад" {
            self.state = SessionState::FeedbackRating;
            return vec![Reply::new("Хорошо, выбери 'Принято' или 'Нужны правки'.")];
        }

        let record = FeedbackRecord {
            plan_id: self.plan_id,
            operator_id: self.operator_id.clone(),
            accepted,
            rating: None,
            comments: input.to_string(),
            diff: None,
            recorded_at: Utc::now(),
        };
        if let Err(e) = self.deps.store.record_feedback(&record).await {
            warn!(error = %e, "handle_feedback_comment: record failed");
            self.state = SessionState::AwaitingConfirmation;
            return vec![Reply::new("Не могу сохранить отзыв: хранилище недоступно.")];
        }
        self.state = SessionState::AwaitingConfirmation;
        vec![Reply::new("Спасибо! Отзыв сохранён.")]
    }

    /// Drop everything tied to the encounter; operator identity persists
    fn reset_encounter(&mut self) {
        self.patient.clear();
        self.card.clear();
        self.intake.clear();
        self.plan = Plan::default();
        self.plan_id = None;
        self.first_seen.clear();
        self.draft = None;
        self.findings.clear();
    }
}

static TOKEN_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s,;]+").expect("valid token split pattern"));

/// All-numeric tokens split on whitespace/commas/semicolons
pub fn parse_codes(raw: &str) -> Vec<String> {
    TOKEN_SPLIT
        .split(raw)
        .filter(|token| !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}

/// 1-based positions from operator input; non-numeric tokens are dropped
pub fn parse_choice_indexes(raw: &str) -> Vec<usize> {
    TOKEN_SPLIT
        .split(raw)
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse::<usize>().ok())
        .collect()
}

fn build_help_message() -> String {
    let rows: Vec<String> = HELP_SNIPPETS
        .iter()
        .enumerate()
        .map(|(idx, snippet)| format!("{}. {snippet}", idx + 1))
        .collect();
    format!(
        "⚡ Быстрые подсказки:\n{}\n\n💡 Можно комбинировать голос и текст: сначала описываешь кейс, потом уточняешь коды или материалы.",
        rows.join("\n")
    )
}

fn format_plan(plan: &Plan) -> String {
    let body = if plan.lines.is_empty() {
        "(пусто)".to_string()
    } else {
        plan.lines
            .iter()
            .map(|l| {
                format!(
                    "• {}: {} × {} → {:.0} ₽",
                    l.code, l.display_name, l.quantity, l.line_total
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!("{body}\n\nИтого: {:.0} ₽", plan.total)
}

fn format_assistant_block(draft: &str, findings: &[Finding]) -> String {
    let mut parts = vec![format!("🤖 Черновик ассистента:\n{}", draft.trim())];
    if !findings.is_empty() {
        let rows: Vec<String> = findings
            .iter()
            .map(|f| {
                let status = if f.passed { "✅" } else { "⚠️" };
                format!("{status} {}", f.message)
            })
            .collect();
        parts.push(format!("🔍 Проверки:\n{}", rows.join("\n")));
    }
    parts.join("\n\n")
}
