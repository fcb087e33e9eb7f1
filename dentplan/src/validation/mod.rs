//! Clinical rule validation
//!
//! Rules are declarative entries in an ordered table; the runner evaluates
//! each independently and contains panics so one broken predicate cannot
//! take down the rest of the check.

use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error};

use crate::plan::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Info => "инфо",
            Severity::Medium => "средняя",
            Severity::High => "высокая",
            Severity::Critical => "критическая",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Finding {
    pub rule_id: &'static str,
    pub passed: bool,
    pub message: String,
    pub severity: Severity,
}

/// What a predicate sees: the priced plan and the narrative draft
pub struct RuleContext<'a> {
    pub plan: &'a Plan,
    pub narrative: &'a str,
}

impl RuleContext<'_> {
    pub fn narrative_lower(&self) -> String {
        self.narrative.to_lowercase()
    }

    pub fn has_code_with_prefix(&self, prefix: &str) -> bool {
        self.plan.lines.iter().any(|l| l.code.starts_with(prefix))
    }
}

pub struct Rule {
    pub id: &'static str,
    pub description: &'static str,
    pub severity: Severity,
    /// Shown to the operator when the rule fails
    pub hint: &'static str,
    pub predicate: fn(&RuleContext) -> bool,
}

fn follow_up_mentioned(ctx: &RuleContext) -> bool {
    let narrative = ctx.narrative_lower();
    ["контроль", "follow-up", "осмотр"]
        .iter()
        .any(|needle| narrative.contains(needle))
}

fn anesthesia_for_implants(ctx: &RuleContext) -> bool {
    if !ctx.has_code_with_prefix("809") {
        return true;
    }
    let narrative = ctx.narrative_lower();
    ["анестез", "седация", "обезбол"]
        .iter()
        .any(|needle| narrative.contains(needle))
}

/// Ordered table; new rules append here
pub const RULES: &[Rule] = &[
    Rule {
        id: "follow_up",
        description: "План упоминает контрольный визит",
        severity: Severity::Medium,
        hint: "Добавьте контрольный визит или осмотр в план",
        predicate: follow_up_mentioned,
    },
    Rule {
        id: "anesthesia_implant",
        description: "Хирургические услуги сопровождаются анестезией",
        severity: Severity::High,
        hint: "Для имплантации укажите анестезию или седацию",
        predicate: anesthesia_for_implants,
    },
];

/// Evaluate the built-in rule table. A panicking predicate becomes a single
/// critical finding for that rule; siblings still run.
pub fn run_rules(ctx: &RuleContext) -> Vec<Finding> {
    run_rules_on(RULES, ctx)
}

pub fn run_rules_on(rules: &[Rule], ctx: &RuleContext) -> Vec<Finding> {
    debug!(rule_count = rules.len(), "run_rules: called");
    rules
        .iter()
        .map(|rule| match catch_unwind(AssertUnwindSafe(|| (rule.predicate)(ctx))) {
            Ok(passed) => Finding {
                rule_id: rule.id,
                passed,
                message: if passed {
                    rule.description.to_string()
                } else {
                    rule.hint.to_string()
                },
                severity: rule.severity,
            },
            Err(_) => {
                error!(rule_id = rule.id, "run_rules: predicate panicked");
                Finding {
                    rule_id: rule.id,
                    passed: false,
                    message: format!("Проверка '{}' завершилась с ошибкой", rule.id),
                    severity: Severity::Critical,
                }
            }
        })
        .collect()
}
