//! DentPlan - conversational treatment plan assistant
//!
//! Assembles, prices, drafts, and validates dental treatment plans from a
//! console conversation with a clinic operator.
//!
//! # Core Concepts
//!
//! - **Snapshot catalog**: resolution always reads one immutable price-list
//!   snapshot; refreshes swap the snapshot atomically
//! - **Aggregated plans**: repeated codes merge into one line, totals are
//!   always recomputed from quantities
//! - **Degradation over failure**: missing context, a slow semantic backend,
//!   or a dead drafting service degrade the reply, never the session
//!
//! # Modules
//!
//! - [`catalog`] - price-list snapshots, aliases, guidelines, resolution
//! - [`plan`] - plan aggregation and disambiguation candidates
//! - [`pricing`] - batch pricing backends
//! - [`draft`] - narrative drafting with deterministic fallback
//! - [`validation`] - declarative clinical rule checks
//! - [`session`] - the conversation state machine and router

pub mod catalog;
pub mod cli;
pub mod config;
pub mod context;
pub mod draft;
pub mod llm;
pub mod plan;
pub mod pricing;
pub mod search;
pub mod session;
pub mod validation;

// Re-export commonly used types
pub use catalog::{
    AliasTable, CatalogEntry, CatalogError, CatalogResolver, CatalogService, CatalogSnapshot,
    Guideline, GuidelineBook, ResolveError,
};
pub use config::Config;
pub use context::{ContextStore, FeedbackRecord, InMemoryContextStore, OperatorProfile};
pub use draft::{DraftError, DraftRequest, NarrativeDrafter};
pub use llm::{GenerationClient, LlmError, OpenAiClient};
pub use plan::{combine, CandidateSet, Plan, PlanLine};
pub use pricing::{HttpPricingBackend, PricingBackend, PricingError, SnapshotPricingBackend};
pub use search::{HttpSemanticSearch, ScoredEntry, SearchError, SemanticSearch};
pub use session::{Reply, Session, SessionDeps, SessionRouter, SessionState};
pub use validation::{run_rules, Finding, Rule, RuleContext, Severity};
