//! Conversational assembly of treatment plans
//!
//! The state machine that walks an operator from profile setup through
//! patient details, code entry, disambiguation, drafting, and confirmation.

mod engine;
mod router;
mod state;

pub use engine::{
    parse_choice_indexes, parse_codes, Reply, Session, SessionDeps, CONFIRM_WORDS,
    CONTINUE_WORDS, DECLINE_WORDS,
};
pub use router::SessionRouter;
pub use state::SessionState;
