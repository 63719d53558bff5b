//! The scoring and resolution engine.
//!
//! [`roles`] and [`patterns`] turn an answer set into weighted totals;
//! [`strings`] and [`verbiage`] resolve localized text with their two
//! distinct fallback axes (language, and role/pattern specificity); the
//! [`assembler`] orchestrates both halves into a [`assembler::ResultView`]
//! and owns the persistence writes. [`service`] and [`router`] are the
//! surrounding HTTP shell.

pub mod assembler;
pub mod domain;
pub mod patterns;
pub mod roles;
pub mod router;
pub mod service;
pub mod strings;
pub mod verbiage;

pub use assembler::{MessageVariant, PatternCard, ResultAssembler, ResultView};
pub use domain::{
    encoded_slot, Answer, AnswerSet, InvalidAnswer, ItemType, PatternId, Role, RoleTotals,
    DEFAULT_LANGUAGE, PATTERN_COUNT, QUESTION_COUNT, TOP_PATTERNS,
};
pub use patterns::PatternScorer;
pub use roles::{RoleOutcome, RoleScorer};
pub use router::quiz_router;
pub use service::{QuizError, QuizService};
pub use strings::StringResolver;
pub use verbiage::VerbiageResolver;
