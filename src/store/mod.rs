//! Persistence contracts for the quiz engine.
//!
//! Reference data (role factors, pattern weights, tweak values, verbiage,
//! localized strings) is read-only to the engine. Session data (sessions,
//! responses, score totals, suggestions) is written once per scoring run.
//! "No row found" is an ordinary `Ok(None)`/empty result, never an error;
//! the only fatal condition is the store being unreachable.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::quiz::domain::{AnswerSet, ItemType, PatternId, Role, RoleTotals};

pub type SessionId = i64;

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session not found")]
    SessionNotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// One row of the role-factor reference table: the weight a particular
/// `(question, answer position)` choice contributes to one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleFactor {
    pub role: Role,
    pub factor: i64,
}

/// One row of the pattern-weight reference table, keyed by the encoded
/// answer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternWeight {
    pub pattern: PatternId,
    pub weight: i64,
}

/// Per-pattern score projection persisted for a session: raw total plus
/// the tweak-scaled total used for ranking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PatternScoreRow {
    pub pattern: PatternId,
    pub total: i64,
    pub tweaked_total: f64,
}

/// Fields captured when a session is opened. All fields are optional on
/// the wire; the service fills in language, version, and start time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewSession {
    pub language: Option<String>,
    pub group: Option<String>,
    pub project: Option<String>,
    pub prompt: Option<String>,
    pub developer: bool,
    pub version: Option<String>,
    /// Unix seconds when the user started the quiz.
    pub started_at: i64,
}

/// Pattern id and display title, as surfaced in session summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternBrief {
    pub pattern_id: PatternId,
    pub title: String,
}

/// A session row joined with its top role and ranked top patterns, for
/// the browser/export surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub started_at: i64,
    pub language: Option<String>,
    pub version: Option<String>,
    pub group: Option<String>,
    pub project: Option<String>,
    pub prompt: Option<String>,
    pub suggestion: Option<String>,
    pub developer: bool,
    pub role: Option<String>,
    pub patterns: Vec<PatternBrief>,
}

/// Read side: reference data owned by the store, never mutated here.
pub trait ReferenceStore: Send + Sync {
    /// Role weights for one `(question, answer position)` pair; at most
    /// one row per role.
    fn role_factors(&self, question: u8, position: u8) -> Result<Vec<RoleFactor>, StoreError>;

    /// Pattern weights for one `(question, encoded slot)` pair; zero or
    /// more rows.
    fn pattern_weights(&self, question: u8, slot: i64) -> Result<Vec<PatternWeight>, StoreError>;

    /// Scaling factor per pattern. Patterns without a row rank as zero.
    fn tweak_values(&self) -> Result<BTreeMap<PatternId, f64>, StoreError>;

    /// Narrative text for `(role, pattern-or-null, language)`, exact match
    /// only; fallback policy belongs to the resolvers.
    fn verbiage(
        &self,
        role: Role,
        pattern: Option<PatternId>,
        language: &str,
    ) -> Result<Option<String>, StoreError>;

    /// Single localized string. A `None` language selects the
    /// language-independent rows (e.g. image file names).
    fn local_string(
        &self,
        language: Option<&str>,
        item: ItemType,
        object_id: i64,
    ) -> Result<Option<String>, StoreError>;

    /// Contiguous block of localized strings, ordered by object id.
    fn local_strings(
        &self,
        language: Option<&str>,
        item: ItemType,
        low: i64,
        high: i64,
    ) -> Result<Vec<String>, StoreError>;

    /// Slug used to compose card image paths for a pattern.
    fn pattern_card_slug(&self, pattern: PatternId) -> Result<Option<String>, StoreError>;
}

/// Write side: session-scoped rows produced by the engine.
pub trait SessionStore: Send + Sync {
    fn record_session(&self, session: NewSession) -> Result<SessionId, StoreError>;

    /// Persist one row per answered question; returns the number of
    /// unanswered questions.
    fn save_responses(&self, session: SessionId, answers: &AnswerSet)
        -> Result<usize, StoreError>;

    /// Persist the final per-role totals (4 rows) and per-pattern totals
    /// (22 rows) for a session in a single transaction. Re-invocation
    /// replaces the previous rows rather than appending.
    fn save_score(
        &self,
        session: SessionId,
        roles: &RoleTotals,
        patterns: &[PatternScoreRow],
    ) -> Result<(), StoreError>;

    fn save_suggestion(&self, session: SessionId, text: &str) -> Result<(), StoreError>;

    /// Non-developer sessions with their top role and ranked top patterns.
    fn sessions(&self) -> Result<Vec<SessionSummary>, StoreError>;
}

/// Combined contract consumed by the quiz service.
pub trait QuizStore: ReferenceStore + SessionStore {}

impl<T: ReferenceStore + SessionStore> QuizStore for T {}
