//! In-memory store used by the test suites and the offline scoring
//! command. Reference data is loaded up front through the `insert_*`
//! methods; session writes go through the same traits the SQLite store
//! implements.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::quiz::domain::{AnswerSet, ItemType, PatternId, Role, RoleTotals};

use super::{
    NewSession, PatternBrief, PatternScoreRow, PatternWeight, ReferenceStore, RoleFactor,
    SessionId, SessionStore, SessionSummary, StoreError,
};

#[derive(Debug, Default)]
struct SessionRow {
    session: NewSession,
    responses: Vec<(u8, u8)>,
    suggestion: Option<String>,
    score: Option<(RoleTotals, Vec<PatternScoreRow>)>,
}

#[derive(Default)]
pub struct MemoryStore {
    role_factors: HashMap<(u8, u8), Vec<RoleFactor>>,
    pattern_weights: HashMap<(u8, i64), Vec<PatternWeight>>,
    tweaks: BTreeMap<PatternId, f64>,
    verbiage: HashMap<(i64, Option<PatternId>, String), String>,
    locals: HashMap<(Option<String>, i64, i64), String>,
    card_slugs: HashMap<PatternId, String>,
    sessions: Mutex<BTreeMap<SessionId, SessionRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_role_factor(&mut self, question: u8, position: u8, role: Role, factor: i64) {
        self.role_factors
            .entry((question, position))
            .or_default()
            .push(RoleFactor { role, factor });
    }

    pub fn insert_pattern_weight(
        &mut self,
        question: u8,
        slot: i64,
        pattern: PatternId,
        weight: i64,
    ) {
        self.pattern_weights
            .entry((question, slot))
            .or_default()
            .push(PatternWeight { pattern, weight });
    }

    pub fn set_tweak(&mut self, pattern: PatternId, value: f64) {
        self.tweaks.insert(pattern, value);
    }

    pub fn insert_verbiage(
        &mut self,
        role: Role,
        pattern: Option<PatternId>,
        language: &str,
        text: &str,
    ) {
        self.verbiage
            .insert((role.id(), pattern, language.to_string()), text.to_string());
    }

    pub fn insert_local(
        &mut self,
        language: Option<&str>,
        item: ItemType,
        object_id: i64,
        text: &str,
    ) {
        self.locals.insert(
            (language.map(str::to_string), item.code(), object_id),
            text.to_string(),
        );
    }

    pub fn set_card_slug(&mut self, pattern: PatternId, slug: &str) {
        self.card_slugs.insert(pattern, slug.to_string());
    }

    /// Persisted score projection for a session, if any. Exposed so tests
    /// can assert on the write contract.
    pub fn score_rows(
        &self,
        session: SessionId,
    ) -> Option<(RoleTotals, Vec<PatternScoreRow>)> {
        let guard = self.sessions.lock().expect("session mutex poisoned");
        guard.get(&session).and_then(|row| row.score.clone())
    }

    /// Responses persisted for a session, as `(question, position)` pairs.
    pub fn responses(&self, session: SessionId) -> Vec<(u8, u8)> {
        let guard = self.sessions.lock().expect("session mutex poisoned");
        guard
            .get(&session)
            .map(|row| row.responses.clone())
            .unwrap_or_default()
    }

    /// A compact synthetic dataset for the offline `score` command: every
    /// `(question, position)` pair carries role factors and two pattern
    /// weights, derived from small arithmetic cycles so the distribution
    /// is uneven but deterministic.
    pub fn sample() -> Self {
        let mut store = Self::new();

        for question in 1..=8u8 {
            for position in 1..=5u8 {
                for role in Role::ALL {
                    let factor =
                        (question as i64 + position as i64 * role.id()) % 4;
                    store.insert_role_factor(question, position, role, factor);
                }

                let slot = (question as i64 - 1) * 5 + position as i64;
                let first = PatternId((slot % 22) as u8 + 1);
                let second = PatternId(((slot * 7) % 22) as u8 + 1);
                store.insert_pattern_weight(question, slot, first, 2 + slot % 5);
                store.insert_pattern_weight(question, slot, second, 1 + slot % 3);
            }
        }

        for pattern in PatternId::all() {
            store.set_tweak(pattern, 0.0038 + pattern.0 as f64 * 0.00007);
            store.set_card_slug(pattern, &format!("card-{pattern}"));
            store.insert_local(
                Some("en"),
                ItemType::PatternTitles,
                pattern.0 as i64,
                &format!("Pattern {pattern}"),
            );
        }

        for role in Role::ALL {
            store.insert_local(Some("en"), ItemType::RoleNames, role.id(), role.label());
            store.insert_verbiage(
                role,
                None,
                "en",
                "As a ROLE you already hold the tools for change.",
            );
        }

        store
    }
}

impl ReferenceStore for MemoryStore {
    fn role_factors(&self, question: u8, position: u8) -> Result<Vec<RoleFactor>, StoreError> {
        Ok(self
            .role_factors
            .get(&(question, position))
            .cloned()
            .unwrap_or_default())
    }

    fn pattern_weights(&self, question: u8, slot: i64) -> Result<Vec<PatternWeight>, StoreError> {
        Ok(self
            .pattern_weights
            .get(&(question, slot))
            .cloned()
            .unwrap_or_default())
    }

    fn tweak_values(&self) -> Result<BTreeMap<PatternId, f64>, StoreError> {
        Ok(self.tweaks.clone())
    }

    fn verbiage(
        &self,
        role: Role,
        pattern: Option<PatternId>,
        language: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .verbiage
            .get(&(role.id(), pattern, language.to_string()))
            .cloned())
    }

    fn local_string(
        &self,
        language: Option<&str>,
        item: ItemType,
        object_id: i64,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .locals
            .get(&(language.map(str::to_string), item.code(), object_id))
            .cloned())
    }

    fn local_strings(
        &self,
        language: Option<&str>,
        item: ItemType,
        low: i64,
        high: i64,
    ) -> Result<Vec<String>, StoreError> {
        let language = language.map(str::to_string);
        let mut strings = Vec::new();
        for object_id in low..=high {
            if let Some(text) = self.locals.get(&(language.clone(), item.code(), object_id)) {
                strings.push(text.clone());
            }
        }
        Ok(strings)
    }

    fn pattern_card_slug(&self, pattern: PatternId) -> Result<Option<String>, StoreError> {
        Ok(self.card_slugs.get(&pattern).cloned())
    }
}

impl SessionStore for MemoryStore {
    fn record_session(&self, session: NewSession) -> Result<SessionId, StoreError> {
        let mut guard = self.sessions.lock().expect("session mutex poisoned");
        let id = guard.keys().next_back().copied().unwrap_or(0) + 1;
        guard.insert(
            id,
            SessionRow {
                session,
                ..SessionRow::default()
            },
        );
        Ok(id)
    }

    fn save_responses(
        &self,
        session: SessionId,
        answers: &AnswerSet,
    ) -> Result<usize, StoreError> {
        let mut guard = self.sessions.lock().expect("session mutex poisoned");
        let row = guard.get_mut(&session).ok_or(StoreError::SessionNotFound)?;
        row.responses = answers
            .answered()
            .map(|(question, answer)| (question, answer.position()))
            .collect();
        Ok(answers.unanswered_count())
    }

    fn save_score(
        &self,
        session: SessionId,
        roles: &RoleTotals,
        patterns: &[PatternScoreRow],
    ) -> Result<(), StoreError> {
        let mut guard = self.sessions.lock().expect("session mutex poisoned");
        let row = guard.get_mut(&session).ok_or(StoreError::SessionNotFound)?;
        row.score = Some((*roles, patterns.to_vec()));
        Ok(())
    }

    fn save_suggestion(&self, session: SessionId, text: &str) -> Result<(), StoreError> {
        let mut guard = self.sessions.lock().expect("session mutex poisoned");
        let row = guard.get_mut(&session).ok_or(StoreError::SessionNotFound)?;
        row.suggestion = Some(text.to_string());
        Ok(())
    }

    fn sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let guard = self.sessions.lock().expect("session mutex poisoned");
        let mut summaries = Vec::new();

        for (id, row) in guard.iter() {
            if row.session.developer {
                continue;
            }

            let (role, patterns) = match &row.score {
                Some((totals, rows)) => {
                    let top = totals
                        .iter()
                        .max_by_key(|(_, total)| *total)
                        .map(|(role, _)| role);
                    let mut ranked: Vec<&PatternScoreRow> = rows.iter().collect();
                    ranked.sort_by(|a, b| b.tweaked_total.total_cmp(&a.tweaked_total));
                    let briefs = ranked
                        .iter()
                        .take(crate::quiz::domain::TOP_PATTERNS)
                        .map(|row| PatternBrief {
                            pattern_id: row.pattern,
                            title: self
                                .locals
                                .get(&(
                                    Some("en".to_string()),
                                    ItemType::PatternTitles.code(),
                                    row.pattern.0 as i64,
                                ))
                                .cloned()
                                .unwrap_or_else(|| format!("Pattern {}", row.pattern)),
                        })
                        .collect();
                    (top.map(|role| role.label().to_string()), briefs)
                }
                None => (None, Vec::new()),
            };

            summaries.push(SessionSummary {
                session_id: *id,
                started_at: row.session.started_at,
                language: row.session.language.clone(),
                version: row.session.version.clone(),
                group: row.session.group.clone(),
                project: row.session.project.clone(),
                prompt: row.session.prompt.clone(),
                suggestion: row.suggestion.clone(),
                developer: row.session.developer,
                role,
                patterns,
            });
        }

        Ok(summaries)
    }
}
