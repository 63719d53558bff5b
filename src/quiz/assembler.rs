use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::store::{PatternScoreRow, QuizStore, SessionId, StoreError};

use super::domain::{message, ItemType, PatternId, ROLE_PLACEHOLDER};
use super::patterns::PatternScorer;
use super::roles::RoleScorer;
use super::strings::StringResolver;
use super::verbiage::VerbiageResolver;

/// Which narrative template the result carries: text tied to one of the
/// top-ranked patterns, or the role-level default when none of the four
/// has specific text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageVariant {
    Specific,
    Assumed,
}

/// One of the four ranked pattern cards shown with a result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternCard {
    pub pattern_id: PatternId,
    pub name: String,
    pub link: String,
    pub image: String,
    pub text_image: String,
}

/// The assembled result for one session.
///
/// Missing reference rows degrade to empty strings; only store
/// connectivity failures surface as errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultView {
    pub session_id: SessionId,
    pub role_id: i64,
    pub role_name: String,
    pub role_description: String,
    pub role_post: String,
    pub role_image: String,
    pub looking_for: String,
    pub verbiage: String,
    pub remember: String,
    pub message_variant: MessageVariant,
    pub patterns: Vec<PatternCard>,
    pub unanswered: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisory: Option<String>,
}

/// Orchestrates the scorers and resolvers into a [`ResultView`] and owns
/// the per-session persistence writes.
pub struct ResultAssembler<S> {
    store: Arc<S>,
    strings: StringResolver<S>,
    verbiage: VerbiageResolver<S>,
    roles: RoleScorer<S>,
    patterns: PatternScorer<S>,
}

impl<S: QuizStore> ResultAssembler<S> {
    pub fn new(store: Arc<S>, default_language: &str) -> Self {
        Self {
            strings: StringResolver::new(store.clone(), default_language),
            verbiage: VerbiageResolver::new(store.clone(), default_language),
            roles: RoleScorer::new(store.clone()),
            patterns: PatternScorer::new(store.clone()),
            store,
        }
    }

    pub fn strings(&self) -> &StringResolver<S> {
        &self.strings
    }

    /// Score a session's answers, persist the projection, and resolve the
    /// narrative copy.
    pub fn assemble(
        &self,
        session: SessionId,
        answers: &super::domain::AnswerSet,
        language: &str,
    ) -> Result<ResultView, StoreError> {
        let unanswered = self.store.save_responses(session, answers)?;

        let role_outcome = self.roles.score(answers)?;
        let raw_totals = self.patterns.score(answers)?;
        let tweak_values = self.store.tweak_values()?;
        let tweaked = PatternScorer::<S>::apply_tweaks(&raw_totals, &tweak_values);

        let score_rows: Vec<PatternScoreRow> = PatternId::all()
            .map(|pattern| PatternScoreRow {
                pattern,
                total: raw_totals.get(pattern),
                tweaked_total: tweaked.get(pattern),
            })
            .collect();
        self.store
            .save_score(session, &role_outcome.totals, &score_rows)?;

        let top = PatternScorer::<S>::top_patterns(&tweaked);
        let role = role_outcome.top_role;
        info!(session, ?role, top = ?top, unanswered, "session scored");

        // Specificity fallback: prefer verbiage tied to the highest-ranked
        // pattern that has any, then fall back to the role-level default.
        // This axis is distinct from the language fallback inside the
        // resolvers.
        let mut narrative = None;
        let mut variant = MessageVariant::Assumed;
        for pattern in &top {
            if let Some(text) = self.verbiage.resolve(role, Some(*pattern), language)? {
                debug!(pattern = %pattern, "pattern-specific verbiage found");
                narrative = Some(text);
                variant = MessageVariant::Specific;
                break;
            }
        }
        if narrative.is_none() {
            narrative = self.verbiage.resolve(role, None, language)?;
        }

        let role_name = self
            .strings
            .resolve(Some(language), ItemType::RoleNames, role.id())?
            .unwrap_or_else(|| role.label().to_string());

        let remember_key = match variant {
            MessageVariant::Specific => message::REMEMBER,
            MessageVariant::Assumed => message::ASSUME,
        };
        let remember = self
            .strings
            .resolve(Some(language), ItemType::Messages, remember_key)?
            .unwrap_or_default()
            .replace(ROLE_PLACEHOLDER, &role_name);
        let verbiage = narrative
            .unwrap_or_default()
            .replace(ROLE_PLACEHOLDER, &role_name);

        let role_description = self
            .strings
            .resolve(Some(language), ItemType::RoleDescriptions, role.id())?
            .unwrap_or_default();
        let role_post = self
            .strings
            .resolve(Some(language), ItemType::RolePosts, role.id())?
            .unwrap_or_default();
        let role_image = self
            .strings
            .resolve(None, ItemType::RoleImages, role.id())?
            .unwrap_or_default();
        let looking_for = self
            .strings
            .resolve(Some(language), ItemType::Messages, message::REVEALS)?
            .unwrap_or_default();

        let advisory = if unanswered > 0 {
            self.strings
                .resolve(Some(language), ItemType::Messages, message::UNANSWERED)?
        } else {
            None
        };

        let mut cards = Vec::with_capacity(top.len());
        for pattern in &top {
            cards.push(self.pattern_card(*pattern, language)?);
        }

        Ok(ResultView {
            session_id: session,
            role_id: role.id(),
            role_name,
            role_description,
            role_post,
            role_image,
            looking_for,
            verbiage,
            remember,
            message_variant: variant,
            patterns: cards,
            unanswered,
            advisory,
        })
    }

    fn pattern_card(
        &self,
        pattern: PatternId,
        language: &str,
    ) -> Result<PatternCard, StoreError> {
        let object_id = pattern.0 as i64;
        let name = self
            .strings
            .resolve(Some(language), ItemType::PatternTitles, object_id)?
            .unwrap_or_default();
        let link = self
            .strings
            .resolve(Some(language), ItemType::PatternLinks, object_id)?
            .unwrap_or_default();

        let (image, text_image) = match self.store.pattern_card_slug(pattern)? {
            Some(slug) => (
                format!("cards/{language}/image/100/{slug}.jpg"),
                format!("cards/{language}/text/100/{slug}.jpg"),
            ),
            None => (String::new(), String::new()),
        };

        Ok(PatternCard {
            pattern_id: pattern,
            name,
            link,
            image,
            text_image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::domain::{Answer, AnswerSet, Role};
    use crate::store::{MemoryStore, NewSession, SessionStore};

    fn fixture() -> MemoryStore {
        let mut store = MemoryStore::new();

        // One answered question drives everything: role factors put
        // Citizen on top, pattern weights favor patterns 6 then 2.
        store.insert_role_factor(1, 4, Role::Rebel, 1);
        store.insert_role_factor(1, 4, Role::Citizen, 5);
        store.insert_pattern_weight(1, 4, PatternId(2), 3);
        store.insert_pattern_weight(1, 4, PatternId(6), 4);
        store.set_tweak(PatternId(2), 0.01);
        store.set_tweak(PatternId(6), 0.01);

        store.insert_local(Some("en"), ItemType::RoleNames, 3, "Citizen");
        store.insert_local(Some("en"), ItemType::RoleDescriptions, 3, "Works within.");
        store.insert_local(None, ItemType::RoleImages, 3, "citizen.png");
        store.insert_local(
            Some("en"),
            ItemType::Messages,
            message::REMEMBER,
            "Remember this, ROLE.",
        );
        store.insert_local(
            Some("en"),
            ItemType::Messages,
            message::ASSUME,
            "We assume, ROLE.",
        );
        store.insert_local(
            Some("en"),
            ItemType::Messages,
            message::UNANSWERED,
            "Some questions went unanswered.",
        );
        store.insert_local(Some("en"), ItemType::PatternTitles, 6, "Civic Memory");
        store.set_card_slug(PatternId(6), "17");

        store
    }

    fn answers() -> AnswerSet {
        let mut slots = [None; 8];
        slots[0] = Answer::new(4);
        AnswerSet::new(slots)
    }

    fn session(store: &MemoryStore) -> crate::store::SessionId {
        store
            .record_session(NewSession::default())
            .expect("session recorded")
    }

    #[test]
    fn specific_verbiage_selects_the_remember_variant() {
        let mut store = fixture();
        // Text exists for the second-ranked pattern only; the assembler
        // walks the ranking until it finds one.
        store.insert_verbiage(Role::Citizen, Some(PatternId(2)), "en", "ROLE at work.");
        let store = Arc::new(store);
        let session = session(&store);

        let assembler = ResultAssembler::new(store, "en");
        let view = assembler
            .assemble(session, &answers(), "en")
            .expect("assembles");

        assert_eq!(view.role_id, 3);
        assert_eq!(view.message_variant, MessageVariant::Specific);
        assert_eq!(view.verbiage, "Citizen at work.");
        assert_eq!(view.remember, "Remember this, Citizen.");
        assert_eq!(view.advisory.as_deref(), Some("Some questions went unanswered."));
    }

    #[test]
    fn role_default_verbiage_selects_the_assume_variant() {
        let mut store = fixture();
        store.insert_verbiage(Role::Citizen, None, "en", "The ROLE holds steady.");
        let store = Arc::new(store);
        let session = session(&store);

        let assembler = ResultAssembler::new(store, "en");
        let view = assembler
            .assemble(session, &answers(), "en")
            .expect("assembles");

        assert_eq!(view.message_variant, MessageVariant::Assumed);
        assert_eq!(view.verbiage, "The Citizen holds steady.");
        assert_eq!(view.remember, "We assume, Citizen.");
    }

    #[test]
    fn absent_content_degrades_to_empty_strings() {
        let store = Arc::new(fixture());
        let session = session(&store);

        let view = ResultAssembler::new(store, "en")
            .assemble(session, &answers(), "en")
            .expect("assembles");

        assert_eq!(view.verbiage, "");
        assert_eq!(view.looking_for, "");
        // Pattern 6 ranks first (weight 4) and carries a card slug.
        assert_eq!(view.patterns[0].pattern_id, PatternId(6));
        assert_eq!(view.patterns[0].image, "cards/en/image/100/17.jpg");
        assert_eq!(view.patterns[0].text_image, "cards/en/text/100/17.jpg");
        // Pattern 2 has no slug; its card paths stay empty.
        assert_eq!(view.patterns[1].pattern_id, PatternId(2));
        assert_eq!(view.patterns[1].image, "");
    }

    #[test]
    fn persists_the_full_score_projection() {
        let store = Arc::new(fixture());
        let session = session(&store);

        ResultAssembler::new(store.clone(), "en")
            .assemble(session, &answers(), "en")
            .expect("assembles");

        let (roles, patterns) = store.score_rows(session).expect("score persisted");
        assert_eq!(roles.get(Role::Citizen), 7); // 5 + tie-break 2
        assert_eq!(patterns.len(), 22);
        let p6 = patterns
            .iter()
            .find(|row| row.pattern == PatternId(6))
            .expect("pattern row");
        assert_eq!(p6.total, 4);
        assert!((p6.tweaked_total - 0.04).abs() < 1e-12);
    }
}
