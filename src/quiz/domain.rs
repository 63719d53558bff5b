use serde::{Deserialize, Serialize};

/// Number of questions in the quiz.
pub const QUESTION_COUNT: usize = 8;
/// Number of behavioral patterns.
pub const PATTERN_COUNT: usize = 22;
/// Size of the ranked pattern subset shown to the user.
pub const TOP_PATTERNS: usize = 4;
/// Language used as the fallback target when a translation is missing.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Token replaced with the resolved role name inside narrative text.
pub const ROLE_PLACEHOLDER: &str = "ROLE";

/// The four archetypal roles a session can resolve to.
///
/// Identifiers are 1-based throughout, matching the reference data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Rebel,
    ChangeAgent,
    Citizen,
    Reformer,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Rebel, Role::ChangeAgent, Role::Citizen, Role::Reformer];

    pub const fn id(self) -> i64 {
        match self {
            Role::Rebel => 1,
            Role::ChangeAgent => 2,
            Role::Citizen => 3,
            Role::Reformer => 4,
        }
    }

    pub fn from_id(id: i64) -> Option<Role> {
        match id {
            1 => Some(Role::Rebel),
            2 => Some(Role::ChangeAgent),
            3 => Some(Role::Citizen),
            4 => Some(Role::Reformer),
            _ => None,
        }
    }

    /// Integer added to a role's total when it is tied for the lead,
    /// forcing a deterministic winner. The constants impose a fixed
    /// priority order: Reformer > Citizen > Rebel > Change-Agent.
    pub const fn tie_break(self) -> i64 {
        match self {
            Role::Rebel => 1,
            Role::ChangeAgent => 0,
            Role::Citizen => 2,
            Role::Reformer => 3,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Role::Rebel => "Rebel",
            Role::ChangeAgent => "Change Agent",
            Role::Citizen => "Citizen",
            Role::Reformer => "Reformer",
        }
    }
}

/// 1-based pattern identifier, `1..=22`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PatternId(pub u8);

impl PatternId {
    pub fn new(id: u8) -> Option<PatternId> {
        (1..=PATTERN_COUNT as u8).contains(&id).then_some(PatternId(id))
    }

    /// Every valid pattern id in ascending order.
    pub fn all() -> impl Iterator<Item = PatternId> {
        (1..=PATTERN_COUNT as u8).map(PatternId)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize - 1
    }
}

impl std::fmt::Display for PatternId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A chosen answer position, `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer(u8);

impl Answer {
    pub fn new(position: u8) -> Option<Answer> {
        (1..=5).contains(&position).then_some(Answer(position))
    }

    pub const fn position(self) -> u8 {
        self.0
    }
}

/// Raised when a raw submission carries an answer outside `1..=5`.
#[derive(Debug, thiserror::Error)]
#[error("question {question}: answer position {value} is outside 1..=5")]
pub struct InvalidAnswer {
    pub question: u8,
    pub value: u8,
}

/// An ordered, immutable set of eight optional answers.
///
/// Question indices are 1-based. Unanswered questions are legal and score
/// zero; the surrounding form flow may submit partial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerSet([Option<Answer>; QUESTION_COUNT]);

impl AnswerSet {
    pub fn new(answers: [Option<Answer>; QUESTION_COUNT]) -> Self {
        Self(answers)
    }

    /// Build from raw positions as submitted by the web layer. Missing
    /// trailing entries count as unanswered.
    pub fn from_raw(values: &[Option<u8>]) -> Result<Self, InvalidAnswer> {
        let mut answers = [None; QUESTION_COUNT];
        for (index, slot) in answers.iter_mut().enumerate() {
            if let Some(Some(value)) = values.get(index) {
                let question = index as u8 + 1;
                *slot = Some(Answer::new(*value).ok_or(InvalidAnswer {
                    question,
                    value: *value,
                })?);
            }
        }
        Ok(Self(answers))
    }

    pub fn empty() -> Self {
        Self([None; QUESTION_COUNT])
    }

    pub fn get(&self, question: u8) -> Option<Answer> {
        self.0.get(question as usize - 1).copied().flatten()
    }

    /// Iterate `(question, answer)` pairs for the answered questions only,
    /// in question order.
    pub fn answered(&self) -> impl Iterator<Item = (u8, Answer)> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(index, answer)| answer.map(|a| (index as u8 + 1, a)))
    }

    pub fn unanswered_count(&self) -> usize {
        self.0.iter().filter(|answer| answer.is_none()).count()
    }
}

/// Flatten a `(question, answer position)` pair into the single `1..=40`
/// slot space the pattern-weight reference data is keyed on. The encoding
/// must be preserved exactly.
pub fn encoded_slot(question: u8, answer: Answer) -> i64 {
    (question as i64 - 1) * 5 + answer.position() as i64
}

/// Accumulated per-role weights for one scoring run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoleTotals([i64; 4]);

impl RoleTotals {
    pub fn get(&self, role: Role) -> i64 {
        self.0[role.id() as usize - 1]
    }

    pub fn add(&mut self, role: Role, weight: i64) {
        self.0[role.id() as usize - 1] += weight;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Role, i64)> + '_ {
        Role::ALL.iter().map(|role| (*role, self.get(*role)))
    }
}

/// Accumulated per-pattern raw weights; every pattern has an entry,
/// defaulting to zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternTotals([i64; PATTERN_COUNT]);

impl Default for PatternTotals {
    fn default() -> Self {
        Self([0; PATTERN_COUNT])
    }
}

impl PatternTotals {
    pub fn get(&self, pattern: PatternId) -> i64 {
        self.0[pattern.index()]
    }

    pub fn add(&mut self, pattern: PatternId, weight: i64) {
        self.0[pattern.index()] += weight;
    }
}

/// Per-pattern totals after scaling by the tweak values.
#[derive(Debug, Clone, PartialEq)]
pub struct TweakedTotals([f64; PATTERN_COUNT]);

impl Default for TweakedTotals {
    fn default() -> Self {
        Self([0.0; PATTERN_COUNT])
    }
}

impl TweakedTotals {
    pub fn get(&self, pattern: PatternId) -> f64 {
        self.0[pattern.index()]
    }

    pub fn set(&mut self, pattern: PatternId, value: f64) {
        self.0[pattern.index()] = value;
    }
}

/// Categories of localized strings, mirroring the `itemtype` column of the
/// reference data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemType {
    Questions,
    AnswerLabels,
    Patterns,
    Roles,
    Messages,
    RoleNames,
    RoleDescriptions,
    RolePosts,
    RoleImages,
    RoleLinks,
    PatternTitles,
    PatternLinks,
    PatternDescriptions,
    PatternGraphics,
    QuestionDescriptors,
    QuestionImages,
}

impl ItemType {
    pub const fn code(self) -> i64 {
        match self {
            ItemType::Questions => 1,
            ItemType::AnswerLabels => 2,
            ItemType::Patterns => 3,
            ItemType::Roles => 4,
            ItemType::Messages => 5,
            ItemType::RoleNames => 11,
            ItemType::RoleDescriptions => 12,
            ItemType::RolePosts => 13,
            ItemType::RoleImages => 14,
            ItemType::RoleLinks => 15,
            ItemType::PatternTitles => 16,
            ItemType::PatternLinks => 17,
            ItemType::PatternDescriptions => 18,
            ItemType::PatternGraphics => 19,
            ItemType::QuestionDescriptors => 20,
            ItemType::QuestionImages => 21,
        }
    }
}

/// Object ids used with [`ItemType::Messages`].
pub mod message {
    pub const TITLE: i64 = 0;
    pub const REVEALS: i64 = 4;
    pub const RECOMMENDED: i64 = 7;
    pub const FULL: i64 = 8;
    pub const POST_REPORT: i64 = 9;
    pub const THANKS: i64 = 10;
    pub const INTRO: i64 = 11;
    pub const SUBMIT_LABEL: i64 = 12;
    pub const INSTRUCTIONS: i64 = 13;
    pub const NEXT: i64 = 14;
    pub const UNANSWERED: i64 = 15;
    pub const NOTE: i64 = 16;
    pub const VERBIAGE: i64 = 17;
    pub const REMEMBER: i64 = 18;
    pub const ASSUME: i64 = 19;
    pub const BEGIN: i64 = 30;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_slot_flattens_question_and_position() {
        let answer = Answer::new(5).expect("valid answer");
        assert_eq!(encoded_slot(3, answer), 15);
        let first = Answer::new(1).expect("valid answer");
        assert_eq!(encoded_slot(1, first), 1);
        assert_eq!(encoded_slot(8, answer), 40);
    }

    #[test]
    fn from_raw_rejects_out_of_range_positions() {
        let err = AnswerSet::from_raw(&[Some(6)]).expect_err("position 6 invalid");
        assert_eq!(err.question, 1);
        assert_eq!(err.value, 6);
        assert!(AnswerSet::from_raw(&[Some(0)]).is_err());
    }

    #[test]
    fn from_raw_tolerates_missing_and_short_submissions() {
        let set = AnswerSet::from_raw(&[Some(3), None, Some(1)]).expect("valid set");
        assert_eq!(set.unanswered_count(), 6);
        let answered: Vec<_> = set.answered().map(|(q, a)| (q, a.position())).collect();
        assert_eq!(answered, vec![(1, 3), (3, 1)]);
    }

    #[test]
    fn role_ids_round_trip() {
        for role in Role::ALL {
            assert_eq!(Role::from_id(role.id()), Some(role));
        }
        assert_eq!(Role::from_id(0), None);
        assert_eq!(Role::from_id(5), None);
    }

    #[test]
    fn pattern_id_bounds() {
        assert!(PatternId::new(0).is_none());
        assert!(PatternId::new(23).is_none());
        assert_eq!(PatternId::all().count(), PATTERN_COUNT);
    }
}
