use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::store::{ReferenceStore, StoreError};

use super::domain::{
    encoded_slot, AnswerSet, PatternId, PatternTotals, TweakedTotals, TOP_PATTERNS,
};

/// Computes per-pattern weighted totals, applies the per-pattern scaling
/// factors, and ranks the result.
pub struct PatternScorer<S> {
    store: Arc<S>,
}

impl<S: ReferenceStore> PatternScorer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Raw totals: for each answered question, the weights keyed on
    /// `(question, encoded slot)` accumulate into their patterns. Every
    /// pattern keeps an entry, zero when nothing applies.
    pub fn score(&self, answers: &AnswerSet) -> Result<PatternTotals, StoreError> {
        let mut totals = PatternTotals::default();

        for (question, answer) in answers.answered() {
            let slot = encoded_slot(question, answer);
            for row in self.store.pattern_weights(question, slot)? {
                totals.add(row.pattern, row.weight);
                debug!(
                    question,
                    slot,
                    pattern = %row.pattern,
                    weight = row.weight,
                    "pattern weight applied"
                );
            }
        }

        Ok(totals)
    }

    /// Scale each raw total by its tweak value. The scaling normalizes
    /// patterns whose raw weights sit on different scales so that
    /// cross-pattern ranking is meaningful. A pattern without a tweak
    /// value ranks as zero.
    pub fn apply_tweaks(
        totals: &PatternTotals,
        tweak_values: &BTreeMap<PatternId, f64>,
    ) -> TweakedTotals {
        let mut tweaked = TweakedTotals::default();
        for pattern in PatternId::all() {
            let tweak = tweak_values.get(&pattern).copied().unwrap_or(0.0);
            tweaked.set(pattern, totals.get(pattern) as f64 * tweak);
        }
        tweaked
    }

    /// All pattern ids sorted by descending tweaked total. Equal totals
    /// keep ascending id order (stable sort), since no explicit tie-break
    /// constant exists for patterns.
    pub fn rank(tweaked: &TweakedTotals) -> Vec<PatternId> {
        let mut ranked: Vec<PatternId> = PatternId::all().collect();
        ranked.sort_by(|a, b| tweaked.get(*b).total_cmp(&tweaked.get(*a)));
        ranked
    }

    /// The ranked subset presented to the user.
    pub fn top_patterns(tweaked: &TweakedTotals) -> Vec<PatternId> {
        Self::rank(tweaked).into_iter().take(TOP_PATTERNS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::domain::Answer;
    use crate::store::MemoryStore;

    #[test]
    fn slots_follow_the_flattened_encoding() {
        // Question 3, answer position 5 must hit slot 15 and nothing else.
        let mut store = MemoryStore::new();
        store.insert_pattern_weight(3, 15, PatternId(9), 6);
        store.insert_pattern_weight(3, 14, PatternId(2), 99);

        let mut slots = [None; 8];
        slots[2] = Answer::new(5);
        let totals = PatternScorer::new(Arc::new(store))
            .score(&AnswerSet::new(slots))
            .expect("scores");

        assert_eq!(totals.get(PatternId(9)), 6);
        assert_eq!(totals.get(PatternId(2)), 0);
    }

    #[test]
    fn unanswered_questions_contribute_nothing() {
        let mut store = MemoryStore::new();
        store.insert_pattern_weight(1, 1, PatternId(1), 5);
        store.insert_pattern_weight(2, 7, PatternId(1), 3);
        let scorer = PatternScorer::new(Arc::new(store));

        let mut both = [None; 8];
        both[0] = Answer::new(1);
        both[1] = Answer::new(2);
        let full = scorer.score(&AnswerSet::new(both)).expect("scores");

        let mut partial = [None; 8];
        partial[0] = Answer::new(1);
        let sparse = scorer.score(&AnswerSet::new(partial)).expect("scores");

        assert_eq!(full.get(PatternId(1)), 8);
        assert_eq!(sparse.get(PatternId(1)), 5);
        assert_eq!(
            scorer.score(&AnswerSet::empty()).expect("scores"),
            PatternTotals::default()
        );
    }

    #[test]
    fn tweaks_scale_and_missing_tweaks_rank_zero() {
        let mut totals = PatternTotals::default();
        totals.add(PatternId(4), 10);
        totals.add(PatternId(11), 10);

        let mut tweaks = BTreeMap::new();
        tweaks.insert(PatternId(4), 0.0053);

        let tweaked = PatternScorer::<MemoryStore>::apply_tweaks(&totals, &tweaks);
        assert!((tweaked.get(PatternId(4)) - 0.053).abs() < 1e-12);
        assert_eq!(tweaked.get(PatternId(11)), 0.0);
    }

    #[test]
    fn equal_tweaked_totals_keep_pattern_id_order() {
        let mut totals = PatternTotals::default();
        totals.add(PatternId(3), 5);
        totals.add(PatternId(12), 5);
        totals.add(PatternId(20), 7);

        let mut tweaks = BTreeMap::new();
        tweaks.insert(PatternId(3), 0.004);
        tweaks.insert(PatternId(12), 0.004);
        tweaks.insert(PatternId(20), 0.004);

        let tweaked = PatternScorer::<MemoryStore>::apply_tweaks(&totals, &tweaks);
        let top = PatternScorer::<MemoryStore>::top_patterns(&tweaked);

        // 20 leads; 3 and 12 tie and keep id order; the rest tie at zero
        // and the first id wins the last slot.
        assert_eq!(
            top,
            vec![PatternId(20), PatternId(3), PatternId(12), PatternId(1)]
        );
    }
}
