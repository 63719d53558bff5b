use std::sync::Arc;

use tracing::debug;

use crate::store::{ReferenceStore, StoreError};

use super::domain::{AnswerSet, Role, RoleTotals};

/// Outcome of one role-scoring pass: the winning role and the final
/// (post-tweak) totals for all four roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleOutcome {
    pub top_role: Role,
    pub totals: RoleTotals,
}

/// Computes per-role weighted totals and selects the top role with
/// deterministic tie-breaking.
pub struct RoleScorer<S> {
    store: Arc<S>,
}

impl<S: ReferenceStore> RoleScorer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Score an answer set. Unanswered questions contribute nothing;
    /// missing reference rows count as zero weight.
    ///
    /// Ties at the leading total are broken by adding each tied leader's
    /// fixed tie-break constant and re-scanning, so the result is always
    /// a single deterministic winner. With every question unanswered all
    /// four roles tie at zero and the constants alone decide (Reformer).
    pub fn score(&self, answers: &AnswerSet) -> Result<RoleOutcome, StoreError> {
        let mut totals = RoleTotals::default();

        for (question, answer) in answers.answered() {
            for row in self.store.role_factors(question, answer.position())? {
                totals.add(row.role, row.factor);
                debug!(
                    question,
                    position = answer.position(),
                    role = ?row.role,
                    factor = row.factor,
                    "role factor applied"
                );
            }
        }

        // Find the leading total, tracking how many roles share it. The
        // tie count resets whenever a new strict maximum appears.
        let mut max = 0;
        let mut ties = 0;
        for (_, total) in totals.iter() {
            if total > max {
                max = total;
                ties = 0;
            } else if total == max {
                ties += 1;
            }
        }
        debug!(max, ties, "pre-tweak leader scan");

        // Only the tied leaders receive their tie-break constant.
        let mut tweaked = totals;
        for (role, total) in totals.iter() {
            if total == max {
                tweaked.add(role, role.tie_break());
            }
        }

        // Re-scan for the post-tweak winner; first strict maximum wins.
        let mut top_role = Role::Rebel;
        let mut best = i64::MIN;
        for (role, total) in tweaked.iter() {
            if total > best {
                best = total;
                top_role = role;
            }
        }

        debug!(?top_role, best, "role scoring complete");
        Ok(RoleOutcome {
            top_role,
            totals: tweaked,
        })
    }
}
