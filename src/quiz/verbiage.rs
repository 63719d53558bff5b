use std::sync::Arc;

use tracing::debug;

use crate::store::{ReferenceStore, StoreError};

use super::domain::{PatternId, Role};

/// Resolves narrative text for a `(role, pattern-or-null)` pair.
///
/// This component applies the language fallback only: a miss in the
/// requested language retries once in the default language. The second
/// fallback axis, specificity (retrying with `pattern = None` for
/// role-level default text), belongs to the assembler and must not be
/// folded in here.
pub struct VerbiageResolver<S> {
    store: Arc<S>,
    default_language: String,
}

impl<S: ReferenceStore> VerbiageResolver<S> {
    pub fn new(store: Arc<S>, default_language: impl Into<String>) -> Self {
        Self {
            store,
            default_language: default_language.into(),
        }
    }

    pub fn resolve(
        &self,
        role: Role,
        pattern: Option<PatternId>,
        language: &str,
    ) -> Result<Option<String>, StoreError> {
        if let Some(text) = self.store.verbiage(role, pattern, language)? {
            return Ok(Some(text));
        }

        if language != self.default_language {
            debug!(?role, ?pattern, language, "verbiage missing, retrying default language");
            return self
                .store
                .verbiage(role, pattern, &self.default_language);
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn resolver() -> VerbiageResolver<MemoryStore> {
        let mut store = MemoryStore::new();
        store.insert_verbiage(
            Role::ChangeAgent,
            Some(PatternId(7)),
            "en",
            "English pattern text",
        );
        store.insert_verbiage(Role::ChangeAgent, None, "es", "Texto general del rol");
        VerbiageResolver::new(Arc::new(store), "en")
    }

    #[test]
    fn exact_match_wins() {
        let resolver = resolver();
        let text = resolver
            .resolve(Role::ChangeAgent, Some(PatternId(7)), "en")
            .expect("lookup");
        assert_eq!(text.as_deref(), Some("English pattern text"));
    }

    #[test]
    fn language_fallback_is_one_level() {
        let resolver = resolver();

        let text = resolver
            .resolve(Role::ChangeAgent, Some(PatternId(7)), "es")
            .expect("lookup");
        assert_eq!(text.as_deref(), Some("English pattern text"));

        // The Spanish role-level row is not reachable from a
        // pattern-specific miss; specificity fallback is the caller's.
        let absent = resolver
            .resolve(Role::ChangeAgent, Some(PatternId(3)), "es")
            .expect("lookup");
        assert_eq!(absent, None);
    }

    #[test]
    fn role_level_rows_resolve_independently() {
        let resolver = resolver();
        let text = resolver
            .resolve(Role::ChangeAgent, None, "es")
            .expect("lookup");
        assert_eq!(text.as_deref(), Some("Texto general del rol"));
    }

    #[test]
    fn total_absence_is_not_an_error() {
        let resolver = resolver();
        let text = resolver
            .resolve(Role::Reformer, Some(PatternId(1)), "fr")
            .expect("lookup");
        assert_eq!(text, None);
    }
}
