use std::sync::Arc;

use tracing::debug;

use crate::store::{ReferenceStore, StoreError};

use super::domain::ItemType;

/// Resolves localized display strings with a single-level fallback to the
/// default language.
///
/// Absence is a normal outcome: a missing row yields `Ok(None)` (or a
/// shorter vector for ranges) and callers degrade to empty content.
pub struct StringResolver<S> {
    store: Arc<S>,
    default_language: String,
}

impl<S: ReferenceStore> StringResolver<S> {
    pub fn new(store: Arc<S>, default_language: impl Into<String>) -> Self {
        Self {
            store,
            default_language: default_language.into(),
        }
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// Look up one string. When `language` is given, misses retry once
    /// with the default language; there is no further fallback chain.
    /// `None` skips language filtering entirely, for language-independent
    /// rows such as image file names.
    pub fn resolve(
        &self,
        language: Option<&str>,
        item: ItemType,
        object_id: i64,
    ) -> Result<Option<String>, StoreError> {
        if let Some(text) = self.store.local_string(language, item, object_id)? {
            return Ok(Some(text));
        }

        match language {
            Some(language) if language != self.default_language => {
                debug!(language, ?item, object_id, "string missing, retrying default language");
                self.store
                    .local_string(Some(&self.default_language), item, object_id)
            }
            _ => Ok(None),
        }
    }

    /// Fetch a contiguous block of strings ordered by object id. Range
    /// lookups do not fall back per row; a partially translated block
    /// comes back short and the caller decides what to do about it.
    pub fn resolve_range(
        &self,
        language: Option<&str>,
        item: ItemType,
        low: i64,
        high: i64,
    ) -> Result<Vec<String>, StoreError> {
        self.store.local_strings(language, item, low, high)
    }

    /// The five answer labels for one question page: object ids
    /// `5*page-4 ..= 5*page`.
    pub fn answer_labels(&self, language: &str, page: u8) -> Result<Vec<String>, StoreError> {
        let page = page as i64;
        self.resolve_range(Some(language), ItemType::AnswerLabels, 5 * page - 4, 5 * page)
    }
}
