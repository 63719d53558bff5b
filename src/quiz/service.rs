use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::store::{NewSession, QuizStore, SessionId, SessionSummary, StoreError};

use super::assembler::{ResultAssembler, ResultView};
use super::domain::{message, AnswerSet, InvalidAnswer, ItemType, QUESTION_COUNT};

/// Errors surfaced by the quiz service. Validation failures are the
/// caller's to fix; store failures are terminal for the request.
#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    #[error("question page {0} is out of range (1..={QUESTION_COUNT})")]
    InvalidPage(u8),
    #[error(transparent)]
    InvalidAnswer(#[from] InvalidAnswer),
    #[error("suggestion text is empty")]
    EmptySuggestion,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to render session export: {0}")]
    Export(String),
}

/// Front-page copy for the quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntroView {
    pub title: String,
    pub intro: String,
    pub instructions: String,
    pub begin: String,
}

/// One question page: the prompt, its supporting copy, and the five
/// answer labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionPageView {
    pub page: u8,
    pub question: String,
    pub descriptor: String,
    pub image: String,
    pub answer_labels: Vec<String>,
}

/// Application service tying the resolvers, scorers, and store together
/// behind the operations the HTTP surface and the CLI expose.
pub struct QuizService<S> {
    store: Arc<S>,
    assembler: ResultAssembler<S>,
    default_language: String,
}

impl<S: QuizStore> QuizService<S> {
    pub fn new(store: Arc<S>, default_language: impl Into<String>) -> Self {
        let default_language = default_language.into();
        Self {
            assembler: ResultAssembler::new(store.clone(), &default_language),
            store,
            default_language,
        }
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    fn language<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested.unwrap_or(&self.default_language)
    }

    pub fn intro(&self, language: Option<&str>) -> Result<IntroView, QuizError> {
        let language = self.language(language);
        let strings = self.assembler.strings();
        let fetch = |id| -> Result<String, StoreError> {
            Ok(strings
                .resolve(Some(language), ItemType::Messages, id)?
                .unwrap_or_default())
        };

        Ok(IntroView {
            title: fetch(message::TITLE)?,
            intro: fetch(message::INTRO)?,
            instructions: fetch(message::INSTRUCTIONS)?,
            begin: fetch(message::BEGIN)?,
        })
    }

    /// One question page. Answer-label ranges do not fall back per row;
    /// when a non-default language comes back with an incomplete block the
    /// whole page of labels is refetched in the default language so the
    /// five labels always read consistently.
    pub fn question_page(
        &self,
        page: u8,
        language: Option<&str>,
    ) -> Result<QuestionPageView, QuizError> {
        if page == 0 || page as usize > QUESTION_COUNT {
            return Err(QuizError::InvalidPage(page));
        }

        let language = self.language(language);
        let strings = self.assembler.strings();
        let object_id = page as i64;

        let question = strings
            .resolve(Some(language), ItemType::Questions, object_id)?
            .unwrap_or_default();
        let descriptor = strings
            .resolve(Some(language), ItemType::QuestionDescriptors, object_id)?
            .unwrap_or_default();
        let image = strings
            .resolve(None, ItemType::QuestionImages, object_id)?
            .unwrap_or_default();

        let mut answer_labels = strings.answer_labels(language, page)?;
        if answer_labels.len() != 5 && language != self.default_language {
            warn!(
                page,
                language,
                found = answer_labels.len(),
                "incomplete answer-label block, refetching in default language"
            );
            answer_labels = strings.answer_labels(&self.default_language, page)?;
        }

        Ok(QuestionPageView {
            page,
            question,
            descriptor,
            image,
            answer_labels,
        })
    }

    /// Open a session. The engine version and start time default to this
    /// build and the current clock when the caller leaves them out.
    #[instrument(skip(self, session))]
    pub fn create_session(&self, mut session: NewSession) -> Result<SessionId, QuizError> {
        if session.version.is_none() {
            session.version = Some(env!("CARGO_PKG_VERSION").to_string());
        }
        if session.started_at == 0 {
            session.started_at = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs() as i64)
                .unwrap_or(0);
        }
        if session.language.is_none() {
            session.language = Some(self.default_language.clone());
        }

        let id = self.store.record_session(session)?;
        info!(session = id, "session opened");
        Ok(id)
    }

    /// Score a session's raw answers and assemble the result page.
    #[instrument(skip(self, raw_answers))]
    pub fn result(
        &self,
        session: SessionId,
        raw_answers: &[Option<u8>],
        language: Option<&str>,
    ) -> Result<ResultView, QuizError> {
        let answers = AnswerSet::from_raw(raw_answers)?;
        let language = self.language(language);
        Ok(self.assembler.assemble(session, &answers, language)?)
    }

    pub fn record_suggestion(&self, session: SessionId, text: &str) -> Result<(), QuizError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(QuizError::EmptySuggestion);
        }
        self.store.save_suggestion(session, text)?;
        info!(session, "suggestion recorded");
        Ok(())
    }

    pub fn sessions(&self) -> Result<Vec<SessionSummary>, QuizError> {
        Ok(self.store.sessions()?)
    }

    /// Tab-separated export of all non-developer sessions, one row per
    /// session with the ranked top patterns flattened into one column.
    pub fn sessions_csv(&self) -> Result<Vec<u8>, QuizError> {
        let summaries = self.sessions()?;

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(Vec::new());
        writer
            .write_record([
                "session_id",
                "started_at",
                "language",
                "version",
                "group",
                "project",
                "prompt",
                "role",
                "patterns",
                "suggestion",
            ])
            .map_err(|err| QuizError::Export(err.to_string()))?;

        for summary in &summaries {
            let patterns = summary
                .patterns
                .iter()
                .map(|brief| brief.title.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            writer
                .write_record([
                    summary.session_id.to_string(),
                    summary.started_at.to_string(),
                    summary.language.clone().unwrap_or_default(),
                    summary.version.clone().unwrap_or_default(),
                    summary.group.clone().unwrap_or_default(),
                    summary.project.clone().unwrap_or_default(),
                    summary.prompt.clone().unwrap_or_default(),
                    summary.role.clone().unwrap_or_default(),
                    patterns,
                    summary.suggestion.clone().unwrap_or_default(),
                ])
                .map_err(|err| QuizError::Export(err.to_string()))?;
        }

        writer
            .into_inner()
            .map_err(|err| QuizError::Export(err.to_string()))
    }
}
