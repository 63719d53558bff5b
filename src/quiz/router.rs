use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::store::{NewSession, QuizStore, SessionId, StoreError};

use super::service::{QuizError, QuizService};

/// Router builder exposing the quiz HTTP surface.
pub fn quiz_router<S>(service: Arc<QuizService<S>>) -> Router
where
    S: QuizStore + 'static,
{
    Router::new()
        .route("/api/v1/quiz/intro", get(intro_handler::<S>))
        .route("/api/v1/quiz/questions/:page", get(question_handler::<S>))
        .route("/api/v1/quiz/sessions", post(create_session_handler::<S>))
        .route("/api/v1/quiz/sessions", get(sessions_handler::<S>))
        .route(
            "/api/v1/quiz/sessions/export",
            get(sessions_export_handler::<S>),
        )
        .route(
            "/api/v1/quiz/sessions/:session_id/result",
            post(result_handler::<S>),
        )
        .route(
            "/api/v1/quiz/sessions/:session_id/suggestion",
            post(suggestion_handler::<S>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct LanguageQuery {
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResultRequest {
    answers: Vec<Option<u8>>,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SuggestionRequest {
    text: String,
}

fn error_response(error: QuizError) -> Response {
    let payload = json!({
        "error": error.to_string(),
    });
    let status = match &error {
        QuizError::InvalidPage(_)
        | QuizError::InvalidAnswer(_)
        | QuizError::EmptySuggestion => StatusCode::UNPROCESSABLE_ENTITY,
        QuizError::Store(StoreError::SessionNotFound) => StatusCode::NOT_FOUND,
        QuizError::Store(StoreError::Unavailable(_)) | QuizError::Export(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn intro_handler<S>(
    State(service): State<Arc<QuizService<S>>>,
    Query(query): Query<LanguageQuery>,
) -> Response
where
    S: QuizStore + 'static,
{
    match service.intro(query.language.as_deref()) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn question_handler<S>(
    State(service): State<Arc<QuizService<S>>>,
    Path(page): Path<u8>,
    Query(query): Query<LanguageQuery>,
) -> Response
where
    S: QuizStore + 'static,
{
    match service.question_page(page, query.language.as_deref()) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn create_session_handler<S>(
    State(service): State<Arc<QuizService<S>>>,
    axum::Json(session): axum::Json<NewSession>,
) -> Response
where
    S: QuizStore + 'static,
{
    match service.create_session(session) {
        Ok(session_id) => {
            let payload = json!({
                "session_id": session_id,
            });
            (StatusCode::CREATED, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn result_handler<S>(
    State(service): State<Arc<QuizService<S>>>,
    Path(session_id): Path<SessionId>,
    axum::Json(request): axum::Json<ResultRequest>,
) -> Response
where
    S: QuizStore + 'static,
{
    match service.result(session_id, &request.answers, request.language.as_deref()) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn suggestion_handler<S>(
    State(service): State<Arc<QuizService<S>>>,
    Path(session_id): Path<SessionId>,
    axum::Json(request): axum::Json<SuggestionRequest>,
) -> Response
where
    S: QuizStore + 'static,
{
    match service.record_suggestion(session_id, &request.text) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn sessions_handler<S>(
    State(service): State<Arc<QuizService<S>>>,
) -> Response
where
    S: QuizStore + 'static,
{
    match service.sessions() {
        Ok(summaries) => (StatusCode::OK, axum::Json(summaries)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn sessions_export_handler<S>(
    State(service): State<Arc<QuizService<S>>>,
) -> Response
where
    S: QuizStore + 'static,
{
    match service.sessions_csv() {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"sessions.tsv\"",
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}
