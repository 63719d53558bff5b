use activist_mirror::config::AppConfig;
use activist_mirror::error::AppError;
use activist_mirror::quiz::{quiz_router, QuizService, ResultView, DEFAULT_LANGUAGE};
use activist_mirror::store::{MemoryStore, NewSession, QuizStore, SqliteStore};
use activist_mirror::telemetry;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "Activist Mirror",
    about = "Run the Activist Mirror quiz service or score answers from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Score a set of answers offline and print the resulting profile
    Score(ScoreArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args, Debug)]
struct ScoreArgs {
    /// Comma-separated answer positions for the eight questions;
    /// use '-' or leave a slot blank for an unanswered question
    #[arg(long, value_parser = parse_answers)]
    answers: AnswerList,
    /// Language for the narrative text
    #[arg(long, default_value = DEFAULT_LANGUAGE)]
    language: String,
    /// SQLite database to score against; omit to use a built-in sample
    /// dataset
    #[arg(long)]
    database: Option<PathBuf>,
}

#[derive(Debug, Clone)]
struct AnswerList(Vec<Option<u8>>);

fn parse_answers(raw: &str) -> Result<AnswerList, String> {
    let mut values = Vec::new();
    for token in raw.split(',') {
        let token = token.trim();
        if token.is_empty() || token == "-" {
            values.push(None);
            continue;
        }
        let value = token
            .parse::<u8>()
            .map_err(|err| format!("failed to parse '{token}' as an answer position ({err})"))?;
        values.push(Some(value));
    }
    Ok(AnswerList(values))
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Score(args) => run_score(args),
    }
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let store = Arc::new(SqliteStore::open(&config.quiz.database_path)?);
    let service = Arc::new(QuizService::new(store, &config.quiz.default_language));

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let app = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .merge(quiz_router(service))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, database = %config.quiz.database_path.display(), "activist mirror ready");

    axum::serve(listener, app).await?;
    Ok(())
}

fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let ScoreArgs {
        answers,
        language,
        database,
    } = args;

    match database {
        Some(path) => {
            let store = Arc::new(SqliteStore::open(&path)?);
            score_and_render(store, &answers.0, &language)
        }
        None => {
            let store = Arc::new(MemoryStore::sample());
            score_and_render(store, &answers.0, &language)
        }
    }
}

fn score_and_render<S: QuizStore>(
    store: Arc<S>,
    answers: &[Option<u8>],
    language: &str,
) -> Result<(), AppError> {
    let service = QuizService::new(store, DEFAULT_LANGUAGE);
    let session = service.create_session(NewSession {
        language: Some(language.to_string()),
        developer: true,
        ..NewSession::default()
    })?;

    let view = service.result(session, answers, Some(language))?;
    render_result(&view);
    Ok(())
}

fn render_result(view: &ResultView) {
    println!("Activist Mirror scoring demo");
    println!("Session: {}", view.session_id);

    let role = if view.role_name.is_empty() {
        "(unnamed role)"
    } else {
        view.role_name.as_str()
    };
    println!("\nRole: {role}");
    if !view.role_description.is_empty() {
        println!("{}", view.role_description);
    }
    if !view.verbiage.is_empty() {
        println!("\n{}", view.verbiage);
    }
    if !view.remember.is_empty() {
        println!("{}", view.remember);
    }

    println!("\nTop patterns");
    for card in &view.patterns {
        let name = if card.name.is_empty() {
            format!("Pattern {}", card.pattern_id)
        } else {
            card.name.clone()
        };
        if card.link.is_empty() {
            println!("- {name}");
        } else {
            println!("- {name} ({})", card.link);
        }
    }

    if view.unanswered > 0 {
        println!("\nUnanswered questions: {}", view.unanswered);
        if let Some(advisory) = &view.advisory {
            println!("{advisory}");
        }
    }
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_answers_accepts_blanks_and_dashes() {
        let parsed = parse_answers("3,1,-,2,,1,3,2").expect("parses");
        assert_eq!(
            parsed.0,
            vec![
                Some(3),
                Some(1),
                None,
                Some(2),
                None,
                Some(1),
                Some(3),
                Some(2)
            ]
        );
    }

    #[test]
    fn parse_answers_rejects_garbage() {
        assert!(parse_answers("3,one,4").is_err());
    }

    #[test]
    fn sample_dataset_scores_end_to_end() {
        let store = Arc::new(MemoryStore::sample());
        let service = QuizService::new(store, DEFAULT_LANGUAGE);
        let session = service
            .create_session(NewSession {
                developer: true,
                ..NewSession::default()
            })
            .expect("session");

        let view = service
            .result(
                session,
                &[
                    Some(3),
                    Some(1),
                    Some(4),
                    Some(2),
                    Some(5),
                    Some(1),
                    Some(3),
                    Some(2),
                ],
                None,
            )
            .expect("scores");

        assert_eq!(view.patterns.len(), 4);
        assert!(!view.role_name.is_empty());
        assert!(view.verbiage.contains(&view.role_name));
    }
}
