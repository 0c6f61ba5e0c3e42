//! HTTP serving layer.
//!
//! Exposes corpus ingestion and conversation sessions as a small JSON API.
//! The serving layer owns the [`SessionStore`] and hands conversations to the
//! session core explicitly, one turn at a time.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/ingest` | Raw zip body, or `?url=` to fetch one → corpus report |
//! | `POST`   | `/sessions` | Start a conversation, optionally seeded from an ingested corpus |
//! | `GET`    | `/sessions/{id}/messages` | Display history (seed hidden, newest first) |
//! | `POST`   | `/sessions/{id}/messages` | Submit one user turn |
//! | `DELETE` | `/sessions/{id}` | End a session |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "completion_failed", "message": "completion API error 429: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `payload_too_large` (413), `corrupt_archive` (422), `completion_failed` (502),
//! `fetch_failed` (502), `internal` (500).

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::archive::ArchiveSource;
use crate::cache::{CorpusCache, MemoryCache};
use crate::completion::{create_provider, CompletionProvider};
use crate::config::Config;
use crate::corpus::CorpusReport;
use crate::error::ArchiveError;
use crate::ingest::Ingestor;
use crate::secrets;
use crate::session::{compose_seed, Message, SessionState};
use crate::sessions::SessionStore;

/// Number of distinct archives whose reports stay cached.
const CACHE_CAPACITY: usize = 16;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    ingestor: Arc<Ingestor>,
    cache: Arc<MemoryCache>,
    sessions: Arc<SessionStore>,
    provider: Arc<dyn CompletionProvider>,
    seed: Arc<String>,
}

impl AppState {
    pub fn new(
        config: Config,
        provider: Arc<dyn CompletionProvider>,
        seed: String,
    ) -> anyhow::Result<Self> {
        let cache = Arc::new(MemoryCache::new(CACHE_CAPACITY));
        let ingestor = Ingestor::new(&config, cache.clone())?;
        Ok(Self {
            config: Arc::new(config),
            ingestor: Arc::new(ingestor),
            cache,
            sessions: Arc::new(SessionStore::new()),
            provider,
            seed: Arc::new(seed),
        })
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}

/// Starts the HTTP server.
///
/// Credential and seed message are resolved before the listener binds, so a
/// misconfigured server never accepts a session.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let resolved = secrets::resolve(config)?;
    let provider = create_provider(&config.completion, resolved.api_key.clone())?;
    let state = AppState::new(config.clone(), provider, resolved.seed_message)?;

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("cchat server listening on http://{}", bind_addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit =
        usize::try_from(state.config.archive.max_archive_bytes).unwrap_or(usize::MAX);

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/ingest",
            post(handle_ingest).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/sessions", post(handle_create_session))
        .route(
            "/sessions/{id}/messages",
            get(handle_history).post(handle_submit),
        )
        .route("/sessions/{id}", delete(handle_end_session))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn app_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code,
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    app_error(StatusCode::NOT_FOUND, "not_found", message)
}

fn internal(message: impl Into<String>) -> AppError {
    app_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

fn classify_archive_error(err: ArchiveError) -> AppError {
    let message = err.to_string();
    match err {
        ArchiveError::CorruptArchive(_) => {
            app_error(StatusCode::UNPROCESSABLE_ENTITY, "corrupt_archive", message)
        }
        ArchiveError::OversizeArchive { .. } => {
            app_error(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", message)
        }
        ArchiveError::Fetch { .. } => app_error(StatusCode::BAD_GATEWAY, "fetch_failed", message),
        ArchiveError::ExtractionIo { .. } => internal(message),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /ingest ============

#[derive(Serialize)]
struct IngestResponse {
    key: String,
    cached: bool,
    total: usize,
    chars: usize,
    #[serde(flatten)]
    report: Arc<CorpusReport>,
}

#[derive(Deserialize)]
struct IngestParams {
    /// Fetch the archive from this URL instead of reading the body.
    url: Option<String>,
}

/// Handler for `POST /ingest`. The body is the raw zip archive unless `url` is given.
async fn handle_ingest(
    State(state): State<AppState>,
    Query(params): Query<IngestParams>,
    body: Bytes,
) -> Result<Json<IngestResponse>, AppError> {
    let bytes = match params.url {
        Some(url) => ArchiveSource::Url(url)
            .load(&state.config.archive)
            .await
            .map_err(classify_archive_error)?,
        None if body.is_empty() => {
            return Err(bad_request(
                "request body must contain a zip archive, or pass ?url=",
            ))
        }
        None => body.to_vec(),
    };

    let ingestor = state.ingestor.clone();
    let ingestion = tokio::task::spawn_blocking(move || ingestor.ingest_bytes(&bytes, None))
        .await
        .map_err(|e| internal(format!("ingest task failed: {}", e)))?
        .map_err(classify_archive_error)?;

    Ok(Json(IngestResponse {
        key: ingestion.key,
        cached: ingestion.cached,
        total: ingestion.report.total(),
        chars: ingestion.report.char_len(),
        report: ingestion.report,
    }))
}

// ============ POST /sessions ============

#[derive(Deserialize, Default)]
struct CreateSessionRequest {
    /// Key returned by `POST /ingest`; the corpus is appended to the seed.
    #[serde(default)]
    corpus_key: Option<String>,
}

#[derive(Serialize)]
struct CreateSessionResponse {
    id: Uuid,
}

async fn handle_create_session(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<CreateSessionResponse>), AppError> {
    let request: CreateSessionRequest = if body.is_empty() {
        CreateSessionRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| bad_request(e.to_string()))?
    };

    let seed = match request.corpus_key {
        Some(key) => {
            let report = state
                .cache
                .get(&key)
                .ok_or_else(|| not_found(format!("no ingested corpus with key: {}", key)))?;
            compose_seed(
                &state.seed,
                Some(&report),
                state.config.session.max_corpus_chars,
            )
        }
        None => state.seed.to_string(),
    };

    let id = state.sessions.create(&seed);
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { id })))
}

// ============ GET /sessions/{id}/messages ============

#[derive(Serialize)]
struct HistoryResponse {
    state: SessionState,
    unanswered: usize,
    messages: Vec<Message>,
}

async fn handle_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<HistoryResponse>, AppError> {
    let conversation = state
        .sessions
        .get(&id)
        .ok_or_else(|| not_found(format!("no session: {}", id)))?;
    let conversation = conversation.lock().await;

    Ok(Json(HistoryResponse {
        state: conversation.state(),
        unanswered: conversation.unanswered(),
        messages: conversation.display_history().cloned().collect(),
    }))
}

// ============ POST /sessions/{id}/messages ============

#[derive(Deserialize)]
struct SubmitRequest {
    content: String,
}

#[derive(Serialize)]
struct SubmitResponse {
    /// `None` when the submitted text was blank and nothing was appended.
    reply: Option<Message>,
    state: SessionState,
}

/// Handler for `POST /sessions/{id}/messages`.
///
/// Returns `409` when a turn is already in flight on the same session and
/// `502` when the completion call fails (the user message stays unanswered).
async fn handle_submit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, AppError> {
    let conversation = state
        .sessions
        .get(&id)
        .ok_or_else(|| not_found(format!("no session: {}", id)))?;
    let mut conversation = conversation.try_lock().map_err(|_| {
        app_error(
            StatusCode::CONFLICT,
            "conflict",
            "a turn is already in progress for this session",
        )
    })?;

    let reply = conversation
        .submit(state.provider.as_ref(), &request.content)
        .await
        .map_err(|e| app_error(StatusCode::BAD_GATEWAY, "completion_failed", e.to_string()))?
        .cloned();

    Ok(Json(SubmitResponse {
        reply,
        state: conversation.state(),
    }))
}

// ============ DELETE /sessions/{id} ============

async fn handle_end_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.sessions.remove(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("no session: {}", id)))
    }
}
