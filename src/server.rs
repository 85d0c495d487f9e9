//! HTTP API for the knowledge base.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload` | Replace the upload directory with the posted files and rebuild |
//! | `POST` | `/generate-test-cases` | `{query}` → `{test_cases}` |
//! | `POST` | `/generate-script` | `{test_case, html_content}` → `{script}` |
//! | `GET`  | `/health` | Health check with knowledge base state |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_built", "message": "knowledge base not initialized: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `load_error` (400), `not_built` (409),
//! `embedding_error` (502), `generation_error` (502), `internal` (500).
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::KbError;
use crate::knowledge::{KbStatus, KnowledgeBase};

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    kb: Arc<KnowledgeBase>,
    upload_dir: Arc<PathBuf>,
    /// Held from clearing the upload directory until the rebuild finishes.
    upload_lock: Arc<Mutex<()>>,
}

/// Open the knowledge base described by `config` and serve it on
/// `[server].bind` until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let mut startup = config.clone();
    startup.index.load_on_start = false;
    let kb = Arc::new(KnowledgeBase::open(&startup).await?);

    // A stale index must not keep the server down: /upload can replace it.
    if config.index.load_on_start {
        match kb.load_persisted().await {
            Ok(_) => {}
            Err(KbError::Config(message)) => {
                tracing::warn!(%message, "persisted index not loaded; starting empty");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let app = router(kb, config.server.upload_dir.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the API router over an existing knowledge base.
pub fn router(kb: Arc<KnowledgeBase>, upload_dir: PathBuf) -> Router {
    let state = AppState {
        kb,
        upload_dir: Arc::new(upload_dir),
        upload_lock: Arc::new(Mutex::new(())),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload", post(handle_upload))
        .route("/generate-test-cases", post(handle_generate_test_cases))
        .route("/generate-script", post(handle_generate_script))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
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
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<KbError> for AppError {
    fn from(err: KbError) -> Self {
        let status = match &err {
            KbError::NotBuilt => StatusCode::CONFLICT,
            KbError::Load { .. } => StatusCode::BAD_REQUEST,
            KbError::EmbeddingService(_) | KbError::GenerationService(_) => StatusCode::BAD_GATEWAY,
            KbError::Storage(_) | KbError::Config(_) => {
                tracing::error!(error = %err, "request failed");
                return internal(err.to_string());
            }
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ POST /upload ============

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    files: Vec<String>,
    chunks: usize,
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    // Read the whole request before touching the upload directory.
    let mut uploads: Vec<(String, Vec<u8>)> = Vec::new();
    let mut taken = HashSet::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let Some(original) = field.file_name().map(str::to_string) else {
            continue;
        };
        let name = unique_name(sanitize_filename(&original), &mut taken);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read '{}': {}", original, e)))?;
        uploads.push((name, bytes.to_vec()));
    }

    if uploads.is_empty() {
        return Err(bad_request("no files uploaded"));
    }

    let report = {
        let _guard = state.upload_lock.lock().await;
        let paths = replace_upload_dir(&state.upload_dir, &uploads)
            .await
            .map_err(|e| internal(format!("failed to save uploads: {}", e)))?;
        state.kb.build_knowledge_base(&paths).await?
    };

    Ok(Json(UploadResponse {
        message: format!(
            "Knowledge base built successfully with {} files.",
            report.files
        ),
        files: uploads.into_iter().map(|(name, _)| name).collect(),
        chunks: report.chunks,
    }))
}

async fn replace_upload_dir(dir: &Path, uploads: &[(String, Vec<u8>)]) -> std::io::Result<Vec<PathBuf>> {
    if tokio::fs::try_exists(dir).await? {
        tokio::fs::remove_dir_all(dir).await?;
    }
    tokio::fs::create_dir_all(dir).await?;

    let mut paths = Vec::with_capacity(uploads.len());
    for (name, bytes) in uploads {
        let path = dir.join(name);
        tokio::fs::write(&path, bytes).await?;
        paths.push(path);
    }
    Ok(paths)
}

/// Reduce a client-supplied filename to a single safe path component.
fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

fn unique_name(name: String, taken: &mut HashSet<String>) -> String {
    let mut candidate = name.clone();
    let mut n = 1;
    while !taken.insert(candidate.clone()) {
        candidate = format!("{}-{}", n, name);
        n += 1;
    }
    candidate
}

// ============ POST /generate-test-cases ============

#[derive(Deserialize)]
struct TestCaseRequest {
    query: String,
}

#[derive(Serialize)]
struct TestCaseResponse {
    test_cases: String,
}

async fn handle_generate_test_cases(
    State(state): State<AppState>,
    Json(req): Json<TestCaseRequest>,
) -> Result<Json<TestCaseResponse>, AppError> {
    let test_cases = state.kb.generate_test_cases(&req.query).await?;
    Ok(Json(TestCaseResponse { test_cases }))
}

// ============ POST /generate-script ============

#[derive(Deserialize)]
struct ScriptRequest {
    test_case: String,
    html_content: String,
}

#[derive(Serialize)]
struct ScriptResponse {
    script: String,
}

async fn handle_generate_script(
    State(state): State<AppState>,
    Json(req): Json<ScriptRequest>,
) -> Result<Json<ScriptResponse>, AppError> {
    let script = state
        .kb
        .generate_script(&req.test_case, &req.html_content)
        .await?;
    Ok(Json(ScriptResponse { script }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    knowledge_base: KbStatus,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        knowledge_base: state.kb.status().await,
    })
}
