//! REST API Server for the finance chat agent
//!
//! Exposes chat sessions over HTTP: create a session, pick its mode, upload an
//! expense CSV and exchange chat turns.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agent::AgentRole;
use crate::error::AgentError;
use crate::llm::ChatModel;
use crate::session::ChatSession;
use crate::tools::QuoteSource;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    /// Client-chosen id; any string maps to a stable UUID.
    pub session_id: Option<String>,
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiReply = (StatusCode, Json<ApiResponse>);

fn reply<T: Serialize>(status: StatusCode, data: T) -> ApiReply {
    (status, Json(ApiResponse::success(data)))
}

fn failure(status: StatusCode, message: impl Into<String>) -> ApiReply {
    (status, Json(ApiResponse::error(message.into())))
}

/// Status code for an error escaping a session operation.
fn error_status(err: &AgentError) -> StatusCode {
    match err {
        AgentError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        AgentError::MalformedCsv(_)
        | AgentError::CsvError(_)
        | AgentError::InvalidToolInput(_) => StatusCode::BAD_REQUEST,
        e if e.is_llm_failure() => StatusCode::BAD_GATEWAY,
        AgentError::HttpError(_) | AgentError::UpstreamError(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// =============================
/// API State
/// =============================

type SharedSession = Arc<Mutex<ChatSession>>;

#[derive(Clone)]
pub struct ApiState {
    sessions: Arc<RwLock<HashMap<Uuid, SharedSession>>>,
    model: Arc<dyn ChatModel>,
    quotes: Arc<dyn QuoteSource>,
}

impl ApiState {
    pub fn new(model: Arc<dyn ChatModel>, quotes: Arc<dyn QuoteSource>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            model,
            quotes,
        }
    }

    async fn find(&self, raw_id: &str) -> Result<SharedSession, AgentError> {
        let id = session_uuid(raw_id);
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AgentError::SessionNotFound(raw_id.to_string()))
    }
}

/// =============================
/// Session Id Helpers
/// =============================

fn stable_uuid_from_string(input: &str) -> Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}

/// A UUID as-is, anything else hashed to a stable UUID.
pub fn session_uuid(raw: &str) -> Uuid {
    let raw = raw.trim();
    Uuid::parse_str(raw).unwrap_or_else(|_| stable_uuid_from_string(raw))
}

fn parse_mode(raw: Option<&str>) -> Result<AgentRole, AgentError> {
    match raw {
        Some(mode) if !mode.trim().is_empty() => AgentRole::from_str(mode),
        _ => Ok(AgentRole::default()),
    }
}

fn session_summary(session: &ChatSession) -> serde_json::Value {
    serde_json::json!({
        "session_id": session.id().to_string(),
        "mode": session.role(),
        "mode_label": session.role().to_string(),
        "has_expenses": session.expenses().is_some(),
        "message_count": session.transcript().len(),
    })
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Session Endpoints
/// =============================

async fn create_session(
    State(state): State<ApiState>,
    body: Option<Json<CreateSessionRequest>>,
) -> ApiReply {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let role = match parse_mode(req.mode.as_deref()) {
        Ok(role) => role,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let id = match req.session_id.as_deref() {
        Some(raw) if !raw.trim().is_empty() => session_uuid(raw),
        _ => Uuid::new_v4(),
    };

    // The map lock is released before any session mutex is awaited; a
    // session stays locked for a whole chat turn.
    let (shared, created) = {
        let mut sessions = state.sessions.write().await;
        let (shared, created) = match sessions.entry(id) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let session =
                    ChatSession::with_id(id, role, state.model.clone(), state.quotes.clone());
                (entry.insert(Arc::new(Mutex::new(session))).clone(), true)
            }
        };
        if created {
            info!(session_id = %id, mode = %role, sessions = sessions.len(), "Session registered");
        }
        (shared, created)
    };

    let session = shared.lock().await;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    reply(status, session_summary(&session))
}

async fn get_session(State(state): State<ApiState>, Path(id): Path<String>) -> ApiReply {
    let shared = match state.find(&id).await {
        Ok(shared) => shared,
        Err(e) => return failure(error_status(&e), e.to_string()),
    };
    let session = shared.lock().await;

    let mut data = session_summary(&session);
    data["transcript"] = serde_json::json!(session.transcript());
    reply(StatusCode::OK, data)
}

async fn switch_mode(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<ModeRequest>,
) -> ApiReply {
    let role = match AgentRole::from_str(&req.mode) {
        Ok(role) => role,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let shared = match state.find(&id).await {
        Ok(shared) => shared,
        Err(e) => return failure(error_status(&e), e.to_string()),
    };
    let mut session = shared.lock().await;

    let changed = session.switch_role(role);
    let mut data = session_summary(&session);
    data["changed"] = serde_json::json!(changed);
    reply(StatusCode::OK, data)
}

async fn upload_expenses(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiReply {
    let shared = match state.find(&id).await {
        Ok(shared) => shared,
        Err(e) => return failure(error_status(&e), e.to_string()),
    };
    let mut session = shared.lock().await;

    match session.upload_csv(&body) {
        Ok(rows) => {
            let columns = session
                .expenses()
                .map(|table| table.headers().to_vec())
                .unwrap_or_default();
            reply(
                StatusCode::OK,
                serde_json::json!({ "rows": rows, "columns": columns }),
            )
        }
        Err(e) => failure(error_status(&e), e.to_string()),
    }
}

async fn chat(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> ApiReply {
    if req.message.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "Message must not be empty");
    }
    let shared = match state.find(&id).await {
        Ok(shared) => shared,
        Err(e) => return failure(error_status(&e), e.to_string()),
    };
    let mut session = shared.lock().await;

    match session.send(&req.message).await {
        Ok(turn) => reply(StatusCode::OK, turn),
        Err(e) => {
            let status = error_status(&e);
            if status.is_server_error() {
                error!(session_id = %session.id(), error = %e, "Chat turn failed");
            } else {
                warn!(session_id = %session.id(), error = %e, "Chat turn rejected");
            }
            failure(status, e.to_string())
        }
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/mode", post(switch_mode))
        .route("/api/sessions/:id/upload", post(upload_expenses))
        .route("/api/sessions/:id/chat", post(chat))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
