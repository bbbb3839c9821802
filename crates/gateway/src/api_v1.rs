//! HTTP API v1 — the REST surface of the agent backend.
//!
//! Endpoints:
//!
//! - `GET  /health`                          — liveness
//! - `POST /api/v1/agents`                   — create an agent
//! - `GET  /api/v1/agents`                   — list agents
//! - `GET  /api/v1/agents/{id}`              — get an agent
//! - `PUT  /api/v1/agents/{id}`              — update an agent
//! - `DELETE /api/v1/agents/{id}`            — delete an agent
//! - `POST /api/v1/agents/{id}/sessions`     — create a session
//! - `GET  /api/v1/agents/{id}/sessions`     — list an agent's sessions
//! - `GET  /api/v1/sessions/{id}`            — get a session
//! - `PUT  /api/v1/sessions/{id}`            — update a session
//! - `DELETE /api/v1/sessions/{id}`          — delete a session
//! - `POST /api/v1/sessions/{id}/messages`   — append a message
//! - `GET  /api/v1/sessions/{id}/messages`   — list messages
//! - `POST /api/v1/sessions/{id}/chat`       — plain chat turn
//! - `POST /api/v1/sessions/{id}/chat/stream`— streaming chat turn (SSE)
//! - `POST /api/v1/sessions/{id}/chat/tools` — tool-enabled chat turn
//! - `GET  /api/v1/tools`                    — list tools
//! - `GET  /api/v1/tools/{name}`             — get one tool
//! - `POST /api/v1/tools/{name}/test`        — execute a tool directly

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, Sse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use agentry_core::agent::{CreateAgentRequest, UpdateAgentRequest};
use agentry_core::message::{CreateMessageRequest, Message};
use agentry_core::session::{CreateSessionRequest, UpdateSessionRequest};
use agentry_core::storage::Stores;
use agentry_core::tool::{InputMap, ToolSchema};
use agentry_engine::{ChatService, ChatTurnRequest, EngineError, ToolChatRequest};

// ── State ─────────────────────────────────────────────────────────────────

/// Shared state for the v1 API.
pub struct AppState {
    pub stores: Stores,
    pub chat: Arc<ChatService>,
}

pub type SharedState = Arc<AppState>;

/// Build the full application router.
pub fn router(state: SharedState) -> Router {
    let v1 = Router::new()
        .route("/agents", post(create_agent).get(list_agents))
        .route(
            "/agents/{id}",
            get(get_agent).put(update_agent).delete(delete_agent),
        )
        .route(
            "/agents/{id}/sessions",
            post(create_session).get(list_sessions),
        )
        .route(
            "/sessions/{id}",
            get(get_session).put(update_session).delete(delete_session),
        )
        .route(
            "/sessions/{id}/messages",
            post(create_message).get(list_messages),
        )
        .route("/sessions/{id}/chat", post(chat))
        .route("/sessions/{id}/chat/stream", post(chat_stream))
        .route("/sessions/{id}/chat/tools", post(chat_with_tools))
        .route("/tools", get(list_tools))
        .route("/tools/{name}", get(get_tool))
        .route("/tools/{name}/test", post(test_tool))
        .with_state(state);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", v1)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ── Errors ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

struct ApiError(StatusCode, String);

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.0, Json(ErrorBody { error: self.1 })).into_response()
    }
}

impl From<agentry_core::error::StorageError> for ApiError {
    fn from(err: agentry_core::error::StorageError) -> Self {
        use agentry_core::error::StorageError;
        match err {
            StorageError::NotFound(what) => {
                ApiError(StatusCode::NOT_FOUND, format!("{what} not found"))
            }
            other => ApiError(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::SessionNotFound(_) | EngineError::AgentNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            EngineError::UnknownProvider(_)
            | EngineError::UnknownStrategy(_)
            | EngineError::Context(_) => StatusCode::BAD_REQUEST,
            EngineError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Provider(_) => StatusCode::BAD_GATEWAY,
            EngineError::Storage(_) | EngineError::MaxIterationsExceeded { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        ApiError(status, err.to_string())
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError(StatusCode::BAD_REQUEST, message.into())
}

fn not_found(what: &str) -> ApiError {
    ApiError(StatusCode::NOT_FOUND, format!("{what} not found"))
}

// ── Shared DTOs ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Pagination {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Serialize)]
struct ListResponse<T> {
    items: Vec<T>,
    total_count: i64,
}

// ── Health ────────────────────────────────────────────────────────────────

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

// ── Agent handlers ────────────────────────────────────────────────────────

async fn create_agent(
    State(state): State<SharedState>,
    Json(payload): Json<CreateAgentRequest>,
) -> Result<(StatusCode, Json<agentry_core::Agent>), ApiError> {
    payload.validate().map_err(bad_request)?;
    let agent = payload.into_agent();
    state.stores.agents.create(&agent).await?;
    info!(agent_id = %agent.id, name = %agent.name, "agent created");
    Ok((StatusCode::CREATED, Json(agent)))
}

async fn list_agents(
    State(state): State<SharedState>,
    Query(page): Query<Pagination>,
) -> Result<Json<ListResponse<agentry_core::Agent>>, ApiError> {
    let (items, total_count) = state.stores.agents.list(page.limit, page.offset).await?;
    Ok(Json(ListResponse { items, total_count }))
}

async fn get_agent(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<agentry_core::Agent>, ApiError> {
    let agent = state
        .stores
        .agents
        .get(&id)
        .await?
        .ok_or_else(|| not_found("agent"))?;
    Ok(Json(agent))
}

async fn update_agent(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateAgentRequest>,
) -> Result<Json<agentry_core::Agent>, ApiError> {
    let mut agent = state
        .stores
        .agents
        .get(&id)
        .await?
        .ok_or_else(|| not_found("agent"))?;
    agent.apply(payload);
    state.stores.agents.update(&agent).await?;
    Ok(Json(agent))
}

async fn delete_agent(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.stores.agents.delete(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("agent"))
    }
}

// ── Session handlers ──────────────────────────────────────────────────────

async fn create_session(
    State(state): State<SharedState>,
    Path(agent_id): Path<String>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<agentry_core::Session>), ApiError> {
    // The parent agent must exist.
    state
        .stores
        .agents
        .get(&agent_id)
        .await?
        .ok_or_else(|| not_found("agent"))?;

    let session = payload.into_session(&agent_id);
    state.stores.sessions.create(&session).await?;
    info!(session_id = %session.id, agent_id = %agent_id, "session created");
    Ok((StatusCode::CREATED, Json(session)))
}

async fn list_sessions(
    State(state): State<SharedState>,
    Path(agent_id): Path<String>,
    Query(page): Query<Pagination>,
) -> Result<Json<ListResponse<agentry_core::Session>>, ApiError> {
    let (items, total_count) = state
        .stores
        .sessions
        .list_by_agent(&agent_id, page.limit, page.offset)
        .await?;
    Ok(Json(ListResponse { items, total_count }))
}

async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<agentry_core::Session>, ApiError> {
    let session = state
        .stores
        .sessions
        .get(&id)
        .await?
        .ok_or_else(|| not_found("session"))?;
    Ok(Json(session))
}

async fn update_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateSessionRequest>,
) -> Result<Json<agentry_core::Session>, ApiError> {
    let mut session = state
        .stores
        .sessions
        .get(&id)
        .await?
        .ok_or_else(|| not_found("session"))?;
    session.apply(payload);
    state.stores.sessions.update(&session).await?;
    Ok(Json(session))
}

async fn delete_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.stores.sessions.delete(&id).await? {
        state.stores.messages.delete_by_session(&id).await?;
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("session"))
    }
}

// ── Message handlers ──────────────────────────────────────────────────────

async fn create_message(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
    Json(payload): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    state
        .stores
        .sessions
        .get(&session_id)
        .await?
        .ok_or_else(|| not_found("session"))?;

    if payload.content.is_empty() {
        return Err(bad_request("content is required"));
    }

    let message = payload.into_message(&session_id);
    state.stores.messages.append(&message).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn list_messages(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
    Query(page): Query<Pagination>,
) -> Result<Json<ListResponse<Message>>, ApiError> {
    let (items, total_count) = state
        .stores
        .messages
        .list_by_session(&session_id, page.limit, page.offset)
        .await?;
    Ok(Json(ListResponse { items, total_count }))
}

// ── Chat handlers ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ChatBody {
    message: String,
    #[serde(default)]
    metadata: InputMap,
}

async fn chat(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
    Json(payload): Json<ChatBody>,
) -> Result<Json<agentry_engine::ChatOutcome>, ApiError> {
    if payload.message.is_empty() {
        return Err(bad_request("message is required"));
    }

    let outcome = state
        .chat
        .chat(ChatTurnRequest {
            session_id,
            message: payload.message,
            metadata: payload.metadata,
        })
        .await?;
    Ok(Json(outcome))
}

async fn chat_stream(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
    Json(payload): Json<ChatBody>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    if payload.message.is_empty() {
        return Err(bad_request("message is required"));
    }

    let rx = state
        .chat
        .stream(ChatTurnRequest {
            session_id,
            message: payload.message,
            metadata: payload.metadata,
        })
        .await?;

    let stream = ReceiverStream::new(rx).map(|chunk| {
        let event = match chunk {
            Ok(chunk) => SseEvent::default()
                .json_data(&chunk)
                .unwrap_or_else(|_| SseEvent::default().data("{}")),
            Err(e) => SseEvent::default()
                .event("error")
                .data(serde_json::json!({"error": e.to_string()}).to_string()),
        };
        Ok(event)
    });

    Ok(Sse::new(stream))
}

#[derive(Deserialize)]
struct ToolChatBody {
    message: String,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default = "default_tool_choice")]
    tool_choice: String,
    #[serde(default)]
    metadata: InputMap,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    max_tokens: Option<u32>,
}

fn default_tool_choice() -> String {
    "auto".into()
}

async fn chat_with_tools(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
    Json(payload): Json<ToolChatBody>,
) -> Result<Json<agentry_engine::ToolChatOutcome>, ApiError> {
    if payload.message.is_empty() {
        return Err(bad_request("message is required"));
    }

    let outcome = state
        .chat
        .chat_with_tools(ToolChatRequest {
            session_id,
            message: payload.message,
            tools: payload.tools,
            tool_choice: payload.tool_choice,
            metadata: payload.metadata,
            temperature: payload.temperature,
            max_tokens: payload.max_tokens,
        })
        .await?;
    Ok(Json(outcome))
}

// ── Tool handlers ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ToolInfo {
    name: String,
    description: String,
    parameters: Vec<ToolParameterInfo>,
    available: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    examples: Vec<serde_json::Value>,
}

#[derive(Serialize)]
struct ToolParameterInfo {
    name: String,
    #[serde(rename = "type")]
    param_type: String,
    description: String,
    required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    default: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    r#enum: Vec<String>,
}

fn tool_info(schema: &ToolSchema, available: bool) -> ToolInfo {
    ToolInfo {
        name: schema.name.clone(),
        description: schema.description.clone(),
        parameters: schema
            .parameters
            .iter()
            .map(|p| ToolParameterInfo {
                name: p.name.clone(),
                param_type: p.param_type.to_string(),
                description: p.description.clone(),
                required: p.required,
                default: p.default.clone(),
                r#enum: p.enum_values.clone(),
            })
            .collect(),
        available,
        examples: schema
            .examples
            .iter()
            .filter_map(|e| serde_json::to_value(e).ok())
            .collect(),
    }
}

async fn list_tools(
    State(state): State<SharedState>,
) -> Json<ListResponse<ToolInfo>> {
    let registry = state.chat.executor().registry();
    let items: Vec<ToolInfo> = registry
        .list()
        .iter()
        .filter_map(|name| registry.get(name))
        .map(|tool| tool_info(&tool.schema(), tool.is_available()))
        .collect();
    let total_count = items.len() as i64;
    Json(ListResponse { items, total_count })
}

async fn get_tool(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<ToolInfo>, ApiError> {
    let registry = state.chat.executor().registry();
    let tool = registry.get(&name).ok_or_else(|| not_found("tool"))?;
    Ok(Json(tool_info(&tool.schema(), tool.is_available())))
}

#[derive(Deserialize)]
struct ToolTestBody {
    #[serde(default)]
    arguments: InputMap,
    #[serde(default)]
    timeout_seconds: Option<u64>,
}

#[derive(Serialize)]
struct ToolTestResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<agentry_core::ErrorCode>,
    duration_ms: u64,
}

async fn test_tool(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(payload): Json<ToolTestBody>,
) -> Result<Json<ToolTestResponse>, ApiError> {
    let executor = match payload.timeout_seconds {
        Some(secs) if secs > 0 => state
            .chat
            .executor()
            .with_timeout(Duration::from_secs(secs)),
        _ => state.chat.executor().clone(),
    };

    let result = executor.execute(&name, "test-session", payload.arguments).await;

    Ok(Json(ToolTestResponse {
        success: result.success,
        result: result.data,
        error: result.error,
        error_code: result.error_code,
        duration_ms: result.duration_ms,
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────
