// src/api/http.rs
// REST surface: token issuance, model listing, agent CRUD, sandbox session
// management, and the chat history/turn endpoints.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::error::ApiError;
use crate::agent::NewAgent;
use crate::config::CONFIG;
use crate::session::{NewPlacement, NewSession};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/token", post(issue_token))
        .route("/models", get(list_models))
        .route("/agents", post(create_agent).get(list_agents))
        .route("/agents/public", get(list_public_agents))
        .route(
            "/agents/{id}",
            get(get_agent).put(update_agent).delete(delete_agent),
        )
        .route("/agents/{id}/duplicate", post(duplicate_agent))
        .route("/sandbox/sessions", post(create_session).get(list_sessions))
        .route(
            "/sandbox/sessions/{id}",
            get(get_session).delete(delete_session),
        )
        .route(
            "/sandbox/sessions/{id}/agents",
            post(add_session_agent).get(list_session_agents),
        )
        .route(
            "/sandbox/sessions/{id}/agents/{placement_id}",
            delete(remove_session_agent),
        )
        .route(
            "/sandbox/sessions/{id}/agents/{placement_id}/position",
            put(set_agent_position),
        )
        .route(
            "/chat/{session_id}/messages",
            get(list_messages).post(post_message),
        )
        .route("/chat/{session_id}/resolutions", get(list_resolutions))
}

/// Resolves the bearer token in the Authorization header to a user id.
fn bearer_user(state: &AppState, headers: &HeaderMap) -> Result<Uuid, ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?;
    state
        .tokens
        .verify(token)
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))
}

#[derive(Debug, Deserialize)]
struct IssueToken {
    user_id: Option<Uuid>,
}

/// Pagination over history endpoints. `limit` is capped server-side.
#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    skip: usize,
    limit: Option<usize>,
}

impl Page {
    fn limit(&self) -> usize {
        self.limit
            .unwrap_or(CONFIG.page_default_limit)
            .min(CONFIG.page_max_limit)
    }
}

// ── Auth

/// The body is optional: without a user id a fresh identity is minted, which
/// is all the reference binary needs for demo issuance.
async fn issue_token(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    let user_id = serde_json::from_slice::<IssueToken>(&body)
        .ok()
        .and_then(|b| b.user_id)
        .unwrap_or_else(Uuid::new_v4);
    let token = state.tokens.issue(user_id);
    Json(json!({ "token": token, "user_id": user_id }))
}

// ── Models

async fn list_models(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "models": state.registry.list_models() }))
}

// ── Agents

async fn create_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(new): Json<NewAgent>,
) -> Result<Json<Value>, ApiError> {
    let user_id = bearer_user(&state, &headers)?;
    if !state.registry.is_supported(&new.provider) {
        return Err(ApiError::bad_request(format!(
            "unsupported AI model provider: {}",
            new.provider
        )));
    }
    let agent = state.agents.create(user_id, new);
    Ok(Json(json!(agent)))
}

async fn list_agents(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let user_id = bearer_user(&state, &headers)?;
    Ok(Json(json!({ "agents": state.agents.list_owned(user_id) })))
}

async fn list_public_agents(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "agents": state.agents.list_public() }))
}

async fn get_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let user_id = bearer_user(&state, &headers)?;
    let agent = state
        .agents
        .visible_to(id, user_id)
        .ok_or_else(|| ApiError::not_found("Agent not found"))?;
    Ok(Json(json!(agent)))
}

async fn update_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(new): Json<NewAgent>,
) -> Result<Json<Value>, ApiError> {
    let user_id = bearer_user(&state, &headers)?;
    if !state.registry.is_supported(&new.provider) {
        return Err(ApiError::bad_request(format!(
            "unsupported AI model provider: {}",
            new.provider
        )));
    }
    let agent = state
        .agents
        .update(id, user_id, new)
        .ok_or_else(|| ApiError::not_found("Agent not found"))?;
    Ok(Json(json!(agent)))
}

async fn delete_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let user_id = bearer_user(&state, &headers)?;
    if !state.agents.delete(id, user_id) {
        return Err(ApiError::not_found("Agent not found"));
    }
    Ok(Json(json!({ "deleted": id })))
}

async fn duplicate_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let user_id = bearer_user(&state, &headers)?;
    let copy = state
        .agents
        .duplicate(id, user_id)
        .ok_or_else(|| ApiError::not_found("Agent not found"))?;
    Ok(Json(json!(copy)))
}

// ── Sandbox sessions

async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(new): Json<NewSession>,
) -> Result<Json<Value>, ApiError> {
    let user_id = bearer_user(&state, &headers)?;
    let session = state.sessions.create(user_id, new);
    Ok(Json(json!(session)))
}

async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let user_id = bearer_user(&state, &headers)?;
    Ok(Json(json!({ "sessions": state.sessions.list(user_id) })))
}

fn owned_session(state: &AppState, user_id: Uuid, id: Uuid) -> Result<crate::session::Session, ApiError> {
    state
        .sessions
        .get(id)
        .filter(|s| s.user_id == user_id)
        .ok_or_else(|| ApiError::not_found("Session not found or not owned by you"))
}

async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let user_id = bearer_user(&state, &headers)?;
    let session = owned_session(&state, user_id, id)?;
    Ok(Json(json!(session)))
}

async fn delete_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let user_id = bearer_user(&state, &headers)?;
    if !state.sessions.delete(id, user_id) {
        return Err(ApiError::not_found("Session not found or not owned by you"));
    }
    Ok(Json(json!({ "deleted": id })))
}

async fn add_session_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(new): Json<NewPlacement>,
) -> Result<Json<Value>, ApiError> {
    let user_id = bearer_user(&state, &headers)?;
    owned_session(&state, user_id, id)?;
    if state.agents.visible_to(new.agent_id, user_id).is_none() {
        return Err(ApiError::not_found("Agent not found"));
    }
    let placement = state.sessions.add_agent(id, new);
    Ok(Json(json!(placement)))
}

async fn list_session_agents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let user_id = bearer_user(&state, &headers)?;
    owned_session(&state, user_id, id)?;
    Ok(Json(json!({ "agents": state.sessions.agents(id) })))
}

async fn remove_session_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, placement_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, ApiError> {
    let user_id = bearer_user(&state, &headers)?;
    owned_session(&state, user_id, id)?;
    if !state.sessions.remove_agent(id, placement_id) {
        return Err(ApiError::not_found("Agent placement not found"));
    }
    Ok(Json(json!({ "removed": placement_id })))
}

#[derive(Debug, Deserialize)]
struct Position {
    position_x: f32,
    position_y: f32,
}

async fn set_agent_position(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, placement_id)): Path<(Uuid, Uuid)>,
    Json(pos): Json<Position>,
) -> Result<Json<Value>, ApiError> {
    let user_id = bearer_user(&state, &headers)?;
    owned_session(&state, user_id, id)?;
    let placement = state
        .sessions
        .set_position(id, placement_id, pos.position_x, pos.position_y)
        .ok_or_else(|| ApiError::not_found("Agent placement not found"))?;
    Ok(Json(json!(placement)))
}

// ── Chat

async fn list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
    Query(page): Query<Page>,
) -> Result<Json<Value>, ApiError> {
    let user_id = bearer_user(&state, &headers)?;
    owned_session(&state, user_id, session_id)?;
    let messages = state.messages.range(session_id, page.skip, page.limit());
    Ok(Json(json!({ "messages": messages })))
}

#[derive(Debug, Deserialize)]
struct PostMessage {
    content: String,
    #[serde(default)]
    metadata: Option<Value>,
}

/// Runs a full turn synchronously and returns everything it produced. The
/// same events also go out over the session's WebSocket subscribers.
async fn post_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
    Json(body): Json<PostMessage>,
) -> Result<Json<Value>, ApiError> {
    let user_id = bearer_user(&state, &headers)?;
    let outcome = state
        .orchestrator
        .run_turn(user_id, session_id, body.content, body.metadata)
        .await?;
    Ok(Json(json!({
        "user_message": outcome.user_message,
        "agent_messages": outcome.agent_messages,
        "resolution": outcome.resolution,
    })))
}

async fn list_resolutions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
    Query(page): Query<Page>,
) -> Result<Json<Value>, ApiError> {
    let user_id = bearer_user(&state, &headers)?;
    owned_session(&state, user_id, session_id)?;
    let resolutions = state.resolutions.range(session_id, page.skip, page.limit());
    Ok(Json(json!({ "resolutions": resolutions })))
}
