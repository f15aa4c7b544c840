//! Chat and chat-session endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use aera_core::ChatSession;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    pub workspace_id: Option<Uuid>,
    /// When set, both turns are stored and the session's workspace scopes retrieval.
    pub session_id: Option<Uuid>,
}

/// `POST /api/chat`
pub async fn chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let answer = match req.session_id {
        Some(session_id) => {
            state
                .chat
                .ask_in_session(auth.user_id, session_id, &req.question)
                .await?
        }
        None => {
            state
                .chat
                .ask(auth.user_id, &req.question, req.workspace_id)
                .await?
        }
    };
    Ok(Json(answer))
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub workspace_id: Uuid,
    pub title: Option<String>,
}

/// `POST /api/chat/sessions`
pub async fn create_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("New chat");
    let session = state
        .chat_history
        .create_session(auth.user_id, req.workspace_id, title)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    pub workspace_id: Option<Uuid>,
}

/// `GET /api/chat/sessions`
pub async fn list_sessions(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListSessionsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let sessions = state
        .chat_history
        .list_sessions(auth.user_id, query.workspace_id)
        .await?;
    Ok(Json(sessions))
}

async fn owned_session(
    state: &AppState,
    user_id: Uuid,
    session_id: Uuid,
) -> Result<ChatSession, ApiError> {
    state
        .chat_history
        .get_session(session_id)
        .await?
        .filter(|s| s.user_id == user_id)
        .ok_or_else(|| ApiError::NotFound(format!("Chat session {} not found", session_id)))
}

/// `GET /api/chat/sessions/:id/messages`
pub async fn list_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    owned_session(&state, auth.user_id, session_id).await?;
    let messages = state.chat_history.list_messages(session_id).await?;
    Ok(Json(messages))
}

/// `DELETE /api/chat/sessions/:id`
pub async fn delete_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    owned_session(&state, auth.user_id, session_id).await?;
    state.chat_history.delete_session(session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
