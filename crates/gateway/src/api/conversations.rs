//! Conversation CRUD and message history.
//!
//! Every lookup is scoped to the [`AuthUser`]; a conversation owned by
//! someone else answers exactly like one that does not exist.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use uuid::Uuid;

use sc_domain::error::Error;
use sc_domain::model::{Conversation, ConversationPatch};

use crate::api::auth::AuthUser;
use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Parse a path id, rejecting anything that is not a UUID before any lookup.
pub(crate) fn parse_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request(format!("invalid id '{raw}'")))
}

fn not_found() -> ApiError {
    ApiError(Error::NotFound("Conversation".into()))
}

/// Empty or whitespace-only strings count as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/conversations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The caller's conversations, most recently updated first.
pub async fn list_conversations(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<Vec<Conversation>>> {
    let conversations = state.store.list_conversations(user_id).await?;
    tracing::debug!(%user_id, count = conversations.len(), "listed conversations");
    Ok(Json(conversations))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/conversations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default, Deserialize)]
pub struct CreateConversationBody {
    #[serde(default)]
    pub title: Option<String>,
    /// Defaults to `llm.default_model`.
    #[serde(default)]
    pub model: Option<String>,
}

pub async fn create_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    body: Option<Json<CreateConversationBody>>,
) -> ApiResult<impl IntoResponse> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let model = non_blank(body.model).unwrap_or_else(|| state.config.llm.default_model.clone());
    let conversation = Conversation::new(user_id, non_blank(body.title), model);

    let conversation = state.store.insert_conversation(conversation).await?;
    tracing::info!(
        conversation_id = %conversation.id,
        model = %conversation.model,
        "conversation created"
    );
    Ok((StatusCode::CREATED, Json(conversation)))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET / PATCH / DELETE /api/conversations/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Conversation>> {
    let id = parse_id(&id)?;
    state
        .store
        .find_conversation(id, user_id)
        .await?
        .map(Json)
        .ok_or_else(not_found)
}

pub async fn update_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    Json(patch): Json<ConversationPatch>,
) -> ApiResult<Json<Conversation>> {
    let id = parse_id(&id)?;
    let patch = ConversationPatch {
        title: non_blank(patch.title),
        model: non_blank(patch.model),
    };
    tracing::info!(
        conversation_id = %id,
        title = patch.title.is_some(),
        model = ?patch.model,
        "updating conversation"
    );
    state
        .store
        .update_conversation(id, user_id, patch)
        .await?
        .map(Json)
        .ok_or_else(not_found)
}

/// Deletes the conversation's messages, then the conversation itself.
pub async fn delete_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    if !state.store.delete_conversation(id, user_id).await? {
        return Err(not_found());
    }
    tracing::info!(conversation_id = %id, "conversation deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/conversations/:id/messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Ordered history. Ownership is checked before anything is read.
pub async fn list_messages(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    if state.store.find_conversation(id, user_id).await?.is_none() {
        return Err(not_found());
    }
    let messages = state.store.list_messages(id).await?;
    Ok(Json(messages))
}
