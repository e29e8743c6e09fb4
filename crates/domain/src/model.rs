//! Stored documents: conversations, messages (with embedded attachments)
//! and users.
//!
//! Field names serialize as camelCase, which is also the shape the HTTP
//! API returns and accepts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::stream::Usage;

/// Title given to a conversation until its first message renames it.
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Chat";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    /// Default model for sends that carry no override.
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(user_id: Uuid, title: Option<String>, model: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: title.unwrap_or_else(|| DEFAULT_CONVERSATION_TITLE.to_owned()),
            model,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::Validation("conversation model must not be empty".into()));
        }
        if self.updated_at < self.created_at {
            return Err(Error::Validation(
                "conversation updatedAt precedes createdAt".into(),
            ));
        }
        Ok(())
    }
}

/// Partial update applied by `PATCH /api/conversations/:id`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A file reference produced by the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub file_name: String,
    /// Declared MIME type.
    pub file_type: String,
    /// Server-local reference. Untrusted: only its base name is used.
    pub file_path: String,
    pub file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn user(
        conversation_id: Uuid,
        content: String,
        attachments: Vec<Attachment>,
        idempotency_key: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            role: Role::User,
            content,
            model: None,
            idempotency_key,
            attachments,
            usage: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn assistant(
        conversation_id: Uuid,
        content: String,
        model: String,
        usage: Option<Usage>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            role: Role::Assistant,
            content,
            model: Some(model),
            idempotency_key: None,
            attachments: Vec::new(),
            usage,
            created_at: now,
            updated_at: now,
        }
    }

    /// Document-level checks applied on insert.
    pub fn validate(&self) -> Result<()> {
        match self.role {
            Role::User => {
                if self.usage.is_some() {
                    return Err(Error::Validation("user messages carry no usage".into()));
                }
            }
            Role::Assistant => {
                if self.content.is_empty() {
                    return Err(Error::Validation(
                        "assistant messages must not be empty".into(),
                    ));
                }
                if self.idempotency_key.is_some() {
                    return Err(Error::Validation(
                        "assistant messages carry no idempotency key".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// User
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A user record. Credentials belong to the auth service; this crate only
/// reads the id and maintains the running token totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub total_prompt_tokens: u64,
    #[serde(default)]
    pub total_completion_tokens: u64,
    #[serde(default)]
    pub total_tokens_used: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: impl Into<String>, password_hash: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash,
            total_prompt_tokens: 0,
            total_completion_tokens: 0,
            total_tokens_used: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.email.contains('@') {
            return Err(Error::Validation(format!("invalid email '{}'", self.email)));
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Titles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Preview of a first message used as the conversation title: at most
/// `max_chars` characters, with `...` appended when truncated.
pub fn title_preview(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &content[..byte_idx]),
        None => content.to_owned(),
    }
}
