//! Document store for conversations, messages and users.
//!
//! [`DocumentStore`] is the seam the chat pipeline and the HTTP handlers
//! program against. [`JsonDocumentStore`] keeps each collection in memory
//! behind a lock and mirrors it to one JSON file per collection.

mod json;

pub use json::JsonDocumentStore;

use async_trait::async_trait;
use uuid::Uuid;

use sc_domain::error::Result;
use sc_domain::model::{Conversation, ConversationPatch, Message, User};
use sc_domain::stream::Usage;

// ── collections and indexes ─────────────────────────────────────────

pub const CONVERSATIONS: &str = "conversations";
pub const MESSAGES: &str = "messages";
pub const USERS: &str = "users";

/// Messages of one conversation, oldest first.
pub const IDX_MESSAGES_BY_CONVERSATION: &str = "messages.conversationId_createdAt";
/// Unique and sparse: only messages that carry a key are indexed.
pub const IDX_MESSAGES_IDEMPOTENCY_KEY: &str = "messages.idempotencyKey";
/// A user's conversations, most recently updated first.
pub const IDX_CONVERSATIONS_BY_USER: &str = "conversations.userId_updatedAt";
pub const IDX_USERS_EMAIL: &str = "users.email";

/// What `ensure_schema` did on this call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReport {
    /// Collections that did not exist before this call.
    pub collections_created: Vec<String>,
    /// Every index that is now in place.
    pub indexes: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Persistence operations used by the chat backend.
///
/// Lookups that take a `user_id` treat "does not exist" and "belongs to
/// someone else" identically: both return `None` / `false`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create missing collections and indexes. Safe to call repeatedly.
    async fn ensure_schema(&self) -> Result<SchemaReport>;

    /// Cheap liveness probe for the health endpoint.
    async fn ping(&self) -> Result<()>;

    // ── conversations ──

    async fn insert_conversation(&self, conversation: Conversation) -> Result<Conversation>;

    async fn find_conversation(&self, id: Uuid, user_id: Uuid) -> Result<Option<Conversation>>;

    /// Conversations owned by `user_id`, most recently updated first.
    async fn list_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>>;

    async fn update_conversation(
        &self,
        id: Uuid,
        user_id: Uuid,
        patch: ConversationPatch,
    ) -> Result<Option<Conversation>>;

    /// Set the title and bump `updatedAt`. `NotFound` unless `user_id` owns
    /// the conversation.
    async fn set_conversation_title(&self, id: Uuid, user_id: Uuid, title: &str) -> Result<()>;

    /// Delete a conversation and all of its messages (messages first).
    /// Returns `false` when nothing matched.
    async fn delete_conversation(&self, id: Uuid, user_id: Uuid) -> Result<bool>;

    // ── messages ──

    /// Insert a message and bump the parent conversation's `updatedAt`.
    ///
    /// Fails with `Error::NotFound` when the parent conversation no longer
    /// exists and with `Error::DuplicateKey` when the idempotency key is
    /// already taken. A failed insert leaves the key free.
    async fn insert_message(&self, message: Message) -> Result<Message>;

    async fn count_messages(&self, conversation_id: Uuid) -> Result<usize>;

    /// Messages of a conversation in chronological order.
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>>;

    // ── users ──

    /// Fails with `Error::DuplicateKey` when the email is already taken.
    async fn insert_user(&self, user: User) -> Result<User>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>>;

    /// Atomically add one response's token counts to the user's totals.
    async fn increment_usage(&self, user_id: Uuid, usage: Usage) -> Result<()>;
}
