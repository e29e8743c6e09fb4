//! JSON-file document store.
//!
//! Each collection lives in `<data_dir>/<collection>.json` as a JSON array.
//! All state is held in memory behind one `RwLock`; every mutation rewrites
//! the affected collection files (tmp file + rename) before the lock is
//! released, so concurrent writers are serialized and readers never see a
//! half-applied change. A mutation whose write fails is rolled back in
//! memory before the error is returned.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use sc_domain::error::{Error, Result};
use sc_domain::model::{Conversation, ConversationPatch, Message, User};
use sc_domain::stream::Usage;
use sc_domain::trace::TraceEvent;

use crate::{
    DocumentStore, SchemaReport, CONVERSATIONS, IDX_CONVERSATIONS_BY_USER,
    IDX_MESSAGES_BY_CONVERSATION, IDX_MESSAGES_IDEMPOTENCY_KEY, IDX_USERS_EMAIL, MESSAGES,
    USERS,
};

const ALL_COLLECTIONS: [&str; 3] = [CONVERSATIONS, MESSAGES, USERS];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct Collections {
    conversations: HashMap<Uuid, Conversation>,
    /// Insertion order; positions are referenced by the message indexes.
    messages: Vec<Message>,
    users: HashMap<Uuid, User>,
    /// Collections that exist (have a file, or were created in memory).
    present: BTreeSet<String>,
    idx: Indexes,
}

#[derive(Default)]
struct Indexes {
    /// conversation id -> positions in `messages`, in insertion order.
    messages_by_conversation: HashMap<Uuid, Vec<usize>>,
    /// Sparse: only keyed messages appear.
    idempotency_keys: HashMap<String, Uuid>,
    conversations_by_user: HashMap<Uuid, Vec<Uuid>>,
    user_emails: HashMap<String, Uuid>,
}

/// Copies of the collections a mutation is about to touch.
struct Snapshot {
    conversations: Option<HashMap<Uuid, Conversation>>,
    messages: Option<Vec<Message>>,
    users: Option<HashMap<Uuid, User>>,
    present: BTreeSet<String>,
}

impl Collections {
    /// Rebuild every index from the documents, enforcing unique indexes.
    fn rebuild_indexes(&mut self) -> Result<()> {
        let mut idx = Indexes::default();

        for (pos, msg) in self.messages.iter().enumerate() {
            idx.messages_by_conversation
                .entry(msg.conversation_id)
                .or_default()
                .push(pos);
            if let Some(key) = &msg.idempotency_key {
                if idx.idempotency_keys.insert(key.clone(), msg.id).is_some() {
                    return Err(Error::DuplicateKey {
                        index: IDX_MESSAGES_IDEMPOTENCY_KEY.into(),
                    });
                }
            }
        }

        for conv in self.conversations.values() {
            idx.conversations_by_user
                .entry(conv.user_id)
                .or_default()
                .push(conv.id);
        }

        for user in self.users.values() {
            if idx.user_emails.insert(user.email.clone(), user.id).is_some() {
                return Err(Error::DuplicateKey {
                    index: IDX_USERS_EMAIL.into(),
                });
            }
        }

        self.idx = idx;
        Ok(())
    }

    fn snapshot(&self, collections: &[&str]) -> Snapshot {
        Snapshot {
            conversations: collections
                .contains(&CONVERSATIONS)
                .then(|| self.conversations.clone()),
            messages: collections.contains(&MESSAGES).then(|| self.messages.clone()),
            users: collections.contains(&USERS).then(|| self.users.clone()),
            present: self.present.clone(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        if let Some(conversations) = snapshot.conversations {
            self.conversations = conversations;
        }
        if let Some(messages) = snapshot.messages {
            self.messages = messages;
        }
        if let Some(users) = snapshot.users {
            self.users = users;
        }
        self.present = snapshot.present;
        // The snapshot satisfied every unique index when it was taken.
        if let Err(e) = self.rebuild_indexes() {
            tracing::error!(error = %e, "index rebuild after rollback failed");
        }
    }

    fn owned_conversation(&self, id: Uuid, user_id: Uuid) -> Option<&Conversation> {
        self.conversations.get(&id).filter(|c| c.user_id == user_id)
    }

    fn sorted_conversations(&self) -> Vec<&Conversation> {
        let mut all: Vec<&Conversation> = self.conversations.values().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        all
    }

    fn sorted_users(&self) -> Vec<&User> {
        let mut all: Vec<&User> = self.users.values().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        all
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Document store backed by one JSON file per collection, or purely in
/// memory when opened with [`JsonDocumentStore::in_memory`].
pub struct JsonDocumentStore {
    data_dir: Option<PathBuf>,
    state: RwLock<Collections>,
}

impl JsonDocumentStore {
    /// Load the collections found under `data_dir`. Missing files are
    /// treated as empty collections until `ensure_schema` creates them.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let mut state = Collections::default();

        if let Some(convs) = read_collection::<Conversation>(data_dir, CONVERSATIONS)? {
            state.conversations = convs.into_iter().map(|c| (c.id, c)).collect();
            state.present.insert(CONVERSATIONS.into());
        }
        if let Some(msgs) = read_collection::<Message>(data_dir, MESSAGES)? {
            state.messages = msgs;
            state.present.insert(MESSAGES.into());
        }
        if let Some(users) = read_collection::<User>(data_dir, USERS)? {
            state.users = users.into_iter().map(|u| (u.id, u)).collect();
            state.present.insert(USERS.into());
        }
        state.rebuild_indexes()?;

        tracing::info!(
            conversations = state.conversations.len(),
            messages = state.messages.len(),
            users = state.users.len(),
            path = %data_dir.display(),
            "document store loaded"
        );

        Ok(Self {
            data_dir: Some(data_dir.to_path_buf()),
            state: RwLock::new(state),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            state: RwLock::new(Collections::default()),
        }
    }

    /// Rewrite the named collection files from `state`.
    fn persist(&self, state: &mut Collections, collections: &[&str]) -> Result<()> {
        for &name in collections {
            state.present.insert(name.to_owned());
        }
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        for &name in collections {
            match name {
                CONVERSATIONS => write_collection(dir, name, &state.sorted_conversations())?,
                MESSAGES => write_collection(dir, name, &state.messages)?,
                USERS => write_collection(dir, name, &state.sorted_users())?,
                other => return Err(Error::Other(format!("unknown collection '{other}'"))),
            }
        }
        Ok(())
    }

    /// Run `mutate` against `state` and write the touched collections.
    ///
    /// If `mutate` or the write fails, the touched collections are put back
    /// as they were and the files are rewritten from them, so the caller's
    /// error leaves nothing behind (no listed message, no claimed key).
    fn transact<T>(
        &self,
        state: &mut Collections,
        collections: &[&str],
        mutate: impl FnOnce(&mut Collections) -> Result<T>,
    ) -> Result<T> {
        let snapshot = state.snapshot(collections);
        let result = mutate(state).and_then(|out| {
            self.persist(state, collections)?;
            Ok(out)
        });

        if let Err(e) = &result {
            tracing::warn!(error = %e, ?collections, "store write failed, rolling back");
            state.restore(snapshot);
            let present: Vec<&str> = collections
                .iter()
                .copied()
                .filter(|name| state.present.contains(*name))
                .collect();
            if let Err(e) = self.persist(state, &present) {
                tracing::error!(error = %e, "rewriting collections after rollback failed");
            }
        }
        result
    }
}

// ── file helpers ────────────────────────────────────────────────────

fn collection_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.json"))
}

fn read_collection<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<Option<Vec<T>>> {
    let path = collection_path(dir, name);
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(&path)?;
    let docs = serde_json::from_str(&raw)
        .map_err(|e| Error::Other(format!("parsing {}: {e}", path.display())))?;
    Ok(Some(docs))
}

fn write_collection<T: Serialize>(dir: &Path, name: &str, docs: &[T]) -> Result<()> {
    let path = collection_path(dir, name);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(docs)
        .map_err(|e| Error::Other(format!("serializing {name}: {e}")))?;
    std::fs::write(&tmp, json)?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(Error::Io(e));
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DocumentStore impl
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl DocumentStore for JsonDocumentStore {
    async fn ensure_schema(&self) -> Result<SchemaReport> {
        if let Some(dir) = &self.data_dir {
            std::fs::create_dir_all(dir)?;
        }

        let mut state = self.state.write();
        let missing: Vec<&str> = ALL_COLLECTIONS
            .into_iter()
            .filter(|name| !state.present.contains(*name))
            .collect();
        self.persist(&mut state, &missing)?;
        state.rebuild_indexes()?;

        let report = SchemaReport {
            collections_created: missing.iter().map(|s| s.to_string()).collect(),
            indexes: vec![
                IDX_MESSAGES_BY_CONVERSATION.into(),
                IDX_MESSAGES_IDEMPOTENCY_KEY.into(),
                IDX_CONVERSATIONS_BY_USER.into(),
                IDX_USERS_EMAIL.into(),
            ],
        };

        TraceEvent::SchemaEnsured {
            collections_created: report.collections_created.len(),
            indexes: report.indexes.len(),
        }
        .emit();

        Ok(report)
    }

    async fn ping(&self) -> Result<()> {
        match &self.data_dir {
            Some(dir) if !dir.is_dir() => Err(Error::Other(format!(
                "data dir {} is not accessible",
                dir.display()
            ))),
            _ => Ok(()),
        }
    }

    // ── conversations ──

    async fn insert_conversation(&self, conversation: Conversation) -> Result<Conversation> {
        conversation.validate()?;
        let mut state = self.state.write();
        self.transact(&mut state, &[CONVERSATIONS], |state| {
            state
                .idx
                .conversations_by_user
                .entry(conversation.user_id)
                .or_default()
                .push(conversation.id);
            state.conversations.insert(conversation.id, conversation.clone());
            Ok(())
        })?;
        Ok(conversation)
    }

    async fn find_conversation(&self, id: Uuid, user_id: Uuid) -> Result<Option<Conversation>> {
        Ok(self.state.read().owned_conversation(id, user_id).cloned())
    }

    async fn list_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let state = self.state.read();
        let mut convs: Vec<Conversation> = state
            .idx
            .conversations_by_user
            .get(&user_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.conversations.get(id).cloned())
            .collect();
        convs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(convs)
    }

    async fn update_conversation(
        &self,
        id: Uuid,
        user_id: Uuid,
        patch: ConversationPatch,
    ) -> Result<Option<Conversation>> {
        let mut state = self.state.write();
        let Some(current) = state.owned_conversation(id, user_id) else {
            return Ok(None);
        };

        let mut updated = current.clone();
        if let Some(title) = patch.title {
            updated.title = title;
        }
        if let Some(model) = patch.model {
            updated.model = model;
        }
        updated.updated_at = Utc::now();
        updated.validate()?;

        self.transact(&mut state, &[CONVERSATIONS], |state| {
            state.conversations.insert(id, updated.clone());
            Ok(())
        })?;
        Ok(Some(updated))
    }

    async fn set_conversation_title(&self, id: Uuid, user_id: Uuid, title: &str) -> Result<()> {
        let mut state = self.state.write();
        if state.owned_conversation(id, user_id).is_none() {
            return Err(Error::NotFound("Conversation".into()));
        }
        self.transact(&mut state, &[CONVERSATIONS], |state| {
            if let Some(conv) = state.conversations.get_mut(&id) {
                conv.title = title.to_owned();
                conv.updated_at = Utc::now();
            }
            Ok(())
        })
    }

    async fn delete_conversation(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let mut state = self.state.write();
        if state.owned_conversation(id, user_id).is_none() {
            return Ok(false);
        }

        // Messages go first so a failure here never strands them.
        let removed_messages = self.transact(&mut state, &[MESSAGES], |state| {
            let before = state.messages.len();
            state.messages.retain(|m| m.conversation_id != id);
            state.rebuild_indexes()?;
            Ok(before - state.messages.len())
        })?;

        self.transact(&mut state, &[CONVERSATIONS], |state| {
            state.conversations.remove(&id);
            if let Some(ids) = state.idx.conversations_by_user.get_mut(&user_id) {
                ids.retain(|c| *c != id);
            }
            Ok(())
        })?;

        tracing::debug!(
            conversation_id = %id,
            removed_messages,
            "conversation deleted"
        );
        Ok(true)
    }

    // ── messages ──

    async fn insert_message(&self, message: Message) -> Result<Message> {
        message.validate()?;
        let mut state = self.state.write();

        // Checked under the write lock, so a concurrent delete cannot
        // leave this message orphaned.
        if !state.conversations.contains_key(&message.conversation_id) {
            return Err(Error::NotFound("Conversation".into()));
        }
        if let Some(key) = &message.idempotency_key {
            if state.idx.idempotency_keys.contains_key(key) {
                return Err(Error::DuplicateKey {
                    index: IDX_MESSAGES_IDEMPOTENCY_KEY.into(),
                });
            }
        }

        self.transact(&mut state, &[MESSAGES, CONVERSATIONS], |state| {
            let pos = state.messages.len();
            state
                .idx
                .messages_by_conversation
                .entry(message.conversation_id)
                .or_default()
                .push(pos);
            if let Some(key) = &message.idempotency_key {
                state.idx.idempotency_keys.insert(key.clone(), message.id);
            }
            state.messages.push(message.clone());
            if let Some(conv) = state.conversations.get_mut(&message.conversation_id) {
                conv.updated_at = Utc::now();
            }
            Ok(())
        })?;

        TraceEvent::MessagePersisted {
            conversation_id: message.conversation_id.to_string(),
            message_id: message.id.to_string(),
            role: format!("{:?}", message.role).to_lowercase(),
            chars: message.content.chars().count(),
        }
        .emit();

        Ok(message)
    }

    async fn count_messages(&self, conversation_id: Uuid) -> Result<usize> {
        Ok(self
            .state
            .read()
            .idx
            .messages_by_conversation
            .get(&conversation_id)
            .map_or(0, Vec::len))
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let state = self.state.read();
        let mut msgs: Vec<Message> = state
            .idx
            .messages_by_conversation
            .get(&conversation_id)
            .into_iter()
            .flatten()
            .filter_map(|&pos| state.messages.get(pos).cloned())
            .collect();
        // Stable: equal timestamps keep insertion order.
        msgs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(msgs)
    }

    // ── users ──

    async fn insert_user(&self, user: User) -> Result<User> {
        user.validate()?;
        let mut state = self.state.write();
        if state.idx.user_emails.contains_key(&user.email) {
            return Err(Error::DuplicateKey {
                index: IDX_USERS_EMAIL.into(),
            });
        }
        self.transact(&mut state, &[USERS], |state| {
            state.idx.user_emails.insert(user.email.clone(), user.id);
            state.users.insert(user.id, user.clone());
            Ok(())
        })?;
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.state.read().users.get(&id).cloned())
    }

    async fn increment_usage(&self, user_id: Uuid, usage: Usage) -> Result<()> {
        let mut state = self.state.write();
        if !state.users.contains_key(&user_id) {
            tracing::warn!(user_id = %user_id, "usage for unknown user dropped");
            return Ok(());
        }
        self.transact(&mut state, &[USERS], |state| {
            if let Some(user) = state.users.get_mut(&user_id) {
                user.total_prompt_tokens += u64::from(usage.prompt_tokens);
                user.total_completion_tokens += u64::from(usage.completion_tokens);
                user.total_tokens_used += u64::from(usage.total_tokens);
                user.updated_at = Utc::now();
            }
            Ok(())
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
