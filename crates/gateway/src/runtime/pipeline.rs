use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use sc_contextpack::{build_context, AttachmentExtractor};
use sc_domain::error::{Error, Result};
use sc_domain::model::{title_preview, Attachment, Message};
use sc_domain::stream::{BoxStream, StreamEvent, Usage};
use sc_domain::trace::TraceEvent;
use sc_providers::{CompletionClient, CompletionRequest};
use sc_store::{DocumentStore, IDX_MESSAGES_IDEMPOTENCY_KEY};
use tokio_util::sync::CancellationToken;


// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ChatEvent: what the transport relays
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One event of a send-message stream.
///
/// A stream carries any number of `Content` events followed by at most one
/// terminal `Done` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatEvent {
    /// A non-empty fragment of the assistant reply.
    Content { text: String },
    /// The reply finished (or was cancelled) and has been persisted.
    Done { usage: Option<Usage> },
    /// The upstream call failed. Nothing from this reply was persisted.
    Error { message: String },
}

impl ChatEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChatEvent::Content { .. })
    }
}

/// Input to a single send-message call.
#[derive(Debug, Clone)]
pub struct SendMessageInput {
    pub conversation_id: Uuid,
    /// Authenticated caller; used as the second half of the ownership check.
    pub user_id: Uuid,
    pub content: String,
    /// Model override. None = the conversation's stored model.
    pub model: Option<String>,
    pub attachments: Vec<Attachment>,
    pub idempotency_key: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MessagePipeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Orchestrates one user turn against the store and the completion client.
pub struct MessagePipeline {
    store: Arc<dyn DocumentStore>,
    client: Arc<dyn CompletionClient>,
    extractor: Arc<AttachmentExtractor>,
    title_max_chars: usize,
}

impl MessagePipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        client: Arc<dyn CompletionClient>,
        extractor: Arc<AttachmentExtractor>,
        title_max_chars: usize,
    ) -> Self {
        Self {
            store,
            client,
            extractor,
            title_max_chars,
        }
    }

    /// Persist the user message and start streaming the reply.
    ///
    /// Everything up to and including context assembly happens before this
    /// returns, so the caller gets a plain error for:
    /// - `NotFound` when the conversation is missing or owned by someone else
    /// - `DuplicateSubmission` when the idempotency key was already used
    /// - `AccessDenied` when a stored attachment escapes the upload root
    ///
    /// Upstream failures after that point arrive as a single
    /// [`ChatEvent::Error`] at the end of the returned stream.
    pub async fn send_message(
        &self,
        input: SendMessageInput,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, ChatEvent>> {
        // ── 1. Ownership ────────────────────────────────────────────
        let conversation = self
            .store
            .find_conversation(input.conversation_id, input.user_id)
            .await?
            .ok_or_else(|| Error::NotFound("Conversation".into()))?;

        // ── 2. User message ─────────────────────────────────────────
        let user_message = Message::user(
            conversation.id,
            input.content,
            input.attachments,
            input.idempotency_key,
        );
        let user_message = match self.store.insert_message(user_message).await {
            Ok(m) => m,
            Err(Error::DuplicateKey { index }) if index == IDX_MESSAGES_IDEMPOTENCY_KEY => {
                tracing::info!(
                    conversation_id = %conversation.id,
                    "duplicate submission rejected"
                );
                return Err(Error::DuplicateSubmission);
            }
            Err(e) => return Err(e),
        };

        // ── 3. Auto-title on the first message ──────────────────────
        if self.store.count_messages(conversation.id).await? == 1 {
            let title = title_preview(&user_message.content, self.title_max_chars);
            self.store
                .set_conversation_title(conversation.id, input.user_id, &title)
                .await?;
            TraceEvent::ConversationTitled {
                conversation_id: conversation.id.to_string(),
                title_chars: title.chars().count(),
            }
            .emit();
        }

        // ── 4. Context ──────────────────────────────────────────────
        let history = self.store.list_messages(conversation.id).await?;
        let context = build_context(&history, &self.extractor).await?;

        let model = input
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(conversation.model);

        let reply = ReplyStream {
            store: self.store.clone(),
            client: self.client.clone(),
            conversation_id: conversation.id,
            user_id: input.user_id,
            model,
            request_messages: context,
            cancel,
        };
        Ok(reply.into_events())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming, persistence and usage accounting
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ReplyStream {
    store: Arc<dyn DocumentStore>,
    client: Arc<dyn CompletionClient>,
    conversation_id: Uuid,
    user_id: Uuid,
    model: String,
    request_messages: Vec<sc_domain::chat::ChatMessage>,
    cancel: CancellationToken,
}

impl ReplyStream {
    fn into_events(self) -> BoxStream<'static, ChatEvent> {
        let ReplyStream {
            store,
            client,
            conversation_id,
            user_id,
            model,
            request_messages,
            cancel,
        } = self;

        let span = tracing::info_span!(
            "chat.stream",
            %conversation_id,
            model = %model,
            "otel.kind" = "CLIENT",
            prompt_tokens = tracing::field::Empty,
            completion_tokens = tracing::field::Empty,
        );

        Box::pin(async_stream::stream! {
            let started = Instant::now();
            TraceEvent::StreamStarted {
                conversation_id: conversation_id.to_string(),
                model: model.clone(),
                context_messages: request_messages.len(),
            }
            .emit();

            let request = CompletionRequest {
                model: model.clone(),
                messages: request_messages,
            };
            let mut upstream = match client
                .stream_completion(request)
                .instrument(span.clone())
                .await
            {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(
                        %conversation_id,
                        provider = client.provider_id(),
                        error = %e,
                        "completion request failed"
                    );
                    yield ChatEvent::Error { message: e.to_string() };
                    return;
                }
            };

            // ── consume ─────────────────────────────────────────────
            let mut text = String::new();
            let mut usage: Option<Usage> = None;
            let mut cancelled = false;
            let mut failure: Option<String> = None;

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        upstream.abort();
                        cancelled = true;
                        break;
                    }
                    next = upstream.next() => next,
                };

                match next {
                    None => break,
                    Some(Ok(StreamEvent::Token { text: delta })) => {
                        if delta.is_empty() {
                            continue;
                        }
                        text.push_str(&delta);
                        yield ChatEvent::Content { text: delta };
                    }
                    Some(Ok(StreamEvent::Done { usage: reported, .. })) => {
                        // Usage normally rides on the last chunk.
                        if reported.is_some() {
                            usage = reported;
                        }
                    }
                    Some(Ok(StreamEvent::Error { message })) => {
                        failure = Some(message);
                        break;
                    }
                    Some(Err(e)) => {
                        failure = Some(e.to_string());
                        break;
                    }
                }
            }

            let chars = text.chars().count();
            TraceEvent::StreamFinished {
                conversation_id: conversation_id.to_string(),
                model: model.clone(),
                chars,
                cancelled,
                duration_ms: started.elapsed().as_millis() as u64,
            }
            .emit();

            if let Some(message) = failure {
                tracing::warn!(
                    %conversation_id,
                    partial_chars = chars,
                    error = %message,
                    "upstream stream failed"
                );
                yield ChatEvent::Error { message };
                return;
            }

            if cancelled {
                tracing::info!(%conversation_id, partial_chars = chars, "stream cancelled");
            }

            // ── persist ─────────────────────────────────────────────
            if !text.is_empty() {
                let reply = Message::assistant(conversation_id, text, model.clone(), usage);
                if let Err(e) = store.insert_message(reply).instrument(span.clone()).await {
                    tracing::error!(%conversation_id, error = %e, "failed to persist assistant message");
                    yield ChatEvent::Error { message: e.to_string() };
                    return;
                }
            }

            // ── usage ───────────────────────────────────────────────
            if let Some(u) = usage {
                span.record("prompt_tokens", u.prompt_tokens);
                span.record("completion_tokens", u.completion_tokens);
                if let Err(e) = store.increment_usage(user_id, u).instrument(span.clone()).await {
                    tracing::error!(%user_id, error = %e, "failed to record token usage");
                    yield ChatEvent::Error { message: e.to_string() };
                    return;
                }
                TraceEvent::UsageRecorded {
                    user_id: user_id.to_string(),
                    prompt_tokens: u.prompt_tokens,
                    completion_tokens: u.completion_tokens,
                    total_tokens: u.total_tokens,
                }
                .emit();
            }

            yield ChatEvent::Done { usage };
        })
    }
}
