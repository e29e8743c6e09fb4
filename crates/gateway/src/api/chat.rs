//! Send-message endpoint: relays the pipeline's events as an SSE stream.
//!
//! Wire framing (one `data:` line per frame):
//! - `{"content":"..."}` per delta
//! - `{"usage":{...}}` then `[DONE]` on success (`[DONE]` alone without usage)
//! - `{"error":"..."}` on failure, with no `[DONE]` after it

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures_core::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use sc_domain::model::Attachment;
use sc_domain::stream::BoxStream;

use crate::api::auth::AuthUser;
use crate::api::conversations::parse_id;
use crate::api::error::{ApiError, ApiResult};
use crate::runtime::{ChatEvent, SendMessageInput};
use crate::state::AppState;

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

const DONE_MARKER: &str = "[DONE]";
const STREAM_TIMEOUT_MESSAGE: &str = "Stream timeout";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageBody {
    pub content: String,
    /// Model override. Falls back to the conversation's model.
    #[serde(default)]
    pub model: Option<String>,
    /// Files already placed under the upload root by the upload service.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Read the optional idempotency header. Oversized or non-ASCII values are
/// ignored rather than forwarded.
pub fn idempotency_key(headers: &HeaderMap, max_len: usize) -> Option<String> {
    let raw = headers.get(IDEMPOTENCY_HEADER)?.to_str().ok()?;
    if raw.is_empty() || raw.len() > max_len {
        if !raw.is_empty() {
            tracing::debug!(len = raw.len(), max_len, "ignoring oversized idempotency key");
        }
        return None;
    }
    Some(raw.to_string())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Framing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The `data:` payloads for one pipeline event, in write order.
pub fn encode_event(event: &ChatEvent) -> Vec<String> {
    match event {
        ChatEvent::Content { text } => vec![serde_json::json!({ "content": text }).to_string()],
        ChatEvent::Done { usage } => {
            let mut frames = Vec::with_capacity(2);
            if let Some(usage) = usage {
                frames.push(serde_json::json!({ "usage": usage }).to_string());
            }
            frames.push(DONE_MARKER.to_string());
            frames
        }
        ChatEvent::Error { message } => vec![error_payload(message)],
    }
}

fn error_payload(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

/// A payload as it appears on the wire.
pub fn frame(payload: &str) -> String {
    format!("data: {payload}\n\n")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/conversations/:id/messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Start a turn and stream the reply.
///
/// Ownership, duplicate-key and traversal failures are answered with a
/// plain JSON error before the stream opens.
pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<SendMessageBody>,
) -> ApiResult<Response> {
    let conversation_id = parse_id(&id)?;
    let chat = &state.config.chat;

    let chars = body.content.chars().count();
    if chars == 0 || chars > chat.max_message_chars {
        return Err(ApiError::bad_request(format!(
            "content must be between 1 and {} characters",
            chat.max_message_chars
        )));
    }

    let key = idempotency_key(&headers, chat.idempotency_key_max_len);
    tracing::info!(
        %conversation_id,
        model = body.model.as_deref().unwrap_or("default"),
        attachments = body.attachments.len(),
        idempotent = key.is_some(),
        "starting SSE stream"
    );

    let cancel = CancellationToken::new();
    let input = SendMessageInput {
        conversation_id,
        user_id,
        content: body.content,
        model: body.model,
        attachments: body.attachments,
        idempotency_key: key,
    };
    let events = state.pipeline.send_message(input, cancel.clone()).await?;

    let (tx, rx) = mpsc::channel::<Event>(64);
    let timeout = Duration::from_secs(chat.stream_timeout_secs);
    let span = tracing::info_span!("sse.relay", %conversation_id);
    tokio::spawn(tracing::Instrument::instrument(
        relay(events, tx, cancel.clone(), timeout),
        span,
    ));

    let sse = Sse::new(sse_body(rx, cancel.drop_guard())).keep_alive(KeepAlive::default());
    let stream_headers = [
        (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        (header::CONNECTION, HeaderValue::from_static("keep-alive")),
        (
            header::HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        ),
    ];
    Ok((stream_headers, sse).into_response())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Relay
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Forward pipeline events to the response channel until the pipeline ends.
///
/// Dropping `tx` is what ends the response, and it happens exactly once:
/// after the last event, after the timeout frame, or when the client has
/// gone away. The pipeline is always drained to the end so that partial
/// replies are persisted even after a disconnect or timeout.
///
/// The deadline bounds both waiting on the pipeline and waiting on a
/// client that has stopped reading.
pub(crate) async fn relay(
    mut events: BoxStream<'static, ChatEvent>,
    tx: mpsc::Sender<Event>,
    cancel: CancellationToken,
    timeout: Duration,
) {
    let deadline = Instant::now() + timeout;
    let mut tx = Some(tx);

    loop {
        let next = if tx.is_some() {
            match tokio::time::timeout_at(deadline, events.next()).await {
                Ok(next) => next,
                Err(_) => {
                    expire(&mut tx, &cancel, timeout);
                    continue;
                }
            }
        } else {
            events.next().await
        };

        let Some(event) = next else { break };
        let Some(sender) = tx.as_ref() else { continue };

        let frames = encode_event(&event);
        match tokio::time::timeout_at(deadline, send_frames(sender, &frames)).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("client went away, cancelling stream");
                tx = None;
                cancel.cancel();
            }
            Err(_) => expire(&mut tx, &cancel, timeout),
        }
    }
    tracing::debug!("relay finished");
}

/// Write the timeout frame if there is room, end the response and cancel
/// the turn.
fn expire(tx: &mut Option<mpsc::Sender<Event>>, cancel: &CancellationToken, timeout: Duration) {
    tracing::warn!(timeout_secs = timeout.as_secs(), "stream timeout");
    if let Some(sender) = tx.take() {
        let frame = Event::default().data(error_payload(STREAM_TIMEOUT_MESSAGE));
        if sender.try_send(frame).is_err() {
            tracing::debug!("timeout frame dropped, client is not reading");
        }
    }
    cancel.cancel();
}

async fn send_frames(tx: &mpsc::Sender<Event>, payloads: &[String]) -> bool {
    for payload in payloads {
        if tx.send(Event::default().data(payload)).await.is_err() {
            return false;
        }
    }
    true
}

/// Response body. Holds the drop guard, so a disconnect cancels the turn.
fn sse_body(
    mut rx: mpsc::Receiver<Event>,
    guard: DropGuard,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let _guard = guard;
        while let Some(event) = rx.recv().await {
            yield Ok(event);
        }
    }
}
