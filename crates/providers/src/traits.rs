use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio_util::sync::CancellationToken;

use sc_domain::chat::ChatMessage;
use sc_domain::error::Result;
use sc_domain::stream::{BoxStream, StreamEvent};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A streaming chat completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model identifier, passed through to the provider unchanged.
    pub model: String,
    /// Full conversation context, oldest first.
    pub messages: Vec<ChatMessage>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Abortable stream
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An in-flight completion.
///
/// Yields `StreamEvent::Token` for every non-empty content delta and
/// `StreamEvent::Done` when the provider reports completion or usage.
/// [`CompletionStream::abort`] terminates the upstream request: the
/// abort token is cancelled and the underlying response is dropped, so
/// no further events are produced.
pub struct CompletionStream {
    inner: Option<BoxStream<'static, Result<StreamEvent>>>,
    abort: CancellationToken,
}

impl CompletionStream {
    pub fn new(inner: BoxStream<'static, Result<StreamEvent>>) -> Self {
        Self::with_abort_token(inner, CancellationToken::new())
    }

    /// Wrap a stream whose producer also watches `abort`.
    pub fn with_abort_token(
        inner: BoxStream<'static, Result<StreamEvent>>,
        abort: CancellationToken,
    ) -> Self {
        Self {
            inner: Some(inner),
            abort,
        }
    }

    /// A handle that observes (or triggers) the abort.
    pub fn abort_handle(&self) -> CancellationToken {
        self.abort.clone()
    }

    pub fn abort(&mut self) {
        self.abort.cancel();
        self.inner = None;
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }
}

impl Stream for CompletionStream {
    type Item = Result<StreamEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.abort.is_cancelled() {
            this.inner = None;
        }
        match this.inner.as_mut() {
            Some(inner) => inner.as_mut().poll_next(cx),
            None => Poll::Ready(None),
        }
    }
}

impl std::fmt::Debug for CompletionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionStream")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core client trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A chat completion backend that can stream its answer.
#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    /// Open a streaming completion. Errors here mean nothing was streamed.
    async fn stream_completion(&self, req: CompletionRequest) -> Result<CompletionStream>;

    /// A short identifier used in logs and error messages.
    fn provider_id(&self) -> &str;
}
