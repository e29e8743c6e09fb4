//! OpenAI-compatible streaming adapter.
//!
//! Targets OpenRouter by default, and works with any endpoint that follows
//! the OpenAI chat completions contract (OpenAI, Ollama, vLLM, LM Studio).

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::traits::{CompletionClient, CompletionRequest, CompletionStream};
use crate::util::{from_reqwest, resolve_api_key};
use sc_domain::config::LlmConfig;
use sc_domain::error::{Error, Result};
use sc_domain::stream::{StreamEvent, Usage};

const PROVIDER_ID: &str = "openai_compat";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Streaming completion client for an OpenAI-compatible endpoint.
pub struct OpenAiCompatClient {
    base_url: String,
    api_key: String,
    referer: Option<String>,
    app_title: String,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Build a client from `[llm]` config, resolving the API key.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = resolve_api_key(&cfg.auth)?;

        // Connect timeout only: a whole-request timeout would cut off long
        // streams. The stream itself is bounded by the transport.
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_millis(cfg.connect_timeout_ms))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            referer: cfg.referer.clone(),
            app_title: cfg.app_title.clone(),
            client,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .header("X-Title", &self.app_title);
        if let Some(referer) = &self.referer {
            builder = builder.header("HTTP-Referer", referer);
        }
        builder
    }
}

/// Streaming request body. Usage is requested via `stream_options`.
pub(crate) fn build_chat_body(req: &CompletionRequest) -> Value {
    let messages: Vec<Value> = req
        .messages
        .iter()
        .map(|m| {
            serde_json::json!({
                "role": m.role.as_str(),
                "content": m.content,
            })
        })
        .collect();

    serde_json::json!({
        "model": req.model,
        "messages": messages,
        "stream": true,
        "stream_options": {"include_usage": true},
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_openai_usage(v: &Value) -> Option<Usage> {
    let field = |name: &str| u32::try_from(v.get(name)?.as_u64()?).ok();
    Some(Usage {
        prompt_tokens: field("prompt_tokens")?,
        completion_tokens: field("completion_tokens")?,
        total_tokens: field("total_tokens")?,
    })
}

/// Pull a readable message out of an error body, falling back to the raw
/// text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE streaming helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events for one `data:` payload, in order: the text delta (if any),
/// then a `Done` when the chunk carries usage or a finish reason.
///
/// Usage is kept whatever else the chunk holds. OpenRouter sends it on a
/// final chunk that still has a choice with an empty delta and a null
/// finish reason.
fn parse_sse_data_vec(data: &str) -> Vec<Result<StreamEvent>> {
    if data.trim() == "[DONE]" {
        return vec![Ok(StreamEvent::Done {
            usage: None,
            finish_reason: Some("stop".into()),
        })];
    }

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };

    // Mid-stream error object (the HTTP status is already 200 by then).
    if let Some(err) = v.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("upstream error")
            .to_string();
        return vec![Err(Error::Provider {
            provider: PROVIDER_ID.into(),
            message,
        })];
    }

    let usage = v.get("usage").and_then(parse_openai_usage);
    let choice = v
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first());

    let text = choice
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|t| t.as_str())
        .unwrap_or("");
    let finish_reason = choice
        .and_then(|c| c.get("finish_reason"))
        .and_then(|f| f.as_str())
        .map(String::from);

    let mut events = Vec::with_capacity(2);
    if !text.is_empty() {
        events.push(Ok(StreamEvent::Token {
            text: text.to_string(),
        }));
    }
    if usage.is_some() || finish_reason.is_some() {
        events.push(Ok(StreamEvent::Done {
            usage,
            finish_reason,
        }));
    }
    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl CompletionClient for OpenAiCompatClient {
    async fn stream_completion(&self, req: CompletionRequest) -> Result<CompletionStream> {
        let url = self.chat_url();
        let body = build_chat_body(&req);

        tracing::debug!(
            provider = PROVIDER_ID,
            url = %url,
            model = %req.model,
            messages = req.messages.len(),
            "completion stream request"
        );

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.map_err(from_reqwest)?;
            return Err(Error::Provider {
                provider: PROVIDER_ID.into(),
                message: format!("HTTP {} - {}", status.as_u16(), error_message(&err_text)),
            });
        }

        let abort = CancellationToken::new();
        let inner = crate::sse::sse_response_stream(resp, abort.clone(), parse_sse_data_vec);
        Ok(CompletionStream::with_abort_token(inner, abort))
    }

    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
