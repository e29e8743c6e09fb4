use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events decoded from an upstream completion stream (provider-agnostic).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A text delta. Adapters never emit empty deltas.
    #[serde(rename = "token")]
    Token { text: String },

    /// A terminating chunk. Providers may send several (finish reason
    /// first, then a usage-only chunk), so consumers keep reading until
    /// the stream closes.
    #[serde(rename = "done")]
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },

    /// An in-band error reported by the provider.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Token usage for one completion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_serializes_camel_case() {
        let usage = Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        };
        let json = serde_json::to_string(&usage).unwrap();
        assert_eq!(
            json,
            r#"{"promptTokens":10,"completionTokens":5,"totalTokens":15}"#
        );
    }
}
