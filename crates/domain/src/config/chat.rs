use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat pipeline limits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Wall-clock limit on one streamed response.
    #[serde(default = "d_300")]
    pub stream_timeout_secs: u64,
    /// Length of the auto-generated title before `...` is appended.
    #[serde(default = "d_50")]
    pub title_max_chars: usize,
    #[serde(default = "d_10000")]
    pub max_message_chars: usize,
    /// Longer `idempotency-key` header values are ignored.
    #[serde(default = "d_64")]
    pub idempotency_key_max_len: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            stream_timeout_secs: 300,
            title_max_chars: 50,
            max_message_chars: 10_000,
            idempotency_key_max_len: 64,
        }
    }
}

fn d_300() -> u64 {
    300
}
fn d_50() -> usize {
    50
}
fn d_10000() -> usize {
    10_000
}
fn d_64() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_section_keeps_other_defaults() {
        let cfg: ChatConfig = toml::from_str("stream_timeout_secs = 30").unwrap();
        assert_eq!(cfg.stream_timeout_secs, 30);
        assert_eq!(cfg.title_max_chars, 50);
        assert_eq!(cfg.max_message_chars, 10_000);
        assert_eq!(cfg.idempotency_key_max_len, 64);
    }
}
