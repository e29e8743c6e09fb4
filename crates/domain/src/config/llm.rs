use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Completion provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The OpenAI-compatible endpoint every conversation streams from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Model used for new conversations when the request names none.
    #[serde(default = "d_default_model")]
    pub default_model: String,
    /// Connect timeout only; streams themselves are bounded by
    /// `chat.stream_timeout_secs`.
    #[serde(default = "d_10000u")]
    pub connect_timeout_ms: u64,
    /// Sent as `HTTP-Referer` for provider attribution.
    #[serde(default)]
    pub referer: Option<String>,
    /// Sent as `X-Title`.
    #[serde(default = "d_app_title")]
    pub app_title: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            auth: AuthConfig::default(),
            default_model: d_default_model(),
            connect_timeout_ms: 10_000,
            referer: None,
            app_title: d_app_title(),
        }
    }
}

/// Where the provider API key comes from. Resolution order: `key`, then
/// the OS keychain (`service` + `account`), then `env`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Direct key (for config-only setups; prefer env or keychain).
    #[serde(default)]
    pub key: Option<String>,
    /// Env var containing the key.
    #[serde(default = "d_key_env")]
    pub env: Option<String>,
    /// Keychain service name (e.g., "simplechat").
    #[serde(default)]
    pub service: Option<String>,
    /// Keychain account name (e.g., "openrouter-api-key").
    #[serde(default)]
    pub account: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            key: None,
            env: d_key_env(),
            service: None,
            account: None,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn d_default_model() -> String {
    "openrouter/free".into()
}
fn d_10000u() -> u64 {
    10_000
}
fn d_app_title() -> String {
    "Simple Chat".into()
}
fn d_key_env() -> Option<String> {
    Some("OPENROUTER_API_KEY".into())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
