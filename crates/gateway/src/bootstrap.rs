//! AppState construction extracted from `main.rs`.

use std::sync::Arc;

use anyhow::Context;
use sha2::{Digest, Sha256};

use sc_domain::config::{Config, ConfigSeverity};
use sc_providers::{CompletionClient, OpenAiCompatClient};
use sc_store::{DocumentStore, JsonDocumentStore};

use crate::state::AppState;

/// Validate config, open the store, build the completion client and return
/// a fully-wired [`AppState`].
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Document store ───────────────────────────────────────────────
    let store: Arc<dyn DocumentStore> = Arc::new(
        JsonDocumentStore::open(&config.storage.data_dir).with_context(|| {
            format!("opening document store at {}", config.storage.data_dir.display())
        })?,
    );
    let schema = store.ensure_schema().await.context("ensuring store schema")?;
    tracing::info!(
        data_dir = %config.storage.data_dir.display(),
        created = ?schema.collections_created,
        indexes = schema.indexes.len(),
        "document store ready"
    );

    // ── Upload root ──────────────────────────────────────────────────
    tokio::fs::create_dir_all(&config.uploads.dir)
        .await
        .with_context(|| format!("creating upload dir {}", config.uploads.dir.display()))?;
    tracing::info!(path = %config.uploads.dir.display(), "upload root ready");

    // ── Completion client ────────────────────────────────────────────
    let client: Arc<dyn CompletionClient> = Arc::new(
        OpenAiCompatClient::from_config(&config.llm).context("initializing completion client")?,
    );
    tracing::info!(
        base_url = %config.llm.base_url,
        default_model = %config.llm.default_model,
        provider = client.provider_id(),
        "completion client ready"
    );

    // ── API token (read once, hash for constant-time comparison) ────
    let api_token_hash = {
        let env_var = &config.server.api_token_env;
        match std::env::var(env_var).ok().filter(|t| !t.is_empty()) {
            Some(token) => {
                tracing::info!(source = %format!("env:{env_var}"), "API bearer-token auth enabled");
                Some(Sha256::digest(token.as_bytes()).to_vec())
            }
            None => {
                tracing::warn!(
                    "API bearer-token auth DISABLED: set the {env_var} env var to require a token"
                );
                None
            }
        }
    };

    Ok(AppState::new(config, store, client, api_token_hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_config_is_rejected_before_anything_opens() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.server.port = 0;
        config.storage.data_dir = dir.path().join("data");

        match build_app_state(Arc::new(config)).await {
            Ok(_) => panic!("expected validation failure"),
            Err(e) => assert!(e.to_string().contains("config validation failed")),
        }
        assert!(!dir.path().join("data").exists());
    }

    #[tokio::test]
    async fn missing_api_key_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().join("data");
        config.uploads.dir = dir.path().join("uploads");
        config.llm.auth.env = Some("SC_TEST_KEY_THAT_IS_NEVER_SET".into());

        match build_app_state(Arc::new(config)).await {
            Ok(_) => panic!("expected missing key error"),
            Err(e) => assert!(format!("{e:#}").contains("completion client")),
        }
        // The store was opened before the client failed.
        assert!(dir.path().join("data").join("messages.json").exists());
    }
}
