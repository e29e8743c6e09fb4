use std::sync::Arc;

use sc_contextpack::AttachmentExtractor;
use sc_domain::config::Config;
use sc_providers::CompletionClient;
use sc_store::DocumentStore;

use crate::runtime::MessagePipeline;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub store: Arc<dyn DocumentStore>,
    pub pipeline: Arc<MessagePipeline>,

    // ── Security ──────────────────────────────────────────────────────
    /// SHA-256 of the API bearer token. None = auth disabled (dev mode).
    pub api_token_hash: Option<Vec<u8>>,
}

impl AppState {
    /// Wire the pipeline from its collaborators.
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn DocumentStore>,
        client: Arc<dyn CompletionClient>,
        api_token_hash: Option<Vec<u8>>,
    ) -> Self {
        let extractor = Arc::new(AttachmentExtractor::new(config.uploads.dir.clone()));
        let pipeline = Arc::new(MessagePipeline::new(
            store.clone(),
            client,
            extractor,
            config.chat.title_max_chars,
        ));
        Self {
            config,
            store,
            pipeline,
            api_token_hash,
        }
    }
}
