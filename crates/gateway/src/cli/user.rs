use anyhow::Context;

use sc_domain::config::Config;
use sc_domain::error::Error;
use sc_domain::model::User;
use sc_store::{DocumentStore, JsonDocumentStore};

/// Create a user record in the configured store and print its id.
pub async fn create(config: &Config, email: &str) -> anyhow::Result<()> {
    let store = JsonDocumentStore::open(&config.storage.data_dir)
        .with_context(|| format!("opening store at {}", config.storage.data_dir.display()))?;
    store.ensure_schema().await.context("ensuring store schema")?;

    let user = match store.insert_user(User::new(email.trim(), None)).await {
        Ok(u) => u,
        Err(Error::DuplicateKey { .. }) => anyhow::bail!("a user with email '{email}' already exists"),
        Err(e) => return Err(e).context("creating user"),
    };

    tracing::info!(user_id = %user.id, "user created");
    println!("{}", user.id);
    Ok(())
}
