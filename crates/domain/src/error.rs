/// Shared error type used across all simplechat crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("validation: {0}")]
    Validation(String),

    /// The record does not exist, or exists but is not visible to the caller.
    #[error("{0} not found")]
    NotFound(String),

    /// A write violated a unique index in the document store.
    #[error("duplicate key on index '{index}'")]
    DuplicateKey { index: String },

    /// A send was retried with an idempotency key that was already used.
    #[error("duplicate message")]
    DuplicateSubmission,

    /// A stored file reference resolved outside the upload root.
    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
