pub mod openai_compat;
pub mod traits;
pub(crate) mod sse;
pub mod util;

// Re-exports for convenience.
pub use openai_compat::OpenAiCompatClient;
pub use traits::{CompletionClient, CompletionRequest, CompletionStream};
