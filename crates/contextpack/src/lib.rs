//! Conversation context assembly: attachment extraction and the
//! role/content list handed to the completion client.

pub mod builder;
pub mod extract;

pub use builder::build_context;
pub use extract::{resolve_upload_path, AttachmentExtractor};
