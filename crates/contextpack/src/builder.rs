use sc_domain::chat::ChatMessage;
use sc_domain::error::Result;
use sc_domain::model::{Message, Role};

use crate::extract::AttachmentExtractor;

/// Delimited block appended to a user message for one attachment.
pub fn format_attachment_block(file_name: &str, content: &str) -> String {
    format!("\n\n[Attached file: {file_name}]\n{content}")
}

/// Build the completion context for a conversation history.
///
/// Messages keep their stored order and nothing is dropped. User messages
/// get one block per attachment that produced text; attachments with no
/// file (or no text) contribute nothing. Assistant messages pass through
/// verbatim and their attachments are ignored.
///
/// Fails only when an attachment reference tries to leave the upload root.
pub async fn build_context(
    messages: &[Message],
    extractor: &AttachmentExtractor,
) -> Result<Vec<ChatMessage>> {
    let mut out = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::User => {
                let mut content = msg.content.clone();
                for attachment in &msg.attachments {
                    if let Some(text) = extractor.extract(attachment).await? {
                        if !text.is_empty() {
                            content.push_str(&format_attachment_block(&attachment.file_name, &text));
                        }
                    }
                }
                out.push(ChatMessage::user(content));
            }
            Role::Assistant => out.push(ChatMessage::assistant(msg.content.clone())),
        }
    }

    Ok(out)
}
