use serde::Serialize;

/// Structured trace events emitted across the simplechat crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SchemaEnsured {
        collections_created: usize,
        indexes: usize,
    },
    MessagePersisted {
        conversation_id: String,
        message_id: String,
        role: String,
        chars: usize,
    },
    ConversationTitled {
        conversation_id: String,
        title_chars: usize,
    },
    AttachmentExtracted {
        file_name: String,
        kind: String,
        chars: usize,
    },
    TraversalBlocked {
        reference: String,
    },
    StreamStarted {
        conversation_id: String,
        model: String,
        context_messages: usize,
    },
    StreamFinished {
        conversation_id: String,
        model: String,
        chars: usize,
        cancelled: bool,
        duration_ms: u64,
    },
    UsageRecorded {
        user_id: String,
        prompt_tokens: u32,
        completion_tokens: u32,
        total_tokens: u32,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sc_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_event_tag() {
        let ev = TraceEvent::TraversalBlocked {
            reference: "../etc/passwd".into(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], "TraversalBlocked");
        assert_eq!(json["reference"], "../etc/passwd");
    }
}
