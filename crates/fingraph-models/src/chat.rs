//! Chat metadata, transcripts and messages.
//!
//! A chat is stored in two places: a metadata document (keyed lookup and
//! ordered listing) and a transcript file holding the append-only message
//! log. Metadata may lag the transcript but never lead it.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::event::Event;

/// Chat metadata document.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChatMetadata {
    /// Chat ID (UUIDv4, string encoded)
    pub id: String,

    /// Display title
    pub title: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Number of messages in the transcript
    pub message_count: usize,

    /// Preview of the last message (at most 100 chars)
    pub last_message_preview: String,

    /// Union of agents used across all messages
    pub agents_used: Vec<String>,

    /// Path of the transcript file
    pub json_path: String,
}

/// Partial update applied to chat metadata.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ChatMetadataUpdate {
    pub title: Option<String>,
}

impl ChatMetadataUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
    }
}

/// The on-disk transcript file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTranscript {
    pub chat_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    System,
}

/// A single transcript entry. Appended only, never edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message ID; stamped on append when empty
    #[serde(default)]
    pub id: String,

    pub role: MessageRole,

    pub content: String,

    /// Stamped on append when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl ChatMessage {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            role: MessageRole::User,
            content: content.into(),
            timestamp: None,
            metadata: None,
        }
    }

    /// Create a system (assistant) message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            role: MessageRole::System,
            content: content.into(),
            timestamp: None,
            metadata: None,
        }
    }

    /// Attach execution metadata.
    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Fill in id and timestamp where absent.
    pub fn stamp(&mut self) {
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
        if self.timestamp.is_none() {
            self.timestamp = Some(Utc::now());
        }
    }
}

/// Execution metadata attached to a system message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default)]
    pub agents_used: Vec<String>,

    #[serde(default)]
    pub tools_called: Vec<ToolRecord>,

    /// Raw replay of the job's event history
    #[serde(default)]
    pub event_history: Vec<Event>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

/// One tool invocation observed during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRecord {
    pub tool: String,
    pub server: String,
    pub args: Map<String, Value>,
    pub agent: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_stamp() {
        let mut msg = ChatMessage::user("hello");
        assert!(msg.id.is_empty());
        msg.stamp();
        assert!(!msg.id.is_empty());
        assert!(msg.timestamp.is_some());

        // Stamping again keeps the original id
        let id = msg.id.clone();
        msg.stamp();
        assert_eq!(msg.id, id);
    }

    #[test]
    fn test_role_serialization() {
        let msg = ChatMessage::system("done");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"system\""));
    }

    #[test]
    fn test_transcript_round_trip() {
        let transcript = ChatTranscript {
            chat_id: "c1".into(),
            title: "Chat c1".into(),
            created_at: Utc::now(),
            messages: vec![ChatMessage::user("revenue of TCS FY24?")],
            settings: Map::new(),
        };
        let json = serde_json::to_string_pretty(&transcript).unwrap();
        let back: ChatTranscript = serde_json::from_str(&json).unwrap();
        assert_eq!(back.messages.len(), 1);
        assert_eq!(back.messages[0].role, MessageRole::User);
    }

    #[test]
    fn test_message_metadata_defaults() {
        let json = r#"{"id":"m1","role":"system","content":"x","metadata":{}}"#;
        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        let meta = msg.metadata.unwrap();
        assert!(meta.agents_used.is_empty());
        assert!(meta.tools_called.is_empty());
        assert!(meta.event_history.is_empty());
    }
}
