//! Chat store over ArangoDB metadata documents and transcript files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::warn;
use uuid::Uuid;

use fingraph_arango::ArangoClient;
use fingraph_models::{ChatMessage, ChatMetadata, ChatMetadataUpdate, ChatTranscript};

use crate::error::{ChatError, ChatResult};

const CHATS_COLLECTION: &str = "chats";
const TITLE_MAX_CHARS: usize = 50;
const PREVIEW_MAX_CHARS: usize = 100;

/// Chat store.
///
/// Appends to a single chat are serialized with a per-chat async mutex;
/// concurrent appends to different chats do not contend.
pub struct ChatStore {
    graph: ArangoClient,
    chats_dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ChatStore {
    /// Create a new chat store writing transcripts under `chats_dir`.
    pub fn new(graph: ArangoClient, chats_dir: impl Into<PathBuf>) -> Self {
        Self {
            graph,
            chats_dir: chats_dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Transcript file path for a chat.
    pub fn transcript_path(&self, chat_id: &str) -> PathBuf {
        self.chats_dir.join(format!("{chat_id}.json"))
    }

    fn lock_for(&self, chat_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(chat_id.to_string()).or_default())
    }

    /// Create a chat, optionally seeded with an initial user message.
    ///
    /// The transcript file is written first; if the metadata write fails the
    /// file is deleted again so the two stores never disagree about
    /// existence.
    pub async fn create(
        &self,
        title: Option<String>,
        initial_message: Option<String>,
    ) -> ChatResult<ChatMetadata> {
        let chat_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let title = title.unwrap_or_else(|| derive_title(initial_message.as_deref(), &chat_id));

        let mut messages = Vec::new();
        if let Some(content) = initial_message {
            let mut message = ChatMessage::user(content);
            message.stamp();
            messages.push(message);
        }

        let transcript = ChatTranscript {
            chat_id: chat_id.clone(),
            title: title.clone(),
            created_at: now,
            messages,
            settings: Map::new(),
        };

        let path = self.transcript_path(&chat_id);
        tokio::fs::create_dir_all(&self.chats_dir).await?;
        write_transcript(&path, &transcript).await?;

        let (message_count, last_message_preview, agents_used) = summarize(&transcript);
        let metadata = ChatMetadata {
            id: chat_id.clone(),
            title,
            created_at: now,
            updated_at: now,
            message_count,
            last_message_preview,
            agents_used,
            json_path: path.to_string_lossy().into_owned(),
        };

        let mut doc = serde_json::to_value(&metadata)?;
        doc["_key"] = json!(chat_id);
        if let Err(e) = self.graph.insert_document(CHATS_COLLECTION, &doc).await {
            // Compensating delete: a transcript without metadata is invisible.
            tokio::fs::remove_file(&path).await.ok();
            return Err(e.into());
        }

        Ok(metadata)
    }

    /// Fetch chat metadata.
    pub async fn get_metadata(&self, chat_id: &str) -> ChatResult<Option<ChatMetadata>> {
        let Some(doc) = self.graph.get_document(CHATS_COLLECTION, chat_id).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(doc)?))
    }

    /// Fetch metadata together with the transcript.
    ///
    /// Returns `None` when either the metadata document or the transcript
    /// file is missing.
    pub async fn get_content(
        &self,
        chat_id: &str,
    ) -> ChatResult<Option<(ChatMetadata, ChatTranscript)>> {
        let Some(metadata) = self.get_metadata(chat_id).await? else {
            return Ok(None);
        };

        let path = self.transcript_path(chat_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let transcript: ChatTranscript = serde_json::from_slice(&raw)?;
        Ok(Some((metadata, transcript)))
    }

    /// Append a message to a chat.
    ///
    /// Stamps the message id and timestamp when absent, recomputes the
    /// derived metadata fields, and writes the transcript before the
    /// metadata update.
    pub async fn append_message(
        &self,
        chat_id: &str,
        mut message: ChatMessage,
    ) -> ChatResult<ChatMetadata> {
        let lock = self.lock_for(chat_id);
        let _guard = lock.lock().await;

        let Some(mut metadata) = self.get_metadata(chat_id).await? else {
            return Err(ChatError::not_found(chat_id));
        };

        let path = self.transcript_path(chat_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ChatError::not_found(chat_id));
            }
            Err(e) => return Err(e.into()),
        };
        let mut transcript: ChatTranscript = serde_json::from_slice(&raw)?;

        message.stamp();
        transcript.messages.push(message);

        write_transcript(&path, &transcript).await?;

        let (message_count, last_message_preview, agents_used) = summarize(&transcript);
        let now = Utc::now();
        self.graph
            .patch_document(
                CHATS_COLLECTION,
                chat_id,
                &json!({
                    "message_count": message_count,
                    "last_message_preview": &last_message_preview,
                    "agents_used": &agents_used,
                    "updated_at": now,
                }),
            )
            .await?;

        metadata.message_count = message_count;
        metadata.last_message_preview = last_message_preview;
        metadata.agents_used = agents_used;
        metadata.updated_at = now;
        Ok(metadata)
    }

    /// List chats ordered by `updated_at` descending.
    pub async fn list(&self, skip: usize, limit: usize) -> ChatResult<Vec<ChatMetadata>> {
        let rows = self
            .graph
            .query(
                "FOR c IN chats SORT c.updated_at DESC LIMIT @skip, @limit RETURN c",
                json!({ "skip": skip, "limit": limit }),
            )
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|doc| match serde_json::from_value(doc) {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    warn!("Skipping malformed chat document: {}", e);
                    None
                }
            })
            .collect())
    }

    /// Total number of chats.
    pub async fn count(&self) -> ChatResult<usize> {
        let rows = self
            .graph
            .query(
                "FOR c IN chats COLLECT WITH COUNT INTO total RETURN total",
                json!({}),
            )
            .await?;

        Ok(rows
            .first()
            .and_then(Value::as_u64)
            .unwrap_or_default() as usize)
    }

    /// Apply a metadata update (currently the title).
    pub async fn update_metadata(
        &self,
        chat_id: &str,
        update: ChatMetadataUpdate,
    ) -> ChatResult<ChatMetadata> {
        let Some(mut metadata) = self.get_metadata(chat_id).await? else {
            return Err(ChatError::not_found(chat_id));
        };

        let now = Utc::now();
        if let Some(title) = update.title {
            metadata.title = title;
        }
        metadata.updated_at = now;

        self.graph
            .patch_document(
                CHATS_COLLECTION,
                chat_id,
                &json!({ "title": &metadata.title, "updated_at": now }),
            )
            .await?;

        Ok(metadata)
    }

    /// Delete a chat: both the transcript file and the metadata document.
    pub async fn delete(&self, chat_id: &str) -> ChatResult<()> {
        if self.get_metadata(chat_id).await?.is_none() {
            return Err(ChatError::not_found(chat_id));
        }

        tokio::fs::remove_file(self.transcript_path(chat_id))
            .await
            .ok();
        self.graph
            .delete_document(CHATS_COLLECTION, chat_id)
            .await?;
        Ok(())
    }

    /// Transcript messages for worker context.
    ///
    /// A missing or unreadable transcript degrades to an empty history.
    pub async fn history(&self, chat_id: &str) -> Vec<ChatMessage> {
        let path = self.transcript_path(chat_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(_) => {
                warn!(chat_id, "Chat transcript not found, using empty history");
                return Vec::new();
            }
        };

        match serde_json::from_slice::<ChatTranscript>(&raw) {
            Ok(transcript) => transcript.messages,
            Err(e) => {
                warn!(chat_id, "Failed to parse chat transcript: {}", e);
                Vec::new()
            }
        }
    }
}

async fn write_transcript(path: &Path, transcript: &ChatTranscript) -> ChatResult<()> {
    let json = serde_json::to_vec_pretty(transcript)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

/// Derived metadata fields: message count, last-message preview and the
/// order-preserving union of agents used across all messages.
fn summarize(transcript: &ChatTranscript) -> (usize, String, Vec<String>) {
    let preview = transcript
        .messages
        .last()
        .map(|m| truncate_chars(&m.content, PREVIEW_MAX_CHARS))
        .unwrap_or_default();

    let mut agents = Vec::new();
    for message in &transcript.messages {
        let Some(metadata) = &message.metadata else {
            continue;
        };
        for agent in &metadata.agents_used {
            if !agents.contains(agent) {
                agents.push(agent.clone());
            }
        }
    }

    (transcript.messages.len(), preview, agents)
}

fn derive_title(initial_message: Option<&str>, chat_id: &str) -> String {
    match initial_message {
        Some(message) if !message.is_empty() => {
            if message.chars().count() > TITLE_MAX_CHARS {
                let head: String = message.chars().take(TITLE_MAX_CHARS).collect();
                format!("{head}...")
            } else {
                message.to_string()
            }
        }
        _ => format!("Chat {}", &chat_id[..8.min(chat_id.len())]),
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
