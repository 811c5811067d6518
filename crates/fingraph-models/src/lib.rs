//! Shared data models for the fingraph backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs and their lifecycle states
//! - Progress events streamed over the event bus
//! - Chats, transcripts and message metadata

pub mod chat;
pub mod event;
pub mod job;

// Re-export common types
pub use chat::{
    ChatMessage, ChatMetadata, ChatMetadataUpdate, ChatTranscript, MessageMetadata, MessageRole,
    ToolRecord,
};
pub use event::{Event, EventKind};
pub use job::{JobRecord, JobState, JobUpdate};
