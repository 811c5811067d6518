//! Chat store error types.

use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Chat not found: {0}")]
    NotFound(String),

    #[error("Graph store error: {0}")]
    Graph(#[from] fingraph_arango::ArangoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChatError {
    pub fn not_found(chat_id: impl Into<String>) -> Self {
        Self::NotFound(chat_id.into())
    }
}
