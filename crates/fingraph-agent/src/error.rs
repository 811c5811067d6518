//! Runner error types.

use thiserror::Error;

pub type RunnerResult<T> = Result<T, RunnerError>;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(
        "Agent CLI not installed. Install it in the worker image or ensure `{0}` is available on PATH."
    )]
    NotInstalled(String),

    #[error("Agent run failed: {0}")]
    Failed(String),

    #[error("Queue error: {0}")]
    Queue(#[from] fingraph_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
