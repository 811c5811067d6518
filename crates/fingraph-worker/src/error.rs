//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Queue error: {0}")]
    Queue(#[from] fingraph_queue::QueueError),

    #[error("Chat error: {0}")]
    Chat(#[from] fingraph_chats::ChatError),

    #[error("Runner error: {0}")]
    Runner(#[from] fingraph_agent::RunnerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
