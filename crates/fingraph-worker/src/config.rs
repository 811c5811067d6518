//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory holding chat transcript files
    pub chats_dir: PathBuf,
    /// Blocking queue pop timeout (bounds shutdown latency)
    pub pop_timeout: Duration,
    /// Backoff after a lost queue connection
    pub reconnect_delay: Duration,
    /// Backoff after any other loop error
    pub error_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            chats_dir: PathBuf::from("chats"),
            pop_timeout: Duration::from_secs(1),
            reconnect_delay: Duration::from_secs(5),
            error_delay: Duration::from_secs(1),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            chats_dir: std::env::var("CHATS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("chats")),
            pop_timeout: Duration::from_secs(
                std::env::var("WORKER_POP_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1),
            ),
            reconnect_delay: Duration::from_secs(
                std::env::var("WORKER_RECONNECT_DELAY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            error_delay: Duration::from_secs(
                std::env::var("WORKER_ERROR_DELAY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1),
            ),
        }
    }
}
