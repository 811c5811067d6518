//! Job records for queue processing.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Job state in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job is waiting in queue
    #[default]
    Queued,
    /// Job is being processed by a worker
    Processing,
    /// Job completed successfully
    Completed,
    /// Job failed
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// A queued query execution unit.
///
/// Stored as JSON at `job:<job_id>`; the queue list holds only ids. State
/// transitions are monotonic: queued -> processing -> completed | failed.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobRecord {
    /// Unique job ID (UUIDv4, string encoded)
    pub job_id: String,

    /// The user's query text
    pub query: String,

    /// Optional chat providing conversation context
    pub chat_id: Option<String>,

    /// Current lifecycle state
    pub status: JobState,

    /// Result payload (opaque JSON, set on completion)
    pub result: Option<Value>,

    /// Error message (set on failure)
    pub error: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Create a new queued job for a query.
    pub fn new(query: impl Into<String>, chat_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4().to_string(),
            query: query.into(),
            chat_id,
            status: JobState::Queued,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge an update into the record, refreshing `updated_at`.
    pub fn apply(&mut self, update: JobUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(result) = update.result {
            self.result = Some(result);
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update applied to a job record.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobState>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl JobUpdate {
    /// Transition to processing.
    pub fn processing() -> Self {
        Self {
            status: Some(JobState::Processing),
            ..Default::default()
        }
    }

    /// Transition to completed with a result payload.
    pub fn completed(result: Value) -> Self {
        Self {
            status: Some(JobState::Completed),
            result: Some(result),
            error: None,
        }
    }

    /// Transition to failed with an error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobState::Failed),
            result: None,
            error: Some(error.into()),
        }
    }
}
