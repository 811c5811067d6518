//! Durable job store: keyed records plus a FIFO queue of job ids.

use std::time::Duration;

use redis::AsyncCommands;
use tracing::{debug, warn};

use fingraph_models::{JobRecord, JobUpdate};

use crate::error::QueueResult;

const QUEUE_KEY: &str = "job_queue";
const JOB_KEY_PREFIX: &str = "job:";

fn job_key(job_id: &str) -> String {
    format!("{}{}", JOB_KEY_PREFIX, job_id)
}

/// Job store client.
///
/// The record write always precedes the queue push so a worker popping an id
/// can rely on the record being present.
#[derive(Clone)]
pub struct JobStore {
    client: redis::Client,
}

impl JobStore {
    /// Create a new job store.
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Create from the `REDIS_URL` environment variable.
    pub fn from_env() -> QueueResult<Self> {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        Self::new(&redis_url)
    }

    /// Enqueue a new job and return its record.
    pub async fn enqueue(&self, query: &str, chat_id: Option<&str>) -> QueueResult<JobRecord> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let job = JobRecord::new(query, chat_id.map(str::to_string));
        let payload = serde_json::to_string(&job)?;

        // Record first, then the queue push, so a pop always finds the record.
        conn.set::<_, _, ()>(job_key(&job.job_id), payload).await?;
        conn.rpush::<_, _, ()>(QUEUE_KEY, &job.job_id).await?;

        debug!(job_id = %job.job_id, "Enqueued job");
        Ok(job)
    }

    /// Fetch a job record.
    pub async fn get(&self, job_id: &str) -> QueueResult<Option<JobRecord>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload: Option<String> = conn.get(job_key(job_id)).await?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Merge an update into a job record, refreshing `updated_at`.
    ///
    /// Terminal records are left untouched; state transitions are monotonic
    /// along queued -> processing -> completed | failed.
    pub async fn update(&self, job_id: &str, update: JobUpdate) -> QueueResult<()> {
        let Some(mut job) = self.get(job_id).await? else {
            warn!(job_id, "Update for unknown job ignored");
            return Ok(());
        };

        if job.status.is_terminal() {
            warn!(job_id, status = job.status.as_str(), "Update for terminal job ignored");
            return Ok(());
        }

        job.apply(update);

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(&job)?;
        conn.set::<_, _, ()>(job_key(job_id), payload).await?;
        Ok(())
    }

    /// Blocking dequeue from the head of the queue.
    ///
    /// Returns `None` when the timeout elapses so the worker loop can check
    /// its shutdown signal between pops.
    pub async fn pop_blocking(&self, timeout: Duration) -> QueueResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let popped: Option<(String, String)> =
            conn.blpop(QUEUE_KEY, timeout.as_secs_f64()).await?;
        Ok(popped.map(|(_, job_id)| job_id))
    }

    /// Number of jobs waiting in the queue.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.llen(QUEUE_KEY).await?;
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_key() {
        assert_eq!(job_key("abc"), "job:abc");
    }
}
