//! Per-job event bus over Redis Pub/Sub with bounded replay history.
//!
//! Live delivery goes through the `events:<job_id>` channel; every publish is
//! also appended to the `event_history:<job_id>` list (capped, TTL-bound) so
//! late subscribers can replay what they missed. Subscribers deduplicate the
//! history/live overlap by `(type, timestamp)` and terminate after a
//! `complete` or `error` event.

use std::collections::HashSet;
use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use redis::AsyncCommands;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use fingraph_models::Event;

use crate::error::QueueResult;

const CHANNEL_PREFIX: &str = "events:";
const HISTORY_PREFIX: &str = "event_history:";

/// Maximum events kept in a job's history list.
pub const MAX_HISTORY: isize = 100;

/// Seconds a history list survives after its last write.
pub const HISTORY_TTL_SECS: i64 = 300;

fn channel_key(job_id: &str) -> String {
    format!("{}{}", CHANNEL_PREFIX, job_id)
}

fn history_key(job_id: &str) -> String {
    format!("{}{}", HISTORY_PREFIX, job_id)
}

/// Event bus client.
#[derive(Clone)]
pub struct EventBus {
    client: redis::Client,
}

impl EventBus {
    /// Create a new event bus.
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

    /// Publish an event for a job.
    ///
    /// The timestamp is stamped when absent. The history write happens first
    /// but a failure there never blocks the live publish; a failed live
    /// publish is logged and not retried (subscribers recover from history).
    pub async fn publish(&self, job_id: &str, mut event: Event) -> QueueResult<()> {
        event.ensure_timestamp();
        let payload = serde_json::to_string(&event)?;

        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let hkey = history_key(job_id);
        let history_write = redis::pipe()
            .rpush(&hkey, &payload)
            .ignore()
            .ltrim(&hkey, -MAX_HISTORY, -1)
            .ignore()
            .expire(&hkey, HISTORY_TTL_SECS)
            .ignore()
            .exec_async(&mut conn)
            .await;
        if let Err(e) = history_write {
            warn!(job_id, "Event history write failed: {}", e);
        }

        if let Err(e) = conn
            .publish::<_, _, ()>(channel_key(job_id), &payload)
            .await
        {
            warn!(job_id, "Live event publish failed: {}", e);
        }

        Ok(())
    }

    /// Publish a status event.
    pub async fn status(&self, job_id: &str, message: impl Into<String>) -> QueueResult<()> {
        self.publish(job_id, Event::status(message)).await
    }

    /// Publish an agent switch event.
    pub async fn agent_switch(
        &self,
        job_id: &str,
        agent: impl Into<String>,
        reason: impl Into<String>,
    ) -> QueueResult<()> {
        self.publish(job_id, Event::agent_switch(agent, reason)).await
    }

    /// Publish a tool call event.
    pub async fn tool_call(
        &self,
        job_id: &str,
        tool: impl Into<String>,
        server: impl Into<String>,
        args: Map<String, Value>,
    ) -> QueueResult<()> {
        self.publish(job_id, Event::tool_call(tool, server, args)).await
    }

    /// Publish a tool result event.
    pub async fn tool_result(
        &self,
        job_id: &str,
        tool: impl Into<String>,
        result: Value,
        duration_ms: i64,
    ) -> QueueResult<()> {
        self.publish(job_id, Event::tool_result(tool, result, duration_ms))
            .await
    }

    /// Publish a completion event.
    pub async fn complete(&self, job_id: &str, result: Value) -> QueueResult<()> {
        self.publish(job_id, Event::complete(result)).await
    }

    /// Publish an error event.
    pub async fn error(&self, job_id: &str, message: impl Into<String>) -> QueueResult<()> {
        self.publish(job_id, Event::error(message)).await
    }

    /// Current raw replay history for a job, oldest first.
    ///
    /// Entries that fail to parse are skipped.
    pub async fn history(&self, job_id: &str) -> QueueResult<Vec<Event>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Vec<String> = conn.lrange(history_key(job_id), 0, -1).await?;

        Ok(raw
            .iter()
            .filter_map(|json| serde_json::from_str(json).ok())
            .collect())
    }

    /// Subscribe to a job's events, replaying missed history first.
    ///
    /// The live channel is subscribed *before* history is read so no event
    /// can fall between the two. The stream yields each history entry, then
    /// live messages whose `(type, timestamp)` key was not already seen, and
    /// ends after a `complete` or `error` event (including one found in
    /// history).
    pub async fn subscribe(
        &self,
        job_id: &str,
    ) -> QueueResult<Pin<Box<dyn Stream<Item = Event> + Send>>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel_key(job_id)).await?;

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let history: Vec<String> = conn.lrange(history_key(job_id), 0, -1).await?;

        let job_id = job_id.to_string();
        let stream = async_stream::stream! {
            let mut seen: HashSet<String> = HashSet::new();

            for json in history {
                let Ok(event) = serde_json::from_str::<Event>(&json) else {
                    continue;
                };
                seen.insert(event.dedup_key());
                let terminal = event.is_terminal();
                yield event;
                if terminal {
                    debug!(job_id = %job_id, "Subscription ended from history replay");
                    return;
                }
            }

            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                let Ok(payload) = msg.get_payload::<String>() else {
                    continue;
                };
                let Ok(event) = serde_json::from_str::<Event>(&payload) else {
                    continue;
                };
                if !seen.insert(event.dedup_key()) {
                    continue;
                }
                let terminal = event.is_terminal();
                yield event;
                if terminal {
                    break;
                }
            }
            debug!(job_id = %job_id, "Subscription ended");
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_prefixes() {
        assert_eq!(channel_key("j1"), "events:j1");
        assert_eq!(history_key("j1"), "event_history:j1");
    }
}
