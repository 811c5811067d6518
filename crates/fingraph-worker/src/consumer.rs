//! The queue consumer loop.

use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, warn};

use fingraph_agent::AgentRunner;
use fingraph_chats::ChatStore;
use fingraph_models::{ChatMessage, JobUpdate, MessageMetadata, ToolRecord};
use fingraph_queue::{EventBus, JobStore};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;

/// Metadata block the runner attaches to its result.
#[derive(Debug, Default, Deserialize)]
struct RunMetadata {
    #[serde(default)]
    agents_used: Vec<String>,
    #[serde(default)]
    tools_called: Vec<ToolRecord>,
}

/// Consumes jobs from the queue, one at a time, until shutdown.
pub struct QueueConsumer {
    config: WorkerConfig,
    jobs: JobStore,
    bus: EventBus,
    chats: ChatStore,
    runner: AgentRunner,
    shutdown: tokio::sync::watch::Sender<bool>,
}

impl QueueConsumer {
    /// Create a new consumer.
    pub fn new(
        config: WorkerConfig,
        jobs: JobStore,
        bus: EventBus,
        chats: ChatStore,
        runner: AgentRunner,
    ) -> Self {
        let (shutdown, _) = tokio::sync::watch::channel(false);
        Self {
            config,
            jobs,
            bus,
            chats,
            runner,
            shutdown,
        }
    }

    /// Signal shutdown. The in-flight job, if any, is finished first.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Main consumer loop.
    ///
    /// The pop timeout bounds how long a shutdown signal waits; a popped id
    /// is always fully processed before the flag is checked again.
    pub async fn run(&self) -> WorkerResult<()> {
        info!("Queue consumer started, waiting for jobs...");

        let shutdown_rx = self.shutdown.subscribe();

        while !*shutdown_rx.borrow() {
            match self.jobs.pop_blocking(self.config.pop_timeout).await {
                Ok(Some(job_id)) => {
                    info!(job_id = %job_id, "Dequeued job");
                    self.process_job(&job_id).await;
                }
                Ok(None) => {}
                Err(e) if e.is_connection() => {
                    error!("Queue connection error: {}", e);
                    tokio::time::sleep(self.config.reconnect_delay).await;
                }
                Err(e) => {
                    error!("Unexpected queue error: {}", e);
                    tokio::time::sleep(self.config.error_delay).await;
                }
            }
        }

        info!("Queue consumer stopped");
        Ok(())
    }

    /// Process a single job end to end.
    ///
    /// Never propagates: runner failures mark the job failed and publish an
    /// `error` event, everything else is logged.
    pub async fn process_job(&self, job_id: &str) {
        let job = match self.jobs.get(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                error!(job_id, "Job not found");
                return;
            }
            Err(e) => {
                error!(job_id, "Failed to load job: {}", e);
                return;
            }
        };

        info!(
            job_id,
            chat_id = job.chat_id.as_deref().unwrap_or(""),
            "Processing job: {:.100}",
            job.query
        );

        if let Err(e) = self.jobs.update(job_id, JobUpdate::processing()).await {
            error!(job_id, "Failed to mark job processing: {}", e);
        }
        self.bus.status(job_id, "Processing query...").await.ok();

        let history = match &job.chat_id {
            Some(chat_id) => self.chats.history(chat_id).await,
            None => Vec::new(),
        };

        match self.runner.run(job_id, &job.query, &history).await {
            Ok(mut result) => {
                let metadata = result
                    .as_object_mut()
                    .and_then(|obj| obj.remove("_metadata"))
                    .map(|value| serde_json::from_value(value).unwrap_or_default())
                    .unwrap_or_else(RunMetadata::default);

                if let Err(e) = self
                    .jobs
                    .update(job_id, JobUpdate::completed(result.clone()))
                    .await
                {
                    error!(job_id, "Failed to mark job completed: {}", e);
                }
                self.bus.complete(job_id, result.clone()).await.ok();

                let agents = metadata.agents_used.clone();
                if let Some(chat_id) = &job.chat_id {
                    self.save_response(chat_id, job_id, &result, metadata).await;
                }

                info!(job_id, agents = ?agents, "Job completed successfully");
            }
            Err(e) => {
                let message = e.to_string();
                error!(job_id, "Job failed: {}", message);

                if let Err(e) = self.jobs.update(job_id, JobUpdate::failed(message.clone())).await {
                    error!(job_id, "Failed to mark job failed: {}", e);
                }
                self.bus.error(job_id, message).await.ok();
            }
        }
    }

    /// Append the system response to the chat transcript.
    ///
    /// The event history is drained from the bus for consistent post-stream
    /// rendering; a drain failure degrades to an empty history rather than
    /// failing the job.
    async fn save_response(
        &self,
        chat_id: &str,
        job_id: &str,
        result: &Value,
        metadata: RunMetadata,
    ) {
        let response_text = extract_response_text(result);

        let event_history = match self.bus.history(job_id).await {
            Ok(history) => history,
            Err(e) => {
                warn!(job_id, "Failed to load event history: {}", e);
                Vec::new()
            }
        };

        let mut message = ChatMessage::system(response_text).with_metadata(MessageMetadata {
            agents_used: metadata.agents_used.clone(),
            tools_called: metadata.tools_called,
            event_history,
            job_id: Some(job_id.to_string()),
        });
        message.id = format!("msg_{job_id}");

        match self.chats.append_message(chat_id, message).await {
            Ok(_) => info!(
                chat_id,
                job_id,
                agents = ?metadata.agents_used,
                "Saved response to chat"
            ),
            Err(e) => error!(chat_id, job_id, "Failed to save response to chat: {}", e),
        }
    }
}

/// The display text of a result payload.
fn extract_response_text(result: &Value) -> String {
    result
        .get("response")
        .or_else(|| result.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| result.to_string())
}
