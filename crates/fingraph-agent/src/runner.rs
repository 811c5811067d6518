//! Supervision of the agent CLI subprocess.

use std::process::Stdio;
use std::time::SystemTime;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use fingraph_models::ChatMessage;
use fingraph_queue::EventBus;

use crate::config::AgentConfig;
use crate::error::{RunnerError, RunnerResult};
use crate::prompt::build_prompt;
use crate::relocate::relocate_outputs;
use crate::scan::OutputScanner;

/// Lines of captured output included in a failure message.
const ERROR_TAIL_LINES: usize = 200;

/// Runs the agent CLI for a single job and relays its stream to the bus.
pub struct AgentRunner {
    config: AgentConfig,
    bus: EventBus,
}

impl AgentRunner {
    /// Create a new runner.
    pub fn new(config: AgentConfig, bus: EventBus) -> Self {
        Self { config, bus }
    }

    /// Create from environment variables.
    pub fn from_env(bus: EventBus) -> Self {
        Self::new(AgentConfig::from_env(), bus)
    }

    /// Run the agent for a query, streaming its events, and return the final
    /// result enriched with a `_metadata` block.
    pub async fn run(
        &self,
        job_id: &str,
        query: &str,
        history: &[ChatMessage],
    ) -> RunnerResult<Value> {
        let prompt = build_prompt(&self.config.config_dir, query, history);
        let run_started_at = SystemTime::now();

        self.bus
            .status(job_id, "Starting OpenCode processing...")
            .await
            .ok();

        let mut child = match self.spawn(job_id, prompt) {
            Ok(child) => child,
            Err(RunnerError::NotInstalled(program)) => {
                let err = RunnerError::NotInstalled(program);
                self.bus.error(job_id, err.to_string()).await.ok();
                return Err(err);
            }
            Err(e) => return Err(e),
        };

        // Merge stdout and stderr into a single ordered-enough line stream.
        let stdout = child.stdout.take().expect("stdout not captured");
        let stderr = child.stderr.take().expect("stderr not captured");
        let (tx, mut rx) = mpsc::channel::<String>(64);
        let stdout_task = tokio::spawn(forward_lines(stdout, tx.clone()));
        let stderr_task = tokio::spawn(forward_lines(stderr, tx));

        // Mirror the raw stream for debugging; failures only cost the trace.
        let trace_path = self.config.trace_dir.join(format!("{job_id}.jsonl"));
        let mut trace = match tokio::fs::create_dir_all(&self.config.trace_dir).await {
            Ok(()) => tokio::fs::File::create(&trace_path).await.ok(),
            Err(_) => None,
        };

        let mut scanner = OutputScanner::new(self.config.live_mcp_events);
        let mut all_output: Vec<String> = Vec::new();

        while let Some(line) = rx.recv().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            debug!(job_id = %job_id, "Agent output: {:.500}", line);
            all_output.push(line.to_string());

            if let Some(file) = trace.as_mut() {
                let write = async {
                    file.write_all(line.as_bytes()).await?;
                    file.write_all(b"\n").await?;
                    file.flush().await
                };
                if let Err(e) = write.await {
                    warn!(job_id = %job_id, "Trace write failed, disabling trace: {}", e);
                    trace = None;
                }
            }

            for event in scanner.scan_line(line) {
                if let Err(e) = self.bus.publish(job_id, event).await {
                    warn!(job_id = %job_id, "Failed to publish event: {}", e);
                }
            }
        }

        let status = child.wait().await?;
        let _ = tokio::join!(stdout_task, stderr_task);

        if !status.success() {
            let start = all_output.len().saturating_sub(ERROR_TAIL_LINES);
            let tail = all_output[start..].join("\n");
            return Err(RunnerError::Failed(if tail.is_empty() {
                "unknown error".to_string()
            } else {
                tail
            }));
        }

        let result = match scanner.final_result.take() {
            Some(result) => result,
            None if !all_output.is_empty() => json!({ "response": all_output.join("\n") }),
            None => json!({ "status": "completed", "output": all_output }),
        };
        // `_metadata` needs an object to attach to.
        let result = if result.is_object() {
            result
        } else {
            json!({ "response": result })
        };

        let config = self.config.clone();
        let (mut result, moved_files) = tokio::task::spawn_blocking(move || {
            let mut result = result;
            let moved = relocate_outputs(&config, &mut result, run_started_at);
            (result, moved)
        })
        .await?;

        result["_metadata"] = json!({
            "agents_used": scanner.ordered_agents(),
            "tools_called": scanner.tools_called,
            "moved_files": moved_files,
            "opencode_trace": trace_path.to_string_lossy(),
        });

        Ok(result)
    }

    fn spawn(&self, job_id: &str, prompt: String) -> RunnerResult<tokio::process::Child> {
        let mut args: Vec<String> = vec!["run".into(), "--format".into(), "json".into()];
        if let Some(agent) = &self.config.agent {
            args.push("--agent".into());
            args.push(agent.clone());
        }
        args.push(prompt);

        // Force line-buffered output when the helper is available so events
        // stream as they happen instead of in pipe-sized bursts.
        let (program, args) = if which::which("stdbuf").is_ok() {
            let mut wrapped = vec![
                "-oL".to_string(),
                "-eL".to_string(),
                self.config.program.clone(),
            ];
            wrapped.extend(args);
            ("stdbuf".to_string(), wrapped)
        } else {
            (self.config.program.clone(), args)
        };

        Command::new(&program)
            .args(&args)
            .env("OPENCODE_CONFIG_DIR", &self.config.config_dir)
            .env("OPENCODE_JOB_ID", job_id)
            .env("REDIS_URL", &self.config.redis_url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RunnerError::NotInstalled(self.config.program.clone())
                } else {
                    RunnerError::Io(e)
                }
            })
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).await.is_err() {
            break;
        }
    }
}
