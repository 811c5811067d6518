//! Worker integration tests with a scripted fake agent CLI.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tempfile::TempDir;

use fingraph_agent::{AgentConfig, AgentRunner};
use fingraph_arango::ArangoClient;
use fingraph_chats::ChatStore;
use fingraph_models::JobState;
use fingraph_queue::{EventBus, JobStore};
use fingraph_worker::{QueueConsumer, WorkerConfig};

fn fake_agent(dir: &Path, script_body: &str) -> String {
    let path = dir.join("fake-agent.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{script_body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path.to_string_lossy().into_owned()
}

fn test_consumer(dir: &TempDir, script_body: &str) -> (QueueConsumer, JobStore, EventBus) {
    dotenvy::dotenv().ok();

    let jobs = JobStore::from_env().expect("Failed to create job store");
    let bus = EventBus::from_env().expect("Failed to create bus");
    let graph = ArangoClient::from_env().expect("Failed to create graph client");
    let chats = ChatStore::new(graph, dir.path().join("chats"));

    let out = dir.path().join("output");
    let runner_config = AgentConfig {
        program: fake_agent(dir.path(), script_body),
        agent: None,
        config_dir: dir.path().join("config"),
        output_root: out.clone(),
        exports_dir: out.join("exports"),
        citations_dir: out.join("citations"),
        trace_dir: out.join("opencode"),
        scan_dirs: vec![dir.path().join("scan")],
        redis_url: std::env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
        live_mcp_events: true,
    };
    let runner = AgentRunner::new(runner_config, bus.clone());

    let config = WorkerConfig {
        chats_dir: dir.path().join("chats"),
        ..WorkerConfig::default()
    };

    (
        QueueConsumer::new(config, jobs.clone(), bus.clone(), chats, runner),
        jobs,
        bus,
    )
}

/// A clean run completes the job with the parsed response.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_successful_job_completes() {
    let dir = TempDir::new().unwrap();
    let (consumer, jobs, bus) =
        test_consumer(&dir, r#"echo '{"type":"text","part":{"text":"42"}}'"#);

    let job = jobs.enqueue("hello", None).await.expect("enqueue failed");
    consumer.process_job(&job.job_id).await;

    let job = jobs.get(&job.job_id).await.expect("get failed").unwrap();
    assert_eq!(job.status, JobState::Completed);
    assert_eq!(job.result.unwrap()["response"], "42");
    assert!(job.updated_at > job.created_at);

    let history = bus.history(&job.job_id).await.expect("history failed");
    let types: Vec<&str> = history.iter().map(|e| e.event_type()).collect();
    assert!(types.contains(&"status"));
    assert!(types.contains(&"complete"));
}

/// A nonzero exit fails the job and publishes an error event.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_failing_job_is_marked_failed() {
    let dir = TempDir::new().unwrap();
    let (consumer, jobs, bus) = test_consumer(&dir, "echo boom\nexit 1");

    let job = jobs.enqueue("hello", None).await.expect("enqueue failed");
    consumer.process_job(&job.job_id).await;

    let job = jobs.get(&job.job_id).await.expect("get failed").unwrap();
    assert_eq!(job.status, JobState::Failed);
    assert!(job.error.unwrap().contains("boom"));

    let history = bus.history(&job.job_id).await.expect("history failed");
    assert!(history.iter().any(|e| e.event_type() == "error"));
}

/// A job with no record is skipped without marking anything.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_missing_job_is_skipped() {
    let dir = TempDir::new().unwrap();
    let (consumer, _, bus) = test_consumer(&dir, "echo unused");

    consumer.process_job("no-such-job").await;
    let history = bus.history("no-such-job").await.expect("history failed");
    assert!(history.is_empty());
}
