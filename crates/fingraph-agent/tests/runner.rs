//! Runner integration tests using a scripted fake agent CLI.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use fingraph_agent::{AgentConfig, AgentRunner, RunnerError};
use fingraph_queue::EventBus;

fn fake_agent(dir: &Path, script_body: &str) -> PathBuf {
    let path = dir.join("fake-agent.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{script_body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn test_config(dir: &TempDir, program: &Path) -> AgentConfig {
    let out = dir.path().join("output");
    AgentConfig {
        program: program.to_string_lossy().into_owned(),
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
    }
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_text_event_becomes_result() {
    dotenvy::dotenv().ok();
    let dir = TempDir::new().unwrap();
    let script = fake_agent(dir.path(), r#"echo '{"type":"text","part":{"text":"42"}}'"#);

    let bus = EventBus::from_env().expect("Failed to create bus");
    let runner = AgentRunner::new(test_config(&dir, &script), bus);

    let result = runner
        .run("test-job-text", "meaning of life?", &[])
        .await
        .expect("run failed");

    assert_eq!(result["response"], "42");
    let metadata = &result["_metadata"];
    assert!(metadata["agents_used"].as_array().unwrap().is_empty());
    assert!(metadata["opencode_trace"]
        .as_str()
        .unwrap()
        .ends_with("test-job-text.jsonl"));
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_nonzero_exit_carries_output_tail() {
    dotenvy::dotenv().ok();
    let dir = TempDir::new().unwrap();
    let script = fake_agent(dir.path(), "echo boom\nexit 1");

    let bus = EventBus::from_env().expect("Failed to create bus");
    let runner = AgentRunner::new(test_config(&dir, &script), bus);

    let err = runner.run("test-job-fail", "q", &[]).await.unwrap_err();
    match err {
        RunnerError::Failed(tail) => assert!(tail.contains("boom")),
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_agent_and_tool_tracking() {
    dotenvy::dotenv().ok();
    let dir = TempDir::new().unwrap();
    let script = fake_agent(
        dir.path(),
        r#"echo '{"type":"agent_switch","agent":"metric-extractor","reason":"metrics"}'
echo '{"type":"tool_use","part":{"tool":"arango_query","state":{"input":{"query":"RETURN 1"},"status":"completed","output":{"rows":1}}}}'
echo '{"type":"text","part":{"text":"done"}}'"#,
    );

    let bus = EventBus::from_env().expect("Failed to create bus");
    let runner = AgentRunner::new(test_config(&dir, &script), bus.clone());

    let result = runner
        .run("test-job-tools", "q", &[])
        .await
        .expect("run failed");

    let metadata = &result["_metadata"];
    assert_eq!(metadata["agents_used"][0], "metric-extractor");
    assert_eq!(metadata["tools_called"][0]["server"], "arangodb");

    // Everything the scanner emitted landed in the replay history.
    let history = bus.history("test-job-tools").await.expect("history failed");
    let types: Vec<&str> = history.iter().map(|e| e.event_type()).collect();
    assert!(types.contains(&"agent_switch"));
    assert!(types.contains(&"tool_call"));
    assert!(types.contains(&"aql_query"));
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_missing_binary_is_reported() {
    dotenvy::dotenv().ok();
    let dir = TempDir::new().unwrap();

    let mut config = test_config(&dir, Path::new("/nonexistent/agent-binary"));
    config.program = "/nonexistent/agent-binary".into();

    let bus = EventBus::from_env().expect("Failed to create bus");
    let runner = AgentRunner::new(config, bus);

    let err = runner.run("test-job-missing", "q", &[]).await.unwrap_err();
    // Without stdbuf the spawn itself fails; with it, stdbuf exits nonzero
    // complaining about the missing command. Both must fail the run.
    match err {
        RunnerError::NotInstalled(_) => {}
        RunnerError::Failed(tail) => assert!(tail.contains("agent-binary")),
        other => panic!("expected a spawn failure, got {other:?}"),
    }
}
