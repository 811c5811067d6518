//! Redis integration tests for the job store and event bus.

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::json;

use fingraph_models::{Event, JobState, JobUpdate};
use fingraph_queue::{EventBus, JobStore};

fn unique_job_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Enqueue then pop preserves FIFO order and record visibility.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_enqueue_pop_cycle() {
    dotenvy::dotenv().ok();
    let store = JobStore::from_env().expect("Failed to create job store");

    let job = store
        .enqueue("hello", None)
        .await
        .expect("Failed to enqueue");
    assert_eq!(job.status, JobState::Queued);

    // The record must exist before the id is poppable.
    let fetched = store.get(&job.job_id).await.expect("get failed");
    assert!(fetched.is_some());

    let mut popped = None;
    // Other tests may be sharing the queue; drain until we find our id.
    for _ in 0..50 {
        match store
            .pop_blocking(Duration::from_secs(1))
            .await
            .expect("pop failed")
        {
            Some(id) if id == job.job_id => {
                popped = Some(id);
                break;
            }
            Some(_) => continue,
            None => break,
        }
    }
    assert_eq!(popped.as_deref(), Some(job.job_id.as_str()));
}

/// Updates merge fields and refuse to mutate terminal records.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_update_is_monotonic() {
    dotenvy::dotenv().ok();
    let store = JobStore::from_env().expect("Failed to create job store");

    let job = store.enqueue("q", None).await.expect("enqueue failed");

    store
        .update(&job.job_id, JobUpdate::processing())
        .await
        .expect("update failed");
    store
        .update(&job.job_id, JobUpdate::completed(json!({"response": "42"})))
        .await
        .expect("update failed");

    // A late failure report must not un-complete the job.
    store
        .update(&job.job_id, JobUpdate::failed("late error"))
        .await
        .expect("update failed");

    let job = store.get(&job.job_id).await.expect("get failed").unwrap();
    assert_eq!(job.status, JobState::Completed);
    assert!(job.error.is_none());
}

/// Publishing three events then subscribing replays exactly those three and
/// terminates on the terminal event.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_replay_then_terminate() {
    dotenvy::dotenv().ok();
    let bus = EventBus::from_env().expect("Failed to create bus");
    let job_id = unique_job_id();

    bus.status(&job_id, "working").await.expect("publish failed");
    bus.tool_call(&job_id, "arango_query", "arangodb", Default::default())
        .await
        .expect("publish failed");
    bus.complete(&job_id, json!({"response": "done"}))
        .await
        .expect("publish failed");

    let stream = bus.subscribe(&job_id).await.expect("subscribe failed");
    let events: Vec<Event> = tokio::time::timeout(Duration::from_secs(5), stream.collect())
        .await
        .expect("subscription did not terminate");

    let types: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
    assert_eq!(types, vec!["status", "tool_call", "complete"]);
}

/// A live duplicate with an identical (type, timestamp) key is yielded once.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_dedup_identical_events() {
    dotenvy::dotenv().ok();
    let bus = EventBus::from_env().expect("Failed to create bus");
    let job_id = unique_job_id();

    let subscriber = {
        let bus = bus.clone();
        let job_id = job_id.clone();
        tokio::spawn(async move {
            let stream = bus.subscribe(&job_id).await.expect("subscribe failed");
            tokio::time::timeout(Duration::from_secs(5), stream.collect::<Vec<Event>>())
                .await
                .expect("subscription did not terminate")
        })
    };

    // Give the subscriber time to attach to the channel.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut event = Event::tool_call("export_excel", "mcp", Default::default());
    event.ensure_timestamp();
    bus.publish(&job_id, event.clone()).await.expect("publish failed");
    bus.publish(&job_id, event).await.expect("publish failed");
    bus.complete(&job_id, json!(null)).await.expect("publish failed");

    let events = subscriber.await.expect("subscriber task failed");
    let tool_calls = events
        .iter()
        .filter(|e| e.event_type() == "tool_call")
        .count();
    assert_eq!(tool_calls, 1);
}

/// History is bounded at 100 entries.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_history_is_bounded() {
    dotenvy::dotenv().ok();
    let bus = EventBus::from_env().expect("Failed to create bus");
    let job_id = unique_job_id();

    for i in 0..120 {
        bus.status(&job_id, format!("step {i}"))
            .await
            .expect("publish failed");
    }

    let history = bus.history(&job_id).await.expect("history failed");
    assert_eq!(history.len(), 100);

    // Oldest entries were trimmed away.
    if let Event::Known(first) = &history[0] {
        let json = serde_json::to_value(first).unwrap();
        assert_eq!(json["message"], "step 20");
    } else {
        panic!("expected a known event");
    }
}

/// A late subscriber sees the same events as one present from the start.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_late_subscriber_replay() {
    dotenvy::dotenv().ok();
    let bus = EventBus::from_env().expect("Failed to create bus");
    let job_id = unique_job_id();

    bus.status(&job_id, "queued").await.expect("publish failed");
    bus.status(&job_id, "processing").await.expect("publish failed");

    let stream = bus.subscribe(&job_id).await.expect("subscribe failed");
    let collector = tokio::spawn(async move {
        tokio::time::timeout(Duration::from_secs(5), stream.collect::<Vec<Event>>())
            .await
            .expect("subscription did not terminate")
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    bus.error(&job_id, "boom").await.expect("publish failed");

    let events = collector.await.expect("collector task failed");
    let types: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
    assert_eq!(types, vec!["status", "status", "error"]);
}
