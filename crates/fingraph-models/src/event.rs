//! Progress events streamed over the event bus.
//!
//! Events are immutable once published. Known types are modeled as a
//! `type`-tagged enum; anything else is carried as a raw JSON map so that
//! unfamiliar event types flow through history and SSE relay unmodified.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single event for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Event {
    /// An event from the known vocabulary.
    Known(KnownEvent),
    /// An event of an unknown type, passed through untouched.
    Raw(Map<String, Value>),
}

/// Envelope for known events: the tagged payload plus the publish timestamp
/// (nanoseconds since epoch on the publisher's clock).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownEvent {
    #[serde(flatten)]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// The known event vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Status {
        message: String,
    },
    AgentSwitch {
        agent: String,
        reason: String,
    },
    ToolCall {
        tool: String,
        server: String,
        args: Map<String, Value>,
    },
    ToolResult {
        tool: String,
        result: Value,
        #[serde(default)]
        duration_ms: i64,
    },
    MetricFound {
        metric: Value,
    },
    AqlQuery {
        query: String,
        bind_vars: Map<String, Value>,
    },
    StepStart,
    Complete {
        result: Value,
    },
    Error {
        message: String,
    },
    Connected {
        job_id: String,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Status { .. } => "status",
            EventKind::AgentSwitch { .. } => "agent_switch",
            EventKind::ToolCall { .. } => "tool_call",
            EventKind::ToolResult { .. } => "tool_result",
            EventKind::MetricFound { .. } => "metric_found",
            EventKind::AqlQuery { .. } => "aql_query",
            EventKind::StepStart => "step_start",
            EventKind::Complete { .. } => "complete",
            EventKind::Error { .. } => "error",
            EventKind::Connected { .. } => "connected",
        }
    }
}

impl From<EventKind> for Event {
    fn from(kind: EventKind) -> Self {
        Event::Known(KnownEvent {
            kind,
            timestamp: None,
        })
    }
}

impl Event {
    /// Create a status event.
    pub fn status(message: impl Into<String>) -> Self {
        EventKind::Status {
            message: message.into(),
        }
        .into()
    }

    /// Create an agent switch event.
    pub fn agent_switch(agent: impl Into<String>, reason: impl Into<String>) -> Self {
        EventKind::AgentSwitch {
            agent: agent.into(),
            reason: reason.into(),
        }
        .into()
    }

    /// Create a tool call event.
    pub fn tool_call(
        tool: impl Into<String>,
        server: impl Into<String>,
        args: Map<String, Value>,
    ) -> Self {
        EventKind::ToolCall {
            tool: tool.into(),
            server: server.into(),
            args,
        }
        .into()
    }

    /// Create a tool result event.
    pub fn tool_result(tool: impl Into<String>, result: Value, duration_ms: i64) -> Self {
        EventKind::ToolResult {
            tool: tool.into(),
            result,
            duration_ms,
        }
        .into()
    }

    /// Create a metric found event.
    pub fn metric_found(metric: Value) -> Self {
        EventKind::MetricFound { metric }.into()
    }

    /// Create an AQL query event.
    pub fn aql_query(query: impl Into<String>, bind_vars: Map<String, Value>) -> Self {
        EventKind::AqlQuery {
            query: query.into(),
            bind_vars,
        }
        .into()
    }

    /// Create a step start event.
    pub fn step_start() -> Self {
        EventKind::StepStart.into()
    }

    /// Create a completion event carrying the final result.
    pub fn complete(result: Value) -> Self {
        EventKind::Complete { result }.into()
    }

    /// Create an error event.
    pub fn error(message: impl Into<String>) -> Self {
        EventKind::Error {
            message: message.into(),
        }
        .into()
    }

    /// Create the synthetic SSE handshake event.
    pub fn connected(job_id: impl Into<String>) -> Self {
        EventKind::Connected {
            job_id: job_id.into(),
        }
        .into()
    }

    /// The wire value of the `type` field (`"message"` when absent).
    pub fn event_type(&self) -> &str {
        match self {
            Event::Known(e) => e.kind.name(),
            Event::Raw(map) => map
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("message"),
        }
    }

    /// Publish timestamp in nanoseconds, if stamped.
    pub fn timestamp(&self) -> Option<i64> {
        match self {
            Event::Known(e) => e.timestamp,
            Event::Raw(map) => map.get("timestamp").and_then(Value::as_i64),
        }
    }

    /// Stamp the current time if no timestamp is present.
    pub fn ensure_timestamp(&mut self) {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        match self {
            Event::Known(e) => {
                e.timestamp.get_or_insert(now);
            }
            Event::Raw(map) => {
                map.entry("timestamp").or_insert_with(|| now.into());
            }
        }
    }

    /// Key used to filter history/live duplicates for a single subscriber.
    pub fn dedup_key(&self) -> String {
        match self.timestamp() {
            Some(ts) => format!("{}:{}", self.event_type(), ts),
            None => format!("{}:", self.event_type()),
        }
    }

    /// Whether this event terminates a subscription.
    pub fn is_terminal(&self) -> bool {
        matches!(self.event_type(), "complete" | "error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        let mut event = Event::status("Processing query...");
        event.ensure_timestamp();
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"status\""));
        assert!(json.contains("\"message\":\"Processing query...\""));
        assert!(json.contains("\"timestamp\":"));
    }

    #[test]
    fn test_round_trip_known() {
        let event = Event::tool_call("arango_query", "arangodb", Map::new());
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), "tool_call");
        assert_eq!(event, back);
    }

    #[test]
    fn test_unknown_type_passes_through() {
        let raw = r#"{"type":"heartbeat","n":3,"timestamp":17}"#;
        let event: Event = serde_json::from_str(raw).unwrap();
        assert!(matches!(event, Event::Raw(_)));
        assert_eq!(event.event_type(), "heartbeat");
        assert_eq!(event.timestamp(), Some(17));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["n"], 3);
    }

    #[test]
    fn test_dedup_key_uses_type_and_timestamp() {
        let mut a = Event::status("x");
        a.ensure_timestamp();
        let b = a.clone();
        assert_eq!(a.dedup_key(), b.dedup_key());

        let unstamped = Event::status("x");
        assert!(unstamped.dedup_key().ends_with(':'));
    }

    #[test]
    fn test_terminal_events() {
        assert!(Event::complete(Value::Null).is_terminal());
        assert!(Event::error("boom").is_terminal());
        assert!(!Event::status("working").is_terminal());

        let raw: Event = serde_json::from_str(r#"{"type":"complete"}"#).unwrap();
        assert!(raw.is_terminal());
    }

    #[test]
    fn test_ensure_timestamp_is_idempotent() {
        let mut event = Event::step_start();
        event.ensure_timestamp();
        let first = event.timestamp();
        event.ensure_timestamp();
        assert_eq!(event.timestamp(), first);
    }
}
