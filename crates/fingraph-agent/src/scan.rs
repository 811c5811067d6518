//! Scanning of the agent CLI's streaming output.
//!
//! Each stdout line is inspected once: JSON lines are dispatched by their
//! `type` into bus events plus agent/tool bookkeeping, everything else is
//! relayed as status text. The scanner is pure — the runner publishes
//! whatever it returns.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Map, Value};

use fingraph_models::{Event, ToolRecord};

static TOOL_TRACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<tool_trace>(.*?)</tool_trace>").unwrap()
});

/// A non-JSON line longer than this is treated as a provisional response.
const STATUS_RESPONSE_MIN_LEN: usize = 50;

/// Stateful scanner over the agent's output stream.
#[derive(Debug)]
pub struct OutputScanner {
    live_mcp_events: bool,
    current_agent: Option<String>,
    processed_traces: HashSet<String>,
    /// Agents observed, in order of first activity (may repeat)
    pub agents_used: Vec<String>,
    /// Every tool invocation observed
    pub tools_called: Vec<ToolRecord>,
    /// Best candidate for the final result so far
    pub final_result: Option<Value>,
}

impl OutputScanner {
    pub fn new(live_mcp_events: bool) -> Self {
        Self {
            live_mcp_events,
            current_agent: None,
            processed_traces: HashSet::new(),
            agents_used: Vec::new(),
            tools_called: Vec::new(),
            final_result: None,
        }
    }

    /// Agents used, deduplicated while preserving first-seen order.
    pub fn ordered_agents(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.agents_used
            .iter()
            .filter(|a| seen.insert(a.as_str()))
            .cloned()
            .collect()
    }

    /// Scan one output line, returning the events to publish for it.
    pub fn scan_line(&mut self, line: &str) -> Vec<Event> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }

        let mut out = Vec::new();

        match serde_json::from_str::<Value>(line) {
            Ok(value) => {
                self.handle_event(&value, &mut out);
                self.capture_result(&value);
            }
            Err(_) => {
                // Non-JSON output; could be the actual response text.
                out.push(Event::status(line));
                if line.len() > STATUS_RESPONSE_MIN_LEN {
                    self.final_result = Some(json!({ "response": line }));
                }
            }
        }

        out
    }

    /// Track the final-result candidate across event shapes.
    fn capture_result(&mut self, event: &Value) {
        match event.get("type").and_then(Value::as_str) {
            Some("result") => {
                let result = event
                    .get("data")
                    .filter(|v| !v.is_null())
                    .or_else(|| event.get("content").filter(|v| !v.is_null()))
                    .cloned()
                    .unwrap_or_else(|| event.clone());
                self.final_result = Some(result);
            }
            Some("text") => {
                let part = event.get("part");
                let text = part
                    .and_then(|p| p.get("text"))
                    .or_else(|| event.get("text"))
                    .or_else(|| event.get("content"))
                    .and_then(Value::as_str);
                if let Some(text) = text {
                    self.final_result = Some(json!({ "response": text }));
                }
            }
            Some("message") => {
                let content = event
                    .get("content")
                    .or_else(|| event.get("text"))
                    .or_else(|| event.get("message"))
                    .and_then(Value::as_str);
                if let Some(content) = content {
                    self.final_result = Some(json!({ "response": content }));
                }
            }
            _ => {
                if let Some(response) = event.get("response").filter(|v| !v.is_null()) {
                    self.final_result = Some(json!({ "response": response }));
                }
            }
        }
    }

    fn handle_event(&mut self, event: &Value, out: &mut Vec<Event>) {
        match event.get("type").and_then(Value::as_str) {
            Some("agent_switch") => {
                let agent = event
                    .get("agent")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                let reason = event
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                out.push(Event::agent_switch(agent, reason));
                if !agent.is_empty() && agent != "unknown" {
                    self.agents_used.push(agent.to_string());
                    self.current_agent = Some(agent.to_string());
                }
            }
            Some("tool_use") => self.handle_tool_use(event, out),
            Some("tool_call") => self.handle_tool_call(event, out),
            Some("tool_result") => self.handle_tool_result(event, out),
            Some("status") => {
                let message = event
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                out.push(Event::status(message));
            }
            Some("error") => {
                let message = event
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown error");
                out.push(Event::error(message));
            }
            Some("step_start") => out.push(Event::step_start()),
            Some("text") | Some("message") | Some("result") => {
                let content = match event.get("type").and_then(Value::as_str) {
                    Some("text") => event
                        .get("part")
                        .and_then(|p| p.get("text"))
                        .or_else(|| event.get("text"))
                        .or_else(|| event.get("content")),
                    Some("message") => event
                        .get("content")
                        .or_else(|| event.get("text"))
                        .or_else(|| event.get("message")),
                    _ => event
                        .get("data")
                        .or_else(|| event.get("content"))
                        .or_else(|| event.get("result"))
                        .or(Some(event)),
                };

                let output_text = extract_output_text(content);
                if !output_text.is_empty() {
                    let agent = self.current_agent.clone().unwrap_or_else(|| "unknown".into());
                    self.scan_tool_trace(&output_text, &agent, out);
                }
            }
            // Other types (step_finish etc.) are noise for the UI; the final
            // result is captured separately.
            _ => {}
        }
    }

    /// `tool_use` events carry nested `part.tool` / `part.state` fields.
    fn handle_tool_use(&mut self, event: &Value, out: &mut Vec<Event>) {
        let part = event.get("part").cloned().unwrap_or_else(|| json!({}));
        let state = part.get("state").cloned().unwrap_or_else(|| json!({}));
        let tool = part
            .get("tool")
            .or_else(|| event.get("tool"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let input = state
            .get("input")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        // Internal agent delegation goes through the `task` tool.
        if tool == "task" {
            let subagent = input
                .get("subagent_type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if !subagent.is_empty() {
                let reason = input
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("Processing request");
                out.push(Event::agent_switch(subagent.as_str(), reason));
                self.agents_used.push(subagent.clone());
                self.current_agent = Some(subagent.clone());
            }

            let output_text = extract_output_text(
                state
                    .get("output")
                    .or_else(|| state.get("result"))
                    .or_else(|| part.get("output"))
                    .or_else(|| part.get("result"))
                    .or_else(|| event.get("output"))
                    .or_else(|| event.get("result")),
            );
            if !output_text.is_empty() {
                let agent = if subagent.is_empty() { "unknown".into() } else { subagent };
                self.scan_tool_trace(&output_text, &agent, out);
            }
            return;
        }

        let server = classify_server(&tool);
        let agent = part
            .get("agent")
            .or_else(|| event.get("agent"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.current_agent.clone())
            .unwrap_or_else(|| "unknown".into());

        out.push(Event::tool_call(tool.as_str(), server, input.clone()));
        self.tools_called.push(ToolRecord {
            tool: tool.clone(),
            server: server.to_string(),
            args: input.clone(),
            agent,
        });

        if tool.contains("execute-aql") || tool.to_lowercase().contains("aql") {
            let query = input
                .get("aql_query")
                .or_else(|| input.get("query"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let bind_vars = input
                .get("bind_vars")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            out.push(Event::aql_query(query, bind_vars));
        }

        let completed = state.get("status").and_then(Value::as_str) == Some("completed");
        if completed {
            if let Some(output) = state.get("output").filter(|v| !v.is_null()) {
                out.push(Event::tool_result(tool.as_str(), output.clone(), 0));
            }
        }
    }

    /// Flat `tool_call` events (already normalized by the child).
    fn handle_tool_call(&mut self, event: &Value, out: &mut Vec<Event>) {
        let tool = event
            .get("tool")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let server = event
            .get("server")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let args = event
            .get("args")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let agent = event
            .get("agent")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.current_agent.clone())
            .unwrap_or_else(|| "unknown".into());

        out.push(Event::tool_call(tool.as_str(), server.as_str(), args.clone()));
        self.tools_called.push(ToolRecord {
            tool: tool.clone(),
            server,
            args: args.clone(),
            agent,
        });

        if tool == "arango_query" {
            let query = args
                .get("query")
                .or_else(|| args.get("aql"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let bind_vars = args
                .get("bind_vars")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            out.push(Event::aql_query(query, bind_vars));
        }
    }

    fn handle_tool_result(&mut self, event: &Value, out: &mut Vec<Event>) {
        let tool = event
            .get("tool")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let result = event.get("result").cloned().unwrap_or(Value::Null);
        let duration_ms = event
            .get("duration_ms")
            .and_then(Value::as_i64)
            .unwrap_or_default();

        out.push(Event::tool_result(tool.as_str(), result.clone(), duration_ms));

        if tool == "task" {
            let output_text = extract_output_text(
                event
                    .get("result")
                    .filter(|v| !v.is_null())
                    .or_else(|| event.get("output"))
                    .or_else(|| event.get("content")),
            );
            if !output_text.is_empty() {
                self.scan_tool_trace(&output_text, "task", out);
            }
        }

        // A result shaped like a metric surfaces as its own event.
        if result.get("metric_name").is_some() {
            out.push(Event::metric_found(result));
        }
    }

    /// Extract tool usage embedded in sub-agent output as a
    /// `<tool_trace>` JSON array. The same raw trace is ingested only once.
    fn scan_tool_trace(&mut self, output: &str, agent: &str, out: &mut Vec<Event>) {
        let Some(captures) = TOOL_TRACE_RE.captures(output) else {
            return;
        };
        let raw_trace = captures.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        if raw_trace.is_empty() || self.processed_traces.contains(raw_trace) {
            return;
        }
        self.processed_traces.insert(raw_trace.to_string());

        let Ok(Value::Array(tools)) = serde_json::from_str::<Value>(raw_trace) else {
            return;
        };

        for tool_entry in tools {
            let tool = tool_entry
                .get("tool")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();

            let args: Map<String, Value> = match tool_entry.get("args").and_then(Value::as_object) {
                Some(args) => args.clone(),
                None => tool_entry
                    .as_object()
                    .map(|obj| {
                        obj.iter()
                            .filter(|(k, _)| !matches!(k.as_str(), "tool" | "result" | "result_count"))
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect()
                    })
                    .unwrap_or_default(),
            };

            let server = classify_server(&tool);
            // Live MCP events were already streamed by the child itself;
            // re-publishing them from the trace would duplicate the feed.
            let skip_publish = self.live_mcp_events && server == "mcp";

            if !skip_publish {
                out.push(Event::tool_call(tool.as_str(), server, args.clone()));
            }

            self.tools_called.push(ToolRecord {
                tool: tool.clone(),
                server: server.to_string(),
                args: args.clone(),
                agent: if agent.is_empty() { "unknown".into() } else { agent.to_string() },
            });

            if let Some(query) = args.get("query").and_then(Value::as_str) {
                if !query.is_empty() {
                    let bind_vars = args
                        .get("bind_vars")
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default();
                    out.push(Event::aql_query(query, bind_vars));
                }
            }

            let has_result = tool_entry.get("result").is_some_and(|v| !v.is_null())
                || tool_entry.get("result_count").is_some_and(|v| !v.is_null());
            if !skip_publish && has_result {
                out.push(Event::tool_result(
                    tool.as_str(),
                    json!({
                        "result": tool_entry.get("result").cloned().unwrap_or(Value::Null),
                        "count": tool_entry.get("result_count").cloned().unwrap_or(Value::Null),
                    }),
                    0,
                ));
            }
        }
    }
}

fn classify_server(tool: &str) -> &'static str {
    if tool.to_lowercase().contains("arango") {
        "arangodb"
    } else {
        "mcp"
    }
}

/// Pull displayable text out of an arbitrary output payload.
fn extract_output_text(output: Option<&Value>) -> String {
    let Some(output) = output else {
        return String::new();
    };
    match output {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(obj) => {
            for key in ["output", "content", "text", "response", "message", "result", "data"] {
                if let Some(Value::String(s)) = obj.get(key) {
                    if !s.trim().is_empty() {
                        return s.clone();
                    }
                }
            }
            serde_json::to_string(output).unwrap_or_default()
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(events: &[Event]) -> Vec<&str> {
        events.iter().map(|e| e.event_type()).collect()
    }

    #[test]
    fn test_text_event_sets_final_result() {
        let mut scanner = OutputScanner::new(true);
        let events = scanner.scan_line(r#"{"type":"text","part":{"text":"42"}}"#);
        assert!(events.is_empty());
        assert_eq!(scanner.final_result, Some(json!({"response": "42"})));
    }

    #[test]
    fn test_non_json_line_becomes_status() {
        let mut scanner = OutputScanner::new(true);
        let events = scanner.scan_line("warming up");
        assert_eq!(types(&events), vec!["status"]);
        assert!(scanner.final_result.is_none());

        let long = "The FY24 consolidated revenue of the company was Rs 2,40,893 crore.";
        scanner.scan_line(long);
        assert_eq!(scanner.final_result, Some(json!({"response": long})));
    }

    #[test]
    fn test_agent_switch_tracks_agent() {
        let mut scanner = OutputScanner::new(true);
        let events =
            scanner.scan_line(r#"{"type":"agent_switch","agent":"metric-extractor","reason":"metrics"}"#);
        assert_eq!(types(&events), vec!["agent_switch"]);
        assert_eq!(scanner.agents_used, vec!["metric-extractor"]);
    }

    #[test]
    fn test_tool_use_classifies_server_and_publishes_aql() {
        let mut scanner = OutputScanner::new(true);
        let line = r#"{"type":"tool_use","part":{"tool":"arango_execute-aql","state":{"input":{"aql_query":"FOR c IN companies RETURN c","bind_vars":{}},"status":"completed","output":{"rows":4}}}}"#;
        let events = scanner.scan_line(line);
        assert_eq!(types(&events), vec!["tool_call", "aql_query", "tool_result"]);

        assert_eq!(scanner.tools_called.len(), 1);
        let record = &scanner.tools_called[0];
        assert_eq!(record.server, "arangodb");
        assert_eq!(record.tool, "arango_execute-aql");
    }

    #[test]
    fn test_task_tool_switches_to_subagent() {
        let mut scanner = OutputScanner::new(true);
        let line = r#"{"type":"tool_use","part":{"tool":"task","state":{"input":{"subagent_type":"pdf-reader","description":"read the filing"}}}}"#;
        let events = scanner.scan_line(line);
        assert_eq!(types(&events), vec!["agent_switch"]);
        assert_eq!(scanner.agents_used, vec!["pdf-reader"]);
        // No tool_call is recorded for the delegation itself
        assert!(scanner.tools_called.is_empty());
    }

    #[test]
    fn test_tool_trace_extraction_and_dedup() {
        let mut scanner = OutputScanner::new(false);
        let trace = r#"<tool_trace>[{"tool":"vector_search","args":{"query":"revenue"},"result_count":3}]</tool_trace>"#;
        let line = format!(
            r#"{{"type":"tool_use","part":{{"tool":"task","state":{{"input":{{"subagent_type":"pdf-reader"}},"output":"done {trace}"}}}}}}"#
        );

        let events = scanner.scan_line(&line);
        // The "query" arg also surfaces as an aql_query event, matching the
        // live stream's behavior for traced tools.
        assert_eq!(
            types(&events),
            vec!["agent_switch", "tool_call", "aql_query", "tool_result"]
        );
        assert_eq!(scanner.tools_called.len(), 1);
        assert_eq!(scanner.tools_called[0].agent, "pdf-reader");

        // The same raw trace embedded in a later event is not re-ingested.
        let events = scanner.scan_line(&format!(
            r#"{{"type":"text","part":{{"text":"summary {trace}"}}}}"#
        ));
        assert!(events.is_empty());
        assert_eq!(scanner.tools_called.len(), 1);
    }

    #[test]
    fn test_tool_trace_live_mcp_suppression() {
        let mut scanner = OutputScanner::new(true);
        let line = r#"{"type":"text","part":{"text":"<tool_trace>[{\"tool\":\"vector_search\",\"args\":{\"query\":\"x\"}}]</tool_trace>"}}"#;
        let events = scanner.scan_line(line);

        // MCP tool events stream live, so the trace publishes nothing...
        assert!(types(&events).iter().all(|t| *t != "tool_call"));
        // ...but the invocation is still recorded for metadata.
        assert_eq!(scanner.tools_called.len(), 1);
        assert_eq!(scanner.tools_called[0].server, "mcp");
    }

    #[test]
    fn test_tool_result_with_metric() {
        let mut scanner = OutputScanner::new(true);
        let line = r#"{"type":"tool_result","tool":"extract_metric","result":{"metric_name":"revenue","value":1000},"duration_ms":12}"#;
        let events = scanner.scan_line(line);
        assert_eq!(types(&events), vec!["tool_result", "metric_found"]);
    }

    #[test]
    fn test_flat_tool_call_arango_query() {
        let mut scanner = OutputScanner::new(true);
        let line = r#"{"type":"tool_call","tool":"arango_query","server":"arangodb","args":{"query":"RETURN 1","bind_vars":{}}}"#;
        let events = scanner.scan_line(line);
        assert_eq!(types(&events), vec!["tool_call", "aql_query"]);
    }

    #[test]
    fn test_status_error_step_start_passthrough() {
        let mut scanner = OutputScanner::new(true);
        assert_eq!(
            types(&scanner.scan_line(r#"{"type":"status","message":"thinking"}"#)),
            vec!["status"]
        );
        assert_eq!(
            types(&scanner.scan_line(r#"{"type":"error","message":"bad"}"#)),
            vec!["error"]
        );
        assert_eq!(
            types(&scanner.scan_line(r#"{"type":"step_start"}"#)),
            vec!["step_start"]
        );
    }

    #[test]
    fn test_result_event_captures_data() {
        let mut scanner = OutputScanner::new(true);
        scanner.scan_line(r#"{"type":"result","data":{"response":"final answer"}}"#);
        assert_eq!(
            scanner.final_result,
            Some(json!({"response": "final answer"}))
        );
    }

    #[test]
    fn test_ordered_agents_dedup() {
        let mut scanner = OutputScanner::new(true);
        scanner.agents_used = vec!["a".into(), "b".into(), "a".into(), "c".into()];
        assert_eq!(scanner.ordered_agents(), vec!["a", "b", "c"]);
    }
}
