//! Prompt assembly for the agent CLI.

use std::path::Path;

use fingraph_models::{ChatMessage, MessageRole};

/// Messages of history included in the prompt.
const HISTORY_WINDOW: usize = 10;

/// Per-message content cap inside the history block.
const HISTORY_CONTENT_MAX_CHARS: usize = 500;

/// Build the full prompt: router instructions, recent chat history, then the
/// current query.
pub fn build_prompt(config_dir: &Path, query: &str, history: &[ChatMessage]) -> String {
    let mut router_instructions = std::fs::read_to_string(config_dir.join("agents/router.md"))
        .unwrap_or_default();
    if !router_instructions.trim().is_empty() {
        router_instructions = format!("{}\n\n", router_instructions.trim());
    } else {
        router_instructions.clear();
    }

    let history_context = format_history(history);

    format!(
        "{router_instructions}{history_context}Current Query:\n{query}\n\nReturn the delegated agent's response to the user."
    )
}

/// Format the last messages of a chat as context paragraphs.
fn format_history(messages: &[ChatMessage]) -> String {
    if messages.is_empty() {
        return String::new();
    }

    let start = messages.len().saturating_sub(HISTORY_WINDOW);
    let mut formatted = String::from("## Previous Conversation Context\n\n");

    for message in &messages[start..] {
        let role = match message.role {
            MessageRole::User => "User",
            MessageRole::System => "Assistant",
        };
        let content = if message.content.chars().count() > HISTORY_CONTENT_MAX_CHARS {
            let head: String = message
                .content
                .chars()
                .take(HISTORY_CONTENT_MAX_CHARS)
                .collect();
            format!("{head}...")
        } else {
            message.content.clone()
        };
        formatted.push_str(&format!("**{role}**: {content}\n\n"));
    }

    formatted.push_str("---\n\n");
    formatted
}
