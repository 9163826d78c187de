//! Human rendering of agent events for parsed output mode

use super::AgentEvent;

/// Render one event as a short human line. `None` suppresses the event
/// (nothing useful to show).
pub fn render(event: &AgentEvent) -> Option<String> {
    match event.kind.as_str() {
        "system" => Some("[system] session started".to_string()),
        "assistant" => assistant_text(event).map(|t| t.to_string()),
        "tool_call" => event.tool_name().map(|t| format!("→ {}", t)),
        "tool_result" => None,
        "result" | "turn.completed" => {
            let mut line = "✔ result".to_string();
            if let Some(cost) = event.total_cost_usd {
                line.push_str(&format!(" (${:.4})", cost));
            }
            Some(line)
        }
        // Unknown event types pass through silently; the raw line is still
        // captured in the log file.
        _ => None,
    }
}

/// Extract displayable text from an assistant message's content, which may
/// be a plain string or a list of typed blocks.
fn assistant_text(event: &AgentEvent) -> Option<String> {
    let content = event.message.as_ref()?.content.as_ref()?;
    match content {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(blocks) => {
            let text: Vec<&str> = blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect();
            if text.is_empty() {
                None
            } else {
                Some(text.join("\n"))
            }
        }
        _ => None,
    }
}
