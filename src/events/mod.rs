//! Agent event schema and usage accounting
//!
//! Agents emit one JSON event per stdout line. The schema is a superset the
//! parser degrades over gracefully: unknown `type`s and non-JSON lines pass
//! through untouched in parsed mode.

mod pretty;
mod stats;

pub use pretty::render;
pub use stats::UsageStats;

use serde::Deserialize;

/// Token usage block, as emitted either at the event top level or inside
/// `message.usage` for streamed assistant chunks. All fields optional; the
/// derived totals below implement the accounting fallbacks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cached_input_tokens: u64,
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

impl Usage {
    /// Input tokens including every cache variant; falls back to
    /// `prompt_tokens` when the sum is zero.
    pub fn input_total(&self) -> u64 {
        let total = self.input_tokens
            + self.cache_read_input_tokens
            + self.cache_creation_input_tokens
            + self.cached_input_tokens;
        if total == 0 {
            self.prompt_tokens
        } else {
            total
        }
    }

    /// Output tokens, falling back to `completion_tokens` when zero.
    pub fn output_total(&self) -> u64 {
        if self.output_tokens == 0 {
            self.completion_tokens
        } else {
            self.output_tokens
        }
    }
}

/// Nested message payload of streamed assistant events.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventMessage {
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub content: Option<serde_json::Value>,
}

/// One parsed agent event. A tagged variant with optional payloads; every
/// field tolerates absence so partial producers still parse.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub message: Option<EventMessage>,
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
    #[serde(default)]
    pub tool_call: Option<serde_json::Map<String, serde_json::Value>>,
}

impl AgentEvent {
    /// Parse a single stdout line. `None` means the line is not JSON and
    /// should pass through as opaque output.
    pub fn parse(line: &str) -> Option<AgentEvent> {
        let trimmed = line.trim();
        if !trimmed.starts_with('{') {
            return None;
        }
        serde_json::from_str(trimmed).ok()
    }

    /// Marks the end of meaningful agent work in an iteration.
    pub fn is_result(&self) -> bool {
        matches!(self.kind.as_str(), "result" | "turn.completed")
    }

    /// Top-level usage preferred; `message.usage` as the streamed fallback.
    pub fn effective_usage(&self) -> Option<&Usage> {
        self.usage
            .as_ref()
            .or_else(|| self.message.as_ref().and_then(|m| m.usage.as_ref()))
    }

    /// Name of the tool being invoked, for `tool_call` events.
    pub fn tool_name(&self) -> Option<&str> {
        self.tool_call
            .as_ref()
            .and_then(|m| m.keys().next())
            .map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_result_event() {
        let ev = AgentEvent::parse(
            r#"{"type":"result","usage":{"input_tokens":1,"output_tokens":1},"total_cost_usd":0.01}"#,
        )
        .unwrap();
        assert!(ev.is_result());
        assert_eq!(ev.total_cost_usd, Some(0.01));
        assert_eq!(ev.effective_usage().unwrap().input_total(), 1);
    }

    #[test]
    fn turn_completed_is_a_result() {
        let ev = AgentEvent::parse(r#"{"type":"turn.completed"}"#).unwrap();
        assert!(ev.is_result());
    }

    #[test]
    fn non_json_lines_pass_through() {
        assert!(AgentEvent::parse("plain output").is_none());
        assert!(AgentEvent::parse("").is_none());
    }

    #[test]
    fn message_usage_is_fallback_only() {
        let ev = AgentEvent::parse(
            r#"{"type":"assistant","usage":{"input_tokens":5},"message":{"usage":{"input_tokens":99}}}"#,
        )
        .unwrap();
        assert_eq!(ev.effective_usage().unwrap().input_tokens, 5);

        let ev = AgentEvent::parse(
            r#"{"type":"assistant","message":{"usage":{"input_tokens":99}}}"#,
        )
        .unwrap();
        assert_eq!(ev.effective_usage().unwrap().input_tokens, 99);
    }

    #[test]
    fn input_totals_sum_cache_variants() {
        let u = Usage {
            input_tokens: 10,
            cache_read_input_tokens: 5,
            cache_creation_input_tokens: 3,
            cached_input_tokens: 2,
            ..Default::default()
        };
        assert_eq!(u.input_total(), 20);
    }

    #[test]
    fn openai_style_fields_are_fallbacks() {
        let u = Usage {
            prompt_tokens: 7,
            completion_tokens: 11,
            ..Default::default()
        };
        assert_eq!(u.input_total(), 7);
        assert_eq!(u.output_total(), 11);

        let u = Usage {
            input_tokens: 1,
            prompt_tokens: 7,
            output_tokens: 2,
            completion_tokens: 11,
            ..Default::default()
        };
        assert_eq!(u.input_total(), 1);
        assert_eq!(u.output_total(), 2);
    }

    #[test]
    fn tool_name_comes_from_first_key() {
        let ev = AgentEvent::parse(r#"{"type":"tool_call","tool_call":{"Read":{"file":"x"}}}"#)
            .unwrap();
        assert_eq!(ev.tool_name(), Some("Read"));
    }

    #[test]
    fn unknown_types_still_parse() {
        let ev = AgentEvent::parse(r#"{"type":"diagnostics","detail":"whatever"}"#).unwrap();
        assert_eq!(ev.kind, "diagnostics");
        assert!(!ev.is_result());
    }
}
