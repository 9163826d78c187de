//! Cumulative usage aggregation for one iteration

use super::AgentEvent;

/// Token and cost totals streamed out of a running iteration.
///
/// Snapshots of this struct are handed to the supervisor's usage callback;
/// the aggregation rules here are what make totals reproducible across
/// parsed and raw output modes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_cost_usd: f64,
    pub current_task: String,
}

impl UsageStats {
    /// Fold one event into the totals. Returns true when anything changed,
    /// so callers can skip emitting empty updates.
    pub fn absorb(&mut self, event: &AgentEvent) -> bool {
        let mut changed = false;

        if let Some(usage) = event.effective_usage() {
            let input = usage.input_total();
            let output = usage.output_total();
            if input > 0 || output > 0 {
                self.input_tokens += input;
                self.output_tokens += output;
                changed = true;
            }
        }

        // Cost arrives verbatim on result events and is summed, never
        // averaged.
        if event.is_result() {
            if let Some(cost) = event.total_cost_usd {
                self.total_cost_usd += cost;
                changed = true;
            }
        }

        if let Some(tool) = event.tool_name() {
            if self.current_task != tool {
                self.current_task = tool.to_string();
                changed = true;
            }
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(json: &str) -> AgentEvent {
        AgentEvent::parse(json).unwrap()
    }

    #[test]
    fn accumulates_across_events() {
        let mut stats = UsageStats::default();
        assert!(stats.absorb(&ev(
            r#"{"type":"assistant","usage":{"input_tokens":10,"output_tokens":2}}"#
        )));
        assert!(stats.absorb(&ev(
            r#"{"type":"result","usage":{"input_tokens":1,"output_tokens":1},"total_cost_usd":0.01}"#
        )));
        assert_eq!(stats.input_tokens, 11);
        assert_eq!(stats.output_tokens, 3);
        assert!((stats.total_cost_usd - 0.01).abs() < 1e-9);
    }

    #[test]
    fn zero_usage_events_do_not_emit_updates() {
        let mut stats = UsageStats::default();
        assert!(!stats.absorb(&ev(r#"{"type":"system","usage":{}}"#)));
        assert!(!stats.absorb(&ev(r#"{"type":"system"}"#)));
        assert_eq!(stats, UsageStats::default());
    }

    #[test]
    fn cost_only_counted_on_result_events() {
        let mut stats = UsageStats::default();
        stats.absorb(&ev(r#"{"type":"assistant","total_cost_usd":5.0}"#));
        assert_eq!(stats.total_cost_usd, 0.0);
        stats.absorb(&ev(r#"{"type":"result","total_cost_usd":0.25}"#));
        stats.absorb(&ev(r#"{"type":"result","total_cost_usd":0.25}"#));
        assert!((stats.total_cost_usd - 0.5).abs() < 1e-9);
    }

    #[test]
    fn current_task_tracks_latest_tool() {
        let mut stats = UsageStats::default();
        stats.absorb(&ev(r#"{"type":"tool_call","tool_call":{"Read":{}}}"#));
        assert_eq!(stats.current_task, "Read");
        stats.absorb(&ev(r#"{"type":"tool_call","tool_call":{"Edit":{}}}"#));
        assert_eq!(stats.current_task, "Edit");
    }
}
