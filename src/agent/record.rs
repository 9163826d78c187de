//! The persistent agent record
//!
//! One `AgentRecord` per launched agent, keyed by a short opaque id. The
//! record is the unit of exchange between supervisors (runtime progress,
//! termination) and operator commands (configuration, control signals).
//! Field ownership is enforced by the store's merge protocol, not here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Whether a supervisor currently owns the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Running,
    Terminated,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Running => write!(f, "running"),
            AgentStatus::Terminated => write!(f, "terminated"),
        }
    }
}

/// Operator-requested termination, polled by the supervisor between
/// iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TerminateMode {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "immediate")]
    Immediate,
    #[serde(rename = "after_iteration")]
    AfterIteration,
}

/// Why the supervisor loop exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExitReason {
    #[default]
    #[serde(rename = "")]
    Unset,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "killed")]
    Killed,
    #[serde(rename = "signal")]
    Signal,
    #[serde(rename = "crashed")]
    Crashed,
    #[serde(rename = "error")]
    Error,
}

impl ExitReason {
    pub fn is_unset(&self) -> bool {
        matches!(self, ExitReason::Unset)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::Unset => "",
            ExitReason::Completed => "completed",
            ExitReason::Killed => "killed",
            ExitReason::Signal => "signal",
            ExitReason::Crashed => "crashed",
            ExitReason::Error => "error",
        }
    }
}

/// Which timeout, if any, ended the run or the last iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeoutReason {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "iteration")]
    Iteration,
    #[serde(rename = "total")]
    Total,
}

/// The single persistent entity of the state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    // Identity & provenance (immutable after creation)
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub prompt_source: String,
    #[serde(default)]
    pub prompt_content: String,
    pub working_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub log_file: String,
    #[serde(default)]
    pub env_names: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub on_complete: String,

    // Configuration (mutable by operator commands)
    pub iterations: u32,
    #[serde(default)]
    pub model: String,

    // Runtime progress (written by the supervisor)
    #[serde(default)]
    pub pid: u32,
    #[serde(default)]
    pub current_iter: u32,
    pub status: AgentStatus,
    #[serde(default)]
    pub successful_iters: u32,
    #[serde(default)]
    pub failed_iters: u32,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default)]
    pub current_task: String,
    #[serde(default)]
    pub last_error: String,

    // Control signals (written by operator commands)
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub paused_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub terminate_mode: TerminateMode,

    // Termination (written by the supervisor on exit)
    #[serde(default)]
    pub terminated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_reason: ExitReason,
    #[serde(default)]
    pub timeout_reason: TimeoutReason,

    // Unknown fields round-trip through here.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AgentRecord {
    /// Create a fresh record in the `running` state.
    pub fn new(id: String, prompt_source: String, working_dir: PathBuf) -> Self {
        Self {
            id,
            name: String::new(),
            prompt_source,
            prompt_content: String::new(),
            working_dir,
            started_at: Utc::now(),
            log_file: String::new(),
            env_names: Vec::new(),
            labels: BTreeMap::new(),
            on_complete: String::new(),
            iterations: 1,
            model: String::new(),
            pid: std::process::id(),
            current_iter: 0,
            status: AgentStatus::Running,
            successful_iters: 0,
            failed_iters: 0,
            input_tokens: 0,
            output_tokens: 0,
            total_cost_usd: 0.0,
            current_task: String::new(),
            last_error: String::new(),
            paused: false,
            paused_at: None,
            terminate_mode: TerminateMode::None,
            terminated_at: None,
            exit_reason: ExitReason::Unset,
            timeout_reason: TimeoutReason::None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == AgentStatus::Running
    }

    pub fn is_terminated(&self) -> bool {
        self.status == AgentStatus::Terminated
    }

    /// `3/10`, or `3/∞` for unlimited targets.
    pub fn display_iterations(&self) -> String {
        if self.iterations == 0 {
            format!("{}/∞", self.current_iter)
        } else {
            format!("{}/{}", self.current_iter, self.iterations)
        }
    }

    /// Age of the record, used by the stale-process sweep.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }

    /// Wall-clock duration from start until termination (or now).
    pub fn duration(&self) -> chrono::Duration {
        match self.terminated_at {
            Some(t) => t - self.started_at,
            None => Utc::now() - self.started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> AgentRecord {
        AgentRecord::new(
            "deadbeef".into(),
            "<string>".into(),
            PathBuf::from("/tmp/project"),
        )
    }

    #[test]
    fn new_record_is_running_at_iteration_zero() {
        let r = record();
        assert!(r.is_running());
        assert_eq!(r.current_iter, 0);
        assert!(r.exit_reason.is_unset());
        assert_eq!(r.terminate_mode, TerminateMode::None);
    }

    #[test]
    fn iteration_display_handles_unlimited() {
        let mut r = record();
        r.current_iter = 3;
        r.iterations = 10;
        assert_eq!(r.display_iterations(), "3/10");
        r.iterations = 0;
        assert_eq!(r.display_iterations(), "3/∞");
    }

    #[test]
    fn control_enums_serialize_as_strings() {
        let mut r = record();
        r.terminate_mode = TerminateMode::AfterIteration;
        r.exit_reason = ExitReason::Killed;
        r.timeout_reason = TimeoutReason::Total;
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["terminate_mode"], "after_iteration");
        assert_eq!(v["exit_reason"], "killed");
        assert_eq!(v["timeout_reason"], "total");
        assert_eq!(v["status"], "running");
    }

    #[test]
    fn unknown_fields_round_trip() {
        let mut v = serde_json::to_value(record()).unwrap();
        v["future_field"] = serde_json::json!({"nested": true});
        let r: AgentRecord = serde_json::from_value(v).unwrap();
        assert!(r.extra.contains_key("future_field"));
        let back = serde_json::to_value(&r).unwrap();
        assert_eq!(back["future_field"]["nested"], true);
    }
}
