//! The on-complete hook
//!
//! After termination the supervisor may spawn a user-supplied shell command
//! with the agent's summary exported through `SWARM_AGENT_*` variables.
//! Hook failures are warnings; they never alter the recorded termination.

use crate::agent::AgentRecord;

pub async fn run_on_complete(record: &AgentRecord) {
    if record.on_complete.is_empty() {
        return;
    }
    tracing::debug!("running on-complete hook for {}", record.id);

    let mut cmd = tokio::process::Command::new("sh");
    cmd.arg("-c")
        .arg(&record.on_complete)
        .current_dir(&record.working_dir)
        .env("SWARM_AGENT_ID", &record.id)
        .env("SWARM_AGENT_NAME", &record.name)
        .env("SWARM_AGENT_STATUS", record.status.to_string())
        .env("SWARM_AGENT_ITERATIONS", record.iterations.to_string())
        .env("SWARM_AGENT_COMPLETED", record.current_iter.to_string())
        .env("SWARM_AGENT_PROMPT", &record.prompt_content)
        .env("SWARM_AGENT_MODEL", &record.model)
        .env("SWARM_AGENT_LOG_FILE", &record.log_file)
        .env(
            "SWARM_AGENT_DURATION",
            format!("{}s", record.duration().num_seconds()),
        )
        .env("SWARM_AGENT_EXIT_REASON", record.exit_reason.as_str())
        .env(
            "SWARM_AGENT_SUCCESSFUL_ITERS",
            record.successful_iters.to_string(),
        )
        .env("SWARM_AGENT_FAILED_ITERS", record.failed_iters.to_string());

    match cmd.status().await {
        Ok(status) if status.success() => {}
        Ok(status) => {
            tracing::warn!("on-complete hook exited with {}", status);
        }
        Err(e) => {
            tracing::warn!("failed to spawn on-complete hook: {}", e);
        }
    }
}
