//! `swarm list` / `swarm ps`: tabular or JSON fleet overview

use anyhow::Result;

use crate::agent::AgentRecord;
use crate::cli::OutputFormat;

pub async fn execute(global: bool, all: bool, format: OutputFormat) -> Result<i32> {
    let store = super::open_store(global)?;
    let records = store.list(!all).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        OutputFormat::Table => print_table(&records),
    }
    Ok(0)
}

fn print_table(records: &[AgentRecord]) {
    println!(
        "{:<10} {:<16} {:<12} {:<8} {:<16} {:<10} {:<12} {}",
        "ID", "NAME", "STATUS", "ITER", "TOKENS", "COST", "MODEL", "STARTED"
    );
    for record in records {
        println!(
            "{:<10} {:<16} {:<12} {:<8} {:<16} {:<10} {:<12} {}",
            record.id,
            truncate(&record.name, 16),
            status_cell(record),
            record.display_iterations(),
            format!("{}/{}", record.input_tokens, record.output_tokens),
            format!("${:.2}", record.total_cost_usd),
            truncate(&record.model, 12),
            super::rel_time(record.started_at),
        );
    }
}

fn status_cell(record: &AgentRecord) -> String {
    if record.is_running() && record.paused {
        "paused".to_string()
    } else if record.is_running() {
        "running".to_string()
    } else {
        format!("exit:{}", record.exit_reason.as_str())
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn status_cell_marks_paused_agents() {
        let mut r = AgentRecord::new("a".into(), "<string>".into(), PathBuf::from("/p"));
        assert_eq!(status_cell(&r), "running");
        r.paused = true;
        assert_eq!(status_cell(&r), "paused");
        r.status = crate::agent::AgentStatus::Terminated;
        r.exit_reason = crate::agent::ExitReason::Completed;
        assert_eq!(status_cell(&r), "exit:completed");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-agent-name", 10), "a-very-lo…");
    }
}
