//! `swarm kill-all` / `pause-all` / `resume-all`: bulk control
//!
//! Filters select running agents by label and name; destructive fan-out
//! requires confirmation unless forced, and a non-TTY without `--force`
//! aborts rather than guessing.

use anyhow::Result;
use futures::future::join_all;
use regex::Regex;
use std::io::IsTerminal;

use crate::agent::{AgentRecord, AgentStatus, ExitReason, TerminateMode};
use crate::error::SwarmError;
use crate::process;
use crate::store::StateStore;

#[derive(Debug, Clone, Copy)]
pub enum BulkAction {
    Kill { immediate: bool },
    Pause,
    Resume,
}

impl BulkAction {
    fn verb(&self) -> &'static str {
        match self {
            BulkAction::Kill { .. } => "kill",
            BulkAction::Pause => "pause",
            BulkAction::Resume => "resume",
        }
    }

    fn past(&self) -> &'static str {
        match self {
            BulkAction::Kill { .. } => "killed",
            BulkAction::Pause => "paused",
            BulkAction::Resume => "resumed",
        }
    }
}

pub async fn execute(
    global: bool,
    action: BulkAction,
    labels: Vec<String>,
    name: Option<String>,
    force: bool,
) -> Result<i32> {
    let store = super::open_store(global)?;

    let label_filters: Vec<(String, String)> = labels
        .iter()
        .map(|arg| {
            arg.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| SwarmError::Usage(format!("--label '{}' is not KEY=VALUE", arg)))
        })
        .collect::<std::result::Result<_, _>>()?;
    let name_filter = name
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| SwarmError::Usage(format!("bad --name regex: {}", e)))?;

    let targets: Vec<AgentRecord> = store
        .list(true)
        .await?
        .into_iter()
        .filter(|r| matches_filters(r, &label_filters, name_filter.as_ref()))
        .collect();

    if targets.is_empty() {
        println!("no matching running agents");
        return Ok(0);
    }

    if !force {
        if !std::io::stdin().is_terminal() {
            return Err(SwarmError::Usage(format!(
                "refusing to {} {} agents without --force in non-interactive mode",
                action.verb(),
                targets.len()
            ))
            .into());
        }
        if !confirm(&action, &targets)? {
            println!("aborted");
            return Ok(0);
        }
    }

    let results = join_all(targets.iter().map(|record| {
        let store = store.clone();
        async move { apply(&store, record, action).await }
    }))
    .await;

    let mut failures = 0;
    for (record, result) in targets.iter().zip(results) {
        match result {
            Ok(()) => println!("{} {}", record.id, action.past()),
            Err(e) => {
                failures += 1;
                eprintln!("{}: {}", record.id, e);
            }
        }
    }
    if failures > 0 {
        tracing::warn!("{} of {} bulk operations failed", failures, targets.len());
    }
    Ok(0)
}

async fn apply(store: &StateStore, record: &AgentRecord, action: BulkAction) -> Result<()> {
    match action {
        BulkAction::Pause => store.set_paused(&record.id, true).await?,
        BulkAction::Resume => store.set_paused(&record.id, false).await?,
        BulkAction::Kill { immediate: false } => {
            store
                .set_terminate_mode(&record.id, TerminateMode::AfterIteration)
                .await?
        }
        BulkAction::Kill { immediate: true } => {
            store
                .set_terminate_mode(&record.id, TerminateMode::Immediate)
                .await?;
            process::force_kill_group(record.pid).await;
            store
                .update_with(&record.id, |r| {
                    if r.is_running() {
                        r.status = AgentStatus::Terminated;
                        r.exit_reason = ExitReason::Killed;
                        r.terminated_at = Some(chrono::Utc::now());
                    }
                })
                .await?;
        }
    }
    Ok(())
}

fn matches_filters(
    record: &AgentRecord,
    labels: &[(String, String)],
    name: Option<&Regex>,
) -> bool {
    if !labels
        .iter()
        .all(|(k, v)| record.labels.get(k).is_some_and(|have| have == v))
    {
        return false;
    }
    if let Some(re) = name {
        if !re.is_match(&record.name) {
            return false;
        }
    }
    true
}

fn confirm(action: &BulkAction, targets: &[AgentRecord]) -> Result<bool> {
    println!("about to {} {} agents:", action.verb(), targets.len());
    for record in targets {
        let name = if record.name.is_empty() {
            ""
        } else {
            &record.name
        };
        println!("  {} {}", record.id, name);
    }
    print!("proceed? [y/N] ");
    use std::io::Write;
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn record(name: &str, labels: &[(&str, &str)]) -> AgentRecord {
        let mut r = AgentRecord::new("ab".into(), "<string>".into(), PathBuf::from("/p"));
        r.name = name.to_string();
        for (k, v) in labels {
            r.labels.insert(k.to_string(), v.to_string());
        }
        r
    }

    #[test]
    fn label_filters_require_all_pairs() {
        let r = record("w", &[("team", "core"), ("tier", "2")]);
        let both = vec![
            ("team".to_string(), "core".to_string()),
            ("tier".to_string(), "2".to_string()),
        ];
        let wrong = vec![("team".to_string(), "infra".to_string())];
        assert!(matches_filters(&r, &both, None));
        assert!(!matches_filters(&r, &wrong, None));
    }

    #[test]
    fn name_filter_is_a_regex() {
        let r = record("worker-7", &[]);
        let re = Regex::new("^worker-\\d+$").unwrap();
        assert!(matches_filters(&r, &[], Some(&re)));
        let re = Regex::new("^builder").unwrap();
        assert!(!matches_filters(&r, &[], Some(&re)));
    }
}
