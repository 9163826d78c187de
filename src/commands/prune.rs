//! `swarm prune`: delete terminated records (and optionally their logs)

use anyhow::Result;
use std::time::Duration;

pub async fn execute(global: bool, older_than: Option<Duration>, logs: bool) -> Result<i32> {
    let store = super::open_store(global)?;
    let cutoff = older_than.map(|d| {
        chrono::Utc::now() - chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero())
    });

    let candidates: Vec<_> = store
        .list(false)
        .await?
        .into_iter()
        .filter(|r| r.is_terminated())
        .filter(|r| match (cutoff, r.terminated_at) {
            (Some(cutoff), Some(terminated_at)) => terminated_at <= cutoff,
            (Some(_), None) => false,
            (None, _) => true,
        })
        .collect();

    let mut pruned = 0usize;
    let mut logs_removed = 0usize;
    for record in &candidates {
        match store.remove(&record.id).await {
            Ok(removed) => {
                pruned += 1;
                if logs && !removed.log_file.is_empty() {
                    match std::fs::remove_file(&removed.log_file) {
                        Ok(()) => logs_removed += 1,
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => {
                            tracing::warn!("could not remove {}: {}", removed.log_file, e)
                        }
                    }
                }
            }
            Err(e) => tracing::warn!("could not prune {}: {}", record.id, e),
        }
    }

    if logs {
        println!("pruned {} agents, removed {} log files", pruned, logs_removed);
    } else {
        println!("pruned {} agents", pruned);
    }
    Ok(0)
}
