//! `swarm wait`: block until agents terminate
//!
//! Exit codes: 0 when the wait condition is met, 1 when `--timeout` fires
//! first, 2 for unknown targets.

use anyhow::Result;
use std::time::Duration;

use crate::error::SwarmError;

pub async fn execute(
    global: bool,
    targets: Vec<String>,
    any: bool,
    timeout: Option<Duration>,
    interval: Option<Duration>,
) -> Result<i32> {
    if targets.is_empty() {
        return Err(SwarmError::Usage("wait needs at least one agent".to_string()).into());
    }
    let store = super::open_store(global)?;

    // Resolve everything up front so typos fail fast with exit 2.
    let mut ids = Vec::with_capacity(targets.len());
    for target in &targets {
        ids.push(store.get_by_name_or_id(target).await?.id);
    }

    let interval = interval.unwrap_or(Duration::from_secs(1));
    let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

    loop {
        let mut terminated = 0usize;
        for id in &ids {
            match store.get(id).await? {
                // A pruned record cannot come back; treat it as terminated.
                None => terminated += 1,
                Some(r) if r.is_terminated() => terminated += 1,
                Some(_) => {}
            }
        }

        if terminated == ids.len() || (any && terminated > 0) {
            return Ok(0);
        }
        if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
            eprintln!(
                "timed out waiting for {} of {} agents",
                ids.len() - terminated,
                ids.len()
            );
            return Ok(1);
        }
        tokio::time::sleep(interval).await;
    }
}
