//! `swarm inspect`: one agent's full record

use anyhow::Result;

use crate::cli::OutputFormat;

pub async fn execute(global: bool, target: &str, _format: OutputFormat) -> Result<i32> {
    let store = super::open_store(global)?;
    let record = store.get_by_name_or_id(target).await?;

    // The record itself is the canonical view; both formats print it as
    // pretty JSON.
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(0)
}
