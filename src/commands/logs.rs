//! `swarm logs`: view a captured agent log

use anyhow::Result;
use std::path::PathBuf;

use crate::error::SwarmError;
use crate::logview::{self, LogViewOptions};

pub async fn execute(global: bool, target: &str, options: LogViewOptions) -> Result<i32> {
    let store = super::open_store(global)?;
    let record = store.get_by_name_or_id(target).await?;

    if record.log_file.is_empty() {
        return Err(SwarmError::Usage(format!(
            "agent {} has no captured log (foreground run)",
            record.id
        ))
        .into());
    }

    let path = PathBuf::from(&record.log_file);
    let mut stdout = std::io::stdout().lock();
    logview::view(&path, &options, &mut stdout).await?;
    Ok(0)
}
