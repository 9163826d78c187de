//! `swarm update`: reconfigure a running agent
//!
//! Writes configuration and label fields; the supervisor adopts them at its
//! next control poll through the store's merge protocol. Only those fields
//! are touched — runtime and termination fields belong to the supervisor,
//! so the mutation happens in place under a single lock rather than as a
//! read-then-overwrite of the whole record.

use anyhow::Result;

use crate::agent;
use crate::error::SwarmError;

pub struct UpdateParams {
    pub global: bool,
    pub target: String,
    pub iterations: Option<u32>,
    pub model: Option<String>,
    pub name: Option<String>,
    pub labels: Vec<String>,
    pub remove_labels: Vec<String>,
}

pub async fn execute(params: UpdateParams) -> Result<i32> {
    let store = super::open_store(params.global)?;
    let record = store.get_by_name_or_id(&params.target).await?;

    if record.is_terminated() {
        return Err(SwarmError::NotRunning {
            id: record.id.clone(),
            status: record.status.to_string(),
        }
        .into());
    }

    if params.iterations.is_none()
        && params.model.is_none()
        && params.name.is_none()
        && params.labels.is_empty()
        && params.remove_labels.is_empty()
    {
        return Err(SwarmError::Usage("nothing to update".to_string()).into());
    }

    if let Some(name) = &params.name {
        agent::validate_name(name)?;
    }
    let mut labels = Vec::with_capacity(params.labels.len());
    for arg in &params.labels {
        labels.push(agent::parse_label(arg)?);
    }

    let updated = store
        .update_with(&record.id, |r| {
            if let Some(iterations) = params.iterations {
                r.iterations = iterations;
            }
            if let Some(model) = &params.model {
                r.model = model.clone();
            }
            if let Some(name) = &params.name {
                r.name = name.clone();
            }
            for (key, value) in &labels {
                r.labels.insert(key.clone(), value.clone());
            }
            for key in &params.remove_labels {
                r.labels.remove(key);
            }
        })
        .await?;

    println!("{} updated", updated.id);
    Ok(0)
}
