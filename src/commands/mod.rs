//! Operator commands
//!
//! Short-lived readers/writers of the state store. Every command follows the
//! same skeleton: open the store in the requested scope, resolve the
//! target(s), perform the action.

pub mod bulk;
pub mod control;
pub mod doctor;
pub mod inspect;
pub mod list;
pub mod logs;
pub mod prune;
pub mod restart;
pub mod run;
pub mod supervise;
pub mod update;
pub mod wait;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::error::SwarmError;
use crate::store::{Scope, StateStore};

pub(crate) fn open_store(global: bool) -> Result<StateStore> {
    let scope = if global { Scope::Global } else { Scope::Project };
    Ok(StateStore::open(scope)?)
}

pub(crate) fn parse_env_pairs(env: &[String]) -> Result<Vec<(String, String)>> {
    env.iter()
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| {
                    SwarmError::Usage(format!("-e '{}' is not KEY=VALUE", entry)).into()
                })
        })
        .collect()
}

/// Compact relative time for table output: `12s ago`, `5m ago`, `3d ago`.
pub(crate) fn rel_time(when: DateTime<Utc>) -> String {
    let elapsed = Utc::now() - when;
    let secs = elapsed.num_seconds();
    if secs < 0 {
        return "just now".to_string();
    }
    match secs {
        0..=59 => format!("{}s ago", secs),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_pairs_parse_and_reject() {
        let pairs = parse_env_pairs(&["A=1".into(), "B=x=y".into()]).unwrap();
        assert_eq!(pairs[0], ("A".to_string(), "1".to_string()));
        assert_eq!(pairs[1], ("B".to_string(), "x=y".to_string()));
        assert!(parse_env_pairs(&["NOEQ".into()]).is_err());
    }

    #[test]
    fn rel_time_buckets() {
        assert_eq!(rel_time(Utc::now() - chrono::Duration::seconds(30)), "30s ago");
        assert_eq!(rel_time(Utc::now() - chrono::Duration::minutes(5)), "5m ago");
        assert_eq!(rel_time(Utc::now() - chrono::Duration::hours(2)), "2h ago");
        assert_eq!(rel_time(Utc::now() - chrono::Duration::days(3)), "3d ago");
    }
}
