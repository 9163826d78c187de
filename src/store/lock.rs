//! Exclusive file lock for state-store operations
//!
//! A sibling `.lock` file created with `create_new` serialises every
//! read-modify-write of the state file across processes. Stale locks left by
//! crashed holders are broken after a TTL. The guard removes the lock file
//! on drop.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SwarmError};

/// How long a lock may exist before another process may break it.
const LOCK_TTL: Duration = Duration::from_secs(30);

/// Retry cadence while waiting on a contended lock.
const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Give up acquiring after this long.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    /// Acquire the exclusive lock guarding `target`, waiting out contention.
    pub async fn acquire(target: &Path) -> Result<StoreLock> {
        let path = lock_path(target);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let deadline = tokio::time::Instant::now() + ACQUIRE_TIMEOUT;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    // Holder pid, for post-mortem inspection only.
                    let _ = write!(file, "{}", std::process::id());
                    return Ok(StoreLock { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale(&path) {
                        tracing::warn!("breaking stale state lock at {}", path.display());
                        let _ = std::fs::remove_file(&path);
                        continue;
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Err(SwarmError::StoreLock(format!(
                            "timed out waiting for {}",
                            path.display()
                        )));
                    }
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(SwarmError::Io(e)),
            }
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn lock_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    name.push_str(".lock");
    target.with_file_name(name)
}

fn is_stale(path: &Path) -> bool {
    match path.metadata().and_then(|m| m.modified()) {
        Ok(modified) => modified
            .elapsed()
            .map(|age| age > LOCK_TTL)
            .unwrap_or(false),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("agents.json");
        {
            let _guard = StoreLock::acquire(&target).await.unwrap();
            assert!(dir.path().join("agents.json.lock").exists());
        }
        assert!(!dir.path().join("agents.json.lock").exists());
    }

    #[tokio::test]
    async fn contended_lock_waits_for_release() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("agents.json");
        let guard = StoreLock::acquire(&target).await.unwrap();

        let target2 = target.clone();
        let waiter = tokio::spawn(async move { StoreLock::acquire(&target2).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(guard);

        let second = waiter.await.unwrap();
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn stale_lock_is_broken() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("agents.json");
        let lock_file = dir.path().join("agents.json.lock");
        std::fs::write(&lock_file, "12345").unwrap();

        // Age the lock past the TTL.
        let old = std::time::SystemTime::now() - Duration::from_secs(60);
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(&lock_file)
            .unwrap();
        file.set_modified(old).unwrap();
        drop(file);

        let guard = StoreLock::acquire(&target).await;
        assert!(guard.is_ok());
    }
}
