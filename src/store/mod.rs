//! The state store: journal of all agents and the operator↔supervisor IPC
//!
//! One JSON document per scope maps agent id → record. Every operation takes
//! an exclusive file lock around a read-modify-write; writes are atomic
//! (temp file + fsync + rename). There is no RPC anywhere in swarm — control
//! flows through this file via the merge protocol below.

mod lock;

pub use lock::StoreLock;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::agent::{AgentRecord, AgentStatus, ExitReason};
use crate::error::{Result, SwarmError};
use crate::process;

/// Which partition of the fleet a command operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// State file under the project directory; `list` filters to records
    /// launched from the current working directory.
    Project,
    /// State file in the user state directory; sees everything.
    Global,
}

/// Records younger than this are exempt from the stale-process sweep, so a
/// just-launched supervisor that has not written its pid yet is not falsely
/// marked crashed.
const SWEEP_MIN_AGE_SECS: i64 = 2;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    agents: BTreeMap<String, AgentRecord>,
}

/// Handle to one scope's state file.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    scope: Scope,
    working_dir: PathBuf,
}

impl StateStore {
    /// Open the store for a scope, resolving paths from the current working
    /// directory and the user state directory. `SWARM_STATE_DIR` overrides
    /// the base directory for both scopes (used by tests and sandboxes).
    pub fn open(scope: Scope) -> Result<StateStore> {
        let working_dir = std::env::current_dir()?;
        let base = match std::env::var_os("SWARM_STATE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => match scope {
                Scope::Project => working_dir.join(".swarm"),
                Scope::Global => global_state_dir()?,
            },
        };
        Ok(StateStore {
            path: base.join("agents.json"),
            scope,
            working_dir,
        })
    }

    /// Open a store rooted at an explicit directory.
    pub fn open_at(state_dir: &Path, scope: Scope, working_dir: PathBuf) -> StateStore {
        StateStore {
            path: state_dir.join("agents.json"),
            scope,
            working_dir,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Insert a new record, rejecting running-name collisions in scope.
    pub async fn register(&self, record: AgentRecord) -> Result<()> {
        let _guard = StoreLock::acquire(&self.path).await?;
        let mut state = self.load_swept()?;
        self.check_name_conflict(&state, &record.name, &record.id)?;
        state.agents.insert(record.id.clone(), record);
        self.write_state(&state)
    }

    /// Overwrite a record wholesale. A rename re-runs the uniqueness check.
    pub async fn update(&self, record: AgentRecord) -> Result<()> {
        let _guard = StoreLock::acquire(&self.path).await?;
        let mut state = self.load_swept()?;
        if let Some(existing) = state.agents.get(&record.id) {
            if existing.name != record.name {
                self.check_name_conflict(&state, &record.name, &record.id)?;
            }
        }
        state.agents.insert(record.id.clone(), record);
        self.write_state(&state)
    }

    /// Publish supervisor progress without clobbering operator-owned fields.
    ///
    /// The control fields (`iterations`, `model`, `terminate_mode`,
    /// `paused`, `paused_at`, `labels`) are replaced in `record` with their
    /// current on-disk values before writing, and the caller's copy is
    /// updated in place. This is what lets `swarm update -n 30` or
    /// `swarm stop` take effect while the supervisor streams stats into the
    /// same record.
    pub async fn merge_update(&self, record: &mut AgentRecord) -> Result<()> {
        let _guard = StoreLock::acquire(&self.path).await?;
        let mut state = self.load_swept()?;
        if let Some(disk) = state.agents.get(&record.id) {
            record.iterations = disk.iterations;
            record.model = disk.model.clone();
            record.terminate_mode = disk.terminate_mode;
            record.paused = disk.paused;
            record.paused_at = disk.paused_at;
            record.labels = disk.labels.clone();
        }
        state.agents.insert(record.id.clone(), record.clone());
        self.write_state(&state)
    }

    /// Read-modify-write a single record under one lock acquisition. A
    /// rename applied by the closure goes through the same uniqueness
    /// check as `update`; nothing is written when it fails.
    pub async fn update_with<F>(&self, id: &str, f: F) -> Result<AgentRecord>
    where
        F: FnOnce(&mut AgentRecord),
    {
        let _guard = StoreLock::acquire(&self.path).await?;
        let mut state = self.load_swept()?;
        let mut updated = state
            .agents
            .get(id)
            .cloned()
            .ok_or_else(|| SwarmError::UnknownAgent(id.to_string()))?;
        let old_name = updated.name.clone();
        f(&mut updated);
        if updated.name != old_name {
            self.check_name_conflict(&state, &updated.name, id)?;
        }
        state.agents.insert(id.to_string(), updated.clone());
        self.write_state(&state)?;
        Ok(updated)
    }

    pub async fn get(&self, id: &str) -> Result<Option<AgentRecord>> {
        let _guard = StoreLock::acquire(&self.path).await?;
        let state = self.load_swept_persist()?;
        Ok(state.agents.get(id).cloned())
    }

    /// Resolve `@last`/`_`, exact id, exact name, or a unique id prefix.
    pub async fn get_by_name_or_id(&self, target: &str) -> Result<AgentRecord> {
        if target == "@last" || target == "_" {
            return self
                .get_last()
                .await?
                .ok_or_else(|| SwarmError::UnknownAgent(target.to_string()));
        }

        let _guard = StoreLock::acquire(&self.path).await?;
        let state = self.load_swept_persist()?;

        if let Some(record) = self.in_scope(&state).find(|r| r.id == target) {
            return Ok(record.clone());
        }

        // Exact name: prefer the running holder, else the most recent.
        let mut named: Vec<&AgentRecord> = self
            .in_scope(&state)
            .filter(|r| !target.is_empty() && r.name == target)
            .collect();
        if !named.is_empty() {
            named.sort_by_key(|r| std::cmp::Reverse(r.started_at));
            if let Some(running) = named.iter().find(|r| r.is_running()) {
                return Ok((*running).clone());
            }
            return Ok(named[0].clone());
        }

        let prefixed: Vec<&AgentRecord> = self
            .in_scope(&state)
            .filter(|r| r.id.starts_with(target))
            .collect();
        match prefixed.len() {
            0 => Err(SwarmError::UnknownAgent(target.to_string())),
            1 => Ok(prefixed[0].clone()),
            n => Err(SwarmError::AmbiguousAgent(target.to_string(), n)),
        }
    }

    /// The most-recently-started record in scope, any status.
    pub async fn get_last(&self) -> Result<Option<AgentRecord>> {
        let _guard = StoreLock::acquire(&self.path).await?;
        let state = self.load_swept_persist()?;
        Ok(self
            .in_scope(&state)
            .max_by_key(|r| r.started_at)
            .cloned())
    }

    /// All records in scope, most recent first.
    pub async fn list(&self, only_running: bool) -> Result<Vec<AgentRecord>> {
        let _guard = StoreLock::acquire(&self.path).await?;
        let state = self.load_swept_persist()?;
        let mut records: Vec<AgentRecord> = self
            .in_scope(&state)
            .filter(|r| !only_running || r.is_running())
            .cloned()
            .collect();
        records.sort_by_key(|r| std::cmp::Reverse(r.started_at));
        Ok(records)
    }

    /// Delete a terminated record. Running records may not be removed.
    pub async fn remove(&self, id: &str) -> Result<AgentRecord> {
        let _guard = StoreLock::acquire(&self.path).await?;
        let mut state = self.load_swept()?;
        let record = state
            .agents
            .get(id)
            .ok_or_else(|| SwarmError::UnknownAgent(id.to_string()))?;
        if record.is_running() {
            return Err(SwarmError::Other(format!(
                "refusing to remove running agent {}",
                id
            )));
        }
        let removed = state
            .agents
            .remove(id)
            .ok_or_else(|| SwarmError::UnknownAgent(id.to_string()))?;
        self.write_state(&state)?;
        Ok(removed)
    }

    /// Request (or lift) a pause. Idempotent; the supervisor acknowledges by
    /// writing `paused_at`.
    pub async fn set_paused(&self, id: &str, paused: bool) -> Result<()> {
        let _guard = StoreLock::acquire(&self.path).await?;
        let mut state = self.load_swept()?;
        let record = state
            .agents
            .get_mut(id)
            .ok_or_else(|| SwarmError::UnknownAgent(id.to_string()))?;
        if !record.is_running() {
            return Err(SwarmError::NotRunning {
                id: id.to_string(),
                status: record.status.to_string(),
            });
        }
        record.paused = paused;
        self.write_state(&state)
    }

    /// Request termination; the supervisor polls this between iterations.
    pub async fn set_terminate_mode(
        &self,
        id: &str,
        mode: crate::agent::TerminateMode,
    ) -> Result<()> {
        let _guard = StoreLock::acquire(&self.path).await?;
        let mut state = self.load_swept()?;
        let record = state
            .agents
            .get_mut(id)
            .ok_or_else(|| SwarmError::UnknownAgent(id.to_string()))?;
        if !record.is_running() {
            return Err(SwarmError::NotRunning {
                id: id.to_string(),
                status: record.status.to_string(),
            });
        }
        record.terminate_mode = mode;
        self.write_state(&state)
    }

    fn in_scope<'a>(&'a self, state: &'a StateFile) -> impl Iterator<Item = &'a AgentRecord> {
        state.agents.values().filter(move |r| match self.scope {
            Scope::Global => true,
            Scope::Project => r.working_dir == self.working_dir,
        })
    }

    fn check_name_conflict(&self, state: &StateFile, name: &str, own_id: &str) -> Result<()> {
        if name.is_empty() {
            return Ok(());
        }
        let conflict = self
            .in_scope(state)
            .any(|r| r.id != own_id && r.is_running() && r.name == name);
        if conflict {
            Err(SwarmError::NameConflict(name.to_string()))
        } else {
            Ok(())
        }
    }

    /// Read and sweep; caller writes (or discards) the state afterwards.
    fn load_swept(&self) -> Result<StateFile> {
        let mut state = self.read_state()?;
        sweep(&mut state);
        Ok(state)
    }

    /// Read and sweep for read-only callers: persists immediately when the
    /// sweep changed anything, so crashed records stay rewritten.
    fn load_swept_persist(&self) -> Result<StateFile> {
        let mut state = self.read_state()?;
        if sweep(&mut state) {
            self.write_state(&state)?;
        }
        Ok(state)
    }

    fn read_state(&self) -> Result<StateFile> {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| SwarmError::StoreCorrupt(format!("{}: {}", self.path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StateFile::default()),
            Err(e) => Err(SwarmError::Io(e)),
        }
    }

    fn write_state(&self, state: &StateFile) -> Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| SwarmError::StoreWrite("state path has no parent".to_string()))?;
        std::fs::create_dir_all(parent)
            .map_err(|e| SwarmError::StoreWrite(e.to_string()))?;

        let bytes = serde_json::to_vec_pretty(state)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| SwarmError::StoreWrite(e.to_string()))?;
        tmp.write_all(&bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| SwarmError::StoreWrite(e.to_string()))?;
        tmp.persist(&self.path)
            .map_err(|e| SwarmError::StoreWrite(e.to_string()))?;
        Ok(())
    }
}

/// Rewrite running records whose supervisor died without its final write.
fn sweep(state: &mut StateFile) -> bool {
    let mut changed = false;
    for record in state.agents.values_mut() {
        if record.is_running()
            && record.age().num_seconds() >= SWEEP_MIN_AGE_SECS
            && !process::is_alive(record.pid)
        {
            tracing::debug!("sweeping crashed agent {} (pid {})", record.id, record.pid);
            record.status = AgentStatus::Terminated;
            record.exit_reason = ExitReason::Crashed;
            record.terminated_at = Some(Utc::now());
            changed = true;
        }
    }
    changed
}

fn global_state_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".swarm"))
        .ok_or_else(|| SwarmError::Config("could not determine home directory".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::TerminateMode;
    use tempfile::TempDir;

    fn store(dir: &TempDir, scope: Scope) -> StateStore {
        StateStore::open_at(dir.path(), scope, PathBuf::from("/tmp/project"))
    }

    fn live_record(id: &str) -> AgentRecord {
        // Own pid keeps the record immune to the sweep.
        let mut r = AgentRecord::new(id.into(), "<string>".into(), PathBuf::from("/tmp/project"));
        r.pid = std::process::id();
        r
    }

    #[tokio::test]
    async fn register_and_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, Scope::Global);
        s.register(live_record("aaaa0001")).await.unwrap();
        let got = s.get("aaaa0001").await.unwrap().unwrap();
        assert_eq!(got.id, "aaaa0001");
        assert!(got.is_running());
    }

    #[tokio::test]
    async fn missing_file_is_empty_store() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, Scope::Global);
        assert!(s.list(false).await.unwrap().is_empty());
        assert!(s.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn running_name_conflicts_rejected() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, Scope::Global);
        let mut a = live_record("aaaa0001");
        a.name = "worker".into();
        s.register(a).await.unwrap();

        let mut b = live_record("bbbb0002");
        b.name = "worker".into();
        assert!(matches!(
            s.register(b).await,
            Err(SwarmError::NameConflict(_))
        ));

        // Terminated holders do not block the name.
        let mut c = live_record("cccc0003");
        c.name = "done".into();
        c.status = AgentStatus::Terminated;
        c.terminated_at = Some(Utc::now());
        s.update(c).await.unwrap();
        let mut d = live_record("dddd0004");
        d.name = "done".into();
        s.register(d).await.unwrap();
    }

    #[tokio::test]
    async fn merge_update_preserves_control_fields() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, Scope::Global);
        let mut supervisor_copy = live_record("aaaa0001");
        supervisor_copy.iterations = 5;
        s.register(supervisor_copy.clone()).await.unwrap();

        // Operator bumps iterations and requests a pause behind the
        // supervisor's back.
        s.update_with("aaaa0001", |r| {
            r.iterations = 30;
            r.model = "opus".into();
            r.paused = true;
            r.terminate_mode = TerminateMode::AfterIteration;
            r.labels.insert("team".into(), "core".into());
        })
        .await
        .unwrap();

        // Supervisor publishes progress from its stale copy.
        supervisor_copy.current_iter = 3;
        supervisor_copy.input_tokens = 1000;
        s.merge_update(&mut supervisor_copy).await.unwrap();

        let disk = s.get("aaaa0001").await.unwrap().unwrap();
        assert_eq!(disk.current_iter, 3);
        assert_eq!(disk.input_tokens, 1000);
        assert_eq!(disk.iterations, 30);
        assert_eq!(disk.model, "opus");
        assert!(disk.paused);
        assert_eq!(disk.terminate_mode, TerminateMode::AfterIteration);
        assert_eq!(disk.labels.get("team").unwrap(), "core");

        // The supervisor's in-memory copy adopted the control fields too.
        assert_eq!(supervisor_copy.iterations, 30);
        assert!(supervisor_copy.paused);
    }

    #[tokio::test]
    async fn stale_running_records_are_swept() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, Scope::Global);
        let mut r = live_record("aaaa0001");
        r.pid = 999_999_99; // certainly dead
        r.started_at = Utc::now() - chrono::Duration::seconds(10);
        s.register(r).await.unwrap();

        let got = s.get("aaaa0001").await.unwrap().unwrap();
        assert!(got.is_terminated());
        assert_eq!(got.exit_reason, ExitReason::Crashed);
        assert!(got.terminated_at.is_some());

        // And the rewrite was persisted.
        let raw = std::fs::read_to_string(s.path()).unwrap();
        assert!(raw.contains("crashed"));
    }

    #[tokio::test]
    async fn fresh_records_survive_the_sweep() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, Scope::Global);
        let mut r = live_record("aaaa0001");
        r.pid = 999_999_99;
        // started_at = now: younger than the sweep threshold
        s.register(r).await.unwrap();
        let got = s.get("aaaa0001").await.unwrap().unwrap();
        assert!(got.is_running());
    }

    #[tokio::test]
    async fn project_scope_filters_by_working_dir() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, Scope::Project);
        let here = live_record("aaaa0001");
        let mut elsewhere = live_record("bbbb0002");
        elsewhere.working_dir = PathBuf::from("/somewhere/else");
        s.register(here).await.unwrap();
        s.register(elsewhere).await.unwrap();

        let listed = s.list(false).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "aaaa0001");

        let g = StateStore::open_at(dir.path(), Scope::Global, PathBuf::from("/tmp/project"));
        assert_eq!(g.list(false).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn resolution_prefers_exact_then_name_then_prefix() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, Scope::Global);
        let mut a = live_record("abc00001");
        a.name = "alpha".into();
        s.register(a).await.unwrap();
        let b = live_record("abd00002");
        s.register(b).await.unwrap();

        assert_eq!(
            s.get_by_name_or_id("abc00001").await.unwrap().id,
            "abc00001"
        );
        assert_eq!(s.get_by_name_or_id("alpha").await.unwrap().id, "abc00001");
        assert_eq!(s.get_by_name_or_id("abd").await.unwrap().id, "abd00002");
        assert!(matches!(
            s.get_by_name_or_id("ab").await,
            Err(SwarmError::AmbiguousAgent(_, 2))
        ));
        assert!(matches!(
            s.get_by_name_or_id("zzz").await,
            Err(SwarmError::UnknownAgent(_))
        ));
    }

    #[tokio::test]
    async fn at_last_resolves_most_recent() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, Scope::Global);
        let mut old = live_record("aaaa0001");
        old.started_at = Utc::now() - chrono::Duration::minutes(5);
        s.register(old).await.unwrap();
        s.register(live_record("bbbb0002")).await.unwrap();

        assert_eq!(s.get_by_name_or_id("@last").await.unwrap().id, "bbbb0002");
        assert_eq!(s.get_by_name_or_id("_").await.unwrap().id, "bbbb0002");
    }

    #[tokio::test]
    async fn set_paused_is_idempotent_and_requires_running() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, Scope::Global);
        s.register(live_record("aaaa0001")).await.unwrap();

        s.set_paused("aaaa0001", true).await.unwrap();
        s.set_paused("aaaa0001", true).await.unwrap();
        assert!(s.get("aaaa0001").await.unwrap().unwrap().paused);

        s.update_with("aaaa0001", |r| {
            r.status = AgentStatus::Terminated;
            r.terminated_at = Some(Utc::now());
        })
        .await
        .unwrap();
        assert!(matches!(
            s.set_paused("aaaa0001", false).await,
            Err(SwarmError::NotRunning { .. })
        ));
    }

    #[tokio::test]
    async fn update_with_checks_renames_and_keeps_runtime_fields() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, Scope::Global);
        let mut a = live_record("aaaa0001");
        a.name = "taken".into();
        s.register(a).await.unwrap();
        s.register(live_record("bbbb0002")).await.unwrap();

        // A supervisor publishes progress for b...
        let mut b = s.get("bbbb0002").await.unwrap().unwrap();
        b.current_iter = 4;
        b.successful_iters = 3;
        s.merge_update(&mut b).await.unwrap();

        // ...and an operator reconfigures b without clobbering it.
        let updated = s
            .update_with("bbbb0002", |r| {
                r.iterations = 9;
                r.name = "fresh".into();
            })
            .await
            .unwrap();
        assert_eq!(updated.iterations, 9);
        assert_eq!(updated.current_iter, 4);
        assert_eq!(updated.successful_iters, 3);

        // A rename onto a running holder is rejected and nothing changes.
        let err = s
            .update_with("bbbb0002", |r| r.name = "taken".into())
            .await;
        assert!(matches!(err, Err(SwarmError::NameConflict(_))));
        let b = s.get("bbbb0002").await.unwrap().unwrap();
        assert_eq!(b.name, "fresh");
    }

    #[tokio::test]
    async fn remove_refuses_running_records() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, Scope::Global);
        s.register(live_record("aaaa0001")).await.unwrap();
        assert!(s.remove("aaaa0001").await.is_err());

        s.update_with("aaaa0001", |r| {
            r.status = AgentStatus::Terminated;
            r.terminated_at = Some(Utc::now());
        })
        .await
        .unwrap();
        s.remove("aaaa0001").await.unwrap();
        assert!(s.get("aaaa0001").await.unwrap().is_none());
    }
}
