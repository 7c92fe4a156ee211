use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

use libctxsync_core::io::atomic_write;
use libctxsync_core::types::ids::{resolve_prefix, short_id};
use libctxsync_core::{
    compare, merge, Approach, ApproachOutcome, Blocker, CoreError, Decision, DiffResult, Handoff,
    MergeOptions, MergeResult, NextStep, SharedContext, Snapshot, SnapshotReason, SnapshotSummary,
    SyncConfig, WorkStatus, STATE_DIR,
};

use crate::error::StoreError;
use crate::lock::FileLock;
use crate::snapshot::{GcStats, SnapshotStore};

/// Persistence operations the sync engine relies on
pub trait ContextPersistence: Send + Sync + 'static {
    /// The current context, if one exists
    fn get_context(&self) -> Result<Option<SharedContext>, StoreError>;

    /// Snapshot the current context
    fn create_snapshot(&self, reason: SnapshotReason) -> Result<Snapshot, StoreError>;

    /// Replace the code-change summary
    fn update_code_changes(
        &self,
        files: &[String],
        summary: &str,
        uncommitted: bool,
    ) -> Result<SharedContext, StoreError>;

    /// Snapshot metadata, newest first
    fn list_snapshots(&self) -> Result<Vec<SnapshotSummary>, StoreError>;

    /// Make a snapshot's data the current context
    fn restore_from_snapshot(&self, id: &str) -> Result<SharedContext, StoreError>;
}

/// Context stored as `.ctxsync/context.json` next to its lock and snapshots
#[derive(Debug, Clone)]
pub struct FileContextStore {
    project_dir: PathBuf,
    state_dir: PathBuf,
    agent_id: String,
    config: SyncConfig,
    lock: FileLock,
    snapshots: SnapshotStore,
}

impl FileContextStore {
    pub fn open(
        project_dir: impl Into<PathBuf>,
        agent_id: impl Into<String>,
        config: SyncConfig,
    ) -> Self {
        let project_dir = project_dir.into();
        let state_dir = project_dir.join(STATE_DIR);
        let agent_id = agent_id.into();
        let lock = FileLock::new(state_dir.join("context.lock"), agent_id.clone())
            .with_stale_after(config.lock.stale_after())
            .with_retry_interval(config.lock.retry_interval());
        let snapshots = SnapshotStore::new(state_dir.join("snapshots"), config.snapshots.max_snapshots);
        Self {
            project_dir,
            state_dir,
            agent_id,
            config,
            lock,
            snapshots,
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn lock(&self) -> &FileLock {
        &self.lock
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn context_path(&self) -> PathBuf {
        self.state_dir.join("context.json")
    }

    pub fn is_initialized(&self) -> bool {
        self.context_path().exists()
    }

    /// Create the context if none exists.
    ///
    /// Returns the current context and whether it was created by this call.
    pub fn init(&self, goal: &str) -> Result<(SharedContext, bool), StoreError> {
        fs::create_dir_all(&self.state_dir)?;
        self.lock.with_lock(self.config.lock.timeout(), || {
            if let Some(existing) = self.read_context()? {
                return Ok((existing, false));
            }
            let mut ctx = SharedContext::new(self.project_dir.display().to_string(), goal);
            ctx.clock = ctx.clock.increment(&self.agent_id);
            self.write_context(&ctx)?;
            info!(agent = %self.agent_id, context = %ctx.id, "context created");
            Ok((ctx, true))
        })
    }

    /// Read the current context without taking the lock.
    ///
    /// Writes are atomic renames, so a reader always sees a whole document.
    pub fn read_context(&self) -> Result<Option<SharedContext>, StoreError> {
        let bytes = match fs::read(self.context_path()) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// The current context, or `NoContext`
    pub fn require_context(&self) -> Result<SharedContext, StoreError> {
        self.read_context()?
            .ok_or_else(|| StoreError::NoContext(self.state_dir.display().to_string()))
    }

    /// Read-modify-write the context under the file lock.
    ///
    /// `f` runs against the latest persisted context; on success the
    /// revision is stamped with this store's agent and written back.
    pub fn update<F>(&self, f: F) -> Result<SharedContext, StoreError>
    where
        F: FnOnce(&mut SharedContext) -> Result<(), StoreError>,
    {
        self.lock.with_lock(self.config.lock.timeout(), || {
            let mut ctx = self.require_context()?;
            f(&mut ctx)?;
            ctx.touch(&self.agent_id);
            self.write_context(&ctx)?;
            debug!(agent = %self.agent_id, version = ctx.version, "context updated");
            Ok(ctx)
        })
    }

    pub fn set_goal(&self, goal: &str) -> Result<SharedContext, StoreError> {
        self.update(|ctx| {
            ctx.current_work.goal = goal.to_string();
            Ok(())
        })
    }

    pub fn set_status(&self, status: WorkStatus) -> Result<SharedContext, StoreError> {
        self.update(|ctx| {
            ctx.current_work.status = status;
            Ok(())
        })
    }

    pub fn add_decision(&self, description: &str, rationale: Option<String>) -> Result<Decision, StoreError> {
        let decision = Decision::new(description, rationale, Some(self.agent_id.clone()));
        let entry = decision.clone();
        self.update(move |ctx| {
            ctx.conversation.decisions.push(entry);
            Ok(())
        })?;
        Ok(decision)
    }

    pub fn add_approach(
        &self,
        description: &str,
        outcome: ApproachOutcome,
        notes: Option<String>,
    ) -> Result<Approach, StoreError> {
        let approach = Approach::new(description, outcome, notes);
        let entry = approach.clone();
        self.update(move |ctx| {
            ctx.conversation.approaches.push(entry);
            Ok(())
        })?;
        Ok(approach)
    }

    pub fn add_blocker(&self, description: &str) -> Result<Blocker, StoreError> {
        let blocker = Blocker::new(description);
        let entry = blocker.clone();
        self.update(move |ctx| {
            ctx.conversation.blockers.push(entry);
            if ctx.current_work.status == WorkStatus::InProgress {
                ctx.current_work.status = WorkStatus::Blocked;
            }
            Ok(())
        })?;
        Ok(blocker)
    }

    /// Mark a blocker resolved; `id` may be a unique prefix
    pub fn resolve_blocker(&self, id: &str, resolution: Option<String>) -> Result<Blocker, StoreError> {
        let mut resolved = None;
        self.update(|ctx| {
            let full = resolve_prefix(id, ctx.conversation.blockers.iter().map(|b| b.id.as_str()))
                .map_err(CoreError::from)?
                .ok_or_else(|| CoreError::NotFound(format!("blocker '{}'", id)))?;
            if let Some(blocker) = ctx.find_blocker_mut(&full) {
                blocker.resolved = true;
                blocker.resolution = resolution;
                resolved = Some(blocker.clone());
            }
            if ctx.current_work.status == WorkStatus::Blocked && ctx.open_blockers().next().is_none() {
                ctx.current_work.status = WorkStatus::InProgress;
            }
            Ok(())
        })?;
        resolved.ok_or_else(|| CoreError::NotFound(format!("blocker '{}'", id)).into())
    }

    pub fn add_next_step(&self, description: &str, priority: u8) -> Result<NextStep, StoreError> {
        let step = NextStep::new(description, priority);
        let entry = step.clone();
        self.update(move |ctx| {
            ctx.conversation.next_steps.push(entry);
            Ok(())
        })?;
        Ok(step)
    }

    /// Hand the work to another agent and mark the point with a snapshot
    pub fn record_handoff(&self, to_agent: &str, summary: &str) -> Result<(SharedContext, Snapshot), StoreError> {
        let handoff = Handoff {
            from_agent: self.agent_id.clone(),
            to_agent: to_agent.to_string(),
            summary: summary.to_string(),
            at: Utc::now(),
        };
        let ctx = self.update(move |ctx| {
            ctx.handoffs.push(handoff);
            Ok(())
        })?;
        let snapshot = self.snapshots.create(
            &ctx,
            SnapshotReason::Handoff,
            Some(format!("{} -> {}", self.agent_id, to_agent)),
        )?;
        info!(from = %self.agent_id, to = %to_agent, "work handed off");
        Ok((ctx, snapshot))
    }

    /// Snapshot the current context with an optional label
    pub fn snapshot(&self, reason: SnapshotReason, label: Option<String>) -> Result<Snapshot, StoreError> {
        let ctx = self.require_context()?;
        self.snapshots.create(&ctx, reason, label)
    }

    pub fn get_snapshot(&self, id: &str) -> Result<Snapshot, StoreError> {
        self.snapshots.get(id)
    }

    pub fn gc_snapshots(&self, keep: usize) -> Result<GcStats, StoreError> {
        self.snapshots.prune(keep)
    }

    /// Diff a snapshot against another snapshot, or against the current context
    pub fn diff(&self, from: &str, to: Option<&str>) -> Result<DiffResult, StoreError> {
        let source = self.snapshots.get(from)?.data;
        let target = match to {
            Some(id) => self.snapshots.get(id)?.data,
            None => self.require_context()?,
        };
        Ok(compare(&source, &target))
    }

    /// Merge a snapshot into the current context.
    ///
    /// With `apply`, a successful merge is written back under the lock;
    /// the read, merge and write happen in one critical section.
    pub fn merge_snapshot(
        &self,
        snapshot_id: &str,
        options: &MergeOptions,
        apply: bool,
    ) -> Result<MergeResult, StoreError> {
        let source = self.snapshots.get(snapshot_id)?.data;
        let mut options = options.clone();
        if options.merging_agent.is_none() {
            options.merging_agent = Some(self.agent_id.clone());
        }
        if !apply {
            let target = self.require_context()?;
            return Ok(merge(&source, &target, &options));
        }

        self.lock.with_lock(self.config.lock.timeout(), || {
            let target = self.require_context()?;
            let result = merge(&source, &target, &options);
            if let Some(merged) = result.merged.as_ref().filter(|_| result.success) {
                self.write_context(merged)?;
                info!(
                    agent = %self.agent_id,
                    snapshot = %short_id(snapshot_id),
                    version = merged.version,
                    "merge applied"
                );
            }
            Ok(result)
        })
    }

    fn write_context(&self, ctx: &SharedContext) -> Result<(), StoreError> {
        fs::create_dir_all(&self.state_dir)?;
        let bytes = serde_json::to_vec_pretty(ctx)?;
        atomic_write(&self.context_path(), &bytes)?;
        Ok(())
    }
}

impl ContextPersistence for FileContextStore {
    fn get_context(&self) -> Result<Option<SharedContext>, StoreError> {
        self.read_context()
    }

    fn create_snapshot(&self, reason: SnapshotReason) -> Result<Snapshot, StoreError> {
        self.snapshot(reason, None)
    }

    fn update_code_changes(
        &self,
        files: &[String],
        summary: &str,
        uncommitted: bool,
    ) -> Result<SharedContext, StoreError> {
        self.update(|ctx| {
            let changes = &mut ctx.code_changes;
            for file in files {
                if !changes.modified_files.contains(file) {
                    changes.modified_files.push(file.clone());
                }
            }
            changes.summary = summary.to_string();
            changes.uncommitted = uncommitted;
            changes.updated_at = Some(Utc::now());
            Ok(())
        })
    }

    fn list_snapshots(&self) -> Result<Vec<SnapshotSummary>, StoreError> {
        self.snapshots.list()
    }

    fn restore_from_snapshot(&self, id: &str) -> Result<SharedContext, StoreError> {
        let snapshot = self.snapshots.get(id)?;
        self.lock.with_lock(self.config.lock.timeout(), || {
            let current = self.read_context()?;
            let mut restored = snapshot.data.clone();
            if let Some(current) = &current {
                self.snapshots.create(
                    current,
                    SnapshotReason::Manual,
                    Some(format!("before restore of {}", short_id(&snapshot.id))),
                )?;
                restored.version = current.version.max(snapshot.data.version) + 1;
                restored.clock = current.clock.merge(&snapshot.data.clock);
            } else {
                restored.version = snapshot.data.version + 1;
            }
            restored.clock = restored.clock.increment(&self.agent_id);
            restored.updated_at = Utc::now();
            self.write_context(&restored)?;
            info!(
                agent = %self.agent_id,
                snapshot = %short_id(&snapshot.id),
                version = restored.version,
                "context restored"
            );
            Ok(restored)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libctxsync_core::ClockOrdering;
    use tempfile::TempDir;

    fn open(dir: &TempDir, agent: &str) -> FileContextStore {
        FileContextStore::open(dir.path(), agent, SyncConfig::default())
    }

    #[test]
    fn test_init_is_once() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, "claude");
        assert!(!store.is_initialized());

        let (ctx, created) = store.init("A").unwrap();
        assert!(created);
        assert_eq!(ctx.version, 1);
        assert_eq!(ctx.clock.get("claude"), 1);

        let (again, created) = store.init("other").unwrap();
        assert!(!created);
        assert_eq!(again.current_work.goal, "A");
        assert!(!store.lock().status().unwrap().locked);
    }

    #[test]
    fn test_update_requires_context() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, "claude");
        assert!(matches!(store.set_goal("x"), Err(StoreError::NoContext(_))));
    }

    #[test]
    fn test_mutations_bump_version_and_clock() {
        let dir = TempDir::new().unwrap();
        let claude = open(&dir, "claude");
        let cursor = open(&dir, "cursor");
        claude.init("A").unwrap();

        claude.add_decision("use tokio", Some("async io".into())).unwrap();
        let ctx = cursor.set_status(WorkStatus::InProgress).unwrap();

        assert_eq!(ctx.version, 3);
        assert_eq!(ctx.clock.get("claude"), 2);
        assert_eq!(ctx.clock.get("cursor"), 1);
        assert_eq!(ctx.conversation.decisions[0].agent.as_deref(), Some("claude"));
    }

    #[test]
    fn test_blockers_drive_status() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, "claude");
        store.init("A").unwrap();
        store.set_status(WorkStatus::InProgress).unwrap();

        let blocker = store.add_blocker("flaky CI").unwrap();
        assert_eq!(store.require_context().unwrap().current_work.status, WorkStatus::Blocked);

        let resolved = store.resolve_blocker(&blocker.id[..8], Some("retry".into())).unwrap();
        assert!(resolved.resolved);
        assert_eq!(store.require_context().unwrap().current_work.status, WorkStatus::InProgress);

        assert!(store.resolve_blocker("nope", None).is_err());
    }

    #[test]
    fn test_handoff_takes_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, "claude");
        store.init("A").unwrap();

        let (ctx, snapshot) = store.record_handoff("cursor", "tests remain").unwrap();
        assert_eq!(ctx.current_owner(), Some("cursor"));
        assert_eq!(snapshot.reason, SnapshotReason::Handoff);
        assert_eq!(snapshot.data.handoffs.len(), 1);
    }

    #[test]
    fn test_code_changes_accumulate() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, "claude");
        store.init("A").unwrap();

        store
            .update_code_changes(&["a.rs".into(), "b.rs".into()], "2 file(s) saved", true)
            .unwrap();
        let ctx = store
            .update_code_changes(&["b.rs".into(), "c.rs".into()], "2 file(s) saved", true)
            .unwrap();
        assert_eq!(ctx.code_changes.modified_files, vec!["a.rs", "b.rs", "c.rs"]);
        assert!(ctx.code_changes.uncommitted);
        assert!(ctx.code_changes.updated_at.is_some());
    }

    #[test]
    fn test_restore_is_causally_later() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, "claude");
        store.init("A").unwrap();
        let snap = store.snapshot(SnapshotReason::Milestone, Some("goal A".into())).unwrap();
        let before = store.set_goal("B").unwrap();

        let restored = store.restore_from_snapshot(&snap.id).unwrap();
        assert_eq!(restored.current_work.goal, "A");
        assert_eq!(restored.version, before.version + 1);
        assert_eq!(restored.clock.compare(&before.clock), ClockOrdering::After);

        // The pre-restore state was kept
        let list = store.list_snapshots().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].reason, SnapshotReason::Manual);
        assert_eq!(list[0].goal, "B");
    }

    #[test]
    fn test_snapshot_merge_end_to_end() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir, "claude");
        store.init("A").unwrap();
        let d1 = store.add_decision("D1", None).unwrap();
        let s1 = store.snapshot(SnapshotReason::Manual, None).unwrap();
        store.set_goal("B").unwrap();
        let d2 = store.add_decision("D2", None).unwrap();

        let diff = store.diff(&s1.id, None).unwrap();
        assert_eq!(diff.metadata[0].key, "current_work.goal");
        assert_eq!(diff.decisions.len(), 1);

        let result = store.merge_snapshot(&s1.id, &MergeOptions::default(), true).unwrap();
        assert!(result.success);
        let merged = store.require_context().unwrap();
        assert_eq!(merged.current_work.goal, "B");
        let ids: Vec<_> = merged.conversation.decisions.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec![d1.id.as_str(), d2.id.as_str()]);
        assert_eq!(merged.version, 5);
    }
}
