//! Snapshot files under `.ctxsync/snapshots/<id>.json`
//!
//! Snapshots are append-only: each is written once, atomically, and never
//! modified. Retention keeps the newest `max_snapshots` files.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use libctxsync_core::io::atomic_write;
use libctxsync_core::types::ids::resolve_prefix;
use libctxsync_core::{SharedContext, Snapshot, SnapshotReason, SnapshotSummary};

use crate::error::StoreError;

/// Statistics from garbage collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct GcStats {
    pub deleted: usize,
    pub kept: usize,
}

/// Directory of immutable snapshot records
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    max_snapshots: usize,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, max_snapshots: usize) -> Self {
        Self {
            dir: dir.into(),
            max_snapshots,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a snapshot of `context`, then apply retention
    pub fn create(
        &self,
        context: &SharedContext,
        reason: SnapshotReason,
        label: Option<String>,
    ) -> Result<Snapshot, StoreError> {
        fs::create_dir_all(&self.dir)?;
        let snapshot = Snapshot::capture(context, reason, label);
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        atomic_write(&self.path_for(&snapshot.id), &bytes)?;
        debug!(
            snapshot = %snapshot.id,
            reason = snapshot.reason.as_str(),
            version = context.version,
            "snapshot created"
        );

        let stats = self.prune(self.max_snapshots)?;
        if stats.deleted > 0 {
            debug!(deleted = stats.deleted, kept = stats.kept, "pruned old snapshots");
        }
        Ok(snapshot)
    }

    /// Load a snapshot by id or unique id prefix
    pub fn get(&self, id: &str) -> Result<Snapshot, StoreError> {
        let full = self.resolve(id)?;
        let bytes = match fs::read(self.path_for(&full)) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::SnapshotNotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Expand an id prefix to a full snapshot id
    pub fn resolve(&self, id: &str) -> Result<String, StoreError> {
        let ids = self.ids()?;
        match resolve_prefix(id, ids.iter().map(String::as_str)) {
            Ok(Some(full)) => Ok(full),
            Ok(None) => Err(StoreError::SnapshotNotFound(id.to_string())),
            Err(e) => Err(libctxsync_core::CoreError::from(e).into()),
        }
    }

    /// All snapshots, newest first
    pub fn list(&self) -> Result<Vec<SnapshotSummary>, StoreError> {
        Ok(self.load_all()?.iter().map(Snapshot::summary).collect())
    }

    /// Most recent snapshot, if any
    pub fn latest(&self) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.load_all()?.into_iter().next())
    }

    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let full = self.resolve(id)?;
        fs::remove_file(self.path_for(&full))?;
        Ok(())
    }

    /// Delete all but the newest `keep` snapshots
    pub fn prune(&self, keep: usize) -> Result<GcStats, StoreError> {
        let snapshots = self.load_all()?;
        let mut deleted = 0;
        for snapshot in snapshots.iter().skip(keep) {
            match fs::remove_file(self.path_for(&snapshot.id)) {
                Ok(()) => deleted += 1,
                // Someone else pruned it first
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(GcStats {
            deleted,
            kept: snapshots.len().min(keep),
        })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn ids(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        Ok(ids)
    }

    fn load_all(&self) -> Result<Vec<Snapshot>, StoreError> {
        let mut snapshots = Vec::new();
        for id in self.ids()? {
            let bytes = match fs::read(self.path_for(&id)) {
                Ok(b) => b,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            match serde_json::from_slice::<Snapshot>(&bytes) {
                Ok(s) => snapshots.push(s),
                Err(e) => warn!(snapshot = %id, error = %e, "skipping unreadable snapshot"),
            }
        }
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir, max: usize) -> SnapshotStore {
        SnapshotStore::new(dir.path().join("snapshots"), max)
    }

    #[test]
    fn test_create_get_list() {
        let dir = TempDir::new().unwrap();
        let snapshots = store(&dir, 10);
        let mut ctx = SharedContext::new("/repo", "A");

        let first = snapshots.create(&ctx, SnapshotReason::Manual, Some("start".into())).unwrap();
        ctx.current_work.goal = "B".into();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = snapshots.create(&ctx, SnapshotReason::Auto, None).unwrap();

        let loaded = snapshots.get(&first.id).unwrap();
        assert_eq!(loaded, first);
        assert_eq!(loaded.data.current_work.goal, "A");

        let list = snapshots.list().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, second.id);
        assert_eq!(list[1].label.as_deref(), Some("start"));
        assert_eq!(snapshots.latest().unwrap().unwrap().id, second.id);
    }

    #[test]
    fn test_get_by_prefix_and_missing() {
        let dir = TempDir::new().unwrap();
        let snapshots = store(&dir, 10);
        let ctx = SharedContext::new("/repo", "A");
        let snap = snapshots.create(&ctx, SnapshotReason::Manual, None).unwrap();

        assert_eq!(snapshots.get(&snap.id[..8]).unwrap().id, snap.id);
        assert!(matches!(
            snapshots.get("ffffffff-0000"),
            Err(StoreError::SnapshotNotFound(_))
        ));
    }

    #[test]
    fn test_retention_keeps_newest() {
        let dir = TempDir::new().unwrap();
        let snapshots = store(&dir, 3);
        let ctx = SharedContext::new("/repo", "A");
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(snapshots.create(&ctx, SnapshotReason::Auto, None).unwrap().id);
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        let remaining: Vec<_> = snapshots.list().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(remaining.len(), 3);
        assert_eq!(remaining, vec![ids[4].clone(), ids[3].clone(), ids[2].clone()]);
    }

    #[test]
    fn test_prune_and_delete() {
        let dir = TempDir::new().unwrap();
        let snapshots = store(&dir, 50);
        let ctx = SharedContext::new("/repo", "A");
        for _ in 0..4 {
            snapshots.create(&ctx, SnapshotReason::Auto, None).unwrap();
        }
        let stats = snapshots.prune(1).unwrap();
        assert_eq!(stats, GcStats { deleted: 3, kept: 1 });

        let last = snapshots.latest().unwrap().unwrap();
        snapshots.delete(&last.id).unwrap();
        assert!(snapshots.list().unwrap().is_empty());
        assert!(snapshots.latest().unwrap().is_none());
    }

    #[test]
    fn test_unreadable_snapshot_is_skipped() {
        let dir = TempDir::new().unwrap();
        let snapshots = store(&dir, 10);
        let ctx = SharedContext::new("/repo", "A");
        snapshots.create(&ctx, SnapshotReason::Manual, None).unwrap();
        std::fs::write(snapshots.dir().join("garbage.json"), b"{").unwrap();
        assert_eq!(snapshots.list().unwrap().len(), 1);
    }
}
