//! Cross-process advisory lock on the context directory
//!
//! The lock is a marker file holding a JSON [`LockInfo`]. It is created
//! atomically with its full content (temp file linked into place without
//! clobbering), so a reader never sees a half-written marker. A marker
//! older than the staleness threshold is treated as abandoned and may be
//! reclaimed; reclamation is serialized through an `fs2` flock on a
//! sibling `.guard` file so two processes cannot both remove and replace
//! the same stale marker.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use libctxsync_core::io::atomic_write;

use crate::error::LockError;

/// Default age after which a marker is considered abandoned
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30);

/// Default interval between acquisition attempts
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Contents of the lock marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub agent_id: String,
    pub pid: u32,
    /// Acquisition time (Unix timestamp in ms)
    pub acquired_at: u64,
}

impl LockInfo {
    pub fn age_ms(&self) -> u64 {
        now_ms().saturating_sub(self.acquired_at)
    }
}

/// Outcome of one acquisition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAttempt {
    Acquired {
        info: LockInfo,
        /// An abandoned marker was removed to get here
        recovered_stale: bool,
    },
    Held {
        /// `None` when the marker could not be decoded
        holder: Option<LockInfo>,
    },
}

impl LockAttempt {
    pub fn is_acquired(&self) -> bool {
        matches!(self, LockAttempt::Acquired { .. })
    }
}

/// Snapshot of the lock as seen by this process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockStatus {
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder: Option<LockInfo>,
    pub is_own: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_ms: Option<u64>,
    pub stale: bool,
}

/// A marker as read from disk
struct Observed {
    raw: Vec<u8>,
    info: Option<LockInfo>,
    age_ms: u64,
}

/// File-based lock shared by every process working on one project
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
    guard_path: PathBuf,
    agent_id: String,
    pid: u32,
    stale_after: Duration,
    retry_interval: Duration,
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>, agent_id: impl Into<String>) -> Self {
        let path = path.into();
        let mut guard = path.clone().into_os_string();
        guard.push(".guard");
        Self {
            path,
            guard_path: PathBuf::from(guard),
            agent_id: agent_id.into(),
            pid: std::process::id(),
            stale_after: DEFAULT_STALE_AFTER,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Try once to take the lock.
    ///
    /// A stale marker is removed and creation retried once.
    pub fn try_acquire(&self) -> Result<LockAttempt, LockError> {
        if let Some(info) = self.create_marker()? {
            debug!(agent = %self.agent_id, path = %self.path.display(), "lock acquired");
            return Ok(LockAttempt::Acquired {
                info,
                recovered_stale: false,
            });
        }

        let observed = match self.observe()? {
            Some(o) => o,
            // Released between our create and our read
            None => {
                return Ok(match self.create_marker()? {
                    Some(info) => LockAttempt::Acquired {
                        info,
                        recovered_stale: false,
                    },
                    None => LockAttempt::Held {
                        holder: self.holder()?,
                    },
                })
            }
        };

        if !self.is_stale_age(observed.age_ms) {
            return Ok(LockAttempt::Held {
                holder: observed.info,
            });
        }

        let removed = self.remove_if_unchanged(&observed)?;
        if removed {
            warn!(
                agent = %self.agent_id,
                stale_holder = observed.info.as_ref().map(|i| i.agent_id.as_str()).unwrap_or("unknown"),
                age_ms = observed.age_ms,
                "recovered stale lock"
            );
        }

        match self.create_marker()? {
            Some(info) => Ok(LockAttempt::Acquired {
                info,
                recovered_stale: removed,
            }),
            None => Ok(LockAttempt::Held {
                holder: self.holder()?,
            }),
        }
    }

    /// Poll [`try_acquire`](Self::try_acquire) until it succeeds or `timeout` elapses.
    ///
    /// On timeout the last observed holder is returned as `Held`.
    pub fn acquire(&self, timeout: Duration, retry_interval: Duration) -> Result<LockAttempt, LockError> {
        let start = Instant::now();
        loop {
            match self.try_acquire()? {
                acquired @ LockAttempt::Acquired { .. } => return Ok(acquired),
                held @ LockAttempt::Held { .. } => {
                    let elapsed = start.elapsed();
                    if elapsed >= timeout {
                        return Ok(held);
                    }
                    std::thread::sleep(retry_interval.min(timeout - elapsed));
                }
            }
        }
    }

    /// Remove our marker. Absent marker is success.
    pub fn release(&self) -> Result<(), LockError> {
        let _guard = self.guard()?;
        let Some(observed) = self.observe()? else {
            return Ok(());
        };
        let owned = observed.info.as_ref().is_some_and(|i| self.owns(i));
        if owned || self.is_stale_age(observed.age_ms) {
            remove_marker(&self.path)?;
            debug!(agent = %self.agent_id, "lock released");
            Ok(())
        } else {
            Err(LockError::NotOwned {
                holder: observed.info,
            })
        }
    }

    /// Remove the marker whoever holds it
    pub fn force_release(&self) -> Result<Option<LockInfo>, LockError> {
        let _guard = self.guard()?;
        let holder = self.observe()?.and_then(|o| o.info);
        remove_marker(&self.path)?;
        if let Some(h) = &holder {
            warn!(agent = %self.agent_id, holder = %h.agent_id, pid = h.pid, "lock force-released");
        }
        Ok(holder)
    }

    /// Re-stamp our marker so it does not go stale during long work
    pub fn refresh(&self) -> Result<LockInfo, LockError> {
        let _guard = self.guard()?;
        let holder = self.observe()?.and_then(|o| o.info);
        match holder {
            Some(info) if self.owns(&info) => {
                let fresh = LockInfo {
                    acquired_at: now_ms(),
                    ..info
                };
                atomic_write(&self.path, &serde_json::to_vec(&fresh)?)?;
                Ok(fresh)
            }
            holder => Err(LockError::NotOwned { holder }),
        }
    }

    /// Current holder, if the marker exists and decodes
    pub fn holder(&self) -> Result<Option<LockInfo>, LockError> {
        Ok(self.observe()?.and_then(|o| o.info))
    }

    pub fn status(&self) -> Result<LockStatus, LockError> {
        Ok(match self.observe()? {
            None => LockStatus {
                locked: false,
                holder: None,
                is_own: false,
                age_ms: None,
                stale: false,
            },
            Some(o) => LockStatus {
                locked: true,
                is_own: o.info.as_ref().is_some_and(|i| self.owns(i)),
                stale: self.is_stale_age(o.age_ms),
                age_ms: Some(o.age_ms),
                holder: o.info,
            },
        })
    }

    /// Whether this process and agent hold the lock
    pub fn is_own_lock(&self) -> Result<bool, LockError> {
        Ok(self.holder()?.is_some_and(|i| self.owns(&i)))
    }

    /// Run `f` while holding the lock.
    ///
    /// The lock is released on every exit path, including panics in `f`.
    pub fn with_lock<T, E, F>(&self, timeout: Duration, f: F) -> Result<T, E>
    where
        E: From<LockError>,
        F: FnOnce() -> Result<T, E>,
    {
        let start = Instant::now();
        match self.acquire(timeout, self.retry_interval)? {
            LockAttempt::Acquired { .. } => {}
            LockAttempt::Held { holder } => {
                return Err(LockError::Timeout {
                    holder,
                    waited_ms: start.elapsed().as_millis() as u64,
                }
                .into())
            }
        }
        let _release = ReleaseOnDrop(self);
        f()
    }

    fn owns(&self, info: &LockInfo) -> bool {
        info.pid == self.pid && info.agent_id == self.agent_id
    }

    fn is_stale_age(&self, age_ms: u64) -> bool {
        age_ms >= self.stale_after.as_millis() as u64
    }

    /// Create the marker if absent; `None` when it already exists
    fn create_marker(&self) -> Result<Option<LockInfo>, LockError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let info = LockInfo {
            agent_id: self.agent_id.clone(),
            pid: self.pid,
            acquired_at: now_ms(),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&serde_json::to_vec(&info)?)?;
        tmp.as_file().sync_all()?;

        match tmp.persist_noclobber(&self.path) {
            Ok(_) => Ok(Some(info)),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(LockError::Persist(e)),
        }
    }

    fn observe(&self) -> Result<Option<Observed>, LockError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let info: Option<LockInfo> = serde_json::from_slice(&raw).ok();
        let age_ms = match &info {
            Some(i) => i.age_ms(),
            None => {
                // Unreadable marker: fall back to file age
                let modified = match fs::metadata(&self.path).and_then(|m| m.modified()) {
                    Ok(m) => m,
                    Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                    Err(e) => return Err(e.into()),
                };
                modified.elapsed().map(|d| d.as_millis() as u64).unwrap_or(0)
            }
        };
        Ok(Some(Observed { raw, info, age_ms }))
    }

    /// Remove the stale marker only if it is still the one we observed
    fn remove_if_unchanged(&self, observed: &Observed) -> Result<bool, LockError> {
        let _guard = self.guard()?;
        match fs::read(&self.path) {
            Ok(current) if current == observed.raw => {
                remove_marker(&self.path)?;
                Ok(true)
            }
            Ok(_) => Ok(false),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn guard(&self) -> Result<GuardFile, LockError> {
        if let Some(dir) = self.guard_path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.guard_path)?;
        file.lock_exclusive()?;
        Ok(GuardFile(file))
    }
}

/// Exclusive flock held until drop
struct GuardFile(File);

impl Drop for GuardFile {
    fn drop(&mut self) {
        let _ = self.0.unlock();
    }
}

struct ReleaseOnDrop<'a>(&'a FileLock);

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.0.release() {
            warn!(agent = %self.0.agent_id, error = %e, "failed to release lock");
        }
    }
}

fn remove_marker(path: &Path) -> Result<(), LockError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lock_in(dir: &TempDir, agent: &str) -> FileLock {
        FileLock::new(dir.path().join("context.lock"), agent)
    }

    fn write_marker(path: &Path, info: &LockInfo) {
        std::fs::write(path, serde_json::to_vec(info).unwrap()).unwrap();
    }

    #[test]
    fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let lock = lock_in(&dir, "claude");

        let attempt = lock.try_acquire().unwrap();
        assert!(attempt.is_acquired());
        assert!(lock.is_own_lock().unwrap());

        let status = lock.status().unwrap();
        assert!(status.locked);
        assert!(status.is_own);
        assert!(!status.stale);
        assert_eq!(status.holder.unwrap().agent_id, "claude");

        lock.release().unwrap();
        assert!(!lock.status().unwrap().locked);
        // Idempotent
        lock.release().unwrap();
    }

    #[test]
    fn test_second_agent_sees_holder() {
        let dir = TempDir::new().unwrap();
        let a = lock_in(&dir, "claude");
        let b = lock_in(&dir, "cursor");

        assert!(a.try_acquire().unwrap().is_acquired());
        match b.try_acquire().unwrap() {
            LockAttempt::Held { holder } => assert_eq!(holder.unwrap().agent_id, "claude"),
            other => panic!("expected Held, got {:?}", other),
        }
        assert!(!b.is_own_lock().unwrap());
    }

    #[test]
    fn test_release_refuses_foreign_lock() {
        let dir = TempDir::new().unwrap();
        let a = lock_in(&dir, "claude");
        let b = lock_in(&dir, "cursor");
        a.try_acquire().unwrap();

        let err = b.release().unwrap_err();
        assert!(matches!(err, LockError::NotOwned { .. }));
        assert!(a.is_own_lock().unwrap());

        let holder = b.force_release().unwrap();
        assert_eq!(holder.unwrap().agent_id, "claude");
        assert!(!a.status().unwrap().locked);
    }

    #[test]
    fn test_stale_lock_is_recovered() {
        let dir = TempDir::new().unwrap();
        let lock = lock_in(&dir, "cursor").with_stale_after(Duration::from_millis(1_000));
        write_marker(
            lock.path(),
            &LockInfo {
                agent_id: "crashed".into(),
                pid: 999_999,
                acquired_at: now_ms() - 60_000,
            },
        );

        assert!(lock.status().unwrap().stale);
        match lock.try_acquire().unwrap() {
            LockAttempt::Acquired { info, recovered_stale } => {
                assert!(recovered_stale);
                assert_eq!(info.agent_id, "cursor");
            }
            other => panic!("expected Acquired, got {:?}", other),
        }
    }

    #[test]
    fn test_corrupt_marker_uses_mtime() {
        let dir = TempDir::new().unwrap();
        let lock = lock_in(&dir, "cursor");
        std::fs::write(lock.path(), b"not json").unwrap();

        // Fresh file, so it is treated as live
        match lock.try_acquire().unwrap() {
            LockAttempt::Held { holder } => assert!(holder.is_none()),
            other => panic!("expected Held, got {:?}", other),
        }

        let lenient = lock_in(&dir, "cursor").with_stale_after(Duration::ZERO);
        assert!(lenient.try_acquire().unwrap().is_acquired());
    }

    #[test]
    fn test_acquire_times_out_with_holder() {
        let dir = TempDir::new().unwrap();
        let a = lock_in(&dir, "claude");
        let b = lock_in(&dir, "cursor");
        a.try_acquire().unwrap();

        let start = Instant::now();
        let attempt = b
            .acquire(Duration::from_millis(150), Duration::from_millis(20))
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(150));
        assert_eq!(
            attempt,
            LockAttempt::Held {
                holder: a.holder().unwrap()
            }
        );
    }

    #[test]
    fn test_with_lock_releases_on_error() {
        let dir = TempDir::new().unwrap();
        let lock = lock_in(&dir, "claude");

        let result: Result<(), LockError> = lock.with_lock(Duration::from_millis(100), || {
            assert!(lock.is_own_lock().unwrap());
            Err(LockError::Corrupt("boom".into()))
        });
        assert!(matches!(result, Err(LockError::Corrupt(_))));
        assert!(!lock.status().unwrap().locked);

        let value: Result<u32, LockError> = lock.with_lock(Duration::from_millis(100), || Ok(7));
        assert_eq!(value.unwrap(), 7);
        assert!(!lock.status().unwrap().locked);
    }

    #[test]
    fn test_with_lock_timeout_reports_holder() {
        let dir = TempDir::new().unwrap();
        let a = lock_in(&dir, "claude");
        let b = lock_in(&dir, "cursor").with_retry_interval(Duration::from_millis(10));
        a.try_acquire().unwrap();

        let result: Result<(), LockError> = b.with_lock(Duration::from_millis(50), || Ok(()));
        match result {
            Err(LockError::Timeout { holder, .. }) => assert_eq!(holder.unwrap().agent_id, "claude"),
            other => panic!("expected Timeout, got {:?}", other),
        }
        // The holder's lock is untouched
        assert!(a.is_own_lock().unwrap());
    }

    #[test]
    fn test_refresh_restamps_own_lock() {
        let dir = TempDir::new().unwrap();
        let a = lock_in(&dir, "claude");
        let b = lock_in(&dir, "cursor");
        a.try_acquire().unwrap();

        let refreshed = a.refresh().unwrap();
        assert_eq!(refreshed.agent_id, "claude");
        assert!(matches!(b.refresh(), Err(LockError::NotOwned { .. })));
    }
}
