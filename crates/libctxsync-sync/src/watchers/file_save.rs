use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use glob::Pattern;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::Watcher;
use crate::event::SyncEvent;

/// Emits one batched `FileSave` after saves stop for the debounce period.
///
/// A file counts as saved when its mtime moved and its content hash
/// changed. The first scan only records a baseline.
pub struct FileSaveWatcher {
    scanner: Arc<Mutex<Scanner>>,
    period: Duration,
    debounce: Duration,
    pending: BTreeSet<String>,
    last_change: Option<Instant>,
}

impl FileSaveWatcher {
    pub fn new(
        root: impl Into<PathBuf>,
        watch_patterns: &[String],
        ignore_patterns: &[String],
        period: Duration,
        debounce: Duration,
    ) -> Self {
        let scanner = Scanner {
            root: root.into(),
            include: compile(watch_patterns),
            ignore: compile(ignore_patterns),
            ignore_dirs: compile(
                &ignore_patterns
                    .iter()
                    .filter_map(|p| p.strip_suffix("/**").map(str::to_string))
                    .collect::<Vec<_>>(),
            ),
            known: HashMap::new(),
            initialized: false,
        };
        Self {
            scanner: Arc::new(Mutex::new(scanner)),
            period,
            debounce,
            pending: BTreeSet::new(),
            last_change: None,
        }
    }
}

impl Watcher for FileSaveWatcher {
    fn name(&self) -> &'static str {
        "file_save"
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn poll(&mut self) -> Option<SyncEvent> {
        let scanner = Arc::clone(&self.scanner);
        let changed = tokio::task::spawn_blocking(move || {
            let mut scanner = scanner.lock().unwrap_or_else(|e| e.into_inner());
            scanner.scan()
        })
        .await;

        match changed {
            Ok(changed) if !changed.is_empty() => {
                debug!(count = changed.len(), "files changed");
                self.pending.extend(changed);
                self.last_change = Some(Instant::now());
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "file scan failed"),
        }

        let quiet = self
            .last_change
            .is_some_and(|at| at.elapsed() >= self.debounce);
        if quiet && !self.pending.is_empty() {
            self.last_change = None;
            let files: Vec<String> = std::mem::take(&mut self.pending).into_iter().collect();
            return Some(SyncEvent::file_save(files));
        }
        None
    }
}

struct Scanner {
    root: PathBuf,
    include: Vec<Pattern>,
    ignore: Vec<Pattern>,
    ignore_dirs: Vec<Pattern>,
    /// Relative path -> (mtime, content hash)
    known: HashMap<String, (SystemTime, String)>,
    initialized: bool,
}

impl Scanner {
    /// Walk the tree; returns files whose content changed since the last scan
    fn scan(&mut self) -> Vec<String> {
        let mut seen = Vec::new();
        self.walk(&self.root, &mut seen);

        let mut changed = Vec::new();
        let mut present = HashMap::with_capacity(seen.len());
        for (rel, path, mtime) in seen {
            let unchanged_mtime = self.known.get(&rel).is_some_and(|(m, _)| *m == mtime);
            if unchanged_mtime {
                if let Some(entry) = self.known.remove(&rel) {
                    present.insert(rel, entry);
                }
                continue;
            }
            let Some(hash) = hash_file(&path) else {
                continue;
            };
            let content_changed = self.known.get(&rel).map_or(true, |(_, h)| *h != hash);
            if self.initialized && content_changed {
                changed.push(rel.clone());
            }
            present.insert(rel, (mtime, hash));
        }
        // Deleted files drop out of the baseline
        self.known = present;
        self.initialized = true;
        changed
    }

    fn walk(&self, dir: &Path, out: &mut Vec<(String, PathBuf, SystemTime)>) {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(rel) = self.relative(&path) else {
                continue;
            };
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                if !self.ignore_dirs.iter().any(|p| p.matches(&rel)) {
                    self.walk(&path, out);
                }
            } else if file_type.is_file() {
                if self.ignore.iter().any(|p| p.matches(&rel)) {
                    continue;
                }
                if !self.include.iter().any(|p| p.matches(&rel)) {
                    continue;
                }
                if let Ok(mtime) = entry.metadata().and_then(|m| m.modified()) {
                    out.push((rel, path, mtime));
                }
            }
        }
    }

    fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = rel.components().map(|c| c.as_os_str().to_string_lossy()).collect();
        Some(parts.join("/"))
    }
}

fn compile(patterns: &[String]) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|p| match Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!(pattern = %p, error = %e, "ignoring invalid glob pattern");
                None
            }
        })
        .collect()
}

fn hash_file(path: &Path) -> Option<String> {
    let mut file = fs::File::open(path).ok()?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).ok()?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Some(hex::encode(hasher.finalize()))
}
