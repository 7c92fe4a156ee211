use std::path::PathBuf;
use std::time::Duration;

use git2::Repository;
use tracing::debug;

use super::Watcher;
use crate::event::SyncEvent;

/// Emits when `HEAD` moves to a different commit.
///
/// The first observation is a baseline and never emits.
pub struct GitCommitWatcher {
    repo_path: PathBuf,
    period: Duration,
    timeout: Duration,
    last: Option<String>,
    initialized: bool,
}

impl GitCommitWatcher {
    pub fn new(repo_path: impl Into<PathBuf>, period: Duration, timeout: Duration) -> Self {
        Self {
            repo_path: repo_path.into(),
            period,
            timeout,
            last: None,
            initialized: false,
        }
    }
}

/// Current `HEAD` commit id, or `None` outside a repository or before the first commit
pub fn head_commit(repo_path: &std::path::Path) -> Option<String> {
    let repo = Repository::discover(repo_path).ok()?;
    let head = repo.head().ok()?;
    let commit = head.peel_to_commit().ok()?;
    Some(commit.id().to_string())
}

impl Watcher for GitCommitWatcher {
    fn name(&self) -> &'static str {
        "git_commit"
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn poll(&mut self) -> Option<SyncEvent> {
        let path = self.repo_path.clone();
        let lookup = tokio::task::spawn_blocking(move || head_commit(&path));
        let head = match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(head)) => head,
            Ok(Err(e)) => {
                debug!(error = %e, "HEAD lookup failed");
                return None;
            }
            Err(_) => {
                debug!("HEAD lookup timed out");
                return None;
            }
        };

        if !self.initialized {
            self.initialized = true;
            self.last = head;
            return None;
        }

        match head {
            Some(hash) if self.last.as_deref() != Some(hash.as_str()) => {
                let previous = self.last.replace(hash.clone());
                Some(SyncEvent::git_commit(hash, previous))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventDetails;
    use tempfile::TempDir;

    fn commit(repo: &Repository, message: &str) -> git2::Oid {
        let sig = git2::Signature::now("Test", "test@example.com").unwrap();
        let tree_id = repo.index().unwrap().write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let parents: Vec<git2::Commit> = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .unwrap()
    }

    #[tokio::test]
    async fn test_emits_on_new_commit_only() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let first = commit(&repo, "initial");

        let mut w = GitCommitWatcher::new(dir.path(), Duration::from_millis(10), Duration::from_secs(5));
        assert!(w.poll().await.is_none());
        assert!(w.poll().await.is_none());

        let second = commit(&repo, "second");
        let event = w.poll().await.unwrap();
        assert_eq!(
            event.details,
            EventDetails::GitCommit {
                hash: second.to_string(),
                previous: Some(first.to_string()),
            }
        );
        assert!(w.poll().await.is_none());
    }

    #[tokio::test]
    async fn test_outside_repository_is_quiet() {
        let dir = TempDir::new().unwrap();
        let mut w = GitCommitWatcher::new(dir.path(), Duration::from_millis(10), Duration::from_secs(5));
        assert!(w.poll().await.is_none());
        assert!(w.poll().await.is_none());
        assert_eq!(head_commit(dir.path()), None);
    }
}
