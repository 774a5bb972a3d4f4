//! Working-tree restoration from a snapshot archive.
//!
//! [`TreeRestorer`] is the seam the orchestrator talks to. The shipped
//! implementation, [`GitTreeRestorer`], treats an archive as a git bundle that
//! contains the snapshot tree and drives the `git` CLI:
//!
//! 1. `git add -A` + `git write-tree` to capture the current tree
//! 2. `git fetch <bundle>` to bring in the snapshot objects
//! 3. `git read-tree -u --reset <tree>` to materialize the snapshot
//! 4. `git write-tree` to confirm the result matches the snapshot hash
//!
//! The index is saved before step 1. If steps 2-4 fail, the captured tree is
//! materialized again and the saved index written back before the error is
//! returned, so a failed restore leaves both the files and the staging area
//! as it found them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::errors::RestoreError;
use crate::snapshot::TreeSnapshotEvent;

/// Trees on either side of a successful restore.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestoreOutcome {
    /// Tree captured before restoring. Used to roll back.
    pub previous_tree: String,
    /// Tree now in the working directory: the new baseline.
    pub new_tree: String,
    /// Raw git index from before the restore. `None` when there was none.
    pub previous_index: Option<Vec<u8>>,
}

/// Materializes a working tree to a snapshot.
#[async_trait]
pub trait TreeRestorer: Send + Sync {
    /// Restore the working tree to `snapshot`.
    ///
    /// On error, any partial change has already been undone.
    async fn restore(&self, snapshot: &TreeSnapshotEvent) -> Result<RestoreOutcome, RestoreError>;

    /// Put back the tree that was present before `outcome` was produced.
    async fn rollback(&self, outcome: &RestoreOutcome) -> Result<(), RestoreError>;
}

/// Resolves an archive reference to a local file.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    /// Local path of the archive.
    async fn fetch(&self, archive: &str) -> Result<PathBuf, RestoreError>;
}

/// Archives that already live on the local filesystem (plain paths or
/// `file://` URLs).
#[derive(Clone, Debug, Default)]
pub struct LocalArchiveFetcher;

#[async_trait]
impl ArchiveFetcher for LocalArchiveFetcher {
    async fn fetch(&self, archive: &str) -> Result<PathBuf, RestoreError> {
        let path = PathBuf::from(archive.strip_prefix("file://").unwrap_or(archive));
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(RestoreError::Fetch {
                archive: archive.to_owned(),
                message: "not a regular file".into(),
            }),
            Err(err) => Err(RestoreError::Fetch {
                archive: archive.to_owned(),
                message: err.to_string(),
            }),
        }
    }
}

/// Git-backed [`TreeRestorer`].
pub struct GitTreeRestorer {
    git: String,
    workdir: PathBuf,
    fetcher: Arc<dyn ArchiveFetcher>,
}

impl GitTreeRestorer {
    /// Restorer for the repository at `workdir`, using the `git` on `PATH`.
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            git: "git".into(),
            workdir: workdir.into(),
            fetcher: Arc::new(LocalArchiveFetcher),
        }
    }

    /// Use a specific git executable.
    #[must_use]
    pub fn with_git_binary(mut self, git: impl Into<String>) -> Self {
        self.git = git.into();
        self
    }

    /// Use a different archive fetcher.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ArchiveFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Working tree this restorer operates on.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    async fn git(&self, args: &[&str]) -> Result<String, RestoreError> {
        debug!(args = ?args, "running git");
        let output = Command::new(&self.git)
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .await?;
        if !output.status.success() {
            return Err(RestoreError::Git {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }

    async fn index_path(&self) -> Result<PathBuf, RestoreError> {
        let raw = PathBuf::from(self.git(&["rev-parse", "--git-path", "index"]).await?);
        if raw.is_absolute() {
            Ok(raw)
        } else {
            Ok(self.workdir.join(raw))
        }
    }

    async fn save_index(&self) -> Result<Option<Vec<u8>>, RestoreError> {
        let path = self.index_path().await?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(RestoreError::Index { path, source }),
        }
    }

    async fn write_index(&self, saved: Option<&[u8]>) -> Result<(), RestoreError> {
        let path = self.index_path().await?;
        let written = match saved {
            Some(bytes) => tokio::fs::write(&path, bytes).await,
            None => match tokio::fs::remove_file(&path).await {
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        written.map_err(|source| RestoreError::Index { path, source })
    }

    /// Materialize `tree` and put the saved index back.
    async fn reinstate(&self, tree: &str, saved_index: Option<&[u8]>) -> Result<(), RestoreError> {
        self.materialize(tree).await?;
        self.write_index(saved_index).await
    }

    async fn capture_tree(&self) -> Result<String, RestoreError> {
        let _ = self.git(&["add", "-A"]).await?;
        self.git(&["write-tree"]).await
    }

    async fn materialize(&self, tree: &str) -> Result<(), RestoreError> {
        let _ = self.git(&["read-tree", "-u", "--reset", tree]).await?;
        Ok(())
    }

    async fn apply_archive(&self, archive: &str, tree_hash: &str) -> Result<String, RestoreError> {
        let mut bundle = self.fetcher.fetch(archive).await?;
        // a leading dash would be read as an option
        if bundle.is_relative() {
            bundle = Path::new(".").join(bundle);
        }
        let bundle = bundle.to_string_lossy();
        let _ = self.git(&["fetch", "--quiet", &*bundle]).await?;
        self.materialize(tree_hash).await?;
        let actual = self.git(&["write-tree"]).await?;
        if !actual.eq_ignore_ascii_case(tree_hash) {
            return Err(RestoreError::TreeMismatch {
                expected: tree_hash.to_owned(),
                actual,
            });
        }
        Ok(actual)
    }
}

#[async_trait]
impl TreeRestorer for GitTreeRestorer {
    #[instrument(skip(self, snapshot), fields(tree_hash = %snapshot.tree_hash))]
    async fn restore(&self, snapshot: &TreeSnapshotEvent) -> Result<RestoreOutcome, RestoreError> {
        let archive = snapshot
            .archive
            .as_deref()
            .ok_or_else(|| RestoreError::MissingArchive {
                tree_hash: snapshot.tree_hash.clone(),
            })?;
        if !is_object_id(&snapshot.tree_hash) {
            return Err(RestoreError::InvalidTreeHash {
                tree_hash: snapshot.tree_hash.clone(),
            });
        }

        let previous_index = self.save_index().await?;
        let previous_tree = match self.capture_tree().await {
            Ok(tree) => tree,
            Err(err) => {
                if let Err(undo) = self.write_index(previous_index.as_deref()).await {
                    warn!(error = %undo, "failed to put back git index");
                }
                return Err(err);
            }
        };
        match self.apply_archive(archive, &snapshot.tree_hash).await {
            Ok(new_tree) => Ok(RestoreOutcome {
                previous_tree,
                new_tree,
                previous_index,
            }),
            Err(err) => {
                if let Err(undo) = self.reinstate(&previous_tree, previous_index.as_deref()).await {
                    warn!(previous_tree = %previous_tree, error = %undo, "failed to undo partial restore");
                }
                Err(err)
            }
        }
    }

    async fn rollback(&self, outcome: &RestoreOutcome) -> Result<(), RestoreError> {
        self.reinstate(&outcome.previous_tree, outcome.previous_index.as_deref())
            .await
    }
}

/// Full SHA-1 or SHA-256 object id in hex.
fn is_object_id(hash: &str) -> bool {
    matches!(hash.len(), 40 | 64) && hash.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Best-effort apply. Failures are logged with the snapshot's tree hash and
/// reported as `None`; they never propagate.
pub async fn apply_snapshot(
    restorer: &dyn TreeRestorer,
    snapshot: &TreeSnapshotEvent,
) -> Option<RestoreOutcome> {
    match restorer.restore(snapshot).await {
        Ok(outcome) => {
            info!(tree_hash = %snapshot.tree_hash, "working tree restored from snapshot");
            Some(outcome)
        }
        Err(err) => {
            warn!(tree_hash = %snapshot.tree_hash, error = %err, "snapshot restore failed, continuing without it");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::process::Command as StdCommand;

    use super::*;
    use assert_matches::assert_matches;
    use rewind_core::logging::capture_logs;

    fn git_available() -> bool {
        StdCommand::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn git(dir: &Path, args: &[&str]) -> String {
        let out = StdCommand::new("git")
            .args(["-c", "user.name=test", "-c", "user.email=test@example.com"])
            .args(["-c", "commit.gpgsign=false"])
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(
            out.status.success(),
            "git {args:?}: {}",
            String::from_utf8_lossy(&out.stderr)
        );
        String::from_utf8_lossy(&out.stdout).trim().to_owned()
    }

    /// Repo with one commit, a bundle of it, and the commit's tree hash.
    fn snapshot_repo(root: &Path) -> (PathBuf, String) {
        let src = root.join("src");
        std::fs::create_dir_all(&src).unwrap();
        let _ = git(&src, &["init", "--quiet"]);
        std::fs::write(src.join("a.txt"), "snapshot\n").unwrap();
        std::fs::write(src.join("keep.txt"), "kept\n").unwrap();
        let _ = git(&src, &["add", "-A"]);
        let _ = git(&src, &["commit", "--quiet", "-m", "snap"]);
        let tree = git(&src, &["rev-parse", "HEAD^{tree}"]);
        let bundle = root.join("snap.bundle");
        let bundle_path = bundle.display().to_string();
        let _ = git(&src, &["bundle", "create", bundle_path.as_str(), "HEAD"]);
        (bundle, tree)
    }

    /// Repo with a committed `a.txt` edited locally and an untracked file.
    fn work_repo(root: &Path) -> PathBuf {
        let work = root.join("work");
        std::fs::create_dir_all(&work).unwrap();
        let _ = git(&work, &["init", "--quiet"]);
        std::fs::write(work.join("a.txt"), "base\n").unwrap();
        let _ = git(&work, &["add", "a.txt"]);
        let _ = git(&work, &["commit", "--quiet", "-m", "base"]);
        std::fs::write(work.join("a.txt"), "local edit\n").unwrap();
        std::fs::write(work.join("scratch.txt"), "scratch\n").unwrap();
        work
    }

    fn status(work: &Path) -> String {
        git(work, &["status", "--porcelain"])
    }

    fn snapshot(tree: &str, archive: Option<&Path>) -> TreeSnapshotEvent {
        TreeSnapshotEvent {
            tree_hash: tree.to_owned(),
            archive: archive.map(|p| p.display().to_string()),
            changes: Vec::new(),
            interrupted: true,
        }
    }

    fn read(path: &Path) -> Option<String> {
        std::fs::read_to_string(path).ok()
    }

    struct FailingRestorer;

    #[async_trait]
    impl TreeRestorer for FailingRestorer {
        async fn restore(&self, _: &TreeSnapshotEvent) -> Result<RestoreOutcome, RestoreError> {
            Err(RestoreError::Fetch {
                archive: "s3://bucket/snap".into(),
                message: "connection reset".into(),
            })
        }

        async fn rollback(&self, _: &RestoreOutcome) -> Result<(), RestoreError> {
            Ok(())
        }
    }

    // ── LocalArchiveFetcher ──

    #[tokio::test]
    async fn local_fetcher_resolves_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.bundle");
        std::fs::write(&file, "x").unwrap();
        let url = format!("file://{}", file.display());
        assert_eq!(LocalArchiveFetcher.fetch(&url).await.unwrap(), file);
    }

    #[tokio::test]
    async fn local_fetcher_rejects_missing_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert_matches!(
            LocalArchiveFetcher
                .fetch(&dir.path().join("nope").display().to_string())
                .await,
            Err(RestoreError::Fetch { .. })
        );
        assert_matches!(
            LocalArchiveFetcher
                .fetch(&dir.path().display().to_string())
                .await,
            Err(RestoreError::Fetch { .. })
        );
    }

    // ── apply_snapshot ──

    #[tokio::test]
    async fn apply_failure_is_logged_with_tree_hash() {
        let (logs, _guard) = capture_logs();
        let result = apply_snapshot(&FailingRestorer, &snapshot("deadbeef", None)).await;
        assert_eq!(result, None);
        let event = logs
            .find(tracing::Level::WARN, "snapshot restore failed")
            .unwrap();
        assert_eq!(event.field("tree_hash"), Some("deadbeef"));
    }

    // ── GitTreeRestorer ──

    #[tokio::test]
    async fn missing_archive_is_rejected_before_touching_tree() {
        let dir = tempfile::tempdir().unwrap();
        let restorer = GitTreeRestorer::new(dir.path());
        assert_matches!(
            restorer.restore(&snapshot("abc", None)).await,
            Err(RestoreError::MissingArchive { .. })
        );
    }

    #[tokio::test]
    async fn restores_and_rolls_back() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let (bundle, tree) = snapshot_repo(dir.path());
        let work = work_repo(dir.path());
        let before = status(&work);
        let restorer = GitTreeRestorer::new(&work);

        let outcome = restorer
            .restore(&snapshot(&tree, Some(&bundle)))
            .await
            .unwrap();
        assert_eq!(outcome.new_tree, tree);
        assert_ne!(outcome.previous_tree, tree);
        assert_eq!(read(&work.join("a.txt")).as_deref(), Some("snapshot\n"));
        assert_eq!(read(&work.join("keep.txt")).as_deref(), Some("kept\n"));
        assert_eq!(read(&work.join("scratch.txt")), None);

        restorer.rollback(&outcome).await.unwrap();
        assert_eq!(read(&work.join("a.txt")).as_deref(), Some("local edit\n"));
        assert_eq!(read(&work.join("scratch.txt")).as_deref(), Some("scratch\n"));
        assert_eq!(read(&work.join("keep.txt")), None);
        assert_eq!(status(&work), before);
    }

    #[tokio::test]
    async fn failed_restore_leaves_tree_untouched() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let (bundle, _tree) = snapshot_repo(dir.path());
        let work = work_repo(dir.path());
        let before = status(&work);
        // leading status column is lost to trim
        assert_eq!(before, "M a.txt\n?? scratch.txt");
        let restorer = GitTreeRestorer::new(&work);

        let bogus = "0123456789abcdef0123456789abcdef01234567";
        assert_matches!(
            restorer.restore(&snapshot(bogus, Some(&bundle))).await,
            Err(RestoreError::Git { .. })
        );
        assert_eq!(read(&work.join("a.txt")).as_deref(), Some("local edit\n"));
        assert_eq!(read(&work.join("scratch.txt")).as_deref(), Some("scratch\n"));
        assert_eq!(status(&work), before);
    }

    #[tokio::test]
    async fn unreadable_bundle_keeps_index_intact() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let work = work_repo(dir.path());
        let before = status(&work);
        let bundle = dir.path().join("garbage.bundle");
        std::fs::write(&bundle, "not a bundle").unwrap();
        let restorer = GitTreeRestorer::new(&work);

        let hash = "0123456789abcdef0123456789abcdef01234567";
        assert_matches!(
            restorer.restore(&snapshot(hash, Some(&bundle))).await,
            Err(RestoreError::Git { .. })
        );
        assert_eq!(status(&work), before);
    }

    #[tokio::test]
    async fn tree_hash_must_be_an_object_id() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("snap.bundle");
        std::fs::write(&bundle, "x").unwrap();
        let restorer = GitTreeRestorer::new(dir.path()).with_git_binary("/nonexistent/git-binary");
        let not_hex = "g".repeat(40);
        for hash in ["--upload-pack=touch pwned", "abc", not_hex.as_str()] {
            assert_matches!(
                restorer.restore(&snapshot(hash, Some(&bundle))).await,
                Err(RestoreError::InvalidTreeHash { .. })
            );
        }
        assert!(is_object_id(&"a".repeat(40)));
        assert!(is_object_id(&"F".repeat(64)));
    }

    #[tokio::test]
    async fn missing_git_binary_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("snap.bundle");
        std::fs::write(&bundle, "x").unwrap();
        let restorer = GitTreeRestorer::new(dir.path()).with_git_binary("/nonexistent/git-binary");
        assert_matches!(
            restorer
                .restore(&snapshot(&"a".repeat(40), Some(&bundle)))
                .await,
            Err(RestoreError::Spawn(_))
        );
    }
}
