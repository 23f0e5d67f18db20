//! Git-backed snapshot store
//!
//! All git interaction shells out to the system `git` binary. The contract
//! that matters: staging writes are per-device and atomic, the commit is a
//! single-writer critical section performed once per run after all results
//! are known, and a run with zero changed files produces no commit at all.

use super::Snapshot;
use crate::managers::report::RunReport;
use crate::utils::command;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Commit author recorded on every snapshot commit.
const AUTHOR_NAME: &str = "netstash";
const AUTHOR_EMAIL: &str = "netstash@localhost";

const GIT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("repository error: {0}")]
    Repository(String),

    #[error("failed to write snapshot for '{device}': {source}")]
    Write {
        device: String,
        #[source]
        source: std::io::Error,
    },
}

/// Version-controlled working tree rooted at the configured backup dir.
pub struct GitStore {
    root: PathBuf,
}

impl GitStore {
    /// Open the backup directory, initializing a git repository if none
    /// exists yet. Any failure here is fatal to the run (pre-dispatch).
    pub async fn open_or_init(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();

        std::fs::create_dir_all(&root)
            .map_err(|e| StoreError::Repository(format!("cannot create {:?}: {}", root, e)))?;

        if root.join(".git").is_dir() {
            debug!("Reading existing repository at {:?}", root);
        } else {
            info!("No repository at {:?}, running git init", root);
            git(&root, &["init", "--quiet"]).await?;
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stable working-tree path for one device's snapshot.
    pub fn snapshot_path(&self, platform: &str, device_id: &str) -> PathBuf {
        self.root
            .join("configs")
            .join(platform)
            .join(format!("{}.cfg", device_id))
    }

    /// Write (or overwrite) one device's snapshot file in the working tree.
    ///
    /// Write-then-rename, so a crash mid-write never leaves a torn file.
    /// Only called for successful backups; failed devices keep whatever a
    /// prior run committed.
    pub async fn stage(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let path = self.snapshot_path(snapshot.platform.as_str(), &snapshot.device_id);
        let wrap = |source| StoreError::Write {
            device: snapshot.device_id.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(wrap)?;
        }

        let tmp = path.with_extension("cfg.tmp");
        tokio::fs::write(&tmp, &snapshot.content).await.map_err(wrap)?;
        tokio::fs::rename(&tmp, &path).await.map_err(wrap)?;

        debug!(
            "Staged snapshot for '{}' ({} bytes, {})",
            snapshot.device_id,
            snapshot.content.len(),
            &snapshot.content_hash[..12]
        );
        Ok(())
    }

    /// Paths that differ from HEAD (modified or untracked), per
    /// `git status --porcelain`.
    ///
    /// `-uall` lists untracked files individually instead of collapsing
    /// them into their directory; `-z` turns off path quoting, so device
    /// ids with spaces or non-ASCII come through verbatim.
    pub async fn changed_paths(&self) -> Result<Vec<String>, StoreError> {
        let output = git(&self.root, &["status", "--porcelain", "-uall", "-z"]).await?;
        Ok(output
            .split('\0')
            .filter(|entry| entry.len() > 3)
            .map(|entry| entry[3..].to_string())
            .collect())
    }

    /// Create the single run commit covering every changed file.
    ///
    /// Returns the changed paths, empty when nothing changed — in that case
    /// no commit is made (content-addressed idempotence: unchanged devices
    /// cost nothing).
    pub async fn commit_run(&self, report: &RunReport) -> Result<Vec<String>, StoreError> {
        let changed = self.changed_paths().await?;
        if changed.is_empty() {
            info!("No configuration changes; skipping commit");
            return Ok(changed);
        }

        git(&self.root, &["add", "--all"]).await?;

        let message = format!(
            "Backup run {}: {}",
            report.run_id,
            report.summary_line()
        );
        git(
            &self.root,
            &[
                "-c",
                &format!("user.name={}", AUTHOR_NAME),
                "-c",
                &format!("user.email={}", AUTHOR_EMAIL),
                "commit",
                "--quiet",
                "-m",
                &message,
            ],
        )
        .await?;

        info!("Committed {} changed file(s): {}", changed.len(), message);
        Ok(changed)
    }

    /// Recent commit history, optionally narrowed to one device's file.
    /// A repository with no commits yet has empty history, not an error.
    pub async fn history(
        &self,
        platform_and_device: Option<(&str, &str)>,
        limit: usize,
    ) -> Result<String, StoreError> {
        // git log exits 128 before the first commit
        let has_head = command::run_command_succeeds(
            "git",
            &["rev-parse", "--verify", "--quiet", "HEAD"],
            Some(&self.root),
            Some(GIT_TIMEOUT),
        )
        .await
        .map_err(|e| StoreError::Repository(e.to_string()))?;
        if !has_head {
            return Ok(String::new());
        }

        let limit = format!("-{}", limit);
        let path = platform_and_device
            .map(|(platform, device_id)| format!("configs/{}/{}.cfg", platform, device_id));

        let mut args = vec!["log", "--oneline", limit.as_str()];
        if let Some(path) = path.as_deref() {
            args.push("--");
            args.push(path);
        }

        git(&self.root, &args).await
    }
}

async fn git(root: &Path, args: &[&str]) -> Result<String, StoreError> {
    command::run_command_stdout("git", args, &[], Some(root), Some(GIT_TIMEOUT))
        .await
        .map_err(|e| StoreError::Repository(e.to_string()))
}
