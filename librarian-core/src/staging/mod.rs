//! `StagerTask` (§4.6): copies catalog files onto a local-disk staging area
//! for direct user access, then hands ownership to the requesting user.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;

use crate::catalog::CatalogBackend;
use crate::error::{LibrarianError, Result};
use crate::tasks::{Task, WorkOutcome};

const SENTINEL_IN_PROGRESS: &str = "STAGING-IN-PROGRESS";
const SENTINEL_SUCCEEDED: &str = "STAGING-SUCCEEDED";
const SENTINEL_ERRORS: &str = "STAGING-ERRORS";

/// One file to place under the staging destination, named relative to its
/// originating store (§4.6 `(store_prefix, parent_dirs, name)`).
#[derive(Debug, Clone)]
pub struct StageItem {
    pub store_prefix: PathBuf,
    pub parent_dirs: String,
    pub name: String,
}

impl StageItem {
    fn source_path(&self) -> PathBuf {
        self.store_prefix.join(&self.parent_dirs).join(&self.name)
    }

    fn dest_path(&self, dest: &Path) -> PathBuf {
        dest.join(&self.parent_dirs).join(&self.name)
    }
}

#[derive(Debug, Clone, Serialize)]
struct Failure {
    path: String,
    message: String,
}

/// Claims the destination directory's `STAGING-IN-PROGRESS` sentinel,
/// clearing any stale result sentinels left by a previous run (§4.6).
///
/// Must run before the task is submitted to the task manager: the lock is
/// acquired synchronously on the calling request thread so a second stage
/// request to the same destination fails fast with `Conflict` instead of
/// racing inside the worker pool.
pub fn claim_destination(dest: &Path) -> Result<()> {
    use std::fs::OpenOptions;

    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest.join(SENTINEL_IN_PROGRESS))
    {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(LibrarianError::Conflict(format!(
                "a staging operation into directory {} is already in progress",
                dest.display()
            )));
        }
        Err(e) => return Err(LibrarianError::Internal(e.to_string())),
    }

    for name in [SENTINEL_SUCCEEDED, SENTINEL_ERRORS] {
        match std::fs::remove_file(dest.join(name)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(LibrarianError::Internal(e.to_string())),
        }
    }

    Ok(())
}

pub struct StagerTask {
    pub dest: PathBuf,
    pub items: Vec<StageItem>,
    pub user: String,
    pub chown_command: Vec<String>,
}

#[async_trait]
impl Task for StagerTask {
    fn description(&self) -> String {
        format!("stage {} files to {}", self.items.len(), self.dest.display())
    }

    async fn work(&self) -> WorkOutcome {
        let mut failures = Vec::new();

        for item in &self.items {
            let source = item.source_path();
            let dest = item.dest_path(&self.dest);
            if let Some(parent) = dest.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    failures.push(Failure {
                        path: parent.display().to_string(),
                        message: e.to_string(),
                    });
                    continue;
                }
            }
            if let Err(e) = copy_file_tree(&source, &dest) {
                failures.push(Failure {
                    path: dest.display().to_string(),
                    message: e.to_string(),
                });
            }
        }

        if !failures.is_empty() {
            return WorkOutcome::Err(
                serde_json::to_string(&failures).unwrap_or_else(|_| "staging failed".into()),
            );
        }

        let mut argv = self.chown_command.clone();
        argv.extend([
            "-u".to_string(),
            self.user.clone(),
            "-R".to_string(),
            "-d".to_string(),
            self.dest.display().to_string(),
        ]);
        let Some((program, args)) = argv.split_first() else {
            return WorkOutcome::Err("chown_command is empty".into());
        };
        match Command::new(program).args(args).output().await {
            Ok(output) if output.status.success() => WorkOutcome::Ok(serde_json::json!({})),
            Ok(output) => WorkOutcome::Err(format!(
                "chown exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )),
            Err(e) => WorkOutcome::Err(format!("failed to run chown: {e}")),
        }
    }

    async fn wrapup(&self, outcome: &WorkOutcome, _catalog: &dyn CatalogBackend) {
        let result = match outcome {
            WorkOutcome::Ok(_) => {
                std::fs::write(self.dest.join(SENTINEL_SUCCEEDED), chrono::Utc::now().to_rfc3339())
            }
            WorkOutcome::Err(message) => {
                std::fs::write(self.dest.join(SENTINEL_ERRORS), message)
            }
        };
        if let Err(e) = result {
            tracing::error!(error = %e, dest = %self.dest.display(), "failed to write staging result sentinel");
        }

        if let Err(e) = std::fs::remove_file(self.dest.join(SENTINEL_IN_PROGRESS)) {
            tracing::error!(error = %e, dest = %self.dest.display(), "couldn't remove staging-in-progress indicator");
        }
    }
}

/// Recursively copy a file or directory tree. Catalog entries are almost
/// always single files, but some instrument outputs are directory-shaped.
fn copy_file_tree(source: &Path, dest: &Path) -> io::Result<()> {
    let metadata = std::fs::metadata(source)?;
    if metadata.is_dir() {
        std::fs::create_dir_all(dest)?;
        for entry in std::fs::read_dir(source)? {
            let entry = entry?;
            copy_file_tree(&entry.path(), &dest.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        std::fs::copy(source, dest).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::InMemoryCatalog;

    #[test]
    fn claim_destination_rejects_concurrent_stage() {
        let dir = tempfile::tempdir().unwrap();
        claim_destination(dir.path()).unwrap();
        let err = claim_destination(dir.path()).unwrap_err();
        assert!(matches!(err, LibrarianError::Conflict(_)));
    }

    #[test]
    fn claim_destination_clears_stale_result_sentinels() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SENTINEL_SUCCEEDED), "old").unwrap();
        claim_destination(dir.path()).unwrap();
        assert!(!dir.path().join(SENTINEL_SUCCEEDED).exists());
        assert!(dir.path().join(SENTINEL_IN_PROGRESS).exists());
    }

    #[tokio::test]
    async fn successful_stage_writes_succeeded_sentinel_and_copies_file() {
        let store = tempfile::tempdir().unwrap();
        std::fs::write(store.path().join("zen.uv"), b"data").unwrap();
        let dest = tempfile::tempdir().unwrap();
        claim_destination(dest.path()).unwrap();

        let task = StagerTask {
            dest: dest.path().to_path_buf(),
            items: vec![StageItem {
                store_prefix: store.path().to_path_buf(),
                parent_dirs: String::new(),
                name: "zen.uv".into(),
            }],
            user: "alice".into(),
            chown_command: vec!["true".into()],
        };

        let catalog = InMemoryCatalog::new();
        let outcome = task.work().await;
        assert!(outcome.is_ok());
        task.wrapup(&outcome, &catalog).await;

        assert!(dest.path().join("zen.uv").exists());
        assert!(dest.path().join(SENTINEL_SUCCEEDED).exists());
        assert!(!dest.path().join(SENTINEL_IN_PROGRESS).exists());
    }

    #[tokio::test]
    async fn missing_source_file_is_reported_in_errors_sentinel() {
        let dest = tempfile::tempdir().unwrap();
        claim_destination(dest.path()).unwrap();

        let task = StagerTask {
            dest: dest.path().to_path_buf(),
            items: vec![StageItem {
                store_prefix: PathBuf::from("/nonexistent"),
                parent_dirs: String::new(),
                name: "missing.uv".into(),
            }],
            user: "alice".into(),
            chown_command: vec!["true".into()],
        };

        let catalog = InMemoryCatalog::new();
        let outcome = task.work().await;
        assert!(!outcome.is_ok());
        task.wrapup(&outcome, &catalog).await;

        assert!(dest.path().join(SENTINEL_ERRORS).exists());
        assert!(!dest.path().join(SENTINEL_IN_PROGRESS).exists());
    }
}
