//! Plan execution with append-as-you-go manifest recording.
//!
//! Actions are applied strictly in sequence order. Each completed
//! action is recorded in the manifest before the next one starts, so a
//! mid-run failure loses at most the single in-flight action and
//! everything before it stays rollback-consistent.

use crate::manifest::{ManifestEntry, ManifestError, ManifestStatus, ManifestWriter, file_checksum};
use crate::plan::{ActionKind, Plan, PlannedAction};
use indicatif::ProgressBar;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Lock file name placed in the destination root for the duration of
/// an execution run.
pub const LOCK_FILE_NAME: &str = ".csvtidy.lock";

/// Errors acquiring the exclusive run lock.
#[derive(Debug)]
pub enum LockError {
    /// Another run holds the lock.
    Held(PathBuf),
    /// The lock file could not be created for other reasons.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockError::Held(path) => {
                write!(
                    f,
                    "Lock file {} already exists; another run may be in progress (delete it if stale)",
                    path.display()
                )
            }
            LockError::Io { path, source } => {
                write!(f, "Failed to create lock file {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for LockError {}

/// An exclusive lock backed by a `create_new` lock file; released when
/// dropped. Prevents two runs from writing overlapping manifests or
/// racing on the same destination tree.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| LockError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    LockError::Held(path.to_path_buf())
                } else {
                    LockError::Io {
                        path: path.to_path_buf(),
                        source: e,
                    }
                }
            })?;

        // Record the owning pid for stale-lock diagnosis.
        let _ = write!(file, "{}", std::process::id());

        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            eprintln!(
                "Warning: Could not remove lock file {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

/// Errors raised during plan execution.
#[derive(Debug)]
pub enum ExecuteError {
    /// Manifest infrastructure failure; the run cannot proceed safely.
    Manifest(ManifestError),
    /// A copy/move failed; remaining actions were aborted. All prior
    /// actions stay recorded in the manifest.
    ActionFailed {
        seq: usize,
        source: PathBuf,
        destination: PathBuf,
        reason: String,
        /// Actions that completed (and were recorded) before the failure.
        completed: usize,
    },
}

impl std::fmt::Display for ExecuteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecuteError::Manifest(e) => write!(f, "{}", e),
            ExecuteError::ActionFailed {
                seq,
                source,
                destination,
                reason,
                completed,
            } => {
                write!(
                    f,
                    "Action #{} failed ({} -> {}): {}; {} prior action(s) completed and remain recorded",
                    seq,
                    source.display(),
                    destination.display(),
                    reason,
                    completed
                )
            }
        }
    }
}

impl std::error::Error for ExecuteError {}

impl From<ManifestError> for ExecuteError {
    fn from(e: ManifestError) -> Self {
        ExecuteError::Manifest(e)
    }
}

/// Summary of a fully successful execution.
#[derive(Debug)]
pub struct ExecutionReport {
    pub completed: usize,
    pub manifest_path: PathBuf,
}

/// Applies a plan to the filesystem.
pub struct Executor;

impl Executor {
    /// Applies every action in sequence order, appending a manifest
    /// entry after each completed action.
    ///
    /// On the first failing action the remaining ones are aborted, the
    /// manifest is finalized as partially failed, and an
    /// [`ExecuteError::ActionFailed`] is returned.
    pub fn execute(
        plan: &Plan,
        writer: &mut ManifestWriter,
        progress: &ProgressBar,
    ) -> Result<ExecutionReport, ExecuteError> {
        let mut completed = 0usize;

        for action in &plan.actions {
            if let Err(reason) = Self::apply_action(action) {
                Self::finalize_quietly(writer, ManifestStatus::PartiallyFailed);
                return Err(ExecuteError::ActionFailed {
                    seq: action.seq,
                    source: action.source.clone(),
                    destination: action.destination.clone(),
                    reason,
                    completed,
                });
            }

            let checksum = match file_checksum(&action.destination) {
                Ok(sum) => Some(sum),
                Err(e) => {
                    Self::finalize_quietly(writer, ManifestStatus::PartiallyFailed);
                    return Err(ExecuteError::ActionFailed {
                        seq: action.seq,
                        source: action.source.clone(),
                        destination: action.destination.clone(),
                        reason: format!("checksum failed after {}: {}", action.kind.as_str(), e),
                        completed,
                    });
                }
            };

            writer.append(ManifestEntry {
                seq: action.seq,
                source: action.source.clone(),
                destination: action.destination.clone(),
                group: action.group.clone(),
                kind: action.kind,
                checksum,
            })?;

            completed += 1;
            progress.inc(1);
        }

        writer.finalize(ManifestStatus::Completed)?;

        Ok(ExecutionReport {
            completed,
            manifest_path: writer.path().to_path_buf(),
        })
    }

    /// Performs the copy or move for a single action.
    fn apply_action(action: &PlannedAction) -> Result<(), String> {
        let parent = action
            .destination
            .parent()
            .ok_or_else(|| "destination has no parent directory".to_string())?;
        fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create {}: {}", parent.display(), e))?;

        match action.kind {
            ActionKind::Copy => {
                fs::copy(&action.source, &action.destination)
                    .map_err(|e| format!("copy failed: {}", e))?;
            }
            ActionKind::Move => {
                // rename does not cross filesystems; fall back to
                // copy-then-remove when it fails that way.
                if fs::rename(&action.source, &action.destination).is_err() {
                    fs::copy(&action.source, &action.destination)
                        .map_err(|e| format!("move failed: {}", e))?;
                    fs::remove_file(&action.source)
                        .map_err(|e| format!("failed to remove source after copy: {}", e))?;
                }
            }
        }

        Ok(())
    }

    fn finalize_quietly(writer: &mut ManifestWriter, status: ManifestStatus) {
        if let Err(e) = writer.finalize(status) {
            eprintln!("Warning: Could not finalize manifest: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Manifest, RunMode, load_manifest};
    use crate::signature::{MatchKind, MatchMode};
    use std::path::Path;
    use tempfile::TempDir;

    fn make_plan(actions: Vec<(PathBuf, PathBuf, &str, ActionKind)>) -> Plan {
        Plan {
            actions: actions
                .into_iter()
                .enumerate()
                .map(|(seq, (source, destination, group, kind))| PlannedAction {
                    seq,
                    source,
                    destination,
                    group: group.to_string(),
                    kind,
                })
                .collect(),
        }
    }

    fn make_writer(dest: &Path, source: &Path) -> ManifestWriter {
        let manifest = Manifest::new(
            RunMode::Executed,
            MatchMode::Strict,
            MatchKind::Exact,
            source,
            dest,
        );
        ManifestWriter::create(dest, manifest).expect("Failed to create manifest writer")
    }

    #[test]
    fn test_execute_moves_files_and_records_entries() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let source = dir.path().join("src");
        let dest = dir.path().join("dest");
        fs::create_dir_all(&source).expect("mkdir failed");

        let file = source.join("a.csv");
        fs::write(&file, "id,name\n1,x\n").expect("write failed");

        let plan = make_plan(vec![(
            file.clone(),
            dest.join("users").join("a.csv"),
            "users",
            ActionKind::Move,
        )]);
        let mut writer = make_writer(&dest, &source);

        let report = Executor::execute(&plan, &mut writer, &ProgressBar::hidden())
            .expect("execute failed");

        assert_eq!(report.completed, 1);
        assert!(!file.exists());
        assert!(dest.join("users").join("a.csv").exists());

        let manifest = load_manifest(&report.manifest_path).expect("load failed");
        assert_eq!(manifest.entries.len(), 1);
        assert_eq!(manifest.status, ManifestStatus::Completed);
        assert!(manifest.entries[0].checksum.is_some());
    }

    #[test]
    fn test_execute_copy_keeps_source() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let source = dir.path().join("src");
        let dest = dir.path().join("dest");
        fs::create_dir_all(&source).expect("mkdir failed");

        let file = source.join("a.csv");
        fs::write(&file, "id\n1\n").expect("write failed");

        let plan = make_plan(vec![(
            file.clone(),
            dest.join("g").join("a.csv"),
            "g",
            ActionKind::Copy,
        )]);
        let mut writer = make_writer(&dest, &source);

        Executor::execute(&plan, &mut writer, &ProgressBar::hidden()).expect("execute failed");

        assert!(file.exists());
        assert!(dest.join("g").join("a.csv").exists());
    }

    #[test]
    fn test_execute_aborts_on_failure_but_keeps_prior_entries() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let source = dir.path().join("src");
        let dest = dir.path().join("dest");
        fs::create_dir_all(&source).expect("mkdir failed");

        let good = source.join("a.csv");
        fs::write(&good, "id\n1\n").expect("write failed");
        let missing = source.join("gone.csv");
        let also_good = source.join("z.csv");
        fs::write(&also_good, "id\n2\n").expect("write failed");

        let plan = make_plan(vec![
            (good.clone(), dest.join("g").join("a.csv"), "g", ActionKind::Move),
            (missing.clone(), dest.join("g").join("gone.csv"), "g", ActionKind::Move),
            (also_good.clone(), dest.join("g").join("z.csv"), "g", ActionKind::Move),
        ]);
        let mut writer = make_writer(&dest, &source);

        let err = Executor::execute(&plan, &mut writer, &ProgressBar::hidden()).unwrap_err();
        match err {
            ExecuteError::ActionFailed { seq, completed, .. } => {
                assert_eq!(seq, 1);
                assert_eq!(completed, 1);
            }
            other => panic!("Expected ActionFailed, got {:?}", other),
        }

        // The third action never ran.
        assert!(also_good.exists());
        assert!(!dest.join("g").join("z.csv").exists());

        let manifest = load_manifest(writer.path()).expect("load failed");
        assert_eq!(manifest.entries.len(), 1);
        assert_eq!(manifest.status, ManifestStatus::PartiallyFailed);
    }

    #[test]
    fn test_run_lock_is_exclusive() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let lock_path = dir.path().join(LOCK_FILE_NAME);

        let lock = RunLock::acquire(&lock_path).expect("first acquire failed");
        let second = RunLock::acquire(&lock_path);
        assert!(matches!(second, Err(LockError::Held(_))));

        drop(lock);
        let third = RunLock::acquire(&lock_path);
        assert!(third.is_ok());
    }
}
