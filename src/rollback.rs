//! Manifest-driven rollback: reverse the recorded actions of an
//! executed run.
//!
//! Entries are replayed in reverse order. Each entry is verified
//! before any mutation: the destination must still exist and its
//! checksum must match what was recorded. Entries that cannot be
//! safely reversed are reported and skipped; rollback continues with
//! the rest.

use crate::executor::{LockError, RunLock};
use crate::manifest::{
    ManifestEntry, ManifestError, ManifestStatus, RunMode, file_checksum, load_manifest,
    save_manifest,
};
use crate::plan::ActionKind;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Errors that prevent rollback from starting at all. Per-entry
/// failures are collected in the [`RollbackReport`] instead.
#[derive(Debug)]
pub enum RollbackError {
    /// The manifest could not be loaded or is invalid.
    Manifest(ManifestError),
    /// Another rollback or run holds the lock on this manifest.
    Lock(LockError),
    /// The manifest records a run that never touched the filesystem.
    NotExecutable { path: PathBuf, mode: RunMode },
}

impl std::fmt::Display for RollbackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RollbackError::Manifest(e) => write!(f, "{}", e),
            RollbackError::Lock(e) => write!(f, "{}", e),
            RollbackError::NotExecutable { path, mode } => {
                write!(
                    f,
                    "Manifest {} records a {} run; there is nothing to roll back",
                    path.display(),
                    mode.as_str()
                )
            }
        }
    }
}

impl std::error::Error for RollbackError {}

impl From<ManifestError> for RollbackError {
    fn from(e: ManifestError) -> Self {
        RollbackError::Manifest(e)
    }
}

impl From<LockError> for RollbackError {
    fn from(e: LockError) -> Self {
        RollbackError::Lock(e)
    }
}

/// Outcome of a rollback run.
#[derive(Debug, Default)]
pub struct RollbackReport {
    /// Entries successfully reversed.
    pub restored: usize,
    /// The manifest was already marked rolled back; nothing was done.
    pub already_rolled_back: bool,
    /// Entries that needed no work: the destination is gone and the
    /// source path already holds the recorded content.
    pub skipped: Vec<(PathBuf, String)>,
    /// Entries that could not be reversed; the file was not restored.
    pub failed: Vec<(PathBuf, String)>,
}

impl RollbackReport {
    /// True when every entry was reversed (or there was nothing to do).
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Why a single entry was not actively reversed.
enum EntryFailure {
    /// Nothing to do; the file is already back at its source path.
    Skipped(PathBuf, String),
    /// Unsafe or impossible to reverse; the file was not restored.
    Failed(PathBuf, String),
}

/// Replays a manifest's actions in reverse.
pub struct RollbackEngine;

impl RollbackEngine {
    /// Rolls back the run recorded in `manifest_path`.
    ///
    /// With `dry_run` set, entries are verified and the report filled
    /// in, but nothing on disk changes and the manifest keeps its
    /// status.
    pub fn rollback(manifest_path: &Path, dry_run: bool) -> Result<RollbackReport, RollbackError> {
        // Lock before reading: the status check below decides whether
        // anything happens, so it must not race a concurrent rollback.
        let _lock = RunLock::acquire(&lock_path_for(manifest_path))?;

        let mut manifest = load_manifest(manifest_path)?;

        if manifest.mode != RunMode::Executed {
            return Err(RollbackError::NotExecutable {
                path: manifest_path.to_path_buf(),
                mode: manifest.mode,
            });
        }

        if manifest.status == ManifestStatus::RolledBack {
            return Ok(RollbackReport {
                already_rolled_back: true,
                ..RollbackReport::default()
            });
        }

        let mut report = RollbackReport::default();
        for entry in manifest.entries.iter().rev() {
            match Self::restore_entry(entry, dry_run) {
                Ok(()) => report.restored += 1,
                Err(EntryFailure::Skipped(path, reason)) => report.skipped.push((path, reason)),
                Err(EntryFailure::Failed(path, reason)) => report.failed.push((path, reason)),
            }
        }

        // Only a fully reversed manifest is marked (skipped entries are
        // already back at their source); a partial rollback must stay
        // replayable for the remaining entries.
        if !dry_run && report.failed.is_empty() {
            manifest.status = ManifestStatus::RolledBack;
            if let Err(e) = save_manifest(manifest_path, &manifest) {
                eprintln!("Warning: Could not mark manifest as rolled back: {}", e);
            }
        }

        Ok(report)
    }

    /// Reverses a single entry, verifying checksums first.
    ///
    /// A move is reversed by moving the destination file back to its
    /// recorded source path; a copy is reversed by deleting the
    /// destination copy. The source path is never overwritten with
    /// different content.
    fn restore_entry(entry: &ManifestEntry, dry_run: bool) -> Result<(), EntryFailure> {
        if !entry.destination.exists() {
            // A vanished destination is only benign when the file is
            // demonstrably back at its source path (a rerun after a
            // partial rollback). Anything else means the file is lost
            // and must fail the entry.
            let already_restored = match &entry.checksum {
                Some(expected) => {
                    file_checksum(&entry.source).is_ok_and(|actual| actual == *expected)
                }
                None => entry.source.exists(),
            };
            if already_restored {
                return Err(EntryFailure::Skipped(
                    entry.destination.clone(),
                    "Source path already holds the recorded content".to_string(),
                ));
            }
            return Err(EntryFailure::Failed(
                entry.destination.clone(),
                "File not found at recorded destination and source was not restored".to_string(),
            ));
        }

        if let Some(expected) = &entry.checksum {
            let actual = file_checksum(&entry.destination).map_err(|e| {
                EntryFailure::Failed(
                    entry.destination.clone(),
                    format!("Could not checksum destination: {}", e),
                )
            })?;
            if actual != *expected {
                return Err(EntryFailure::Failed(
                    entry.destination.clone(),
                    format!(
                        "Checksum mismatch at destination (expected {}, found {}); file was modified after the run",
                        expected, actual
                    ),
                ));
            }
        }

        match entry.kind {
            ActionKind::Move => Self::restore_move(entry, dry_run),
            ActionKind::Copy => Self::restore_copy(entry, dry_run),
        }
    }

    fn restore_move(entry: &ManifestEntry, dry_run: bool) -> Result<(), EntryFailure> {
        if entry.source.exists() {
            // Occupied by identical content means the file is already
            // back; drop the stray destination copy. Different content
            // is never overwritten.
            let same = match (&entry.checksum, file_checksum(&entry.source)) {
                (Some(expected), Ok(actual)) => actual == *expected,
                _ => false,
            };
            if !same {
                return Err(EntryFailure::Failed(
                    entry.source.clone(),
                    "Source path is occupied by different content; not overwriting".to_string(),
                ));
            }
            if !dry_run {
                fs::remove_file(&entry.destination).map_err(|e| {
                    EntryFailure::Failed(
                        entry.destination.clone(),
                        format!("Failed to remove duplicate destination: {}", e),
                    )
                })?;
            }
            return Ok(());
        }

        if dry_run {
            return Ok(());
        }

        if let Some(parent) = entry.source.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EntryFailure::Failed(
                    entry.source.clone(),
                    format!("Could not recreate source directory: {}", e),
                )
            })?;
        }

        fs::rename(&entry.destination, &entry.source).map_err(|e| {
            EntryFailure::Failed(
                entry.destination.clone(),
                format!("Failed to restore file: {}", e),
            )
        })
    }

    fn restore_copy(entry: &ManifestEntry, dry_run: bool) -> Result<(), EntryFailure> {
        if dry_run {
            return Ok(());
        }

        if !entry.source.exists() {
            // The original vanished since the run; moving the copy
            // back preserves the data instead of deleting the last one.
            if let Some(parent) = entry.source.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    EntryFailure::Failed(
                        entry.source.clone(),
                        format!("Could not recreate source directory: {}", e),
                    )
                })?;
            }
            return fs::rename(&entry.destination, &entry.source).map_err(|e| {
                EntryFailure::Failed(
                    entry.destination.clone(),
                    format!("Failed to restore file: {}", e),
                )
            });
        }

        fs::remove_file(&entry.destination).map_err(|e| {
            EntryFailure::Failed(
                entry.destination.clone(),
                format!("Failed to remove copied file: {}", e),
            )
        })
    }
}

/// Lock file placed beside the manifest being replayed.
fn lock_path_for(manifest_path: &Path) -> PathBuf {
    let mut os: OsString = manifest_path.as_os_str().to_os_string();
    os.push(".lock");
    PathBuf::from(os)
}
