//! Run manifests: the persisted, versioned record of planned or
//! executed actions.
//!
//! A manifest is an append-only event log with a fixed schema version.
//! During execution the file on disk is rewritten after every
//! appended entry, so a crash loses at most the single in-flight
//! action; everything recorded before it stays reversible.

use crate::plan::ActionKind;
use crate::signature::{MatchKind, MatchMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// Current manifest schema version.
pub const MANIFEST_VERSION: u32 = 1;

/// What kind of run produced the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Plan only, nothing persisted (a dry-run manifest is never
    /// written to disk; the variant exists for completeness).
    DryRun,
    /// Plan persisted, zero filesystem mutation.
    ReportOnly,
    /// Actions applied and recorded as they complete.
    Executed,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::DryRun => "dry-run",
            RunMode::ReportOnly => "report-only",
            RunMode::Executed => "executed",
        }
    }
}

/// Lifecycle marker of a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestStatus {
    /// Entries are still being appended.
    InProgress,
    /// The run finished; all planned actions are recorded.
    Completed,
    /// The run aborted mid-way; recorded entries remain valid and
    /// rollback-eligible.
    PartiallyFailed,
    /// Every recorded action has been reversed.
    RolledBack,
}

/// One recorded action. Entry order equals physical application order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub seq: usize,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub group: String,
    pub kind: ActionKind,
    /// SHA-256 of the file content at action time; absent for
    /// report-only manifests where nothing was touched.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub checksum: Option<String>,
}

/// Versioned record of a classification run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub mode: RunMode,
    pub match_mode: MatchMode,
    pub match_kind: MatchKind,
    pub source_root: PathBuf,
    pub dest_root: PathBuf,
    pub status: ManifestStatus,
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(
        mode: RunMode,
        match_mode: MatchMode,
        match_kind: MatchKind,
        source_root: &Path,
        dest_root: &Path,
    ) -> Self {
        Self {
            version: MANIFEST_VERSION,
            created_at: Utc::now(),
            mode,
            match_mode,
            match_kind,
            source_root: source_root.to_path_buf(),
            dest_root: dest_root.to_path_buf(),
            status: ManifestStatus::InProgress,
            entries: Vec::new(),
        }
    }
}

/// Errors raised while reading or writing manifests.
#[derive(Debug)]
pub enum ManifestError {
    /// Manifest file not found.
    NotFound(PathBuf),
    /// Failed to write the manifest file.
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to read the manifest file.
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The file is not a valid manifest.
    InvalidFormat { path: PathBuf, reason: String },
    /// The manifest was written by an incompatible schema version.
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        supported: u32,
    },
}

impl std::fmt::Display for ManifestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestError::NotFound(path) => {
                write!(f, "Manifest {} not found", path.display())
            }
            ManifestError::WriteFailed { path, source } => {
                write!(f, "Failed to write manifest {}: {}", path.display(), source)
            }
            ManifestError::ReadFailed { path, source } => {
                write!(f, "Failed to read manifest {}: {}", path.display(), source)
            }
            ManifestError::InvalidFormat { path, reason } => {
                write!(f, "Invalid manifest {}: {}", path.display(), reason)
            }
            ManifestError::UnsupportedVersion {
                path,
                found,
                supported,
            } => {
                write!(
                    f,
                    "Manifest {} has schema version {} but this build supports version {}",
                    path.display(),
                    found,
                    supported
                )
            }
        }
    }
}

impl std::error::Error for ManifestError {}

/// Persists a manifest incrementally during a run.
pub struct ManifestWriter {
    path: PathBuf,
    manifest: Manifest,
}

impl ManifestWriter {
    /// Creates the manifest file inside `dir` and persists the initial
    /// (empty) state. File name carries a millisecond timestamp:
    /// `manifest_20250101_120000123.json`.
    pub fn create(dir: &Path, manifest: Manifest) -> Result<Self, ManifestError> {
        fs::create_dir_all(dir).map_err(|e| ManifestError::WriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let stamp = manifest.created_at.format("%Y%m%d_%H%M%S%3f");
        let path = dir.join(format!("manifest_{}.json", stamp));

        let writer = Self { path, manifest };
        writer.persist()?;
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Appends an entry and rewrites the file before returning, so the
    /// on-disk manifest always reflects every completed action.
    pub fn append(&mut self, entry: ManifestEntry) -> Result<(), ManifestError> {
        self.manifest.entries.push(entry);
        self.persist()
    }

    /// Marks the run's final status and persists it.
    pub fn finalize(&mut self, status: ManifestStatus) -> Result<(), ManifestError> {
        self.manifest.status = status;
        self.persist()
    }

    fn persist(&self) -> Result<(), ManifestError> {
        save_manifest(&self.path, &self.manifest)
    }
}

/// Loads and validates a manifest file.
pub fn load_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    if !path.exists() {
        return Err(ManifestError::NotFound(path.to_path_buf()));
    }

    let content = fs::read_to_string(path).map_err(|e| ManifestError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let manifest: Manifest =
        serde_json::from_str(&content).map_err(|e| ManifestError::InvalidFormat {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if manifest.version != MANIFEST_VERSION {
        return Err(ManifestError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: manifest.version,
            supported: MANIFEST_VERSION,
        });
    }

    Ok(manifest)
}

/// Writes a manifest as pretty-printed JSON.
pub fn save_manifest(path: &Path, manifest: &Manifest) -> Result<(), ManifestError> {
    let json =
        serde_json::to_string_pretty(manifest).map_err(|e| ManifestError::InvalidFormat {
            path: path.to_path_buf(),
            reason: format!("JSON serialization failed: {}", e),
        })?;

    fs::write(path, json).map_err(|e| ManifestError::WriteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Hex SHA-256 of a file's content.
pub fn file_checksum(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
