//! Signature registry and scan filter configuration.
//!
//! Configuration is stored in TOML. Signatures are declared as an
//! array of tables so that declaration order is preserved; the matcher
//! uses that order to break ties between equal-rank matches.
//!
//! # Configuration File Format
//!
//! ```toml
//! [options]
//! mode = "strict"        # strict | relaxed
//! match = "exact"        # exact | contains
//!
//! [filters]
//! exclude = ["*_backup.csv"]
//!
//! [[signature]]
//! group = "users"
//! columns = ["id", "name"]
//! match = "contains"     # optional per-signature override
//! mode = "relaxed"       # optional per-signature override
//! ```

use crate::header::{NormalizeOptions, normalize_header};
use crate::signature::{MatchKind, MatchMode, SignatureRegistry, canonicalize, hash_columns};
use glob::Pattern;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Errors that can occur while loading or validating configuration.
/// All of them fail the run before any filesystem mutation.
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    ConfigNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    ConfigInvalid(String),
    /// Invalid glob pattern in the filter section.
    InvalidGlobPattern(String),
    /// Two signatures declared with the same group name.
    DuplicateGroup(String),
    /// Two signatures with identical canonical columns under the same
    /// mode; matching between them would be ambiguous.
    DuplicateSignature { group: String, earlier: String },
    /// A signature whose column list is empty after normalization.
    EmptyColumns(String),
    /// IO error while reading configuration.
    IoError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ConfigNotFound(path) => {
                write!(f, "Configuration file not found: {}", path.display())
            }
            ConfigError::ConfigInvalid(msg) => write!(f, "Invalid configuration: {}", msg),
            ConfigError::InvalidGlobPattern(pattern) => {
                write!(f, "Invalid glob pattern '{}' in filters.exclude", pattern)
            }
            ConfigError::DuplicateGroup(group) => {
                write!(f, "Signature group '{}' is declared more than once", group)
            }
            ConfigError::DuplicateSignature { group, earlier } => {
                write!(
                    f,
                    "Signature '{}' has the same canonical columns as earlier signature '{}'",
                    group, earlier
                )
            }
            ConfigError::EmptyColumns(group) => {
                write!(f, "Signature '{}' has no usable columns", group)
            }
            ConfigError::IoError(msg) => write!(f, "IO error reading configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Top-level classification configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassifyConfig {
    #[serde(default)]
    pub options: Options,

    #[serde(default)]
    pub filters: Filters,

    /// Declared signatures, in declaration order.
    #[serde(default, rename = "signature")]
    pub signatures: Vec<SignatureDecl>,
}

/// Default matching options; overridden by command-line flags.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Options {
    pub mode: Option<MatchMode>,

    #[serde(rename = "match")]
    pub match_kind: Option<MatchKind>,
}

/// Scan filtering rules.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Filters {
    /// Glob patterns for files to skip during scanning.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// One declared signature: a destination group and its expected columns.
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureDecl {
    pub group: String,
    pub columns: Vec<String>,

    /// Per-signature mode override.
    pub mode: Option<MatchMode>,

    /// Per-signature match-kind override.
    #[serde(rename = "match")]
    pub match_kind: Option<MatchKind>,
}

impl ClassifyConfig {
    /// Load configuration from a specific file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// Builds the signature registry, validating declarations.
    ///
    /// Column names go through the same normalization as file headers
    /// so that configured signatures and scanned headers compare under
    /// identical rules.
    pub fn build_registry(
        &self,
        default_mode: MatchMode,
        default_kind: MatchKind,
        normalize: &NormalizeOptions,
    ) -> Result<SignatureRegistry, ConfigError> {
        let mut registry = SignatureRegistry::new();
        let mut seen_groups: HashSet<&str> = HashSet::new();
        let mut seen_hashes: HashMap<(MatchMode, String), &str> = HashMap::new();

        for decl in &self.signatures {
            if !seen_groups.insert(decl.group.as_str()) {
                return Err(ConfigError::DuplicateGroup(decl.group.clone()));
            }

            let mode = decl.mode.unwrap_or(default_mode);
            let kind = decl.match_kind.unwrap_or(default_kind);

            let columns = normalize_header(&decl.columns, normalize);
            if columns.is_empty() {
                return Err(ConfigError::EmptyColumns(decl.group.clone()));
            }

            let hash = hash_columns(&canonicalize(&columns, mode));
            if let Some(earlier) = seen_hashes.insert((mode, hash), decl.group.as_str()) {
                return Err(ConfigError::DuplicateSignature {
                    group: decl.group.clone(),
                    earlier: earlier.to_string(),
                });
            }

            registry.push(&decl.group, &columns, mode, kind);
        }

        Ok(registry)
    }

    /// Compiles the exclude filter patterns, validating each one.
    pub fn compile_filters(&self) -> Result<Vec<Pattern>, ConfigError> {
        self.filters
            .exclude
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
            })
            .collect()
    }
}
