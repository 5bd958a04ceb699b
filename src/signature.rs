//! Header signatures, signature matching and auto-clustering.
//!
//! A signature is the canonical form of a header plus a deterministic
//! hash of that form. Canonicalization depends on the matching mode:
//! strict keeps the column order verbatim, relaxed deduplicates and
//! sorts so that column order no longer matters.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Separator used when joining column names for hashing. The ASCII
/// unit separator never appears in sane column names, which prevents
/// accidental collisions like ["ab","c"] vs ["a","bc"].
pub const SIGNATURE_SEPARATOR: u8 = 0x1f;

/// Number of hash characters embedded in auto-derived cluster names.
const CLUSTER_DIGEST_LEN: usize = 10;

/// Maximum length of the human-readable hint in cluster names.
const CLUSTER_HINT_LEN: usize = 60;

/// Header-order sensitivity of signature computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Column order matters; two headers match only if identical in order.
    Strict,
    /// Column order is ignored; headers are compared as sorted sets.
    Relaxed,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMode::Strict => "strict",
            MatchMode::Relaxed => "relaxed",
        }
    }
}

impl Default for MatchMode {
    fn default() -> Self {
        MatchMode::Strict
    }
}

/// How a registered signature is compared against a file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// The signature's columns must equal the header's columns under
    /// the active mode's equality rule.
    Exact,
    /// The signature's column set must be a subset of the header's;
    /// the file may carry extra columns.
    Contains,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Exact => "exact",
            MatchKind::Contains => "contains",
        }
    }
}

impl Default for MatchKind {
    fn default() -> Self {
        MatchKind::Exact
    }
}

/// Canonical representation and hash of a header under a given mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Group name for configured signatures; None for auto-derived ones.
    pub name: Option<String>,
    /// Canonical column representation (order-sensitive for strict,
    /// sorted and deduplicated for relaxed).
    pub columns: Vec<String>,
    /// Hex SHA-256 digest of the canonical representation.
    pub hash: String,
    /// The mode the signature was computed under.
    pub mode: MatchMode,
}

impl Signature {
    /// Computes an anonymous signature for a header.
    pub fn compute(columns: &[String], mode: MatchMode) -> Self {
        let canonical = canonicalize(columns, mode);
        let hash = hash_columns(&canonical);
        Self {
            name: None,
            columns: canonical,
            hash,
            mode,
        }
    }

    /// Computes a named (configured) signature.
    pub fn named(name: &str, columns: &[String], mode: MatchMode) -> Self {
        let mut signature = Self::compute(columns, mode);
        signature.name = Some(name.to_string());
        signature
    }
}

/// Canonicalizes a normalized header under the given mode.
pub fn canonicalize(columns: &[String], mode: MatchMode) -> Vec<String> {
    match mode {
        MatchMode::Strict => columns.to_vec(),
        MatchMode::Relaxed => {
            let set: BTreeSet<&String> = columns.iter().collect();
            set.into_iter().cloned().collect()
        }
    }
}

/// Hashes a canonical column sequence. Pure function of its input:
/// identical sequences always produce identical digests, across runs
/// and processes.
pub fn hash_columns(columns: &[String]) -> String {
    let mut hasher = Sha256::new();
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            hasher.update([SIGNATURE_SEPARATOR]);
        }
        hasher.update(column.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// A configured signature together with its effective match kind.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    /// Destination group name.
    pub group: String,
    /// Signature computed under the entry's effective mode.
    pub signature: Signature,
    /// Effective match kind for this entry.
    pub kind: MatchKind,
}

/// Ordered collection of configured signatures. Declaration order is
/// significant: it breaks ties between equal-rank matches.
#[derive(Debug, Clone, Default)]
pub struct SignatureRegistry {
    entries: Vec<RegistryEntry>,
}

impl SignatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a signature; callers are responsible for validating
    /// duplicates beforehand (see config loading).
    pub fn push(&mut self, group: &str, columns: &[String], mode: MatchMode, kind: MatchKind) {
        self.entries.push(RegistryEntry {
            group: group.to_string(),
            signature: Signature::named(group, columns, mode),
            kind,
        });
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Match ranking: exact matches outrank contains matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchRank {
    Exact,
    Contains,
}

/// Decides whether a file header matches registered signatures.
pub struct Matcher<'a> {
    registry: &'a SignatureRegistry,
}

impl<'a> Matcher<'a> {
    pub fn new(registry: &'a SignatureRegistry) -> Self {
        Self { registry }
    }

    /// Returns the best matching entry for a normalized header, or
    /// None if no registered signature qualifies.
    ///
    /// Exact matches outrank contains matches; among equal-rank
    /// matches the signature declared earliest wins. The result is
    /// independent of file scan order.
    pub fn best_match(&self, header: &[String]) -> Option<&'a RegistryEntry> {
        let mut best: Option<(MatchRank, usize)> = None;
        for (index, entry) in self.registry.entries.iter().enumerate() {
            let Some(rank) = Self::rank(entry, header) else {
                continue;
            };
            // Earlier declarations win ties, so only a strictly better
            // rank replaces the current best.
            match best {
                None => best = Some((rank, index)),
                Some((best_rank, _)) if rank < best_rank => best = Some((rank, index)),
                Some(_) => {}
            }
        }
        best.map(|(_, index)| &self.registry.entries[index])
    }

    fn rank(entry: &RegistryEntry, header: &[String]) -> Option<MatchRank> {
        let candidate = canonicalize(header, entry.signature.mode);
        if candidate == entry.signature.columns {
            return Some(MatchRank::Exact);
        }
        if entry.kind == MatchKind::Contains {
            let header_set: HashSet<&String> = header.iter().collect();
            if entry.signature.columns.iter().all(|c| header_set.contains(c)) {
                return Some(MatchRank::Contains);
            }
        }
        None
    }
}

/// Groups unmatched files by identical canonical signature, assigning
/// stable group names derived purely from the signature itself.
#[derive(Debug)]
pub struct ClusterAssigner {
    mode: MatchMode,
    names: HashMap<String, String>,
}

impl ClusterAssigner {
    pub fn new(mode: MatchMode) -> Self {
        Self {
            mode,
            names: HashMap::new(),
        }
    }

    /// Computes the signature for a header and returns it along with
    /// the cluster group name. Headers with identical canonical
    /// signatures always land in the same group.
    pub fn assign(&mut self, header: &[String]) -> (Signature, String) {
        let signature = Signature::compute(header, self.mode);
        let name = self
            .names
            .entry(signature.hash.clone())
            .or_insert_with(|| cluster_name(&signature))
            .clone();
        (signature, name)
    }

    /// Number of distinct clusters seen so far.
    pub fn cluster_count(&self) -> usize {
        self.names.len()
    }
}

/// Builds a cluster group name: a short human hint from the leading
/// columns plus a collision-resistant suffix from the full signature.
pub fn cluster_name(signature: &Signature) -> String {
    let hint: String = signature
        .columns
        .iter()
        .take(6)
        .cloned()
        .collect::<Vec<_>>()
        .join("__")
        .chars()
        .take(CLUSTER_HINT_LEN)
        .collect();

    let hint = sanitize_hint(&hint);
    let digest = &signature.hash[..CLUSTER_DIGEST_LEN];
    format!("cluster_{}__h{}", hint, digest)
}

/// Replaces runs of characters outside [A-Za-z0-9._-] with a single
/// underscore and strips leading/trailing underscores.
fn sanitize_hint(hint: &str) -> String {
    let mut out = String::with_capacity(hint.len());
    let mut replaced = false;
    for c in hint.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            out.push(c);
            replaced = false;
        } else if !replaced {
            out.push('_');
            replaced = true;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "empty".to_string()
    } else {
        trimmed.to_string()
    }
}
