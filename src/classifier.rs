//! Classification pipeline: scan a source directory, match headers
//! against the registry, cluster the rest.
//!
//! Scanning is read-only. Matching and clustering run over the
//! path-sorted file list so group assignment never depends on
//! filesystem iteration order.

use crate::header::{NormalizeOptions, ScanError, read_header};
use crate::plan::{FileRecord, RecordStatus, UNCLASSIFIED_GROUP};
use crate::signature::{ClusterAssigner, MatchMode, Matcher, Signature, SignatureRegistry};
use glob::Pattern;
use std::fs;
use std::path::{Path, PathBuf};

/// Errors raised while enumerating the source directory.
#[derive(Debug)]
pub enum ClassifyError {
    /// The source path is missing or not a directory.
    SourceNotADirectory(PathBuf),
    /// The source directory could not be read.
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for ClassifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifyError::SourceNotADirectory(path) => {
                write!(f, "Source directory {} does not exist", path.display())
            }
            ClassifyError::ReadDir { path, source } => {
                write!(f, "Failed to read directory {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ClassifyError {}

/// A file excluded from the run because its header could not be read.
#[derive(Debug)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

impl SkippedFile {
    fn from_scan_error(error: &ScanError) -> Self {
        Self {
            path: error.path().to_path_buf(),
            reason: error.to_string(),
        }
    }
}

/// A candidate file with its normalized header, before classification.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub header: Vec<String>,
}

/// Result of scanning: readable candidates plus per-file skips.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Files with a readable header, sorted by path.
    pub records: Vec<ScannedFile>,
    /// Files excluded with their reasons, aggregated for the summary.
    pub skipped: Vec<SkippedFile>,
}

/// Drives scanning and group assignment for one classification run.
pub struct Classifier {
    registry: SignatureRegistry,
    /// Mode for auto-derived and unclassified signatures; matched
    /// records use the mode of the registry entry they matched.
    mode: MatchMode,
    auto: bool,
    normalize: NormalizeOptions,
    filters: Vec<Pattern>,
}

impl Classifier {
    pub fn new(registry: SignatureRegistry, mode: MatchMode, auto: bool) -> Self {
        Self {
            registry,
            mode,
            auto,
            normalize: NormalizeOptions::default(),
            filters: Vec::new(),
        }
    }

    /// Sets exclude filters applied during scanning.
    pub fn with_filters(mut self, filters: Vec<Pattern>) -> Self {
        self.filters = filters;
        self
    }

    /// Overrides header normalization options.
    pub fn with_normalize(mut self, normalize: NormalizeOptions) -> Self {
        self.normalize = normalize;
        self
    }

    /// Scans the source directory for CSV files and reads their
    /// headers. Unreadable headers become [`SkippedFile`] entries; the
    /// scan continues. The result list is sorted by path so that every
    /// later stage sees a stable order.
    pub fn scan(&self, source_dir: &Path) -> Result<ScanOutcome, ClassifyError> {
        if !source_dir.is_dir() {
            return Err(ClassifyError::SourceNotADirectory(source_dir.to_path_buf()));
        }

        let entries = fs::read_dir(source_dir).map_err(|e| ClassifyError::ReadDir {
            path: source_dir.to_path_buf(),
            source: e,
        })?;

        let mut candidates: Vec<PathBuf> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || !is_csv(&path) {
                continue;
            }
            if self.is_excluded(&path) {
                continue;
            }
            candidates.push(path);
        }
        candidates.sort();

        let mut outcome = ScanOutcome::default();
        for path in candidates {
            match read_header(&path, &self.normalize) {
                Ok(header) => outcome.records.push(ScannedFile { path, header }),
                Err(e) => outcome.skipped.push(SkippedFile::from_scan_error(&e)),
            }
        }

        Ok(outcome)
    }

    /// Assigns each scanned file to exactly one group.
    ///
    /// Configured signatures are tried first; leftovers are clustered
    /// by identical canonical signature when auto mode is on, or sent
    /// to the `unclassified` group otherwise.
    pub fn classify(&self, scanned: Vec<ScannedFile>) -> Vec<FileRecord> {
        let matcher = Matcher::new(&self.registry);
        let mut assigner = ClusterAssigner::new(self.mode);
        let mut records = Vec::with_capacity(scanned.len());

        for file in scanned {
            let record = match matcher.best_match(&file.header) {
                Some(entry) => {
                    // Signature under the matched entry's mode, so the
                    // record reflects the rule it was matched with.
                    let signature = Signature::compute(&file.header, entry.signature.mode);
                    FileRecord {
                        path: file.path,
                        header: file.header,
                        signature,
                        group: entry.group.clone(),
                        status: RecordStatus::Matched,
                    }
                }
                None if self.auto => {
                    let (signature, group) = assigner.assign(&file.header);
                    FileRecord {
                        path: file.path,
                        header: file.header,
                        signature,
                        group,
                        status: RecordStatus::Clustered,
                    }
                }
                None => FileRecord {
                    signature: Signature::compute(&file.header, self.mode),
                    path: file.path,
                    header: file.header,
                    group: UNCLASSIFIED_GROUP.to_string(),
                    status: RecordStatus::Unclassified,
                },
            };
            records.push(record);
        }

        records
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return true;
        };
        self.filters
            .iter()
            .any(|pattern| pattern.matches(&name) || pattern.matches_path(path))
    }
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("csv"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::MatchKind;
    use std::fs;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(name), content).expect("Failed to write test file");
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn auto_classifier(mode: MatchMode) -> Classifier {
        Classifier::new(SignatureRegistry::new(), mode, true)
    }

    #[test]
    fn test_scan_only_picks_csv_files() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        write_file(&dir, "a.csv", "id,name\n1,x\n");
        write_file(&dir, "notes.txt", "hello");
        write_file(&dir, "B.CSV", "id,name\n2,y\n");

        let outcome = auto_classifier(MatchMode::Strict)
            .scan(dir.path())
            .expect("Scan failed");
        assert_eq!(outcome.records.len(), 2);
        assert!(outcome.skipped.is_empty());
    }

    #[test]
    fn test_scan_is_sorted_by_path() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        write_file(&dir, "zeta.csv", "id\n1\n");
        write_file(&dir, "alpha.csv", "id\n1\n");
        write_file(&dir, "mid.csv", "id\n1\n");

        let outcome = auto_classifier(MatchMode::Strict)
            .scan(dir.path())
            .expect("Scan failed");
        let names: Vec<String> = outcome
            .records
            .iter()
            .map(|r| r.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["alpha.csv", "mid.csv", "zeta.csv"]);
    }

    #[test]
    fn test_scan_skips_unreadable_headers() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        write_file(&dir, "good.csv", "id,name\n1,x\n");
        write_file(&dir, "empty.csv", "");
        write_file(&dir, "numeric.csv", "1,2,3\n4,5,6\n");

        let outcome = auto_classifier(MatchMode::Strict)
            .scan(dir.path())
            .expect("Scan failed");
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.skipped.len(), 2);
    }

    #[test]
    fn test_scan_applies_exclude_filters() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        write_file(&dir, "data.csv", "id\n1\n");
        write_file(&dir, "data_backup.csv", "id\n1\n");

        let filters = vec![Pattern::new("*_backup.csv").expect("bad pattern")];
        let outcome = auto_classifier(MatchMode::Strict)
            .with_filters(filters)
            .scan(dir.path())
            .expect("Scan failed");
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(
            outcome.records[0].path.file_name().unwrap().to_string_lossy(),
            "data.csv"
        );
    }

    #[test]
    fn test_scan_missing_source_errors() {
        let result = auto_classifier(MatchMode::Strict).scan(Path::new("/does/not/exist"));
        assert!(matches!(result, Err(ClassifyError::SourceNotADirectory(_))));
    }

    #[test]
    fn test_classify_matched_record() {
        let mut registry = SignatureRegistry::new();
        registry.push("users", &cols(&["id", "name"]), MatchMode::Strict, MatchKind::Exact);
        let classifier = Classifier::new(registry, MatchMode::Strict, false);

        let records = classifier.classify(vec![ScannedFile {
            path: PathBuf::from("/src/u.csv"),
            header: cols(&["id", "name"]),
        }]);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].group, "users");
        assert_eq!(records[0].status, RecordStatus::Matched);
    }

    #[test]
    fn test_classify_unmatched_without_auto_goes_unclassified() {
        let classifier = Classifier::new(SignatureRegistry::new(), MatchMode::Strict, false);

        let records = classifier.classify(vec![ScannedFile {
            path: PathBuf::from("/src/u.csv"),
            header: cols(&["a", "b"]),
        }]);

        assert_eq!(records[0].group, UNCLASSIFIED_GROUP);
        assert_eq!(records[0].status, RecordStatus::Unclassified);
    }

    #[test]
    fn test_classify_auto_clusters_by_signature() {
        let classifier = auto_classifier(MatchMode::Relaxed);

        let records = classifier.classify(vec![
            ScannedFile {
                path: PathBuf::from("/src/a.csv"),
                header: cols(&["id", "name", "age"]),
            },
            ScannedFile {
                path: PathBuf::from("/src/b.csv"),
                header: cols(&["name", "id", "age"]),
            },
        ]);

        assert_eq!(records[0].group, records[1].group);
        assert_eq!(records[0].status, RecordStatus::Clustered);
    }

    #[test]
    fn test_classify_auto_strict_splits_reordered_headers() {
        let classifier = auto_classifier(MatchMode::Strict);

        let records = classifier.classify(vec![
            ScannedFile {
                path: PathBuf::from("/src/a.csv"),
                header: cols(&["id", "name", "age"]),
            },
            ScannedFile {
                path: PathBuf::from("/src/b.csv"),
                header: cols(&["name", "id", "age"]),
            },
        ]);

        assert_ne!(records[0].group, records[1].group);
    }

    #[test]
    fn test_classify_is_deterministic_across_runs() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        write_file(&dir, "a.csv", "id,name\n1,x\n");
        write_file(&dir, "b.csv", "name,id\n,\n");
        write_file(&dir, "c.csv", "temp,humidity\n20,50\n");

        let classifier = auto_classifier(MatchMode::Relaxed);
        let first: Vec<(PathBuf, String)> = {
            let outcome = classifier.scan(dir.path()).expect("Scan failed");
            classifier
                .classify(outcome.records)
                .into_iter()
                .map(|r| (r.path, r.group))
                .collect()
        };
        let second: Vec<(PathBuf, String)> = {
            let outcome = classifier.scan(dir.path()).expect("Scan failed");
            classifier
                .classify(outcome.records)
                .into_iter()
                .map(|r| (r.path, r.group))
                .collect()
        };

        assert_eq!(first, second);
    }
}
