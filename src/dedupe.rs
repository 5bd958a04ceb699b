//! Duplicate-row utilities for a single CSV file.
//!
//! Rows are identified by a SHA-256 digest over their cell values,
//! joined with the ASCII unit separator (0x1f). The separator is a
//! non-printable control character that effectively never appears in
//! CSV data, so `["ab", "c"]` and `["a", "bc"]` hash differently.
//!
//! Independent of the classifier: this operates on row content, not
//! headers.

use crate::signature::SIGNATURE_SEPARATOR;
use clap::ValueEnum;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Which row of a duplicate group survives deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum KeepPolicy {
    /// Keep the first occurrence of each duplicate group.
    First,
    /// Keep the last occurrence of each duplicate group.
    Last,
    /// Drop every row that has a duplicate.
    None,
}

impl Default for KeepPolicy {
    fn default() -> Self {
        KeepPolicy::First
    }
}

/// Errors raised by the dedupe pipeline.
#[derive(Debug)]
pub enum DedupeError {
    /// The input CSV does not exist.
    InputNotFound(PathBuf),
    /// The input could not be parsed as CSV.
    ReadFailed { path: PathBuf, source: csv::Error },
    /// An output file could not be written.
    WriteFailed { path: PathBuf, source: csv::Error },
    /// The input has no header row.
    EmptyHeader(PathBuf),
    /// A column named in `--subset` or `--exclude` is not in the header.
    UnknownColumn { column: String, header: Vec<String> },
}

impl std::fmt::Display for DedupeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DedupeError::InputNotFound(path) => {
                write!(f, "Input file {} not found", path.display())
            }
            DedupeError::ReadFailed { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
            DedupeError::WriteFailed { path, source } => {
                write!(f, "Failed to write {}: {}", path.display(), source)
            }
            DedupeError::EmptyHeader(path) => {
                write!(f, "Input file {} has no header row", path.display())
            }
            DedupeError::UnknownColumn { column, header } => {
                write!(
                    f,
                    "Column '{}' not found in header ({})",
                    column,
                    header.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for DedupeError {}

/// Column selection and keep policy for a dedupe run.
#[derive(Debug, Clone, Default)]
pub struct DedupeOptions {
    /// Columns considered for the digest; all columns when empty.
    pub subset: Vec<String>,
    /// Columns removed after `subset` is applied (id columns,
    /// timestamps).
    pub exclude: Vec<String>,
    pub keep: KeepPolicy,
}

/// One duplicate group in the report: rows sharing a digest.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub digest: String,
    pub count: usize,
    /// Zero-based data-row indices (header excluded), ascending.
    pub indices: Vec<usize>,
}

/// Summary of a completed dedupe run.
#[derive(Debug)]
pub struct DedupeOutcome {
    pub total_rows: usize,
    pub kept_rows: usize,
    pub duplicate_groups: Vec<DuplicateGroup>,
}

impl DedupeOutcome {
    pub fn dropped_rows(&self) -> usize {
        self.total_rows - self.kept_rows
    }
}

/// Hex SHA-256 over cells joined with the unit separator.
pub fn row_digest(cells: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            hasher.update([SIGNATURE_SEPARATOR]);
        }
        hasher.update(cell.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Deduplicates a CSV file, writing the surviving rows and a
/// duplicate-group report.
pub struct Deduper {
    options: DedupeOptions,
}

impl Deduper {
    pub fn new(options: DedupeOptions) -> Self {
        Self { options }
    }

    /// Reads `input`, writes the deduplicated rows to `deduped_out`
    /// and the duplicate-group report to `report_out`.
    ///
    /// Row order of the input is preserved in the deduped output. The
    /// report lists one row per duplicate group, largest group first;
    /// groups of equal size appear in order of first occurrence.
    pub fn run(
        &self,
        input: &Path,
        deduped_out: &Path,
        report_out: &Path,
    ) -> Result<DedupeOutcome, DedupeError> {
        if !input.exists() {
            return Err(DedupeError::InputNotFound(input.to_path_buf()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(input)
            .map_err(|e| DedupeError::ReadFailed {
                path: input.to_path_buf(),
                source: e,
            })?;

        let header: Vec<String> = reader
            .headers()
            .map_err(|e| DedupeError::ReadFailed {
                path: input.to_path_buf(),
                source: e,
            })?
            .iter()
            .map(str::to_string)
            .collect();
        if header.is_empty() || (header.len() == 1 && header[0].is_empty()) {
            return Err(DedupeError::EmptyHeader(input.to_path_buf()));
        }

        let digest_columns = self.resolve_columns(&header)?;

        let mut rows: Vec<csv::StringRecord> = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| DedupeError::ReadFailed {
                path: input.to_path_buf(),
                source: e,
            })?;
            rows.push(record);
        }

        let digests: Vec<String> = rows
            .iter()
            .map(|row| {
                let cells: Vec<&str> = digest_columns
                    .iter()
                    .map(|&i| row.get(i).unwrap_or(""))
                    .collect();
                row_digest(&cells)
            })
            .collect();

        let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, digest) in digests.iter().enumerate() {
            groups.entry(digest).or_default().push(idx);
        }

        let keep_set = self.select_kept(&digests, &groups);

        let mut duplicate_groups: Vec<DuplicateGroup> = groups
            .iter()
            .filter(|(_, indices)| indices.len() > 1)
            .map(|(digest, indices)| DuplicateGroup {
                digest: digest.to_string(),
                count: indices.len(),
                indices: indices.clone(),
            })
            .collect();
        duplicate_groups.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.indices[0].cmp(&b.indices[0]))
        });

        self.write_deduped(deduped_out, &header, &rows, &keep_set)?;
        self.write_report(report_out, &duplicate_groups)?;

        Ok(DedupeOutcome {
            total_rows: rows.len(),
            kept_rows: keep_set.iter().filter(|&&kept| kept).count(),
            duplicate_groups,
        })
    }

    /// Effective digest columns as header indices. Falls back to all
    /// columns when the subset-minus-exclude set comes out empty.
    fn resolve_columns(&self, header: &[String]) -> Result<Vec<usize>, DedupeError> {
        let index_of = |name: &String| -> Result<usize, DedupeError> {
            header.iter().position(|h| h == name).ok_or_else(|| {
                DedupeError::UnknownColumn {
                    column: name.clone(),
                    header: header.to_vec(),
                }
            })
        };

        let mut columns: Vec<usize> = if self.options.subset.is_empty() {
            (0..header.len()).collect()
        } else {
            self.options
                .subset
                .iter()
                .map(index_of)
                .collect::<Result<_, _>>()?
        };

        for name in &self.options.exclude {
            let idx = index_of(name)?;
            columns.retain(|&c| c != idx);
        }

        if columns.is_empty() {
            columns = (0..header.len()).collect();
        }
        Ok(columns)
    }

    fn select_kept(
        &self,
        digests: &[String],
        groups: &HashMap<&str, Vec<usize>>,
    ) -> Vec<bool> {
        let mut kept = vec![false; digests.len()];
        for indices in groups.values() {
            match self.options.keep {
                KeepPolicy::First => kept[indices[0]] = true,
                KeepPolicy::Last => kept[indices[indices.len() - 1]] = true,
                KeepPolicy::None => {
                    if indices.len() == 1 {
                        kept[indices[0]] = true;
                    }
                }
            }
        }
        kept
    }

    fn write_deduped(
        &self,
        path: &Path,
        header: &[String],
        rows: &[csv::StringRecord],
        keep_set: &[bool],
    ) -> Result<(), DedupeError> {
        let wrap = |e: csv::Error| DedupeError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        };

        let mut writer = csv::Writer::from_path(path).map_err(wrap)?;
        writer.write_record(header).map_err(wrap)?;
        for (row, &kept) in rows.iter().zip(keep_set) {
            if kept {
                writer.write_record(row).map_err(wrap)?;
            }
        }
        writer.flush().map_err(|e| DedupeError::WriteFailed {
            path: path.to_path_buf(),
            source: csv::Error::from(e),
        })
    }

    fn write_report(
        &self,
        path: &Path,
        groups: &[DuplicateGroup],
    ) -> Result<(), DedupeError> {
        let wrap = |e: csv::Error| DedupeError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        };

        let mut writer = csv::Writer::from_path(path).map_err(wrap)?;
        writer
            .write_record(["row_digest", "count", "indices"])
            .map_err(wrap)?;
        for group in groups {
            let indices = group
                .indices
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(";");
            writer
                .write_record([&group.digest, &group.count.to_string(), &indices])
                .map_err(wrap)?;
        }
        writer.flush().map_err(|e| DedupeError::WriteFailed {
            path: path.to_path_buf(),
            source: csv::Error::from(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn run_dedupe(content: &str, options: DedupeOptions) -> (TempDir, DedupeOutcome, String, String) {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let input = dir.path().join("in.csv");
        let deduped = dir.path().join("deduped.csv");
        let report = dir.path().join("report.csv");
        fs::write(&input, content).expect("write failed");

        let outcome = Deduper::new(options)
            .run(&input, &deduped, &report)
            .expect("dedupe failed");
        let deduped_content = fs::read_to_string(&deduped).expect("read failed");
        let report_content = fs::read_to_string(&report).expect("read failed");
        (dir, outcome, deduped_content, report_content)
    }

    #[test]
    fn test_keep_first_preserves_order() {
        let (_dir, outcome, deduped, _report) = run_dedupe(
            "id,name\n1,alice\n2,bob\n1,alice\n3,carol\n",
            DedupeOptions::default(),
        );

        assert_eq!(outcome.total_rows, 4);
        assert_eq!(outcome.kept_rows, 3);
        assert_eq!(outcome.dropped_rows(), 1);
        assert_eq!(deduped, "id,name\n1,alice\n2,bob\n3,carol\n");
    }

    #[test]
    fn test_keep_last() {
        let (_dir, _outcome, deduped, _report) = run_dedupe(
            "id\n1\n2\n1\n",
            DedupeOptions {
                keep: KeepPolicy::Last,
                ..DedupeOptions::default()
            },
        );
        assert_eq!(deduped, "id\n2\n1\n");
    }

    #[test]
    fn test_keep_none_drops_all_duplicates() {
        let (_dir, outcome, deduped, _report) = run_dedupe(
            "id\n1\n2\n1\n",
            DedupeOptions {
                keep: KeepPolicy::None,
                ..DedupeOptions::default()
            },
        );
        assert_eq!(outcome.kept_rows, 1);
        assert_eq!(deduped, "id\n2\n");
    }

    #[test]
    fn test_subset_limits_digest_columns() {
        // Rows differ only in the timestamp column.
        let (_dir, outcome, deduped, _report) = run_dedupe(
            "name,ts\nalice,1\nalice,2\nbob,3\n",
            DedupeOptions {
                subset: vec!["name".to_string()],
                ..DedupeOptions::default()
            },
        );
        assert_eq!(outcome.kept_rows, 2);
        assert_eq!(deduped, "name,ts\nalice,1\nbob,3\n");
    }

    #[test]
    fn test_exclude_removes_columns_after_subset() {
        let (_dir, outcome, _deduped, _report) = run_dedupe(
            "id,name\n1,alice\n2,alice\n",
            DedupeOptions {
                exclude: vec!["id".to_string()],
                ..DedupeOptions::default()
            },
        );
        assert_eq!(outcome.kept_rows, 1);
    }

    #[test]
    fn test_report_sorted_by_group_size() {
        let (_dir, outcome, _deduped, report) = run_dedupe(
            "v\na\nb\na\nb\na\n",
            DedupeOptions::default(),
        );

        assert_eq!(outcome.duplicate_groups.len(), 2);
        assert_eq!(outcome.duplicate_groups[0].count, 3);
        assert_eq!(outcome.duplicate_groups[0].indices, vec![0, 2, 4]);
        assert_eq!(outcome.duplicate_groups[1].indices, vec![1, 3]);

        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], "row_digest,count,indices");
        assert!(lines[1].ends_with(",3,0;2;4"));
        assert!(lines[2].ends_with(",2,1;3"));
    }

    #[test]
    fn test_unknown_column_is_rejected() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let input = dir.path().join("in.csv");
        fs::write(&input, "id\n1\n").expect("write failed");

        let result = Deduper::new(DedupeOptions {
            subset: vec!["nope".to_string()],
            ..DedupeOptions::default()
        })
        .run(
            &input,
            &dir.path().join("d.csv"),
            &dir.path().join("r.csv"),
        );

        assert!(matches!(result, Err(DedupeError::UnknownColumn { .. })));
    }

    #[test]
    fn test_digest_separator_prevents_boundary_collisions() {
        assert_ne!(row_digest(&["ab", "c"]), row_digest(&["a", "bc"]));
        assert_eq!(row_digest(&["a", "b"]), row_digest(&["a", "b"]));
    }

    #[test]
    fn test_missing_input() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let result = Deduper::new(DedupeOptions::default()).run(
            &dir.path().join("missing.csv"),
            &dir.path().join("d.csv"),
            &dir.path().join("r.csv"),
        );
        assert!(matches!(result, Err(DedupeError::InputNotFound(_))));
    }
}
