//! Header extraction for candidate CSV files.
//!
//! Only the first line of a file is read and parsed into an ordered
//! sequence of column names. Files with unreadable, empty or
//! data-looking first rows are rejected with a [`ScanError`] so the
//! caller can skip and report them.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Errors raised while reading a file's header row.
#[derive(Debug)]
pub enum ScanError {
    /// The file could not be opened or read.
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The CSV parser rejected the first row.
    Csv { path: PathBuf, message: String },
    /// The file contains no rows at all.
    EmptyFile { path: PathBuf },
    /// The first row normalized down to zero column names.
    EmptyHeader { path: PathBuf },
    /// The first row looks like data (all cells numeric), not a header.
    NumericHeader { path: PathBuf },
}

impl ScanError {
    /// The file this error refers to.
    pub fn path(&self) -> &Path {
        match self {
            Self::FileRead { path, .. }
            | Self::Csv { path, .. }
            | Self::EmptyFile { path }
            | Self::EmptyHeader { path }
            | Self::NumericHeader { path } => path,
        }
    }
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileRead { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
            Self::Csv { path, message } => {
                write!(f, "Invalid CSV in {}: {}", path.display(), message)
            }
            Self::EmptyFile { path } => {
                write!(f, "File {} is empty", path.display())
            }
            Self::EmptyHeader { path } => {
                write!(f, "Header row of {} has no usable column names", path.display())
            }
            Self::NumericHeader { path } => {
                write!(
                    f,
                    "First row of {} is purely numeric and was treated as data, not a header",
                    path.display()
                )
            }
        }
    }
}

impl std::error::Error for ScanError {}

/// Controls how raw header cells are normalized before signature
/// computation. The defaults mirror typical CSV exports: surrounding
/// whitespace is insignificant and empty trailing cells are noise.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    /// Trim surrounding whitespace from each column name.
    pub trim: bool,
    /// Lowercase column names (Unicode casefold) before comparison.
    pub casefold: bool,
    /// Drop column names that are empty after trimming.
    pub drop_empty: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            trim: true,
            casefold: false,
            drop_empty: true,
        }
    }
}

/// Reads and normalizes the header row of a CSV file.
///
/// Returns the ordered column names, or a [`ScanError`] describing why
/// the file cannot participate in classification.
pub fn read_header(path: &Path, options: &NormalizeOptions) -> Result<Vec<String>, ScanError> {
    let file = File::open(path).map_err(|e| ScanError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = reader.headers().map_err(|e| ScanError::Csv {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let raw: Vec<String> = headers.iter().map(|cell| cell.to_string()).collect();
    if raw.is_empty() || (raw.len() == 1 && raw[0].is_empty()) {
        return Err(ScanError::EmptyFile {
            path: path.to_path_buf(),
        });
    }

    // A first row whose cells are all numeric is data, not a header.
    if is_purely_numeric_row(&raw) {
        return Err(ScanError::NumericHeader {
            path: path.to_path_buf(),
        });
    }

    let normalized = normalize_header(&raw, options);
    if normalized.is_empty() {
        return Err(ScanError::EmptyHeader {
            path: path.to_path_buf(),
        });
    }

    Ok(normalized)
}

/// Applies the normalization rules to a raw header row.
pub fn normalize_header(header: &[String], options: &NormalizeOptions) -> Vec<String> {
    let mut out = Vec::with_capacity(header.len());
    for cell in header {
        let mut name = cell.clone();
        if options.trim {
            name = name.trim().to_string();
        }
        if options.casefold {
            name = name.to_lowercase();
        }
        if options.drop_empty && name.is_empty() {
            continue;
        }
        out.push(name);
    }
    out
}

/// Returns true when every non-empty cell is a plain number.
fn is_purely_numeric_row(row: &[String]) -> bool {
    let cells: Vec<&str> = row
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect();
    if cells.is_empty() {
        return false;
    }
    cells.iter().all(|c| is_numeric_cell(c))
}

/// Digits with at most one decimal point; avoids float-parse surprises.
fn is_numeric_cell(cell: &str) -> bool {
    let stripped = cell.replacen('.', "", 1);
    !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit())
}
