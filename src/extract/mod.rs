//! Extraction stage: metadata files in, append-mode CSV rows out
//!
//! Every extractor walks a list of sources, turns each file into at most one
//! row, and reports what it skipped. Per-file problems (missing fields,
//! unparseable paths) are [`SkipReason`] values; structural failures
//! (unreadable file, malformed JSON, unwritable output) are [`ExtractError`]
//! and abort the run.

pub mod dicom;
pub mod path_info;
pub mod qc;
pub mod schema;
pub mod segstats;
pub mod writer;

pub use path_info::PathInfo;
pub use qc::{extract_qc, QcOptions};
pub use schema::{EraBoundaries, SchemaEra};
pub use segstats::extract_segstats;

use globset::GlobSet;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Fatal extraction failures
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Malformed DICOM file {}: {message}", path.display())]
    Dicom { path: PathBuf, message: String },

    #[error("Unknown DICOM attribute '{0}'")]
    UnknownAttribute(String),

    #[error("Path does not exist: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("Invalid glob pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },
}

/// Why a single source file produced no row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SkipReason {
    /// No `ses-<date>` entity could be recovered from the path
    UnparseablePath { message: String },
    /// A field required by the record's schema era is absent
    MissingField { field: String },
    /// A required field is present but has the wrong shape
    InvalidField { field: String, message: String },
    /// The requested instrument attribute is not in the file
    MissingAttribute { attribute: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnparseablePath { message } => write!(f, "unparseable path: {}", message),
            SkipReason::MissingField { field } => write!(f, "missing required field '{}'", field),
            SkipReason::InvalidField { field, message } => {
                write!(f, "invalid field '{}': {}", field, message)
            }
            SkipReason::MissingAttribute { attribute } => {
                write!(f, "attribute '{}' not present", attribute)
            }
        }
    }
}

/// Result of turning one source file into a row
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome<T> {
    Row(T),
    Skip(SkipReason),
}

/// A source file that was skipped, with the reason
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// What an extraction run did
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionSummary {
    /// CSV files appended to
    pub outputs: Vec<PathBuf>,
    /// Source files examined
    pub files_seen: usize,
    /// Data rows written (per output)
    pub rows_written: usize,
    pub skipped: Vec<SkippedFile>,
    /// Non-fatal remarks, e.g. a missing anatomical companion
    pub notes: Vec<String>,
}

impl ExtractionSummary {
    pub(crate) fn skip(&mut self, path: &Path, reason: SkipReason) {
        self.skipped.push(SkippedFile {
            path: path.to_path_buf(),
            reason,
        });
    }
}

/// Read and parse one JSON metadata file
pub fn read_json(path: &Path) -> Result<serde_json::Value, ExtractError> {
    let content = fs::read_to_string(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ExtractError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn is_glob_pattern(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Resolve CLI sources into a sorted, deduplicated file list.
///
/// Files are taken as given, directories are walked recursively and filtered
/// by `include` (matched against the path relative to the directory), and
/// arguments containing glob metacharacters are expanded in-process.
pub fn collect_sources(
    inputs: &[PathBuf],
    include: &GlobSet,
    ignore: Option<&GlobSet>,
) -> Result<Vec<PathBuf>, ExtractError> {
    let mut files = Vec::new();
    let ignored = |p: &Path| ignore.is_some_and(|set| crate::config::is_ignored(p, set));

    for input in inputs {
        let as_str = input.to_string_lossy();
        if input.is_file() {
            if !ignored(input) {
                files.push(input.clone());
            }
        } else if input.is_dir() {
            for entry in WalkDir::new(input)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let path = entry.path();
                let relative = path.strip_prefix(input).unwrap_or(path);
                if include.is_match(relative) && !ignored(path) {
                    files.push(path.to_path_buf());
                }
            }
        } else if is_glob_pattern(&as_str) {
            let paths = glob::glob(&as_str).map_err(|e| ExtractError::Pattern {
                pattern: as_str.to_string(),
                message: e.to_string(),
            })?;
            for path in paths.filter_map(|p| p.ok()) {
                if path.is_file() && !ignored(&path) {
                    files.push(path);
                }
            }
        } else {
            return Err(ExtractError::PathNotFound(input.clone()));
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}
