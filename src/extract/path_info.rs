//! Subject/session/date recovery from BIDS-style paths
//!
//! Paths look like `sub-<id>/ses-<date>/func/sub-<id>_ses-<date>_<tail>.json`,
//! or a flat derivatives folder holding `sub-<id>_ses-<date>_<tail>.json`.
//! Entities are matched per path component, so the directory depth does not
//! matter.

use chrono::NaiveDate;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

fn session_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{8})").expect("valid session date regex"))
}

/// Identity of one acquisition, recovered from its path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathInfo {
    /// Subject label without the `sub-` prefix
    pub subject: Option<String>,
    /// Session label without the `ses-` prefix
    pub session: String,
    /// Acquisition date, the leading `YYYYMMDD` of the session label
    pub date: NaiveDate,
    /// File name with the leading `sub-`/`ses-` entities removed
    pub filetype: String,
}

impl PathInfo {
    /// Parse identity entities out of `path`.
    pub fn parse(path: &Path) -> Result<Self, String> {
        let mut subject = None;
        let mut session = None;

        for component in path.components() {
            let Component::Normal(part) = component else {
                continue;
            };
            let part = part.to_string_lossy();
            for entity in part.split('_') {
                if let Some(label) = entity.strip_prefix("sub-") {
                    subject.get_or_insert_with(|| label.to_string());
                } else if let Some(label) = entity.strip_prefix("ses-") {
                    session.get_or_insert_with(|| strip_extension(label).to_string());
                }
            }
        }

        let session = session.ok_or_else(|| "no ses-<label> entity in path".to_string())?;
        let digits = session_date_regex()
            .captures(&session)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| format!("session label '{}' does not start with a YYYYMMDD date", session))?;
        let date = NaiveDate::parse_from_str(digits, "%Y%m%d")
            .map_err(|e| format!("invalid session date '{}': {}", digits, e))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(Self {
            subject,
            session,
            date,
            filetype: filetype_of(&file_name),
        })
    }

    /// Subject column value, e.g. `sub-sid000143`
    pub fn subject_column(&self) -> String {
        match &self.subject {
            Some(s) => format!("sub-{}", s),
            None => String::new(),
        }
    }

    /// Date column value, `YYYYMMDD`
    pub fn date_column(&self) -> String {
        self.date.format("%Y%m%d").to_string()
    }
}

fn strip_extension(label: &str) -> &str {
    label.split('.').next().unwrap_or(label)
}

/// Split a file name into its leading identity entities and the rest
fn split_identity(file_name: &str) -> (Vec<&str>, Vec<&str>) {
    let mut identity = Vec::new();
    let mut rest = Vec::new();
    for entity in file_name.split('_') {
        if rest.is_empty() && (entity.starts_with("sub-") || entity.starts_with("ses-")) {
            identity.push(entity);
        } else {
            rest.push(entity);
        }
    }
    (identity, rest)
}

fn filetype_of(file_name: &str) -> String {
    let (_, rest) = split_identity(file_name);
    if rest.is_empty() {
        file_name.to_string()
    } else {
        rest.join("_")
    }
}

/// Path of the anatomical companion of a functional metadata file.
///
/// A `func` parent directory becomes `anat`, and everything after the
/// `sub-*_ses-*_` entities in the file name is replaced by `suffix`.
pub fn anatomical_companion(func_path: &Path, suffix: &str) -> PathBuf {
    let file_name = func_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let (identity, _) = split_identity(&file_name);
    let mut companion_name = identity.join("_");
    if !companion_name.is_empty() {
        companion_name.push('_');
    }
    companion_name.push_str(suffix);

    let parent = func_path.parent().unwrap_or(Path::new(""));
    let dir = if parent.file_name().is_some_and(|n| n == "func") {
        parent.with_file_name("anat")
    } else {
        parent.to_path_buf()
    };
    dir.join(companion_name)
}
