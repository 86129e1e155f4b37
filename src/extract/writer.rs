//! Append-mode CSV sink
//!
//! Each run appends its own header followed by its rows. The file handle is
//! owned by the sink, so it is flushed and closed on every exit path; there
//! is no atomic replace, and an aborted run leaves the rows written so far.

use super::ExtractError;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

pub struct CsvSink {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows: usize,
}

impl CsvSink {
    /// Open `path` for appending and write `header`
    pub fn open_append<S: AsRef<str>>(path: &Path, header: &[S]) -> Result<Self, ExtractError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ExtractError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| ExtractError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let mut sink = Self {
            path: path.to_path_buf(),
            writer: csv::WriterBuilder::new().flexible(true).from_writer(file),
            rows: 0,
        };
        sink.write(header.iter().map(|h| h.as_ref()))?;
        Ok(sink)
    }

    fn write<'a>(&mut self, record: impl IntoIterator<Item = &'a str>) -> Result<(), ExtractError> {
        self.writer
            .write_record(record)
            .map_err(|source| ExtractError::Csv {
                path: self.path.clone(),
                source,
            })
    }

    /// Append one data row
    pub fn write_row<S: AsRef<str>>(&mut self, row: &[S]) -> Result<(), ExtractError> {
        self.write(row.iter().map(|c| c.as_ref()))?;
        self.rows += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close the file
    pub fn finish(mut self) -> Result<usize, ExtractError> {
        self.writer.flush().map_err(|source| ExtractError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(self.rows)
    }
}

/// Render an optional number as a CSV cell; absent values stay empty
pub fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
