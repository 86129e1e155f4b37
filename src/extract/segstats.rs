//! Segmentation statistics: per-region voxel counts and volumes
//!
//! Each region in a segstats record is a two-element array `[count, volume]`.
//! One run reads the sources once and writes both a `-count` and a `-volume`
//! CSV next to the requested output path.

use super::path_info::PathInfo;
use super::writer::CsvSink;
use super::{read_json, ExtractError, ExtractionSummary, RecordOutcome, SkipReason};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Regions every segstats record must carry, in output column order
pub const REGIONS: [&str; 18] = [
    "Background",
    "Left-Accumbens-area",
    "Left-Amygdala",
    "Left-Caudate",
    "Left-Hippocampus",
    "Left-Pallidum",
    "Left-Putamen",
    "Left-Thalamus-Proper",
    "Right-Accumbens-area",
    "Right-Amygdala",
    "Right-Caudate",
    "Right-Hippocampus",
    "Right-Pallidum",
    "Right-Putamen",
    "Right-Thalamus-Proper",
    "csf",
    "gray",
    "white",
];

/// Which element of a region's `[count, volume]` pair to write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    Count,
    Volume,
}

impl Measure {
    pub const ALL: [Measure; 2] = [Measure::Count, Measure::Volume];

    fn index(self) -> usize {
        match self {
            Measure::Count => 0,
            Measure::Volume => 1,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Measure::Count => "count",
            Measure::Volume => "volume",
        }
    }

    /// `out/segstats.csv` becomes `out/segstats-count.csv`
    pub fn output_path(self, output: &Path) -> PathBuf {
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = match output.extension() {
            Some(ext) => format!("{}-{}.{}", stem, self.label(), ext.to_string_lossy()),
            None => format!("{}-{}", stem, self.label()),
        };
        output.with_file_name(name)
    }
}

pub fn segstats_header() -> Vec<String> {
    ["Date", "sid", "ses"]
        .iter()
        .chain(REGIONS.iter())
        .map(|s| s.to_string())
        .collect()
}

/// Region values of one record, `[count, volume]` per region
#[derive(Debug, Clone, PartialEq)]
pub struct SegstatsRow {
    pub info: PathInfo,
    pub values: Vec<[String; 2]>,
}

impl SegstatsRow {
    pub fn to_record(&self, measure: Measure) -> Vec<String> {
        let mut record = vec![
            self.info.date_column(),
            self.info.subject_column(),
            self.info.session.clone(),
        ];
        record.extend(self.values.iter().map(|pair| pair[measure.index()].clone()));
        record
    }
}

fn pair(region: &str, value: &Value) -> Result<[String; 2], SkipReason> {
    let items = value.as_array().filter(|a| a.len() == 2).ok_or_else(|| SkipReason::InvalidField {
        field: region.to_string(),
        message: "expected a [count, volume] pair".to_string(),
    })?;
    let mut out = [String::new(), String::new()];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = match item {
            Value::Number(n) => n.to_string(),
            other => {
                return Err(SkipReason::InvalidField {
                    field: region.to_string(),
                    message: format!("non-numeric element {}", other),
                })
            }
        };
    }
    Ok(out)
}

pub fn process_file(path: &Path) -> Result<RecordOutcome<SegstatsRow>, ExtractError> {
    let info = match PathInfo::parse(path) {
        Ok(info) => info,
        Err(message) => return Ok(RecordOutcome::Skip(SkipReason::UnparseablePath { message })),
    };
    let record = read_json(path)?;

    let mut values = Vec::with_capacity(REGIONS.len());
    for region in REGIONS {
        let Some(value) = record.get(region) else {
            return Ok(RecordOutcome::Skip(SkipReason::MissingField {
                field: region.to_string(),
            }));
        };
        match pair(region, value) {
            Ok(p) => values.push(p),
            Err(reason) => return Ok(RecordOutcome::Skip(reason)),
        }
    }

    Ok(RecordOutcome::Row(SegstatsRow { info, values }))
}

/// Extract region counts and volumes from `sources` into the two outputs
/// derived from `output`.
pub fn extract_segstats(sources: &[PathBuf], output: &Path) -> Result<ExtractionSummary, ExtractError> {
    let header = segstats_header();
    let mut count_sink = CsvSink::open_append(&Measure::Count.output_path(output), &header)?;
    let mut volume_sink = CsvSink::open_append(&Measure::Volume.output_path(output), &header)?;
    let mut summary = ExtractionSummary {
        outputs: vec![count_sink.path().to_path_buf(), volume_sink.path().to_path_buf()],
        ..Default::default()
    };

    for path in sources {
        summary.files_seen += 1;
        match process_file(path)? {
            RecordOutcome::Row(row) => {
                count_sink.write_row(&row.to_record(Measure::Count))?;
                volume_sink.write_row(&row.to_record(Measure::Volume))?;
            }
            RecordOutcome::Skip(reason) => summary.skip(path, reason),
        }
    }

    summary.rows_written = count_sink.finish()?;
    volume_sink.finish()?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn full_record() -> Value {
        let mut obj = serde_json::Map::new();
        for (i, region) in REGIONS.iter().enumerate() {
            obj.insert(region.to_string(), json!([100 + i, 1000.5 + i as f64]));
        }
        Value::Object(obj)
    }

    #[test]
    fn test_output_paths() {
        let out = Path::new("extractions/segstats.csv");
        assert_eq!(
            Measure::Count.output_path(out),
            PathBuf::from("extractions/segstats-count.csv")
        );
        assert_eq!(
            Measure::Volume.output_path(out),
            PathBuf::from("extractions/segstats-volume.csv")
        );
    }

    #[test]
    fn test_one_run_writes_both_outputs() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("sub-sid000143/ses-20180315/anat/sub-sid000143_ses-20180315_aseg.json");
        let bad = dir.path().join("sub-sid000144/ses-20180316/anat/sub-sid000144_ses-20180316_aseg.json");
        fs::create_dir_all(good.parent().unwrap()).unwrap();
        fs::create_dir_all(bad.parent().unwrap()).unwrap();
        fs::write(&good, full_record().to_string()).unwrap();
        let mut partial = full_record();
        partial.as_object_mut().unwrap().remove("white");
        fs::write(&bad, partial.to_string()).unwrap();

        let output = dir.path().join("segstats.csv");
        let summary = extract_segstats(&[good, bad], &output).unwrap();
        assert_eq!(summary.files_seen, 2);
        assert_eq!(summary.rows_written, 1);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(
            summary.skipped[0].reason,
            SkipReason::MissingField {
                field: "white".to_string()
            }
        );

        let counts = fs::read_to_string(dir.path().join("segstats-count.csv")).unwrap();
        let volumes = fs::read_to_string(dir.path().join("segstats-volume.csv")).unwrap();
        let count_row: Vec<&str> = counts.lines().nth(1).unwrap().split(',').collect();
        let volume_row: Vec<&str> = volumes.lines().nth(1).unwrap().split(',').collect();
        assert_eq!(&count_row[..4], &["20180315", "sub-sid000143", "20180315", "100"]);
        assert_eq!(volume_row[3], "1000.5");
        assert_eq!(count_row.len(), 21);
    }

    #[test]
    fn test_malformed_pair_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub-a_ses-20180101_aseg.json");
        let mut record = full_record();
        record["gray"] = json!([1]);
        fs::write(&path, record.to_string()).unwrap();
        assert!(matches!(
            process_file(&path).unwrap(),
            RecordOutcome::Skip(SkipReason::InvalidField { .. })
        ));
    }
}
