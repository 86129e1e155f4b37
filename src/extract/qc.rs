//! QC metrics extraction: functional metadata JSON to one CSV row per run

use super::path_info::{anatomical_companion, PathInfo};
use super::schema::{EraBoundaries, QcFields, SchemaEra, SnrMetric, SHIM_COUNT};
use super::writer::{cell, CsvSink};
use super::{read_json, ExtractError, ExtractionSummary, RecordOutcome, SkipReason};
use crate::config::Config;
use std::path::{Path, PathBuf};

/// Options for one QC extraction run
#[derive(Debug, Clone)]
pub struct QcOptions {
    pub eras: EraBoundaries,
    /// Companion file name tail, e.g. `T1w.json`
    pub anatomical_suffix: String,
    /// Merge `snr_total` from the anatomical companion (adds a column)
    pub merge_anatomical: bool,
}

impl QcOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            eras: EraBoundaries {
                anatomical: config.anatomical_cutover,
                flat_layout: config.flat_layout_cutover,
            },
            anatomical_suffix: config.anatomical_suffix.clone(),
            merge_anatomical: true,
        }
    }

    pub fn without_anatomical(mut self) -> Self {
        self.merge_anatomical = false;
        self
    }
}

impl Default for QcOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Column header of a QC extraction run
pub fn qc_header(merge_anatomical: bool) -> Vec<String> {
    let mut header: Vec<String> = [
        "Date",
        "Filetype",
        "tsnr",
        "SAR",
        "AcquisitionTime",
        "TxRefAmp",
        "SoftwareVersions",
        "CSV",
        "RepetitionTime",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    header.extend((1..=SHIM_COUNT).map(|i| format!("Shim{}", i)));
    if merge_anatomical {
        header.push("snr_total".to_string());
    }
    header
}

/// One extracted QC row
#[derive(Debug, Clone, PartialEq)]
pub struct QcRow {
    pub info: PathInfo,
    pub era: SchemaEra,
    pub fields: QcFields,
    /// `snr_total` from the anatomical companion, when found
    pub anatomical_snr_total: Option<f64>,
}

impl QcRow {
    pub fn to_record(&self, merge_anatomical: bool) -> Vec<String> {
        let f = &self.fields;
        let mut record = vec![
            self.info.date_column(),
            self.info.filetype.clone(),
            f.snr.to_string(),
            f.sar.to_string(),
            f.acquisition_time.to_string(),
            cell(f.tx_ref_amp),
            f.software_versions.clone().unwrap_or_default(),
            f.conversion_software_version.clone().unwrap_or_default(),
            cell(f.repetition_time),
        ];
        record.extend((0..SHIM_COUNT).map(|i| cell(f.shims.get(i).copied())));
        if merge_anatomical {
            record.push(cell(self.anatomical_snr_total));
        }
        record
    }
}

/// Turn one metadata file into a row. `notes` collects non-fatal remarks.
pub fn process_file(
    path: &Path,
    options: &QcOptions,
    notes: &mut Vec<String>,
) -> Result<RecordOutcome<QcRow>, ExtractError> {
    let info = match PathInfo::parse(path) {
        Ok(info) => info,
        Err(message) => return Ok(RecordOutcome::Skip(SkipReason::UnparseablePath { message })),
    };
    let record = read_json(path)?;
    let era = options.eras.classify(info.date);
    let fields = match era.extract(&record) {
        Ok(fields) => fields,
        Err(reason) => return Ok(RecordOutcome::Skip(reason)),
    };

    let anatomical_snr_total = if options.merge_anatomical && era.merges_anatomical() {
        let companion = anatomical_companion(path, &options.anatomical_suffix);
        anatomical_snr(&companion, notes)?
    } else {
        None
    };

    Ok(RecordOutcome::Row(QcRow {
        info,
        era,
        fields,
        anatomical_snr_total,
    }))
}

fn anatomical_snr(companion: &Path, notes: &mut Vec<String>) -> Result<Option<f64>, ExtractError> {
    if !companion.is_file() {
        notes.push(format!("no anatomical companion at {}", companion.display()));
        return Ok(None);
    }
    let record = read_json(companion)?;
    let snr = record.get("snr_total").and_then(|v| v.as_f64());
    if snr.is_none() {
        notes.push(format!("no snr_total in {}", companion.display()));
    }
    Ok(snr)
}

/// Extract QC rows from `sources` and append them to `output`
pub fn extract_qc(
    sources: &[PathBuf],
    output: &Path,
    options: &QcOptions,
) -> Result<ExtractionSummary, ExtractError> {
    let mut summary = ExtractionSummary {
        outputs: vec![output.to_path_buf()],
        ..Default::default()
    };
    let mut sink = CsvSink::open_append(output, &qc_header(options.merge_anatomical))?;
    let mut snr_total_rows = 0;

    for path in sources {
        summary.files_seen += 1;
        match process_file(path, options, &mut summary.notes)? {
            RecordOutcome::Row(row) => {
                if row.fields.snr_metric == SnrMetric::SnrTotal {
                    snr_total_rows += 1;
                }
                sink.write_row(&row.to_record(options.merge_anatomical))?
            }
            RecordOutcome::Skip(reason) => summary.skip(path, reason),
        }
    }

    summary.rows_written = sink.finish()?;
    // The tsnr column holds whichever SNR metric the record provided
    if snr_total_rows > 0 {
        summary.notes.push(format!(
            "{} of {} rows carry snr_total in the tsnr column",
            snr_total_rows, summary.rows_written
        ));
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn write_json(path: &Path, value: &serde_json::Value) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    }

    fn func_path(root: &Path, date: &str) -> PathBuf {
        root.join(format!("sub-qa/ses-{date}/func/sub-qa_ses-{date}_task-rest_acq-p2_bold.json"))
    }

    #[test]
    fn test_header_columns() {
        let header = qc_header(true);
        assert_eq!(header.len(), 18);
        assert_eq!(&header[..3], &["Date", "Filetype", "tsnr"]);
        assert_eq!(header[9], "Shim1");
        assert_eq!(header[16], "Shim8");
        assert_eq!(header[17], "snr_total");
        assert_eq!(qc_header(false).len(), 17);
    }

    #[test]
    fn test_anatomical_snr_merged_for_late_2017() {
        let dir = TempDir::new().unwrap();
        let path = func_path(dir.path(), "20171030");
        write_json(
            &path,
            &json!({
                "tsnr": 58.0,
                "bids_meta": {
                    "global": { "const": { "SAR": 0.2 } },
                    "time": { "samples": { "AcquisitionTime": "11:00:00" } }
                }
            }),
        );
        write_json(
            &dir.path().join("sub-qa/ses-20171030/anat/sub-qa_ses-20171030_T1w.json"),
            &json!({ "snr_total": 14.25 }),
        );

        let mut notes = Vec::new();
        let outcome = process_file(&path, &QcOptions::default(), &mut notes).unwrap();
        let RecordOutcome::Row(row) = outcome else {
            panic!("expected a row");
        };
        assert_eq!(row.era, SchemaEra::NestedWithAnatomical);
        assert_eq!(row.anatomical_snr_total, Some(14.25));
        assert!(notes.is_empty());

        let record = row.to_record(true);
        assert_eq!(record[0], "20171030");
        assert_eq!(record[1], "task-rest_acq-p2_bold.json");
        assert_eq!(record[4], "39600");
        assert_eq!(record[5], "", "nested era has no TxRefAmp");
        assert_eq!(record[17], "14.25");
    }

    #[test]
    fn test_missing_companion_is_a_note_not_a_skip() {
        let dir = TempDir::new().unwrap();
        let path = func_path(dir.path(), "20180301");
        write_json(
            &path,
            &json!({
                "snr_total": 190.0,
                "bids_meta": { "SAR": 0.2, "AcquisitionTime": "10:00:00", "TxRefAmp": 220.0 }
            }),
        );
        let mut notes = Vec::new();
        let outcome = process_file(&path, &QcOptions::default(), &mut notes).unwrap();
        assert!(matches!(outcome, RecordOutcome::Row(ref r) if r.anatomical_snr_total.is_none()));
        assert_eq!(notes.len(), 1);
        assert!(notes[0].contains("no anatomical companion"));
    }

    #[test]
    fn test_unparseable_path_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub-qa_task-rest_bold.json");
        write_json(&path, &json!({}));
        let outcome = process_file(&path, &QcOptions::default(), &mut Vec::new()).unwrap();
        assert!(matches!(
            outcome,
            RecordOutcome::Skip(SkipReason::UnparseablePath { .. })
        ));
    }

    #[test]
    fn test_without_anatomical_drops_column_and_lookup() {
        let dir = TempDir::new().unwrap();
        let path = func_path(dir.path(), "20180301");
        write_json(
            &path,
            &json!({
                "tsnr": 60.0,
                "SAR": 0.2, "AcquisitionTime": "10:00:00", "TxRefAmp": 220.0
            }),
        );
        let output = dir.path().join("qc.csv");
        let options = QcOptions::default().without_anatomical();
        let summary = extract_qc(&[path], &output, &options).unwrap();
        assert_eq!(summary.rows_written, 1);
        assert!(summary.notes.is_empty());
        let content = fs::read_to_string(&output).unwrap();
        assert!(!content.contains("snr_total"));
    }

    #[test]
    fn test_snr_total_rows_are_noted() {
        let dir = TempDir::new().unwrap();
        let flat = func_path(dir.path(), "20180301");
        write_json(
            &flat,
            &json!({
                "snr_total": 190.0,
                "SAR": 0.2, "AcquisitionTime": "10:00:00", "TxRefAmp": 220.0
            }),
        );
        let nested = func_path(dir.path(), "20170605");
        write_json(
            &nested,
            &json!({
                "tsnr": 58.0,
                "bids_meta": {
                    "global": { "const": { "SAR": 0.2 } },
                    "time": { "samples": { "AcquisitionTime": "11:00:00" } }
                }
            }),
        );
        let output = dir.path().join("qc.csv");
        let options = QcOptions::default().without_anatomical();
        let summary = extract_qc(&[nested, flat], &output, &options).unwrap();
        assert_eq!(summary.rows_written, 2);
        assert_eq!(summary.notes, vec!["1 of 2 rows carry snr_total in the tsnr column".to_string()]);
    }
}
