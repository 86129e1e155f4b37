//! End-to-end extraction over a synthetic dataset tree.

use qadrift::analysis::table::Table;
use qadrift::config::build_glob_set;
use qadrift::extract::schema::SchemaEra;
use qadrift::extract::{collect_sources, extract_qc, extract_segstats, EraBoundaries, QcOptions, SkipReason};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_json(path: &Path, value: &Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

fn bold_path(root: &Path, date: &str) -> PathBuf {
    root.join(format!(
        "sub-qa/ses-{date}/func/sub-qa_ses-{date}_task-rest_acq-p2_bold.json"
    ))
}

fn nested_record(tsnr: f64, with_sar: bool) -> Value {
    let mut constants = json!({
        "SoftwareVersions": "syngo MR E11",
        "ConversionSoftwareVersion": "v1.0.20170314",
        "RepetitionTime": 2.0,
        "ShimSetting": [1, 2, 3, 4, 5, 6, 7, 8]
    });
    if with_sar {
        constants["SAR"] = json!(0.21);
    }
    json!({
        "tsnr": tsnr,
        "bids_meta": {
            "global": { "const": constants },
            "time": { "samples": { "AcquisitionTime": ["14:23:05.123000"] } }
        }
    })
}

fn flat_record(snr_total: f64, with_tx_ref_amp: bool) -> Value {
    let mut record = json!({
        "snr_total": snr_total,
        "tsnr": 60.0,
        "bids_meta": {
            "SAR": 0.19,
            "AcquisitionTime": "09:30:00.000000",
            "SoftwareVersions": "syngo MR E11",
            "ConversionSoftwareVersion": "v1.0.20171215",
            "RepetitionTime": 2.0,
            "ShimSetting": [10, 20, 30, 40, 50, 60, 70, 80]
        }
    });
    if with_tx_ref_amp {
        record["bids_meta"]["TxRefAmp"] = json!(231.4);
    }
    record
}

/// Three pre-cutover and three post-cutover sidecars, one of each missing a
/// field its era requires.
fn build_dataset(root: &Path) {
    write_json(&bold_path(root, "20170605"), &nested_record(58.0, true));
    write_json(&bold_path(root, "20170612"), &nested_record(59.0, true));
    write_json(&bold_path(root, "20170619"), &nested_record(57.0, false));
    write_json(&bold_path(root, "20180108"), &flat_record(190.0, true));
    write_json(&bold_path(root, "20180115"), &flat_record(192.0, true));
    write_json(&bold_path(root, "20180122"), &flat_record(191.0, false));
    // Not matched by the default include pattern
    write_json(
        &root.join("sub-qa/ses-20180108/anat/sub-qa_ses-20180108_T1w.json"),
        &json!({ "snr_total": 17.5 }),
    );
}

fn run_qc(root: &Path, output: &Path) -> qadrift::ExtractionSummary {
    let include = build_glob_set(&["**/*_bold.json".to_string()]).unwrap();
    let sources = collect_sources(&[root.to_path_buf()], &include, None).unwrap();
    assert_eq!(sources.len(), 6);
    extract_qc(&sources, output, &QcOptions::default()).unwrap()
}

#[test]
fn extracts_four_rows_from_six_files() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    build_dataset(&data);
    let output = dir.path().join("qc.csv");

    let summary = run_qc(&data, &output);

    assert_eq!(summary.files_seen, 6);
    assert_eq!(summary.rows_written, 4);
    assert_eq!(summary.skipped.len(), 2);

    let content = fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 5, "header plus four rows:\n{}", content);
    assert_eq!(
        lines[0],
        "Date,Filetype,tsnr,SAR,AcquisitionTime,TxRefAmp,SoftwareVersions,CSV,RepetitionTime,\
         Shim1,Shim2,Shim3,Shim4,Shim5,Shim6,Shim7,Shim8,snr_total"
    );
}

#[test]
fn each_era_takes_its_own_branch() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    build_dataset(&data);
    let output = dir.path().join("qc.csv");
    run_qc(&data, &output);

    let content = fs::read_to_string(&output).unwrap();
    let rows: Vec<Vec<&str>> = content.lines().skip(1).map(|l| l.split(',').collect()).collect();

    // Pre-cutover: tsnr metric, no TxRefAmp, no anatomical merge
    let pre = &rows[0];
    assert_eq!(pre[0], "20170605");
    assert_eq!(pre[2], "58");
    assert_eq!(pre[4], "51785");
    assert_eq!(pre[5], "");
    assert_eq!(pre[9], "1");
    assert_eq!(pre[17], "");

    // Post-cutover: snr_total preferred, TxRefAmp present, companion merged
    let post = &rows[2];
    assert_eq!(post[0], "20180108");
    assert_eq!(post[2], "190");
    assert_eq!(post[4], "34200");
    assert_eq!(post[5], "231.4");
    assert_eq!(post[17], "17.5");

    let eras = EraBoundaries::default();
    assert_eq!(eras.classify(chrono::NaiveDate::from_ymd_opt(2017, 6, 5).unwrap()), SchemaEra::Nested);
    assert_eq!(eras.classify(chrono::NaiveDate::from_ymd_opt(2018, 1, 8).unwrap()), SchemaEra::Flat);
}

#[test]
fn skip_reasons_name_the_missing_field() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    build_dataset(&data);
    let summary = run_qc(&data, &dir.path().join("qc.csv"));

    let fields: Vec<String> = summary
        .skipped
        .iter()
        .map(|s| match &s.reason {
            SkipReason::MissingField { field } => field.clone(),
            other => panic!("unexpected skip reason {other}"),
        })
        .collect();
    assert_eq!(fields, vec!["global.const.SAR".to_string(), "TxRefAmp".to_string()]);
    // One companion is missing, which is only a note
    assert_eq!(summary.notes.len(), 2);
    assert!(summary.notes[0].contains("no anatomical companion"));
    assert_eq!(summary.notes[1], "2 of 4 rows carry snr_total in the tsnr column");
}

#[test]
fn appending_runs_keeps_a_loadable_table() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    build_dataset(&data);
    let output = dir.path().join("qc.csv");
    run_qc(&data, &output);
    run_qc(&data, &output);

    let content = fs::read_to_string(&output).unwrap();
    assert_eq!(content.lines().count(), 10);

    let table = Table::from_csv_paths(&[output]).unwrap();
    assert_eq!(table.len(), 8);
    assert!(table.numeric("tsnr").is_some());
}

#[test]
fn runs_with_different_headers_load_together() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    build_dataset(&data);
    let output = dir.path().join("qc.csv");
    let include = build_glob_set(&["**/*_bold.json".to_string()]).unwrap();
    let sources = collect_sources(&[data], &include, None).unwrap();

    extract_qc(&sources, &output, &QcOptions::default().without_anatomical()).unwrap();
    extract_qc(&sources, &output, &QcOptions::default()).unwrap();

    let table = Table::from_csv_paths(&[output]).unwrap();
    assert_eq!(table.len(), 8);
    let snr_total = table.numeric("snr_total").unwrap();
    assert!(snr_total[..4].iter().all(|v| v.is_nan()));
    assert_eq!(snr_total[6], 17.5);
}

#[test]
fn segstats_writes_count_and_volume_tables() {
    let dir = TempDir::new().unwrap();
    let path = dir
        .path()
        .join("sub-01/ses-20190301/anat/sub-01_ses-20190301_T1w_segstats.json");
    let mut record = serde_json::Map::new();
    for (i, region) in qadrift::extract::segstats::REGIONS.iter().enumerate() {
        record.insert(region.to_string(), json!([100 + i, 1000.5 + i as f64]));
    }
    write_json(&path, &Value::Object(record));
    let broken = dir
        .path()
        .join("sub-02/ses-20190302/anat/sub-02_ses-20190302_T1w_segstats.json");
    write_json(&broken, &json!({ "Left-Hippocampus": [1, 2.0] }));

    let output = dir.path().join("segstats.csv");
    let summary = extract_segstats(&[path, broken], &output).unwrap();
    assert_eq!(summary.outputs.len(), 2);
    assert_eq!(summary.skipped.len(), 1);

    let counts = fs::read_to_string(dir.path().join("segstats-count.csv")).unwrap();
    let volumes = fs::read_to_string(dir.path().join("segstats-volume.csv")).unwrap();
    assert_eq!(counts.lines().count(), 2);
    assert_eq!(volumes.lines().count(), 2);
    assert!(counts.lines().nth(1).unwrap().contains(",100,"));
    assert!(volumes.lines().nth(1).unwrap().contains(",1000.5,"));
}
