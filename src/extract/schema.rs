//! Schema eras of the QC metadata records
//!
//! The QC tool changed its output layout over time. Each record is assigned
//! to exactly one [`SchemaEra`] from its session date, and each era has its
//! own field-extraction function.

use super::SkipReason;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

/// Number of shim coefficient columns in the QC output
pub const SHIM_COUNT: usize = 8;

/// Field layout generation of a QC record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SchemaEra {
    /// Fields nested under `bids_meta.global.const` / `bids_meta.time.samples`
    Nested,
    /// Nested layout, with an anatomical companion file carrying `snr_total`
    NestedWithAnatomical,
    /// Flat layout: fields on the record or directly under `bids_meta`,
    /// `TxRefAmp` present, SNR from `snr_total` or `tsnr`
    Flat,
}

/// Dates at which the layout changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraBoundaries {
    /// First date with an anatomical companion
    pub anatomical: NaiveDate,
    /// First date with the flat layout
    pub flat_layout: NaiveDate,
}

impl EraBoundaries {
    pub fn classify(&self, date: NaiveDate) -> SchemaEra {
        if date >= self.flat_layout {
            SchemaEra::Flat
        } else if date >= self.anatomical {
            SchemaEra::NestedWithAnatomical
        } else {
            SchemaEra::Nested
        }
    }
}

impl Default for EraBoundaries {
    fn default() -> Self {
        let config = crate::config::Config::default();
        Self {
            anatomical: config.anatomical_cutover,
            flat_layout: config.flat_layout_cutover,
        }
    }
}

/// Which SNR metric the record provided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnrMetric {
    SnrTotal,
    Tsnr,
}

/// Normalized QC fields of one record
#[derive(Debug, Clone, PartialEq)]
pub struct QcFields {
    pub snr: f64,
    pub snr_metric: SnrMetric,
    pub sar: f64,
    /// Seconds since midnight
    pub acquisition_time: u32,
    pub tx_ref_amp: Option<f64>,
    pub software_versions: Option<String>,
    pub conversion_software_version: Option<String>,
    pub repetition_time: Option<f64>,
    pub shims: Vec<f64>,
}

impl SchemaEra {
    /// Whether records of this era have an anatomical companion file
    pub fn merges_anatomical(self) -> bool {
        matches!(self, SchemaEra::NestedWithAnatomical | SchemaEra::Flat)
    }

    /// Pull the era's fields out of `record`, or say why it is not eligible.
    pub fn extract(self, record: &Value) -> Result<QcFields, SkipReason> {
        match self {
            SchemaEra::Nested | SchemaEra::NestedWithAnatomical => extract_nested(record),
            SchemaEra::Flat => extract_flat(record),
        }
    }
}

fn missing(field: &str) -> SkipReason {
    SkipReason::MissingField {
        field: field.to_string(),
    }
}

fn invalid(field: &str, message: impl Into<String>) -> SkipReason {
    SkipReason::InvalidField {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Look up `section.key` under `bids_meta`, falling back to the record root
/// (raw scanner metadata has no `bids_meta` wrapper).
fn nested<'a>(record: &'a Value, section: &str, key: &str) -> Option<&'a Value> {
    record
        .pointer(&format!("/bids_meta/{}/{}", section, key))
        .or_else(|| record.pointer(&format!("/{}/{}", section, key)))
}

/// Look up `key` on the record itself, then under `bids_meta`
fn flat<'a>(record: &'a Value, key: &str) -> Option<&'a Value> {
    record
        .get(key)
        .or_else(|| record.get("bids_meta").and_then(|m| m.get(key)))
}

fn number(field: &str, value: &Value) -> Result<f64, SkipReason> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| invalid(field, "not a finite number")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid(field, format!("'{}' is not a number", s))),
        // Per-volume samples: the first volume stands for the run
        Value::Array(items) => match items.first() {
            Some(first) => number(field, first),
            None => Err(invalid(field, "empty sample list")),
        },
        other => Err(invalid(field, format!("unexpected value {}", other))),
    }
}

fn optional_number(value: Option<&Value>) -> Option<f64> {
    value.and_then(|v| number("", v).ok())
}

fn optional_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn shims(value: Option<&Value>) -> Vec<f64> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .take(SHIM_COUNT)
            .filter_map(|v| v.as_f64())
            .collect(),
        _ => Vec::new(),
    }
}

fn acquisition_time(field: &str, value: &Value) -> Result<u32, SkipReason> {
    match value {
        Value::String(s) => parse_acquisition_time(s).map_err(|e| invalid(field, e)),
        Value::Array(items) => match items.first() {
            Some(first) => acquisition_time(field, first),
            None => Err(invalid(field, "empty sample list")),
        },
        Value::Number(n) => n
            .as_f64()
            .filter(|s| (0.0..86_400.0).contains(s))
            .map(|s| s as u32)
            .ok_or_else(|| invalid(field, format!("{} is not a time of day in seconds", n))),
        other => Err(invalid(field, format!("unexpected value {}", other))),
    }
}

/// Convert `HH:MM:SS[.ffffff]` (or DICOM-style `HHMMSS[.ffffff]`) to whole
/// seconds since midnight. The fractional part is truncated.
pub fn parse_acquisition_time(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let whole = s.split('.').next().unwrap_or(s);
    let parts: Vec<&str> = if whole.contains(':') {
        whole.split(':').collect()
    } else if whole.len() == 6 && whole.is_ascii() {
        vec![&whole[0..2], &whole[2..4], &whole[4..6]]
    } else {
        return Err(format!("'{}' is not HH:MM:SS", s));
    };
    if parts.len() != 3 {
        return Err(format!("'{}' is not HH:MM:SS", s));
    }

    let mut fields = [0u32; 3];
    for (slot, part) in fields.iter_mut().zip(&parts) {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("'{}' is not HH:MM:SS", s));
        }
        *slot = part.parse().map_err(|_| format!("'{}' is not HH:MM:SS", s))?;
    }
    let [h, m, sec] = fields;
    if h > 23 || m > 59 || sec > 60 {
        return Err(format!("'{}' is out of range", s));
    }

    if let Some(frac) = s.split('.').nth(1) {
        if frac.is_empty() || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("'{}' has a malformed fraction", s));
        }
    }

    Ok(h * 3600 + m * 60 + sec)
}

fn extract_nested(record: &Value) -> Result<QcFields, SkipReason> {
    let tsnr = record.get("tsnr").ok_or_else(|| missing("tsnr"))?;
    let sar = nested(record, "global/const", "SAR").ok_or_else(|| missing("global.const.SAR"))?;
    let time = nested(record, "time/samples", "AcquisitionTime")
        .ok_or_else(|| missing("time.samples.AcquisitionTime"))?;

    Ok(QcFields {
        snr: number("tsnr", tsnr)?,
        snr_metric: SnrMetric::Tsnr,
        sar: number("global.const.SAR", sar)?,
        acquisition_time: acquisition_time("time.samples.AcquisitionTime", time)?,
        tx_ref_amp: optional_number(nested(record, "global/const", "TxRefAmp")),
        software_versions: optional_text(nested(record, "global/const", "SoftwareVersions")),
        conversion_software_version: optional_text(nested(
            record,
            "global/const",
            "ConversionSoftwareVersion",
        )),
        repetition_time: optional_number(nested(record, "global/const", "RepetitionTime")),
        shims: shims(nested(record, "global/const", "ShimSetting")),
    })
}

fn extract_flat(record: &Value) -> Result<QcFields, SkipReason> {
    // All three scanner fields are required together
    let sar = flat(record, "SAR").ok_or_else(|| missing("SAR"))?;
    let time = flat(record, "AcquisitionTime").ok_or_else(|| missing("AcquisitionTime"))?;
    let tx_ref_amp = flat(record, "TxRefAmp").ok_or_else(|| missing("TxRefAmp"))?;

    let (snr_metric, snr) = if let Some(v) = record.get("snr_total") {
        (SnrMetric::SnrTotal, number("snr_total", v)?)
    } else if let Some(v) = record.get("tsnr") {
        (SnrMetric::Tsnr, number("tsnr", v)?)
    } else {
        return Err(missing("snr_total|tsnr"));
    };

    Ok(QcFields {
        snr,
        snr_metric,
        sar: number("SAR", sar)?,
        acquisition_time: acquisition_time("AcquisitionTime", time)?,
        tx_ref_amp: Some(number("TxRefAmp", tx_ref_amp)?),
        software_versions: optional_text(flat(record, "SoftwareVersions")),
        conversion_software_version: optional_text(flat(record, "ConversionSoftwareVersion")),
        repetition_time: optional_number(flat(record, "RepetitionTime")),
        shims: shims(flat(record, "ShimSetting")),
    })
}
