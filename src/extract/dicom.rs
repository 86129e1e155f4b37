//! Instrument attribute extraction from DICOM Part-10 files
//!
//! Files are parsed with `dicom-object` up to the pixel data, so any
//! transfer syntax it can decode is accepted.

use super::path_info::PathInfo;
use super::writer::CsvSink;
use super::{ExtractError, ExtractionSummary, RecordOutcome, SkipReason};
use dicom_core::Tag;
use dicom_dictionary_std::tags;
use dicom_object::{DefaultDicomObject, OpenFileOptions};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Attributes that can be requested with `--type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    StudyDate,
    SeriesDescription,
    PatientId,
    PatientSex,
    PatientAge,
    PatientSize,
    PatientWeight,
    MagneticFieldStrength,
    RepetitionTime,
    SoftwareVersions,
}

impl Attribute {
    pub const ALL: [Attribute; 10] = [
        Attribute::StudyDate,
        Attribute::SeriesDescription,
        Attribute::PatientId,
        Attribute::PatientSex,
        Attribute::PatientAge,
        Attribute::PatientSize,
        Attribute::PatientWeight,
        Attribute::MagneticFieldStrength,
        Attribute::RepetitionTime,
        Attribute::SoftwareVersions,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            Attribute::StudyDate => "StudyDate",
            Attribute::SeriesDescription => "SeriesDescription",
            Attribute::PatientId => "PatientID",
            Attribute::PatientSex => "PatientSex",
            Attribute::PatientAge => "PatientAge",
            Attribute::PatientSize => "PatientSize",
            Attribute::PatientWeight => "PatientWeight",
            Attribute::MagneticFieldStrength => "MagneticFieldStrength",
            Attribute::RepetitionTime => "RepetitionTime",
            Attribute::SoftwareVersions => "SoftwareVersions",
        }
    }

    fn tag(self) -> Tag {
        match self {
            Attribute::StudyDate => tags::STUDY_DATE,
            Attribute::SeriesDescription => tags::SERIES_DESCRIPTION,
            Attribute::PatientId => tags::PATIENT_ID,
            Attribute::PatientSex => tags::PATIENT_SEX,
            Attribute::PatientAge => tags::PATIENT_AGE,
            Attribute::PatientSize => tags::PATIENT_SIZE,
            Attribute::PatientWeight => tags::PATIENT_WEIGHT,
            Attribute::MagneticFieldStrength => tags::MAGNETIC_FIELD_STRENGTH,
            Attribute::RepetitionTime => tags::REPETITION_TIME,
            Attribute::SoftwareVersions => tags::SOFTWARE_VERSIONS,
        }
    }
}

impl FromStr for Attribute {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Attribute::ALL
            .into_iter()
            .find(|a| a.keyword().eq_ignore_ascii_case(s))
            .ok_or_else(|| ExtractError::UnknownAttribute(s.to_string()))
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Value of `attribute` as text, `None` when absent or empty
pub fn read_attribute(object: &DefaultDicomObject, attribute: Attribute) -> Result<Option<String>, String> {
    let element = match object.element_opt(attribute.tag()) {
        Ok(Some(element)) => element,
        Ok(None) => return Ok(None),
        Err(e) => return Err(e.to_string()),
    };
    let text = element.to_str().map_err(|e| e.to_string())?;
    let text = text.trim_matches(|c: char| c == '\0' || c == ' ');
    Ok((!text.is_empty()).then(|| text.to_string()))
}

fn open(path: &Path) -> Result<DefaultDicomObject, ExtractError> {
    OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
        .map_err(|e| ExtractError::Dicom {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

pub fn process_file(path: &Path, attribute: Attribute) -> Result<RecordOutcome<Vec<String>>, ExtractError> {
    let info = match PathInfo::parse(path) {
        Ok(info) => info,
        Err(message) => return Ok(RecordOutcome::Skip(SkipReason::UnparseablePath { message })),
    };
    let object = open(path)?;
    let value = read_attribute(&object, attribute).map_err(|message| ExtractError::Dicom {
        path: path.to_path_buf(),
        message,
    })?;

    Ok(match value {
        Some(value) => RecordOutcome::Row(vec![
            info.date_column(),
            info.subject_column(),
            info.session.clone(),
            value,
        ]),
        None => RecordOutcome::Skip(SkipReason::MissingAttribute {
            attribute: attribute.keyword().to_string(),
        }),
    })
}

/// Extract one attribute from each DICOM file into `output`
pub fn extract_dicom(
    sources: &[PathBuf],
    output: &Path,
    attribute: Attribute,
) -> Result<ExtractionSummary, ExtractError> {
    let header = ["Date", "sid", "ses", attribute.keyword()];
    let mut sink = CsvSink::open_append(output, &header)?;
    let mut summary = ExtractionSummary {
        outputs: vec![output.to_path_buf()],
        ..Default::default()
    };

    for path in sources {
        summary.files_seen += 1;
        match process_file(path, attribute)? {
            RecordOutcome::Row(row) => sink.write_row(&row)?,
            RecordOutcome::Skip(reason) => summary.skip(path, reason),
        }
    }

    summary.rows_written = sink.finish()?;
    Ok(summary)
}
