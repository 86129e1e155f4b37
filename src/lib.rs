//! qadrift: QA metric extraction and drift analysis for imaging metadata
//!
//! The extraction stage walks a dataset of per-acquisition JSON sidecars
//! (or DICOM files) and appends one normalized row per file to a CSV. The
//! analysis stage loads those CSVs, fits an OLS model of an SNR metric on
//! orthogonalized covariates, and reports which covariates matter after
//! grouped F-tests and false-discovery-rate correction.

pub mod analysis;
pub mod config;
pub mod extract;
pub mod reporter;

pub use analysis::design::Profile;
pub use analysis::table::Table;
pub use analysis::{regress, scan, AnalysisError, RegressionOptions, RegressionReport, ScanRow};
pub use config::Config;
pub use extract::{ExtractError, ExtractionSummary, SkipReason};
