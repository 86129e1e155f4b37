//! Regression analysis over extracted QA tables
//!
//! [`regress`] runs the whole pipeline: derived covariates, profile column
//! selection, row filtering, centering and sequential orthogonalization, the
//! OLS fit, grouped F-tests, the significant set, partial fits and
//! Benjamini-Hochberg correction.

pub mod design;
pub mod linalg;
pub mod model;
pub mod scan;
pub mod significance;
pub mod table;

use chrono::NaiveDate;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::Config;
use design::{add_derived_covariates, build_design, filter_rows, ExcludedRows, Profile};
use model::OlsFit;
use significance::{
    fdr_table, group_tests, partial_fits, significant_variables, FdrEntry, GroupTest, PartialFit, DEFAULT_GROUPS,
};
use table::Table;

pub use scan::{scan, ScanRow};

/// Column holding the conversion software version
pub const SOFTWARE_VERSION_COLUMN: &str = "CSV";

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {source_name}: {message}")]
    Csv { source_name: String, message: String },

    #[error("no Date column in the input tables")]
    MissingDateColumn,

    #[error("row {row}: cannot parse date '{value}'")]
    InvalidDate { row: usize, value: String },

    #[error("missing columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("column '{0}' is not numeric")]
    NotNumeric(String),

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("{rows} usable rows cannot fit {params} parameters")]
    TooFewRows { rows: usize, params: usize },

    #[error("design matrix is singular")]
    Singular,
}

/// Inputs to one regression run
#[derive(Debug, Clone)]
pub struct RegressionOptions {
    pub target: String,
    pub profile: Profile,
    pub alpha: f64,
    pub seasonal_epoch: NaiveDate,
    /// Name prefixes tested jointly
    pub group_prefixes: Vec<String>,
    /// Keep only rows of this `Filetype`
    pub filetype: Option<String>,
}

impl Default for RegressionOptions {
    fn default() -> Self {
        Self::from_config(&Config::default(), "snr_total", Profile::All)
    }
}

impl RegressionOptions {
    pub fn from_config(config: &Config, target: &str, profile: Profile) -> Self {
        Self {
            target: target.to_string(),
            profile,
            alpha: config.alpha,
            seasonal_epoch: config.seasonal_epoch,
            group_prefixes: DEFAULT_GROUPS.iter().map(|s| s.to_string()).collect(),
            filetype: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Coefficient {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub t_value: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    pub nobs: usize,
    pub df_model: usize,
    pub df_resid: usize,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub f_statistic: f64,
    pub f_pvalue: f64,
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
}

impl From<&OlsFit> for ModelSummary {
    fn from(fit: &OlsFit) -> Self {
        Self {
            nobs: fit.nobs,
            df_model: fit.df_model,
            df_resid: fit.df_resid,
            r_squared: fit.rsquared,
            adj_r_squared: fit.rsquared_adj,
            f_statistic: fit.fvalue,
            f_pvalue: fit.f_pvalue,
            log_likelihood: fit.llf,
            aic: fit.aic,
            bic: fit.bic,
        }
    }
}

/// One row of the fit diagnostic
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FitPoint {
    pub date: NaiveDate,
    pub actual: f64,
    pub full_fit: f64,
    /// Sum of the partial fits of all significant covariates
    pub partial_sum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegressionReport {
    pub target: String,
    pub alpha: f64,
    /// `None` when the table has no software version column
    pub software_versions_consistent: Option<bool>,
    pub excluded: ExcludedRows,
    pub dropped_collinear: Vec<String>,
    pub coefficients: Vec<Coefficient>,
    pub summary: ModelSummary,
    pub group_tests: Vec<GroupTest>,
    pub significant: Vec<String>,
    #[serde(skip)]
    pub partial_fits: Vec<PartialFit>,
    pub fdr: Vec<FdrEntry>,
    pub points: Vec<FitPoint>,
}

/// Fit `options.target` against the profile's covariates
pub fn regress(table: &Table, options: &RegressionOptions) -> Result<RegressionReport, AnalysisError> {
    let mut table = match &options.filetype {
        Some(filetype) => table.filter_filetype(filetype)?,
        None => table.clone(),
    };
    let software_versions_consistent = table.is_constant(SOFTWARE_VERSION_COLUMN);

    add_derived_covariates(&mut table, options.seasonal_epoch);
    if !table.has_column(&options.target) {
        return Err(AnalysisError::MissingColumns(vec![options.target.clone()]));
    }
    let covariates = options.profile.columns(&table, &options.target);
    let (table, excluded) = filter_rows(&table, &options.target, &covariates)?;

    let design = build_design(&table, &options.target, &covariates)?;
    let fit = OlsFit::fit(&design.x, &design.y, design.names.clone())?;

    let prefixes = &options.group_prefixes;
    let groups = group_tests(&fit, prefixes);
    let significant = significant_variables(&fit, &groups, prefixes, options.alpha);
    let partials = partial_fits(&design, &fit, &significant);
    let fdr = fdr_table(&fit, &groups, prefixes, options.alpha);

    let points = design
        .dates
        .iter()
        .enumerate()
        .map(|(i, date)| FitPoint {
            date: *date,
            actual: design.y[i],
            full_fit: fit.fitted[i],
            partial_sum: partials.iter().map(|p| p.values[i]).sum(),
        })
        .collect();

    let coefficients = fit
        .names
        .iter()
        .enumerate()
        .map(|(i, name)| Coefficient {
            name: name.clone(),
            estimate: fit.params[i],
            std_error: fit.bse[i],
            t_value: fit.tvalues[i],
            p_value: fit.pvalues[i],
        })
        .collect();

    Ok(RegressionReport {
        target: options.target.clone(),
        alpha: options.alpha,
        software_versions_consistent,
        excluded,
        dropped_collinear: design.dropped_collinear,
        coefficients,
        summary: ModelSummary::from(&fit),
        group_tests: groups,
        significant,
        partial_fits: partials,
        fdr,
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qa_csv() -> String {
        let mut text = String::from("Date,Filetype,tsnr,SAR,AcquisitionTime,TxRefAmp,CSV\n");
        for week in 0..30u32 {
            let date = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap() + chrono::Days::new(7 * week as u64);
            let sar = 0.2 + 0.01 * (week % 4) as f64;
            let acq = 36000 + 60 * ((week * 7) % 9);
            let tx = 230.0 + ((week * 5) % 7) as f64;
            let wiggle = [0.3, -0.2, 0.1, -0.3, 0.2][(week % 5) as usize];
            let tsnr = 40.0 + 80.0 * sar + wiggle;
            let sar_cell = if week == 3 { String::new() } else { sar.to_string() };
            text.push_str(&format!(
                "{},task-rest_bold.json,{},{},{},{},v1.0.20170923\n",
                date.format("%Y%m%d"),
                tsnr,
                sar_cell,
                acq,
                tx
            ));
        }
        text
    }

    fn qa_options() -> RegressionOptions {
        RegressionOptions::from_config(
            &Config::default(),
            "tsnr",
            Profile::Qa {
                trend: false,
                seasonal: false,
                shims: false,
                iopd: false,
            },
        )
    }

    #[test]
    fn test_regress_reports_everything() {
        let table = Table::from_csv_str(&qa_csv()).unwrap();
        let report = regress(&table, &qa_options()).unwrap();

        assert_eq!(report.software_versions_consistent, Some(true));
        assert_eq!(
            report.excluded.missing_sar,
            vec![NaiveDate::from_ymd_opt(2018, 1, 22).unwrap()]
        );
        assert_eq!(report.summary.nobs, 29);
        let names: Vec<&str> = report.coefficients.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["AcquisitionTime", "SAR", "TxRefAmp", "const"]);
        assert!(report.significant.contains(&"SAR".to_string()));
        assert!(report.significant.contains(&"const".to_string()));
        assert!(report.group_tests.iter().all(|g| g.test.is_none()));
        assert_eq!(report.points.len(), 29);
        assert!(report.summary.r_squared > 0.5);
    }

    #[test]
    fn test_regress_missing_profile_column() {
        let table = Table::from_csv_str("Date,tsnr,SAR\n20180101,1,0.2\n20180108,2,0.3\n").unwrap();
        let err = regress(&table, &qa_options()).unwrap_err();
        match err {
            AnalysisError::MissingColumns(cols) => {
                assert_eq!(cols, vec!["AcquisitionTime".to_string(), "TxRefAmp".to_string()])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_regress_missing_target() {
        let table = Table::from_csv_str(&qa_csv()).unwrap();
        let options = RegressionOptions {
            target: "snr_total".to_string(),
            ..qa_options()
        };
        assert!(matches!(
            regress(&table, &options),
            Err(AnalysisError::MissingColumns(ref c)) if c == &vec!["snr_total".to_string()]
        ));
    }

    #[test]
    fn test_regress_filetype_filter_to_nothing() {
        let table = Table::from_csv_str(&qa_csv()).unwrap();
        let options = RegressionOptions {
            filetype: Some("task-other_bold.json".to_string()),
            ..qa_options()
        };
        assert!(matches!(
            regress(&table, &options),
            Err(AnalysisError::TooFewRows { rows: 0, .. })
        ));
    }

    #[test]
    fn test_regress_mixed_covariate_scales() {
        // Seconds since midnight next to a covariate in thousandths
        let start = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
        let dates: Vec<NaiveDate> = (0..20u64).map(|i| start + chrono::Days::new(7 * i)).collect();
        let acq: Vec<f64> = (0..20).map(|i| 30000.0 + 1440.0 * (((i * 7) % 11) as f64 - 5.0)).collect();
        let small: Vec<f64> = (0..20).map(|i| 1e-3 * (((i * 5) % 13) as f64 - 6.0)).collect();
        let y: Vec<f64> = (0..20)
            .map(|i| 50.0 + 1e-4 * acq[i] + 900.0 * small[i] + [0.3, -0.1, -0.2][i % 3])
            .collect();
        let table = Table::from_numeric(
            dates,
            vec![("y", y), ("AcquisitionTime", acq), ("small", small)],
        );
        let options = RegressionOptions {
            target: "y".to_string(),
            profile: Profile::All,
            ..RegressionOptions::default()
        };
        let report = regress(&table, &options).unwrap();
        assert_eq!(report.summary.nobs, 20);
        assert!(report.dropped_collinear.is_empty());
        assert!(report.coefficients.iter().any(|c| c.name == "small" && c.std_error.is_finite()));
        assert!(report.significant.contains(&"small".to_string()));
    }
}
