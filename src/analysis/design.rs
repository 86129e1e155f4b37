//! Design matrix construction
//!
//! Derived covariates are added to the table first, then a profile picks the
//! covariate columns, incomplete rows are dropped, and the covariates are
//! centered and orthogonalized in column order before the intercept is
//! appended.

use super::linalg::dot;
use super::model::INTERCEPT;
use super::table::Table;
use super::AnalysisError;
use chrono::{Datelike, NaiveDate};
use ndarray::{Array1, Array2};
use serde::Serialize;

pub const DATE_ORDINAL: &str = "DateOrdinal";
pub const SEASONAL_SIN: &str = "Seasonal (sin)";
pub const SEASONAL_COS: &str = "Seasonal (cos)";
pub const SAR: &str = "SAR";

/// Relative residual norm below which a column counts as collinear
const COLLINEAR_TOLERANCE: f64 = 1e-10;

const DAYS_PER_YEAR: f64 = 365.25;

/// Add the linear date term and the yearly sine/cosine regressors
pub fn add_derived_covariates(table: &mut Table, seasonal_epoch: NaiveDate) {
    let ordinal: Vec<f64> = table
        .dates()
        .iter()
        .map(|d| f64::from(d.num_days_from_ce()))
        .collect();
    let radians: Vec<f64> = table
        .dates()
        .iter()
        .map(|d| (*d - seasonal_epoch).num_days() as f64 * 2.0 * std::f64::consts::PI / DAYS_PER_YEAR)
        .collect();
    table.set_numeric(DATE_ORDINAL, ordinal);
    table.set_numeric(SEASONAL_SIN, radians.iter().map(|r| r.sin()).collect());
    table.set_numeric(SEASONAL_COS, radians.iter().map(|r| r.cos()).collect());
}

/// Which covariates enter the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Profile {
    /// Phantom QA runs: scanner settings and timing
    Qa {
        trend: bool,
        seasonal: bool,
        shims: bool,
        iopd: bool,
    },
    /// Participant data: demographics plus the QA-derived SNR
    RealData { trend: bool, seasonal: bool },
    /// Every numeric column except the date and the target
    All,
}

impl Profile {
    /// Covariate names in model order, never including `target`
    pub fn columns(&self, table: &Table, target: &str) -> Vec<String> {
        let mut cols: Vec<String> = Vec::new();
        let mut push = |name: &str| cols.push(name.to_string());
        match *self {
            Profile::Qa {
                trend,
                seasonal,
                shims,
                iopd,
            } => {
                if trend {
                    push(DATE_ORDINAL);
                }
                push("AcquisitionTime");
                push(SAR);
                push("TxRefAmp");
                if shims {
                    (1..=8).for_each(|i| push(&format!("Shim{}", i)));
                }
                if iopd {
                    (1..=6).for_each(|i| push(&format!("IOPD{}", i)));
                }
                if seasonal {
                    push(SEASONAL_SIN);
                    push(SEASONAL_COS);
                }
            }
            Profile::RealData { trend, seasonal } => {
                push("age");
                push("sind");
                push("PatientWeight");
                push("snr_total_qa");
                (1..=6).for_each(|i| push(&format!("IOPD{}_real", i)));
                if trend {
                    push(DATE_ORDINAL);
                }
                if seasonal {
                    push(SEASONAL_SIN);
                    push(SEASONAL_COS);
                }
            }
            Profile::All => {
                // Columns never filled (e.g. shims of an era without them) would empty the table
                table
                    .numeric_columns()
                    .into_iter()
                    .filter(|name| table.numeric(name).is_some_and(|v| v.iter().any(|x| x.is_finite())))
                    .for_each(push);
            }
        }
        cols.retain(|c| c != target);
        cols
    }
}

/// Rows removed before fitting
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcludedRows {
    /// Dates whose SAR was missing or not finite
    pub missing_sar: Vec<NaiveDate>,
    /// Dates with a non-finite target or covariate value
    pub incomplete: Vec<NaiveDate>,
}

impl ExcludedRows {
    pub fn is_empty(&self) -> bool {
        self.missing_sar.is_empty() && self.incomplete.is_empty()
    }
}

fn require_numeric<'a>(table: &'a Table, names: &[String]) -> Result<Vec<&'a [f64]>, AnalysisError> {
    let missing: Vec<String> = names.iter().filter(|n| !table.has_column(n)).cloned().collect();
    if !missing.is_empty() {
        return Err(AnalysisError::MissingColumns(missing));
    }
    names
        .iter()
        .map(|n| table.numeric(n).ok_or_else(|| AnalysisError::NotNumeric(n.clone())))
        .collect()
}

/// Drop rows without a finite SAR (when the table has SAR), then rows with
/// any non-finite target or covariate value.
pub fn filter_rows(
    table: &Table,
    target: &str,
    covariates: &[String],
) -> Result<(Table, ExcludedRows), AnalysisError> {
    let mut excluded = ExcludedRows::default();
    let mut mask = vec![true; table.len()];

    if let Some(sar) = table.numeric(SAR) {
        for (i, value) in sar.iter().enumerate() {
            if !value.is_finite() {
                mask[i] = false;
                excluded.missing_sar.push(table.dates()[i]);
            }
        }
    }

    let mut needed = covariates.to_vec();
    needed.push(target.to_string());
    let columns = require_numeric(table, &needed)?;
    for i in 0..table.len() {
        if mask[i] && columns.iter().any(|col| !col[i].is_finite()) {
            mask[i] = false;
            excluded.incomplete.push(table.dates()[i]);
        }
    }

    Ok((table.select_rows(&mask), excluded))
}

/// Sequential Gram-Schmidt over the columns of `m`, in order.
///
/// Each column loses its component along every earlier kept column. A column
/// left with (relatively) no norm is zeroed and reported as not kept.
pub fn orthogonalize(m: &mut Array2<f64>) -> Vec<bool> {
    let p = m.ncols();
    let mut kept = vec![false; p];
    for j in 0..p {
        let original_norm = dot(m.column(j), m.column(j)).sqrt();
        for k in 0..j {
            if !kept[k] {
                continue;
            }
            let qk = m.column(k).to_owned();
            let coef = dot(m.column(j), qk.view()) / dot(qk.view(), qk.view());
            m.column_mut(j).scaled_add(-coef, &qk);
        }
        let norm = dot(m.column(j), m.column(j)).sqrt();
        if original_norm > 0.0 && norm > COLLINEAR_TOLERANCE * original_norm {
            kept[j] = true;
        } else {
            m.column_mut(j).fill(0.0);
        }
    }
    kept
}

/// Subtract each column's mean
pub fn center(m: &mut Array2<f64>) {
    for mut col in m.columns_mut() {
        let mean = col.mean().unwrap_or(0.0);
        col.mapv_inplace(|v| v - mean);
    }
}

/// Numeric model inputs ready for [`super::model::OlsFit::fit`]
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    /// Covariate names followed by the intercept
    pub names: Vec<String>,
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    /// Dates of the rows, not part of the model
    pub dates: Vec<NaiveDate>,
    /// Covariates removed because nothing was left after orthogonalization
    pub dropped_collinear: Vec<String>,
}

/// Center and orthogonalize `covariates` from an already filtered table and
/// append an intercept column.
pub fn build_design(table: &Table, target: &str, covariates: &[String]) -> Result<DesignMatrix, AnalysisError> {
    let columns = require_numeric(table, covariates)?;
    let y = require_numeric(table, &[target.to_string()])?[0].to_vec();
    let n = table.len();

    let mut x = Array2::<f64>::zeros((n, columns.len()));
    for (j, col) in columns.iter().enumerate() {
        for (i, v) in col.iter().enumerate() {
            x[[i, j]] = *v;
        }
    }
    center(&mut x);
    let kept = orthogonalize(&mut x);

    let kept_idx: Vec<usize> = (0..kept.len()).filter(|&j| kept[j]).collect();
    let dropped_collinear = (0..kept.len())
        .filter(|&j| !kept[j])
        .map(|j| covariates[j].clone())
        .collect();

    let mut design = Array2::<f64>::ones((n, kept_idx.len() + 1));
    for (dst, &src) in kept_idx.iter().enumerate() {
        design.column_mut(dst).assign(&x.column(src));
    }
    let mut names: Vec<String> = kept_idx.iter().map(|&j| covariates[j].clone()).collect();
    names.push(INTERCEPT.to_string());

    Ok(DesignMatrix {
        names,
        x: design,
        y: Array1::from(y),
        dates: table.dates().to_vec(),
        dropped_collinear,
    })
}
