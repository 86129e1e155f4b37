//! Repeat one regression over several targets and collect a single
//! covariate's significance per target

use super::significance::benjamini_hochberg;
use super::table::Table;
use super::{regress, AnalysisError, RegressionOptions};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRow {
    pub target: String,
    /// `None` when the variable did not enter this target's model
    pub p_value: Option<f64>,
    /// Benjamini-Hochberg adjusted across all targets
    pub fdr_p_value: Option<f64>,
    pub r_squared: f64,
}

/// Fit `options` once per target. The target in `options` is ignored.
pub fn scan(
    table: &Table,
    targets: &[String],
    variable: &str,
    options: &RegressionOptions,
) -> Result<Vec<ScanRow>, AnalysisError> {
    let mut rows = Vec::with_capacity(targets.len());
    for target in targets {
        let opts = RegressionOptions {
            target: target.clone(),
            ..options.clone()
        };
        let report = regress(table, &opts)?;
        let p_value = report
            .coefficients
            .iter()
            .find(|c| c.name == variable)
            .map(|c| c.p_value);
        rows.push(ScanRow {
            target: target.clone(),
            p_value,
            fdr_p_value: None,
            r_squared: report.summary.r_squared,
        });
    }

    let raw: Vec<f64> = rows.iter().map(|r| r.p_value.unwrap_or(f64::NAN)).collect();
    for (row, adjusted) in rows.iter_mut().zip(benjamini_hochberg(&raw)) {
        row.fdr_p_value = adjusted.is_finite().then_some(adjusted);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::design::Profile;
    use chrono::NaiveDate;

    fn table() -> Table {
        let n = 20;
        let dates = (0..n)
            .map(|i| NaiveDate::from_ymd_opt(2019, 1, 1).unwrap() + chrono::Days::new(i as u64))
            .collect();
        let weight: Vec<f64> = (0..n).map(|i| 60.0 + ((i * 7) % 13) as f64).collect();
        let age: Vec<f64> = (0..n).map(|i| 20.0 + ((i * 3) % 17) as f64).collect();
        let wobble = [0.2, -0.3, 0.1, 0.0, -0.1, 0.3, -0.2];
        let volume: Vec<f64> = (0..n).map(|i| 1000.0 + 5.0 * weight[i] + wobble[i % 7]).collect();
        let flat: Vec<f64> = (0..n).map(|i| 10.0 + wobble[(i * 3) % 7]).collect();
        Table::from_numeric(
            dates,
            vec![
                ("PatientWeight", weight),
                ("age", age),
                ("Hippocampus", volume),
                ("Thalamus", flat),
            ],
        )
    }

    #[test]
    fn test_scan_collects_variable_per_target() {
        let options = RegressionOptions {
            profile: Profile::All,
            ..RegressionOptions::default()
        };
        let targets = vec!["Hippocampus".to_string(), "Thalamus".to_string()];
        let rows = scan(&table(), &targets, "PatientWeight", &options).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].p_value.unwrap() < 1e-6);
        assert!(rows[0].r_squared > 0.99);
        assert!(rows[0].fdr_p_value.unwrap() >= rows[0].p_value.unwrap());
    }

    #[test]
    fn test_scan_variable_absent_from_model() {
        let options = RegressionOptions {
            profile: Profile::All,
            ..RegressionOptions::default()
        };
        let rows = scan(&table(), &["PatientWeight".to_string()], "PatientWeight", &options).unwrap();
        assert_eq!(rows[0].p_value, None);
        assert_eq!(rows[0].fdr_p_value, None);
    }
}
