//! Config schema and deserialization

use chrono::NaiveDate;
use serde::Deserialize;
use std::path::PathBuf;

fn default_flat_layout_cutover() -> NaiveDate {
    NaiveDate::from_ymd_opt(2018, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn default_anatomical_cutover() -> NaiveDate {
    NaiveDate::from_ymd_opt(2017, 10, 26).unwrap_or(NaiveDate::MIN)
}

fn default_seasonal_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2017, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn default_anatomical_suffix() -> String {
    "T1w.json".to_string()
}

fn default_include_patterns() -> Vec<String> {
    vec!["**/*_bold.json".to_string()]
}

fn default_alpha() -> f64 {
    0.05
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_heatmap_file() -> String {
    "correlation_heatmap.svg".to_string()
}

fn default_fit_plot_file() -> String {
    "fit_diagnostic.svg".to_string()
}

/// Root config structure for .qadriftrc.json
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// First session date whose records use the flat field layout
    #[serde(default = "default_flat_layout_cutover")]
    pub flat_layout_cutover: NaiveDate,

    /// First session date that has an anatomical companion file
    #[serde(default = "default_anatomical_cutover")]
    pub anatomical_cutover: NaiveDate,

    /// File name tail of the anatomical companion (after `sub-*_ses-*_`)
    #[serde(default = "default_anatomical_suffix")]
    pub anatomical_suffix: String,

    /// Glob patterns selecting metadata files when walking a directory
    #[serde(default = "default_include_patterns")]
    pub include_patterns: Vec<String>,

    /// Glob patterns for files/directories to exclude from extraction
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Day zero of the seasonal sine/cosine regressors
    #[serde(default = "default_seasonal_epoch")]
    pub seasonal_epoch: NaiveDate,

    /// Significance level for F-tests, marginal p-values and FDR
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Directory where rendered images are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_heatmap_file")]
    pub heatmap_file: String,

    #[serde(default = "default_fit_plot_file")]
    pub fit_plot_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            flat_layout_cutover: default_flat_layout_cutover(),
            anatomical_cutover: default_anatomical_cutover(),
            anatomical_suffix: default_anatomical_suffix(),
            include_patterns: default_include_patterns(),
            ignore: Vec::new(),
            seasonal_epoch: default_seasonal_epoch(),
            alpha: default_alpha(),
            output_dir: default_output_dir(),
            heatmap_file: default_heatmap_file(),
            fit_plot_file: default_fit_plot_file(),
        }
    }
}

impl Config {
    /// Merge CLI overrides into config. CLI takes precedence.
    pub fn merge_with_cli(mut self, alpha: Option<f64>, output_dir: Option<PathBuf>) -> Self {
        if let Some(a) = alpha {
            self.alpha = a;
        }
        if let Some(dir) = output_dir {
            self.output_dir = dir;
        }
        self
    }

    /// Full path of the correlation heatmap image
    pub fn heatmap_path(&self) -> PathBuf {
        self.output_dir.join(&self.heatmap_file)
    }

    /// Full path of the fit diagnostic image
    pub fn fit_plot_path(&self) -> PathBuf {
        self.output_dir.join(&self.fit_plot_file)
    }
}
