//! JSON reporter for machine-readable output

use crate::analysis::{RegressionReport, ScanRow};
use crate::extract::ExtractionSummary;
use serde::Serialize;

/// Reporter for JSON output. Non-finite numbers serialize as `null`.
pub struct JsonReporter {
    /// Whether to pretty-print JSON
    pretty: bool,
}

impl JsonReporter {
    pub fn new() -> Self {
        Self { pretty: false }
    }

    /// Enable pretty-printing
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    fn render<T: Serialize + ?Sized>(&self, value: &T, fallback: &str) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|_| fallback.to_string())
    }

    pub fn report_regression(&self, report: &RegressionReport) -> String {
        self.render(report, "{}")
    }

    pub fn report_scan(&self, variable: &str, rows: &[ScanRow]) -> String {
        self.render(&JsonScan { variable, rows }, "{}")
    }

    pub fn report_extraction(&self, summary: &ExtractionSummary) -> String {
        self.render(summary, "{}")
    }
}

impl Default for JsonReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonScan<'a> {
    variable: &'a str,
    rows: &'a [ScanRow],
}
