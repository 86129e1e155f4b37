//! Console reporter with colored output

use crate::analysis::{RegressionReport, ScanRow};
use crate::extract::ExtractionSummary;
use colored::Colorize;

/// Reporter for terminal output
pub struct ConsoleReporter {
    /// Whether to list every skipped file and group members
    verbose: bool,
}

fn fmt_p(p: f64) -> String {
    if p.is_nan() {
        "nan".to_string()
    } else if p < 1e-4 {
        format!("{:.2e}", p)
    } else {
        format!("{:.4}", p)
    }
}

fn fmt_opt_p(p: Option<f64>) -> String {
    p.map(fmt_p).unwrap_or_else(|| "-".to_string())
}

fn join_lines(lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self { verbose: false }
    }

    /// Enable verbose output
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    pub fn report_extraction(&self, summary: &ExtractionSummary) {
        print!("{}", self.render_extraction(summary));
    }

    pub fn report_regression(&self, report: &RegressionReport) {
        print!("{}", self.render_regression(report));
    }

    pub fn report_scan(&self, variable: &str, rows: &[ScanRow]) {
        print!("{}", self.render_scan(variable, rows));
    }

    pub fn render_extraction(&self, summary: &ExtractionSummary) -> String {
        let mut lines = Vec::new();
        let outputs: Vec<String> = summary.outputs.iter().map(|p| p.display().to_string()).collect();
        lines.push(format!(
            "{} {} rows from {} files to {}",
            "Extracted".bold(),
            summary.rows_written,
            summary.files_seen,
            outputs.join(", ")
        ));
        if !summary.skipped.is_empty() {
            lines.push(format!("   {} {} files", "Skipped".yellow(), summary.skipped.len()));
            if self.verbose {
                for skip in &summary.skipped {
                    lines.push(format!("     {} {}", skip.path.display().to_string().dimmed(), skip.reason));
                }
            }
        }
        join_lines(lines)
    }

    pub fn render_regression(&self, report: &RegressionReport) -> String {
        let mut lines = Vec::new();
        lines.push(String::new());
        lines.push(format!("Regression: {}", report.target).bold().to_string());

        match report.software_versions_consistent {
            Some(true) => {
                lines.push(format!("   Software versions: {}", "consistent".green()));
            }
            Some(false) => {
                lines.push(format!("   Software versions: {}", "CHANGED during the period".red()));
            }
            None => {}
        }

        if !report.excluded.missing_sar.is_empty() {
            let dates: Vec<String> = report.excluded.missing_sar.iter().map(|d| d.to_string()).collect();
            lines.push(format!("   Dates without SAR, excluded: {}", dates.join(", ").yellow()));
        }
        if !report.excluded.incomplete.is_empty() {
            let dates: Vec<String> = report.excluded.incomplete.iter().map(|d| d.to_string()).collect();
            lines.push(format!("   Incomplete rows, excluded: {}", dates.join(", ").yellow()));
        }
        if !report.dropped_collinear.is_empty() {
            lines.push(format!(
                "   Collinear covariates dropped: {}",
                report.dropped_collinear.join(", ").yellow()
            ));
        }
        lines.push(String::new());

        let s = &report.summary;
        lines.push(format!("   {}", "Model:".bold()));
        lines.push(format!(
            "   n = {}  df model = {}  df resid = {}",
            s.nobs, s.df_model, s.df_resid
        ));
        lines.push(format!(
            "   R² = {:.4}  adj. R² = {:.4}  F = {:.3} (p = {})",
            s.r_squared,
            s.adj_r_squared,
            s.f_statistic,
            fmt_p(s.f_pvalue)
        ));
        lines.push(format!(
            "   log-likelihood = {:.3}  AIC = {:.3}  BIC = {:.3}",
            s.log_likelihood, s.aic, s.bic
        ));
        lines.push(String::new());

        lines.push(format!("   {}", "Coefficients:".bold()));
        lines.push(format!(
            "   {:<24} {:>12} {:>10} {:>8} {:>10}",
            "", "coef", "std err", "t", "P>|t|"
        ));
        for c in &report.coefficients {
            let line = format!(
                "   {:<24} {:>12.4} {:>10.4} {:>8.3} {:>10}",
                c.name,
                c.estimate,
                c.std_error,
                c.t_value,
                fmt_p(c.p_value)
            );
            if c.p_value < report.alpha {
                lines.push(line);
            } else {
                lines.push(line.dimmed().to_string());
            }
        }
        lines.push(String::new());

        lines.push(format!("   {}", "Group F-tests:".bold()));
        for group in &report.group_tests {
            match &group.test {
                Some(t) => {
                    let verdict = if group.rejects(report.alpha) {
                        "rejected".green()
                    } else {
                        "not rejected".dimmed()
                    };
                    lines.push(format!(
                        "   {:<10} F({}, {}) = {:.3}, p = {} {}",
                        group.prefix,
                        t.df_num,
                        t.df_denom,
                        t.fvalue,
                        fmt_p(t.pvalue),
                        verdict
                    ));
                    if self.verbose {
                        lines.push(format!("              members: {}", group.members.join(", ").dimmed()));
                    }
                }
                None if group.members.is_empty() => {
                    lines.push(format!("   {:<10} {}", group.prefix, "no such variables".dimmed()));
                }
                None => {
                    lines.push(format!("   {:<10} {}", group.prefix, "restriction is singular".yellow()));
                }
            }
        }
        lines.push(String::new());

        lines.push(format!(
            "   {} {}",
            "Statistically significant variables:".bold(),
            report.significant.join(", ").green()
        ));
        lines.push(String::new());

        if !report.fdr.is_empty() {
            lines.push(format!("   {}", "FDR correction (Benjamini-Hochberg):".bold()));
            lines.push(format!("   {:<24} {:>10} {:>10}", "", "p", "adjusted"));
            for entry in &report.fdr {
                let name = if entry.is_group {
                    format!("{}*", entry.name)
                } else {
                    entry.name.clone()
                };
                let marker = if entry.significant { " *".green().to_string() } else { String::new() };
                lines.push(format!(
                    "   {:<24} {:>10} {:>10}{}",
                    name,
                    fmt_p(entry.pvalue),
                    fmt_p(entry.adjusted),
                    marker
                ));
            }
            lines.push(String::new());
        }
        join_lines(lines)
    }

    pub fn render_scan(&self, variable: &str, rows: &[ScanRow]) -> String {
        let mut lines = Vec::new();
        lines.push(format!(
            "{:<28} {:>14} {:>14} {:>8}",
            "Target",
            format!("{} p", variable),
            "FDR p",
            "R²"
        ));
        for row in rows {
            lines.push(format!(
                "{:<28} {:>14} {:>14} {:>8.4}",
                row.target,
                fmt_opt_p(row.p_value),
                fmt_opt_p(row.fdr_p_value),
                row.r_squared
            ));
        }
        join_lines(lines)
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}
