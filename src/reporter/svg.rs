//! SVG renderer for the correlation heatmap and the fit diagnostic plot
//!
//! Both images are self-contained SVG documents built as strings.

use crate::analysis::{FitPoint, RegressionReport};
use chrono::Datelike;
use std::path::Path;

const CELL: f64 = 28.0;
const LABEL_SPACE: f64 = 150.0;

const PLOT_WIDTH: f64 = 960.0;
const PLOT_HEIGHT: f64 = 380.0;
const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 70.0;
const MARGIN_TOP: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 50.0;

const ACTUAL_COLOR: &str = "#000000";
const FULL_FIT_COLOR: &str = "#ff0000";
const PARTIAL_COLOR: &str = "#ffcccc";

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Diverging palette: -1 blue, 0 white, +1 red. NaN is grey.
fn diverging_color(r: f64) -> String {
    if !r.is_finite() {
        return "#cccccc".to_string();
    }
    let r = r.clamp(-1.0, 1.0);
    let (target, t) = if r < 0.0 {
        ((59.0, 76.0, 192.0), -r)
    } else {
        ((180.0, 4.0, 38.0), r)
    };
    let mix = |c: f64| (255.0 + (c - 255.0) * t).round() as u8;
    format!("#{:02x}{:02x}{:02x}", mix(target.0), mix(target.1), mix(target.2))
}

/// Correlation matrix as a labelled grid of colored cells
pub fn render_heatmap(names: &[String], matrix: &[Vec<f64>]) -> String {
    let k = names.len() as f64;
    let width = LABEL_SPACE + k * CELL + 20.0;
    let height = LABEL_SPACE + k * CELL + 20.0;
    let mut svg = String::with_capacity(4096);
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif" font-size="11">"#,
        w = width,
        h = height
    ));
    svg.push('\n');
    svg.push_str(r#"<rect width="100%" height="100%" fill="white"/>"#);
    svg.push('\n');

    for (i, name) in names.iter().enumerate() {
        let offset = LABEL_SPACE + i as f64 * CELL + CELL / 2.0;
        let label = escape_xml(name);
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" dominant-baseline="middle">{}</text>"#,
            LABEL_SPACE - 6.0,
            offset,
            label
        ));
        svg.push('\n');
        svg.push_str(&format!(
            r#"<text transform="translate({},{}) rotate(-60)" text-anchor="start">{}</text>"#,
            offset,
            LABEL_SPACE - 6.0,
            label
        ));
        svg.push('\n');
    }

    for (i, row) in matrix.iter().enumerate() {
        for (j, r) in row.iter().enumerate() {
            let x = LABEL_SPACE + j as f64 * CELL;
            let y = LABEL_SPACE + i as f64 * CELL;
            svg.push_str(&format!(
                r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}"><title>{} / {}: {:.3}</title></rect>"#,
                x,
                y,
                CELL,
                CELL,
                diverging_color(*r),
                escape_xml(&names[i]),
                escape_xml(&names[j]),
                r
            ));
            svg.push('\n');
        }
    }
    svg.push_str("</svg>\n");
    svg
}

/// Linear map from a data range onto a pixel range. A degenerate range maps
/// everything to the middle.
struct Scale {
    lo: f64,
    hi: f64,
    from: f64,
    to: f64,
}

impl Scale {
    fn new<I: IntoIterator<Item = f64>>(values: I, from: f64, to: f64) -> Self {
        let (lo, hi) = values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        Self { lo, hi, from, to }
    }

    fn map(&self, v: f64) -> f64 {
        if self.hi <= self.lo {
            return (self.from + self.to) / 2.0;
        }
        self.from + (v - self.lo) / (self.hi - self.lo) * (self.to - self.from)
    }
}

fn day(p: &FitPoint) -> f64 {
    f64::from(p.date.num_days_from_ce())
}

fn polyline(points: &[FitPoint], x: &Scale, y: &Scale, value: impl Fn(&FitPoint) -> f64, color: &str) -> String {
    let coords: Vec<String> = points
        .iter()
        .filter(|p| value(*p).is_finite())
        .map(|p| {
            format!(
                "{:.1},{:.1}",
                x.map(day(p)),
                y.map(value(p))
            )
        })
        .collect();
    format!(
        r#"<polyline fill="none" stroke="{}" stroke-width="1.5" points="{}"/>"#,
        color,
        coords.join(" ")
    )
}

/// Actual and full fit on the left axis, summed partial fits on the right
pub fn render_fit_plot(report: &RegressionReport) -> String {
    let points = &report.points;
    let x_scale = Scale::new(
        points.iter().map(day),
        MARGIN_LEFT,
        PLOT_WIDTH - MARGIN_RIGHT,
    );
    let left = Scale::new(
        points.iter().flat_map(|p| [p.actual, p.full_fit]),
        PLOT_HEIGHT - MARGIN_BOTTOM,
        MARGIN_TOP,
    );
    let right = Scale::new(
        points.iter().map(|p| p.partial_sum),
        PLOT_HEIGHT - MARGIN_BOTTOM,
        MARGIN_TOP,
    );

    let mut svg = String::with_capacity(8192);
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif" font-size="12">"#,
        w = PLOT_WIDTH,
        h = PLOT_HEIGHT
    ));
    svg.push('\n');
    svg.push_str(r#"<rect width="100%" height="100%" fill="white"/>"#);
    svg.push('\n');

    let bottom = PLOT_HEIGHT - MARGIN_BOTTOM;
    let right_edge = PLOT_WIDTH - MARGIN_RIGHT;
    svg.push_str(&format!(
        r##"<g stroke="#444"><line x1="{l}" y1="{t}" x2="{l}" y2="{b}"/><line x1="{r}" y1="{t}" x2="{r}" y2="{b}"/><line x1="{l}" y1="{b}" x2="{r}" y2="{b}"/></g>"##,
        l = MARGIN_LEFT,
        r = right_edge,
        t = MARGIN_TOP,
        b = bottom
    ));
    svg.push('\n');

    // Axis extremes as tick labels
    if left.hi >= left.lo {
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end">{:.2}</text><text x="{}" y="{}" text-anchor="end">{:.2}</text>"#,
            MARGIN_LEFT - 6.0,
            MARGIN_TOP + 4.0,
            left.hi,
            MARGIN_LEFT - 6.0,
            bottom,
            left.lo
        ));
        svg.push('\n');
    }
    if right.hi >= right.lo {
        svg.push_str(&format!(
            r#"<text x="{}" y="{}">{:.2}</text><text x="{}" y="{}">{:.2}</text>"#,
            right_edge + 6.0,
            MARGIN_TOP + 4.0,
            right.hi,
            right_edge + 6.0,
            bottom,
            right.lo
        ));
        svg.push('\n');
    }
    if let (Some(first), Some(last)) = (points.first(), points.last()) {
        svg.push_str(&format!(
            r#"<text x="{}" y="{}">{}</text><text x="{}" y="{}" text-anchor="end">{}</text>"#,
            MARGIN_LEFT,
            bottom + 20.0,
            first.date,
            right_edge,
            bottom + 20.0,
            last.date
        ));
        svg.push('\n');
    }
    svg.push_str(&format!(
        r#"<text x="{}" y="{}" text-anchor="middle">{}</text>"#,
        PLOT_WIDTH / 2.0,
        MARGIN_TOP - 16.0,
        escape_xml(&report.target)
    ));
    svg.push('\n');

    svg.push_str(&polyline(points, &x_scale, &right, |p| p.partial_sum, PARTIAL_COLOR));
    svg.push('\n');
    svg.push_str(&polyline(points, &x_scale, &left, |p| p.actual, ACTUAL_COLOR));
    svg.push('\n');
    svg.push_str(&polyline(points, &x_scale, &left, |p| p.full_fit, FULL_FIT_COLOR));
    svg.push('\n');

    let legend = [("actual", ACTUAL_COLOR), ("full fit", FULL_FIT_COLOR), ("partial fit", PARTIAL_COLOR)];
    for (i, (label, color)) in legend.iter().enumerate() {
        let y = MARGIN_TOP + 10.0 + i as f64 * 16.0;
        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="3"/><text x="{}" y="{}">{}</text>"#,
            MARGIN_LEFT + 10.0,
            y,
            MARGIN_LEFT + 30.0,
            y,
            color,
            MARGIN_LEFT + 36.0,
            y + 4.0,
            label
        ));
        svg.push('\n');
    }
    svg.push_str("</svg>\n");
    svg
}

/// Write an SVG document, creating parent directories as needed
pub fn write_svg(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::design::ExcludedRows;
    use crate::analysis::ModelSummary;
    use chrono::NaiveDate;

    fn report(points: Vec<FitPoint>) -> RegressionReport {
        RegressionReport {
            target: "snr_total".to_string(),
            alpha: 0.05,
            software_versions_consistent: None,
            excluded: ExcludedRows::default(),
            dropped_collinear: vec![],
            coefficients: vec![],
            summary: ModelSummary {
                nobs: points.len(),
                df_model: 0,
                df_resid: 0,
                r_squared: f64::NAN,
                adj_r_squared: f64::NAN,
                f_statistic: f64::NAN,
                f_pvalue: f64::NAN,
                log_likelihood: f64::NAN,
                aic: f64::NAN,
                bic: f64::NAN,
            },
            group_tests: vec![],
            significant: vec![],
            partial_fits: vec![],
            fdr: vec![],
            points,
        }
    }

    #[test]
    fn test_diverging_palette_endpoints() {
        assert_eq!(diverging_color(0.0), "#ffffff");
        assert_eq!(diverging_color(1.0), "#b40426");
        assert_eq!(diverging_color(-1.0), "#3b4cc0");
        assert_eq!(diverging_color(f64::NAN), "#cccccc");
    }

    #[test]
    fn test_heatmap_has_one_cell_per_pair() {
        let names = vec!["SAR".to_string(), "a<b".to_string()];
        let matrix = vec![vec![1.0, -0.5], vec![-0.5, 1.0]];
        let svg = render_heatmap(&names, &matrix);
        assert!(svg.starts_with("<svg"));
        assert_eq!(svg.matches("<rect x=").count(), 4);
        assert!(svg.contains("a&lt;b"));
        assert!(!svg.contains("a<b"));
    }

    #[test]
    fn test_fit_plot_draws_three_series() {
        let start = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
        let points: Vec<FitPoint> = (0..5)
            .map(|i| FitPoint {
                date: start + chrono::Days::new(7 * i),
                actual: 200.0 + i as f64,
                full_fit: 200.5 + i as f64,
                partial_sum: 1.0 * i as f64,
            })
            .collect();
        let svg = render_fit_plot(&report(points));
        assert_eq!(svg.matches("<polyline").count(), 3);
        assert!(svg.contains("2018-01-01"));
        assert!(svg.contains("2018-01-29"));
        assert!(svg.contains(PARTIAL_COLOR));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn test_fit_plot_empty_report() {
        let svg = render_fit_plot(&report(vec![]));
        assert_eq!(svg.matches("<polyline").count(), 3);
    }

    #[test]
    fn test_write_svg_creates_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("plots").join("heatmap.svg");
        write_svg(&path, "<svg/>").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "<svg/>");
    }
}
