//! In-memory analysis table loaded from extraction CSVs

use super::AnalysisError;
use chrono::NaiveDate;
use std::io::Read;
use std::path::Path;

/// Name of the date column every analysis table must carry
pub const DATE_COLUMN: &str = "Date";

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Missing cells are NaN
    Numeric(Vec<f64>),
    /// Missing cells are empty strings
    Text(Vec<String>),
}

impl ColumnData {
    fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    fn select(&self, mask: &[bool]) -> ColumnData {
        fn keep<T: Clone>(values: &[T], mask: &[bool]) -> Vec<T> {
            values
                .iter()
                .zip(mask)
                .filter(|&(_, &m)| m)
                .map(|(v, _)| v.clone())
                .collect()
        }
        match self {
            ColumnData::Numeric(v) => ColumnData::Numeric(keep(v, mask)),
            ColumnData::Text(v) => ColumnData::Text(keep(v, mask)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

/// Rectangular table: one row per acquisition, a parsed date per row
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    dates: Vec<NaiveDate>,
    columns: Vec<Column>,
}

/// Raw string cells accumulated across files before typing
#[derive(Default)]
struct RawTable {
    names: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    fn column_index(&mut self, name: &str) -> usize {
        match self.names.iter().position(|n| n == name) {
            Some(i) => i,
            None => {
                self.names.push(name.to_string());
                self.names.len() - 1
            }
        }
    }

    /// Append the records of one CSV source. Each appended extraction run
    /// starts with its own header, which may have a different column set
    /// than the previous run; such a line re-maps the columns that follow.
    fn append<R: Read>(&mut self, reader: R, source: &str) -> Result<(), AnalysisError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut header: Option<Vec<String>> = None;
        let mut indices = Vec::new();

        for record in rdr.records() {
            let record = record.map_err(|e| AnalysisError::Csv {
                source_name: source.to_string(),
                message: e.to_string(),
            })?;
            let cells: Vec<String> = record.iter().map(|c| c.to_string()).collect();
            if cells.iter().all(|c| c.is_empty()) {
                continue;
            }
            if is_header(header.as_deref(), &cells) {
                indices = cells
                    .iter()
                    .map(|name| {
                        let name = if name.eq_ignore_ascii_case(DATE_COLUMN) {
                            DATE_COLUMN
                        } else {
                            name.as_str()
                        };
                        self.column_index(name)
                    })
                    .collect();
                header = Some(cells);
                continue;
            }
            let mut row = vec![None; self.names.len()];
            for (cell, &idx) in cells.into_iter().zip(&indices) {
                if !cell.is_empty() {
                    row[idx] = Some(cell);
                }
            }
            self.rows.push(row);
        }
        Ok(())
    }

    fn into_table(self) -> Result<Table, AnalysisError> {
        let width = self.names.len();
        let date_idx = self
            .names
            .iter()
            .position(|n| n == DATE_COLUMN)
            .ok_or(AnalysisError::MissingDateColumn)?;

        let mut dates = Vec::with_capacity(self.rows.len());
        for (i, row) in self.rows.iter().enumerate() {
            let raw = row.get(date_idx).cloned().flatten().unwrap_or_default();
            dates.push(parse_date(&raw).ok_or(AnalysisError::InvalidDate {
                row: i + 1,
                value: raw,
            })?);
        }

        let mut columns = Vec::with_capacity(width.saturating_sub(1));
        for (idx, name) in self.names.iter().enumerate() {
            if idx == date_idx || name.is_empty() {
                continue;
            }
            let cells: Vec<Option<&str>> = self
                .rows
                .iter()
                .map(|row| row.get(idx).and_then(|c| c.as_deref()))
                .collect();
            let numeric: Option<Vec<f64>> = cells
                .iter()
                .map(|c| match c {
                    None => Some(f64::NAN),
                    Some(s) => parse_number(s),
                })
                .collect();
            let data = match numeric {
                Some(values) => ColumnData::Numeric(values),
                None => ColumnData::Text(cells.iter().map(|c| c.unwrap_or("").to_string()).collect()),
            };
            columns.push(Column {
                name: name.clone(),
                data,
            });
        }

        Ok(Table { dates, columns })
    }
}

fn is_header(current: Option<&[String]>, cells: &[String]) -> bool {
    match current {
        None => true,
        Some(h) => h == cells || cells.first().is_some_and(|c| c.eq_ignore_ascii_case(DATE_COLUMN)),
    }
}

fn parse_number(s: &str) -> Option<f64> {
    match s {
        "nan" | "NaN" | "NA" | "None" => Some(f64::NAN),
        _ => s.parse().ok(),
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .ok()
}

impl Table {
    /// Load and concatenate CSV files by header name
    pub fn from_csv_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Self, AnalysisError> {
        let mut raw = RawTable::default();
        for path in paths {
            let path = path.as_ref();
            let file = std::fs::File::open(path).map_err(|source| AnalysisError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            raw.append(file, &path.display().to_string())?;
        }
        raw.into_table()
    }

    /// Load a table from CSV text
    pub fn from_csv_str(text: &str) -> Result<Self, AnalysisError> {
        let mut raw = RawTable::default();
        raw.append(text.as_bytes(), "<memory>")?;
        raw.into_table()
    }

    /// Build a table from dates and numeric columns
    pub fn from_numeric(dates: Vec<NaiveDate>, columns: Vec<(&str, Vec<f64>)>) -> Self {
        Self {
            dates,
            columns: columns
                .into_iter()
                .map(|(name, values)| Column {
                    name: name.to_string(),
                    data: ColumnData::Numeric(values),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Numeric values of a column, `None` when absent or textual
    pub fn numeric(&self, name: &str) -> Option<&[f64]> {
        match &self.column(name)?.data {
            ColumnData::Numeric(v) => Some(v),
            ColumnData::Text(_) => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&[String]> {
        match &self.column(name)?.data {
            ColumnData::Text(v) => Some(v),
            ColumnData::Numeric(_) => None,
        }
    }

    /// Names of all numeric columns, in table order
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| matches!(c.data, ColumnData::Numeric(_)))
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Add or replace a numeric column
    pub fn set_numeric(&mut self, name: &str, values: Vec<f64>) {
        debug_assert_eq!(values.len(), self.len());
        let data = ColumnData::Numeric(values);
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(col) => col.data = data,
            None => self.columns.push(Column {
                name: name.to_string(),
                data,
            }),
        }
    }

    /// Keep rows where `mask` is true
    pub fn select_rows(&self, mask: &[bool]) -> Table {
        debug_assert_eq!(mask.len(), self.len());
        Table {
            dates: self
                .dates
                .iter()
                .zip(mask)
                .filter(|&(_, &m)| m)
                .map(|(d, _)| *d)
                .collect(),
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    data: c.data.select(mask),
                })
                .collect(),
        }
    }

    /// Keep rows whose `Filetype` equals `filetype`
    pub fn filter_filetype(&self, filetype: &str) -> Result<Table, AnalysisError> {
        let values = self
            .text("Filetype")
            .ok_or_else(|| AnalysisError::MissingColumns(vec!["Filetype".to_string()]))?;
        let mask: Vec<bool> = values.iter().map(|v| v == filetype).collect();
        Ok(self.select_rows(&mask))
    }

    /// Whether every row has the same value in `column`; `None` when the
    /// column is absent or the table is empty.
    pub fn is_constant(&self, column: &str) -> Option<bool> {
        let col = self.column(column)?;
        if col.data.len() == 0 {
            return None;
        }
        Some(match &col.data {
            ColumnData::Text(v) => v.iter().all(|x| *x == v[0]),
            ColumnData::Numeric(v) => v.iter().all(|x| x == &v[0] || (x.is_nan() && v[0].is_nan())),
        })
    }

    /// Pairwise Pearson correlation of all numeric columns, using the rows
    /// where both columns are finite.
    pub fn correlation(&self) -> (Vec<String>, Vec<Vec<f64>>) {
        let names: Vec<String> = self.numeric_columns().iter().map(|s| s.to_string()).collect();
        let cols: Vec<&[f64]> = names.iter().filter_map(|n| self.numeric(n)).collect();
        let k = cols.len();
        let mut matrix = vec![vec![f64::NAN; k]; k];
        for i in 0..k {
            for j in i..k {
                let r = pearson(cols[i], cols[j]);
                matrix[i][j] = r;
                matrix[j][i] = r;
            }
        }
        (names, matrix)
    }
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (*x, *y))
        .collect();
    let n = pairs.len() as f64;
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let mean_a = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        return f64::NAN;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    const QC_CSV: &str = "\
Date,Filetype,tsnr,SAR,CSV
20180101,task-rest_acq-p2_bold.json,60.5,0.2,v1.0.20170923
20180108,task-rest_acq-p2Xs4X35mm_bold.json,61.0,,v1.0.20170923
Date,Filetype,tsnr,SAR,CSV
20180115,task-rest_acq-p2_bold.json,59.0,0.21,v1.0.20170923
";

    #[test]
    fn test_repeated_header_lines_skipped() {
        let table = Table::from_csv_str(QC_CSV).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.dates()[2], NaiveDate::from_ymd_opt(2018, 1, 15).unwrap());
        assert_eq!(table.numeric("tsnr").unwrap(), &[60.5, 61.0, 59.0]);
    }

    #[test]
    fn test_header_with_more_columns_remaps_rows() {
        let text = "\
Date,tsnr,SAR
20180101,60.5,0.2
date,tsnr,SAR,snr_total
20180108,61.0,0.21,17.5
";
        let table = Table::from_csv_str(text).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.numeric("tsnr").unwrap(), &[60.5, 61.0]);
        let snr = table.numeric("snr_total").unwrap();
        assert!(snr[0].is_nan());
        assert_eq!(snr[1], 17.5);
    }

    #[test]
    fn test_empty_cells_are_nan_and_text_columns_detected() {
        let table = Table::from_csv_str(QC_CSV).unwrap();
        assert!(table.numeric("SAR").unwrap()[1].is_nan());
        assert!(table.numeric("Filetype").is_none());
        assert_eq!(table.text("CSV").unwrap().len(), 3);
        assert_eq!(table.numeric_columns(), vec!["tsnr", "SAR"]);
    }

    #[test]
    fn test_filter_filetype() {
        let table = Table::from_csv_str(QC_CSV).unwrap();
        let p2 = table.filter_filetype("task-rest_acq-p2_bold.json").unwrap();
        assert_eq!(p2.len(), 2);
        assert_eq!(p2.numeric("tsnr").unwrap(), &[60.5, 59.0]);
    }

    #[test]
    fn test_software_version_consistency() {
        let table = Table::from_csv_str(QC_CSV).unwrap();
        assert_eq!(table.is_constant("CSV"), Some(true));
        assert_eq!(table.is_constant("tsnr"), Some(false));
        assert_eq!(table.is_constant("Missing"), None);
    }

    #[test]
    fn test_concatenation_unions_columns() {
        let dir = tempfile::TempDir::new().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        std::fs::write(&a, "date,tsnr\n20170601,50\n").unwrap();
        std::fs::write(&b, "Date,tsnr,TxRefAmp\n20180601,55,230\n").unwrap();
        let table = Table::from_csv_paths(&[a, b]).unwrap();
        assert_eq!(table.len(), 2);
        let tx = table.numeric("TxRefAmp").unwrap();
        assert!(tx[0].is_nan());
        assert_eq!(tx[1], 230.0);
    }

    #[test]
    fn test_missing_date_column_is_error() {
        let err = Table::from_csv_str("tsnr,SAR\n1,2\n").unwrap_err();
        assert!(matches!(err, AnalysisError::MissingDateColumn));
    }

    #[test]
    fn test_invalid_date_is_error() {
        let err = Table::from_csv_str("Date,tsnr\n2018-13-45,1\n").unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidDate { row: 1, .. }));
    }

    #[test]
    fn test_correlation_matrix() {
        let d = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
        let table = Table::from_numeric(
            vec![d; 4],
            vec![
                ("a", vec![1.0, 2.0, 3.0, 4.0]),
                ("b", vec![2.0, 4.0, 6.0, 8.0]),
                ("c", vec![4.0, 3.0, 2.0, f64::NAN]),
            ],
        );
        let (names, m) = table.correlation();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!((m[0][1] - 1.0).abs() < 1e-12);
        assert!((m[0][2] + 1.0).abs() < 1e-12);
        assert!((m[2][2] - 1.0).abs() < 1e-12);
    }
}
