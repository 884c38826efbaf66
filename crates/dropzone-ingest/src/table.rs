//! In-memory tabular batches parsed from delimited files
//!
//! A batch is column-oriented: every column carries an inferred type and one
//! value per row. Types are inferred the way spreadsheet exports usually need:
//! a column is integer if every present cell parses as an integer, float if
//! every present cell parses as a number, boolean for true/false columns, and
//! text otherwise.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Cell contents recognized as missing values
pub const NULL_MARKERS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "NULL", "null", "None", "#N/A", "#NA",
    "<NA>",
];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Timestamp,
    Text,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    /// PostgreSQL column type used when creating destination tables
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Integer => "BIGINT",
            ColumnType::Float => "DOUBLE PRECISION",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Timestamp => "TIMESTAMPTZ",
            ColumnType::Text => "TEXT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render as text; `None` for nulls
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(v) => write!(f, "{v}"),
            // keep a trailing ".0" so whole floats stay recognizable
            Value::Float(v) if v.fract() == 0.0 && v.is_finite() => write!(f, "{v:.1}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{}", if *v { "True" } else { "False" }),
            Value::Timestamp(ts) => f.write_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true)),
            Value::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            kind,
            values,
        }
    }

    /// A column repeating one value `len` times
    pub fn constant(name: impl Into<String>, kind: ColumnType, value: Value, len: usize) -> Self {
        Self::new(name, kind, vec![value; len])
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    /// Build a typed column from raw cells
    fn infer(name: String, cells: Vec<String>) -> Self {
        let kind = infer_kind(&cells);
        let values = cells.into_iter().map(|cell| parse_cell(cell, kind)).collect();
        Self { name, kind, values }
    }
}

/// Failure to interpret bytes as a delimited table
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row} has {found} fields, header has {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// Column-oriented rows from one file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularBatch {
    columns: Vec<Column>,
    rows: usize,
}

impl TabularBatch {
    /// Build a batch from columns of equal length; `None` if lengths differ
    pub fn from_columns(columns: Vec<Column>) -> Option<Self> {
        let rows = columns.first().map_or(0, |c| c.values.len());
        if columns.iter().any(|c| c.values.len() != rows) {
            return None;
        }
        Some(Self { columns, rows })
    }

    /// Parse comma-delimited bytes with a header row.
    ///
    /// Zero-byte input yields an empty batch. Repeated header names are
    /// disambiguated with numeric suffixes (`qty`, `qty.1`, `qty.2`). Rows
    /// shorter than the header are padded with missing cells; longer rows are
    /// an error.
    pub fn from_csv(bytes: &[u8]) -> Result<Self, TableError> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);

        let headers = dedupe_names(reader.headers()?.iter());
        let width = headers.len();
        let mut cells: Vec<Vec<String>> = vec![Vec::new(); width];

        for (index, record) in reader.records().enumerate() {
            let record = record?;
            // a blank line parses as a single empty field
            if record.len() == 1 && record[0].is_empty() && width != 1 {
                continue;
            }
            if record.len() > width {
                return Err(TableError::RaggedRow {
                    row: index + 1,
                    expected: width,
                    found: record.len(),
                });
            }
            // short rows are padded with missing cells
            let fields = record.iter().chain(std::iter::repeat(""));
            for (column, field) in cells.iter_mut().zip(fields) {
                column.push(field.to_string());
            }
        }

        let rows = cells.first().map_or(0, Vec::len);
        let columns = headers
            .into_iter()
            .zip(cells)
            .map(|(name, values)| Column::infer(name, values))
            .collect();

        Ok(Self { columns, rows })
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// No rows to load
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Rename every column with `rename`, then suffix repeats so names stay unique
    pub fn rename_columns(&mut self, rename: impl Fn(&str) -> String) {
        let renamed: Vec<String> = self.columns.iter().map(|c| rename(&c.name)).collect();
        let unique = dedupe_names(renamed.iter().map(String::as_str));
        for (column, name) in self.columns.iter_mut().zip(unique) {
            column.name = name;
        }
    }

    /// Replace a same-named column or append one holding `value` in every row
    pub fn set_constant(&mut self, name: &str, kind: ColumnType, value: Value) {
        let column = Column::constant(name, kind, value, self.rows);
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
    }

    /// Values of one row in column order
    pub fn row(&self, index: usize) -> Option<Vec<&Value>> {
        (index < self.rows).then(|| self.columns.iter().map(|c| &c.values[index]).collect())
    }

    /// Plain-text rendering of the first `limit` rows, for previews
    pub fn preview(&self, limit: usize) -> String {
        let mut out = self.column_names().collect::<Vec<_>>().join(" | ");
        for index in 0..self.rows.min(limit) {
            out.push('\n');
            let cells: Vec<String> = self.columns.iter().map(|c| c.values[index].to_string()).collect();
            out.push_str(&cells.join(" | "));
        }
        out
    }
}

fn dedupe_names<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    let mut next_suffix: HashMap<&str, usize> = HashMap::new();
    let mut names = Vec::new();
    for name in raw {
        let mut candidate = name.to_string();
        if used.contains(&candidate) {
            let suffix = next_suffix.entry(name).or_insert(1);
            loop {
                candidate = format!("{name}.{suffix}");
                *suffix += 1;
                if !used.contains(&candidate) {
                    break;
                }
            }
        }
        used.insert(candidate.clone());
        names.push(candidate);
    }
    names
}

fn is_null_marker(cell: &str) -> bool {
    NULL_MARKERS.contains(&cell.trim())
}

fn parse_bool(cell: &str) -> Option<bool> {
    match cell.trim() {
        "true" | "True" | "TRUE" => Some(true),
        "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

fn infer_kind(cells: &[String]) -> ColumnType {
    let mut present = cells.iter().map(|c| c.trim()).filter(|c| !is_null_marker(c)).peekable();
    if present.peek().is_none() {
        // nothing but missing values: numeric, so the zero fill applies
        return ColumnType::Float;
    }

    let present: Vec<&str> = present.collect();
    if present.iter().all(|c| c.parse::<i64>().is_ok()) {
        ColumnType::Integer
    } else if present.iter().all(|c| c.parse::<f64>().is_ok()) {
        ColumnType::Float
    } else if present.iter().all(|c| parse_bool(c).is_some()) {
        ColumnType::Boolean
    } else {
        ColumnType::Text
    }
}

fn parse_cell(cell: String, kind: ColumnType) -> Value {
    if is_null_marker(&cell) {
        return Value::Null;
    }
    let trimmed = cell.trim();
    match kind {
        ColumnType::Integer => trimmed.parse().map_or(Value::Null, Value::Integer),
        ColumnType::Float => trimmed.parse().map_or(Value::Null, Value::Float),
        ColumnType::Boolean => parse_bool(trimmed).map_or(Value::Null, Value::Boolean),
        ColumnType::Timestamp => dropzone_common::types::parse_timestamp(trimmed)
            .map_or(Value::Null, Value::Timestamp),
        ColumnType::Text => Value::Text(cell),
    }
}
