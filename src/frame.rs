use crate::errors::ConformalError;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single tabular cell.
///
/// Integer and floating point cells are both numeric and coerce to `f64`;
/// string cells do not. `Missing` models a null cell, which is distinct from
/// a NaN payload inside a `Double`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// A null cell.
    Missing,
    /// An integer cell.
    Int(i64),
    /// A floating point cell.
    Double(f64),
    /// A string cell.
    Str(String),
}

impl Value {
    /// Coerce the cell to `f64` if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Borrow the cell as a string if it holds one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Whether the cell is null.
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Coerce the cell to `f64`, failing with the offending column and row
    /// context the way scoring requires: a null cell is a missing value, a
    /// string cell is a type error.
    ///
    /// * `column` - Name of the column the cell was read from.
    /// * `row` - Identifier of the row the cell was read from.
    pub fn numeric(&self, column: &str, row: &str) -> Result<f64, ConformalError> {
        match self {
            Value::Int(v) => Ok(*v as f64),
            Value::Double(v) => Ok(*v),
            Value::Missing => Err(ConformalError::MissingValue(
                column.to_string(),
                format!("row {}", row),
            )),
            Value::Str(s) => Err(ConformalError::WrongType(
                column.to_string(),
                format!("\"{}\"", s),
            )),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Missing => write!(f, "?"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// A record: one ordered cell per frame column plus a stable identifier.
///
/// Rows are never mutated in place by the engine; derived rows are new values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Stable row identifier, preserved through partitioning and prediction.
    pub id: String,
    /// Cells, ordered as the owning frame's columns.
    pub values: Vec<Value>,
}

impl Row {
    /// Create a new row.
    ///
    /// * `id` - Stable row identifier.
    /// * `values` - One cell per column of the owning frame.
    pub fn new(id: impl Into<String>, values: Vec<Value>) -> Self {
        Row {
            id: id.into(),
            values,
        }
    }
}

/// An ordered collection of rows sharing one ordered column list.
///
/// This is the container every engine stage consumes and produces. It is
/// row major and suited for appending rows, with constant-time column
/// lookup by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    columns: Vec<String>,
    lookup: HashMap<String, usize>,
    rows: Vec<Row>,
}

impl Frame {
    /// Create an empty frame with the given column list.
    ///
    /// * `columns` - Ordered column names; duplicates are rejected.
    pub fn new(columns: Vec<String>) -> Result<Self, ConformalError> {
        let mut lookup = HashMap::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            if lookup.insert(name.clone(), i).is_some() {
                return Err(ConformalError::InvalidParameter(
                    "columns".to_string(),
                    "unique column names".to_string(),
                    name.clone(),
                ));
            }
        }
        Ok(Frame {
            columns,
            lookup,
            rows: Vec::new(),
        })
    }

    /// The ordered column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Index of a column by name, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    /// Whether a column with this name exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.lookup.contains_key(name)
    }

    /// Index of a column by name, failing if the column is absent.
    pub fn require_column(&self, name: &str) -> Result<usize, ConformalError> {
        self.column_index(name).ok_or_else(|| {
            ConformalError::MissingValue(name.to_string(), "not in the table".to_string())
        })
    }

    /// Add a row to the frame. The row must have exactly one cell per column.
    pub fn append_row(&mut self, row: Row) {
        assert_eq!(
            row.values.len(),
            self.columns.len(),
            "row width must match the frame's column count"
        );
        self.rows.push(row);
    }

    /// All rows, in insertion order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// A single row by position.
    pub fn row(&self, index: usize) -> &Row {
        &self.rows[index]
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the frame holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// A single cell by row position and column index.
    pub fn value(&self, row: usize, col: usize) -> &Value {
        &self.rows[row].values[col]
    }

    /// Consume the frame, yielding its rows.
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Whether another frame has the identical ordered column list.
    pub fn same_columns(&self, other: &Frame) -> bool {
        self.columns == other.columns
    }
}
