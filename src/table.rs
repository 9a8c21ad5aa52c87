// 📋 Tables - In-memory tabular data
// Ordered rows of loosely typed cells. Every input and output of the
// reconciler is a Table; nothing here performs I/O.

use crate::error::{ReconcileError, ReconcileResult};
use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Rendering used for unknown cells when no marker is configured
pub const DEFAULT_UNKNOWN_MARKER: &str = "N/A";

// ============================================================================
// VALUE
// ============================================================================

/// Value - A single cell
///
/// `Unknown` and `Invalid` are explicit markers, never folded into zero or
/// the empty string:
/// - `Unknown`: nothing was recorded (empty cell, missing source, no match)
/// - `Invalid`: something was recorded but could not be coerced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Unknown,
    Invalid(String),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Value::Invalid(_))
    }

    /// Anything other than the unknown marker counts as a recorded value
    pub fn is_present(&self) -> bool {
        !self.is_unknown()
    }

    /// Numeric view (Int or Float only)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Render for output, using `unknown_marker` for unknown cells
    pub fn render(&self, unknown_marker: &str) -> String {
        match self {
            Value::Unknown => unknown_marker.to_string(),
            Value::Invalid(raw) => format!("INVALID({})", raw),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Timestamp(ts) => {
                if ts.time() == NaiveTime::MIN {
                    ts.format("%Y-%m-%d").to_string()
                } else {
                    ts.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(DEFAULT_UNKNOWN_MARKER))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

// ============================================================================
// ENTITY ID
// ============================================================================

/// EntityId - Join key shared across tables
///
/// Whole numbers are normalized to `Int` so that `"12"`, `12` and `12.0`
/// identify the same employee regardless of how the source file spelled it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Text(String),
}

impl EntityId {
    /// Extract a key from a cell. Unknown, invalid and timestamp cells have none.
    pub fn from_value(value: &Value) -> Option<EntityId> {
        match value {
            Value::Int(i) => Some(EntityId::Int(*i)),
            Value::Float(f) => whole_number(*f).map(EntityId::Int),
            Value::Text(s) => EntityId::parse(s),
            Value::Unknown | Value::Invalid(_) | Value::Timestamp(_) => None,
        }
    }

    /// Parse a raw identifier, preferring integers
    pub fn parse(raw: &str) -> Option<EntityId> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Some(EntityId::Int(i));
        }
        if let Some(i) = trimmed.parse::<f64>().ok().and_then(whole_number) {
            return Some(EntityId::Int(i));
        }
        Some(EntityId::Text(trimmed.to_string()))
    }

    pub fn to_value(&self) -> Value {
        match self {
            EntityId::Int(i) => Value::Int(*i),
            EntityId::Text(s) => Value::Text(s.clone()),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(i) => write!(f, "{}", i),
            EntityId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for EntityId {
    fn from(v: i64) -> Self {
        EntityId::Int(v)
    }
}

fn whole_number(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

// ============================================================================
// TABLE
// ============================================================================

/// Table - Named, ordered rows under a fixed header
///
/// Row order is meaningful: it is the "natural order" used to break ties
/// when records are otherwise equally current.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table with the given header
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        columns: impl IntoIterator<Item = S>,
    ) -> ReconcileResult<Self> {
        let name = name.into();
        let mut seen: Vec<String> = Vec::new();

        for column in columns {
            let column = column.into();
            if seen.contains(&column) {
                return Err(ReconcileError::DuplicateColumn {
                    table: name,
                    column,
                });
            }
            seen.push(column);
        }

        Ok(Table {
            name,
            columns: seen,
            rows: Vec::new(),
        })
    }

    /// A table with no columns and no rows (the "nothing loaded" table)
    pub fn empty(name: impl Into<String>) -> Self {
        Table {
            name: name.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Build a table in one go
    pub fn from_rows<S: Into<String>>(
        name: impl Into<String>,
        columns: impl IntoIterator<Item = S>,
        rows: impl IntoIterator<Item = Vec<Value>>,
    ) -> ReconcileResult<Self> {
        let mut table = Table::new(name, columns)?;
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Same header, no rows
    pub fn empty_like(&self) -> Self {
        Table {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[Value]> {
        self.rows.get(index).map(|r| r.as_slice())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    /// Columns from `columns` that this table lacks
    pub fn missing_columns(&self, columns: &[&str]) -> Vec<String> {
        columns
            .iter()
            .filter(|c| !self.has_column(c))
            .map(|c| c.to_string())
            .collect()
    }

    /// Cell lookup by row index and column name
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// All cells of one column, in row order
    pub fn column_values<'a>(&'a self, column: &str) -> Option<impl Iterator<Item = &'a Value> + 'a> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(move |r| &r[idx]))
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> ReconcileResult<()> {
        if row.len() != self.columns.len() {
            return Err(ReconcileError::RowWidth {
                table: self.name.clone(),
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Rename a column. Returns false if `from` is absent or `to` already exists.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        if self.has_column(to) {
            return false;
        }
        match self.column_index(from) {
            Some(idx) => {
                self.columns[idx] = to.to_string();
                true
            }
            None => false,
        }
    }

    /// Replace a column's values, or append the column if it does not exist
    pub fn set_column(&mut self, column: &str, values: Vec<Value>) -> ReconcileResult<()> {
        if values.len() != self.rows.len() {
            return Err(ReconcileError::ColumnLength {
                table: self.name.clone(),
                column: column.to_string(),
                expected: self.rows.len(),
                found: values.len(),
            });
        }

        match self.column_index(column) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(column.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }

        Ok(())
    }

    /// Rewrite every cell of a column in place. Returns false if absent.
    pub fn map_column<F>(&mut self, column: &str, mut f: F) -> bool
    where
        F: FnMut(&Value) -> Value,
    {
        let Some(idx) = self.column_index(column) else {
            return false;
        };
        for row in &mut self.rows {
            row[idx] = f(&row[idx]);
        }
        true
    }

    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Render every cell as a string
    pub fn render_rows(&self, unknown_marker: &str) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|v| v.render(unknown_marker)).collect())
            .collect()
    }

    /// SHA-256 over the header and rendered cells
    ///
    /// Two tables with the same fingerprint render to identical bytes.
    pub fn fingerprint(&self, unknown_marker: &str) -> String {
        let mut hasher = Sha256::new();
        for column in &self.columns {
            hasher.update(column.as_bytes());
            hasher.update([0x1f]);
        }
        hasher.update([0x1e]);
        for row in self.render_rows(unknown_marker) {
            for cell in row {
                hasher.update(cell.as_bytes());
                hasher.update([0x1f]);
            }
            hasher.update([0x1e]);
        }
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// TABLE SET
// ============================================================================

/// TableSet - Named input tables handed to the reconciler
///
/// Explicit injection: the reconciler reads only what it is given here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSet {
    tables: BTreeMap<String, Table>,
}

impl TableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert under the table's own name, replacing any previous entry
    pub fn insert(&mut self, table: Table) -> Option<Table> {
        self.tables.insert(table.name().to_string(), table)
    }

    pub fn with(mut self, table: Table) -> Self {
        self.insert(table);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Table> {
        self.tables.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn into_tables(self) -> impl Iterator<Item = Table> {
        self.tables.into_values()
    }
}

impl FromIterator<Table> for TableSet {
    fn from_iter<I: IntoIterator<Item = Table>>(iter: I) -> Self {
        let mut set = TableSet::new();
        for table in iter {
            set.insert(table);
        }
        set
    }
}

// ============================================================================
// TESTS
// ============================================================================
