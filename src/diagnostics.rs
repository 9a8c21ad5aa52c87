// 🩺 Diagnostics - Make "silently skipped" observable
// Every degradation (missing table, missing column, coerced cell, fallback)
// is recorded here instead of disappearing.

use serde::Serialize;
use std::fmt;

// ============================================================================
// SEVERITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Info,     // Expected normalization (rename, synthesized ids)
    Warning,  // Data degraded but the snapshot is still meaningful
    Critical, // A whole source or the base registry is unusable
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

// ============================================================================
// ISSUE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Issue {
    /// No table with this name was supplied
    TableMissing,
    /// The file behind a table could not be read
    FileUnreadable { reason: String },
    /// A required column is absent
    ColumnMissing { column: String },
    /// An alias column was renamed to its canonical name
    ColumnRenamed { from: String, to: String },
    /// Cells that could not be coerced to the column's type
    InvalidCells { column: String, count: usize },
    /// Ordering cells that fell back to the minimum sentinel
    InvalidTimestamps { column: String, count: usize },
    /// The ordering column is absent; input order decides
    InputOrderUsed { column: String },
    /// Rows without a usable identifier
    RowsWithoutKey { count: usize },
    /// Identifiers were assigned by row position
    SyntheticKeys { count: usize },
    /// Several rows claimed the same identifier; the last one was kept
    DuplicateKeys { count: usize },
    /// Selected values with no row in the lookup table
    LookupUnmatched { table: String, count: usize },
    /// Base entities left without a value for an attribute
    AttributeUnresolved { count: usize },
    /// An attribute replaced a column already present in the base table
    BaseColumnShadowed,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issue::TableMissing => write!(f, "table not supplied"),
            Issue::FileUnreadable { reason } => write!(f, "file unreadable: {}", reason),
            Issue::ColumnMissing { column } => write!(f, "column `{}` missing", column),
            Issue::ColumnRenamed { from, to } => write!(f, "renamed `{}` to `{}`", from, to),
            Issue::InvalidCells { column, count } => {
                write!(f, "{} invalid cell(s) in `{}`", count, column)
            }
            Issue::InvalidTimestamps { column, count } => write!(
                f,
                "{} unparseable timestamp(s) in `{}` sorted as oldest",
                count, column
            ),
            Issue::InputOrderUsed { column } => write!(
                f,
                "ordering column `{}` missing, last row per entity wins",
                column
            ),
            Issue::RowsWithoutKey { count } => write!(f, "{} row(s) without identifier", count),
            Issue::SyntheticKeys { count } => {
                write!(f, "assigned {} identifier(s) by row position", count)
            }
            Issue::DuplicateKeys { count } => {
                write!(f, "{} duplicate identifier(s), last row kept", count)
            }
            Issue::LookupUnmatched { table, count } => {
                write!(f, "{} value(s) not found in `{}`", count, table)
            }
            Issue::AttributeUnresolved { count } => {
                write!(f, "{} entit(ies) left unknown", count)
            }
            Issue::BaseColumnShadowed => write!(f, "replaces base column of the same name"),
        }
    }
}

// ============================================================================
// DIAGNOSTIC
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub table: Option<String>,
    pub attribute: Option<String>,
    pub issue: Issue,
}

impl Diagnostic {
    pub fn new(severity: Severity, issue: Issue) -> Self {
        Diagnostic {
            severity,
            table: None,
            attribute: None,
            issue,
        }
    }

    pub fn info(issue: Issue) -> Self {
        Self::new(Severity::Info, issue)
    }

    pub fn warning(issue: Issue) -> Self {
        Self::new(Severity::Warning, issue)
    }

    pub fn critical(issue: Issue) -> Self {
        Self::new(Severity::Critical, issue)
    }

    pub fn for_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn for_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.severity.as_str())?;
        if let Some(table) = &self.table {
            write!(f, " {}", table)?;
        }
        if let Some(attribute) = &self.attribute {
            write!(f, " -> {}", attribute)?;
        }
        write!(f, ": {}", self.issue)
    }
}

// ============================================================================
// DIAGNOSTICS
// ============================================================================

/// Ordered collection of diagnostics, in the order they were raised
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.entries.extend(diagnostics);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.entries.iter().filter(|d| d.severity == severity).count()
    }

    pub fn has_critical(&self) -> bool {
        self.count(Severity::Critical) > 0
    }

    /// Diagnostics that concern one attribute
    pub fn for_attribute<'a>(&'a self, attribute: &'a str) -> impl Iterator<Item = &'a Diagnostic> {
        self.entries
            .iter()
            .filter(move |d| d.attribute.as_deref() == Some(attribute))
    }

    pub fn summary(&self) -> String {
        format!(
            "{} diagnostic(s): {} critical, {} warning, {} info",
            self.len(),
            self.count(Severity::Critical),
            self.count(Severity::Warning),
            self.count(Severity::Info)
        )
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

// ============================================================================
// TESTS
// ============================================================================
