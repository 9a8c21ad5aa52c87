// 🚨 Contract Errors
// Only programmer errors surface here. Missing tables, missing columns and
// unparseable cells are never errors: they degrade and show up as diagnostics.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// The caller passed an empty identifier column name
    #[error("identifier column name must not be empty")]
    EmptyKeyColumn,

    /// A row does not match the width of its table header
    #[error("table `{table}`: row has {found} cells but the header has {expected} columns")]
    RowWidth {
        table: String,
        expected: usize,
        found: usize,
    },

    /// A column was declared twice in the same table
    #[error("table `{table}`: duplicate column `{column}`")]
    DuplicateColumn { table: String, column: String },

    /// A column vector does not match the number of rows
    #[error("table `{table}`: column `{column}` has {found} values for {expected} rows")]
    ColumnLength {
        table: String,
        column: String,
        expected: usize,
        found: usize,
    },

    /// The same output name was requested twice
    #[error("attribute `{0}` requested more than once")]
    DuplicateAttribute(String),

    /// An attribute or derived field without a name
    #[error("attribute name must not be empty")]
    EmptyAttributeName,
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
