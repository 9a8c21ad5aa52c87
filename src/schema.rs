// 📐 Shape Layer - Schema normalization
// Brings every loaded table to one canonical shape before reconciliation:
// canonical column names, integer identifiers, typed timestamps and numbers.
//
// Runs separately from the reconciler so the reconciler's contract can stay
// "canonical columns in, snapshot out".

use crate::diagnostics::{Diagnostic, Issue};
use crate::table::{EntityId, Table, TableSet, Value};
use crate::temporal::coerce_timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

// ============================================================================
// TABLE SCHEMA
// ============================================================================

/// Alias → canonical column name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnAlias {
    pub alias: String,
    pub canonical: String,
}

/// TableSchema - Expected shape of one named table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,

    /// Tried in order; a rename only happens when the canonical column is absent
    #[serde(default)]
    pub aliases: Vec<ColumnAlias>,

    /// Identifier column, normalized to integer ids where possible
    #[serde(default)]
    pub key_column: Option<String>,

    #[serde(default)]
    pub timestamp_columns: Vec<String>,

    #[serde(default)]
    pub numeric_columns: Vec<String>,

    /// Assign ids 1..=n by row position when the key column is absent
    #[serde(default)]
    pub synthesize_key: bool,
}

impl TableSchema {
    pub fn new(table: impl Into<String>) -> Self {
        TableSchema {
            table: table.into(),
            aliases: Vec::new(),
            key_column: None,
            timestamp_columns: Vec::new(),
            numeric_columns: Vec::new(),
            synthesize_key: false,
        }
    }

    /// Builder: rename `alias` to `canonical` when needed
    pub fn alias(mut self, alias: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.aliases.push(ColumnAlias {
            alias: alias.into(),
            canonical: canonical.into(),
        });
        self
    }

    /// Builder: identifier column
    pub fn key(mut self, column: impl Into<String>) -> Self {
        self.key_column = Some(column.into());
        self
    }

    /// Builder: timestamp columns
    pub fn timestamps(mut self, columns: &[&str]) -> Self {
        self.timestamp_columns
            .extend(columns.iter().map(|c| c.to_string()));
        self
    }

    /// Builder: numeric columns
    pub fn numeric(mut self, columns: &[&str]) -> Self {
        self.numeric_columns
            .extend(columns.iter().map(|c| c.to_string()));
        self
    }

    /// Builder: synthesize ids when the key column is absent
    pub fn synthesize_key(mut self) -> Self {
        self.synthesize_key = true;
        self
    }
}

// ============================================================================
// NUMBER PARSING
// ============================================================================

/// Parse a numeric cell: integers first, then decimals
///
/// Accepts a leading `$` and `,` thousands separators ("$1,250.50").
pub fn parse_number(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    let unsigned = trimmed.strip_prefix('$').unwrap_or(trimmed);
    let cleaned: String = unsigned.chars().filter(|c| *c != ',').collect();

    if cleaned.is_empty() {
        return None;
    }
    if let Ok(i) = cleaned.parse::<i64>() {
        return Some(Value::Int(i));
    }
    match cleaned.parse::<f64>() {
        Ok(f) if f.is_finite() => Some(Value::Float(f)),
        _ => None,
    }
}

/// Coerce a cell to a numeric cell. Unknown stays unknown.
pub fn coerce_number(value: &Value) -> Value {
    match value {
        Value::Int(_) | Value::Float(_) | Value::Unknown | Value::Invalid(_) => value.clone(),
        Value::Text(s) => parse_number(s).unwrap_or_else(|| Value::Invalid(s.clone())),
        Value::Timestamp(_) => Value::Invalid(value.to_string()),
    }
}

/// Coerce an identifier cell. Unusable cells become unknown.
pub fn coerce_key(value: &Value) -> Value {
    match EntityId::from_value(value) {
        Some(id) => id.to_value(),
        None => Value::Unknown,
    }
}

// ============================================================================
// SCHEMA NORMALIZER
// ============================================================================

/// Normalized table plus what was changed on the way
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    pub value: T,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default)]
pub struct SchemaNormalizer {
    schemas: BTreeMap<String, TableSchema>,
}

impl SchemaNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, schema: TableSchema) -> Self {
        self.register(schema);
        self
    }

    pub fn register(&mut self, schema: TableSchema) {
        self.schemas.insert(schema.table.clone(), schema);
    }

    pub fn schema(&self, table: &str) -> Option<&TableSchema> {
        self.schemas.get(table)
    }

    /// Normalize one table. Tables without a schema pass through unchanged.
    pub fn normalize_table(&self, mut table: Table) -> Normalized<Table> {
        let mut diagnostics = Vec::new();
        let Some(schema) = self.schemas.get(table.name()) else {
            return Normalized {
                value: table,
                diagnostics,
            };
        };
        let name = schema.table.as_str();

        for alias in &schema.aliases {
            if !table.has_column(&alias.canonical) && table.rename_column(&alias.alias, &alias.canonical) {
                debug!(table = name, from = %alias.alias, to = %alias.canonical, "renamed column");
                diagnostics.push(
                    Diagnostic::info(Issue::ColumnRenamed {
                        from: alias.alias.clone(),
                        to: alias.canonical.clone(),
                    })
                    .for_table(name),
                );
            }
        }

        if let Some(key) = &schema.key_column {
            if table.has_column(key) {
                let mut unusable = 0;
                table.map_column(key, |v| {
                    let coerced = coerce_key(v);
                    if coerced.is_unknown() && v.is_present() {
                        unusable += 1;
                    }
                    coerced
                });
                if unusable > 0 {
                    diagnostics.push(
                        Diagnostic::warning(Issue::InvalidCells {
                            column: key.clone(),
                            count: unusable,
                        })
                        .for_table(name),
                    );
                }
            } else if schema.synthesize_key {
                let ids: Vec<Value> = (1..=table.len() as i64).map(Value::Int).collect();
                let count = ids.len();
                // Lengths match by construction
                if table.set_column(key, ids).is_ok() {
                    diagnostics.push(Diagnostic::info(Issue::SyntheticKeys { count }).for_table(name));
                }
            }
        }

        for column in &schema.timestamp_columns {
            let invalid = coerce_column(&mut table, column, coerce_timestamp);
            if invalid > 0 {
                diagnostics.push(
                    Diagnostic::warning(Issue::InvalidCells {
                        column: column.clone(),
                        count: invalid,
                    })
                    .for_table(name),
                );
            }
        }

        for column in &schema.numeric_columns {
            let invalid = coerce_column(&mut table, column, coerce_number);
            if invalid > 0 {
                diagnostics.push(
                    Diagnostic::warning(Issue::InvalidCells {
                        column: column.clone(),
                        count: invalid,
                    })
                    .for_table(name),
                );
            }
        }

        Normalized {
            value: table,
            diagnostics,
        }
    }

    /// Normalize every table of a set
    pub fn normalize_all(&self, tables: TableSet) -> Normalized<TableSet> {
        let mut diagnostics = Vec::new();
        let mut normalized = TableSet::new();

        for table in tables.into_tables() {
            let result = self.normalize_table(table);
            diagnostics.extend(result.diagnostics);
            normalized.insert(result.value);
        }

        Normalized {
            value: normalized,
            diagnostics,
        }
    }
}

/// Apply `coerce` to a column, returning how many cells became newly invalid
fn coerce_column(table: &mut Table, column: &str, coerce: fn(&Value) -> Value) -> usize {
    let mut invalid = 0;
    table.map_column(column, |v| {
        let coerced = coerce(v);
        if coerced.is_invalid() && !v.is_invalid() {
            invalid += 1;
        }
        coerced
    });
    invalid
}

// ============================================================================
// TESTS
// ============================================================================
