// 🧭 Attribute Resolver - Primary first, fallback second
//
// For one tracked attribute, decide per entity which source supplies the
// value:
// - Primary: a history table reduced to its latest row per entity
//   (optionally mapped through a lookup table)
// - Fallback: a pre-aggregated table that already has one row per entity
//
// An unusable source becomes an empty candidate. Resolution never fails.

use crate::error::ReconcileResult;
use crate::latest::{select_latest, OrderingPolicy, SelectionOutcome};
use crate::table::{EntityId, Table, TableSet, Value};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

// ============================================================================
// SOURCE DECLARATIONS
// ============================================================================

/// Map a selected value through a dimension table
/// (e.g. `dept_id` → `department.dept_name`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lookup {
    pub table: String,
    pub key_column: String,
    pub value_column: String,
}

/// A history table reduced via the latest-record selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrimarySource {
    pub table: String,
    pub value_column: String,
    pub order_column: String,
    pub lookup: Option<Lookup>,
}

impl PrimarySource {
    pub fn new(
        table: impl Into<String>,
        value_column: impl Into<String>,
        order_column: impl Into<String>,
    ) -> Self {
        PrimarySource {
            table: table.into(),
            value_column: value_column.into(),
            order_column: order_column.into(),
            lookup: None,
        }
    }

    /// Builder: map the selected value through `table.key_column` → `table.value_column`
    pub fn with_lookup(
        mut self,
        table: impl Into<String>,
        key_column: impl Into<String>,
        value_column: impl Into<String>,
    ) -> Self {
        self.lookup = Some(Lookup {
            table: table.into(),
            key_column: key_column.into(),
            value_column: value_column.into(),
        });
        self
    }
}

/// A pre-aggregated "current state" table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FallbackSource {
    pub table: String,
    pub value_column: String,
}

impl FallbackSource {
    pub fn new(table: impl Into<String>, value_column: impl Into<String>) -> Self {
        FallbackSource {
            table: table.into(),
            value_column: value_column.into(),
        }
    }
}

/// AttributeSpec - One requested snapshot column and where it comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeSpec {
    pub name: String,
    pub primary: Option<PrimarySource>,
    pub fallback: Option<FallbackSource>,
}

impl AttributeSpec {
    pub fn new(name: impl Into<String>) -> Self {
        AttributeSpec {
            name: name.into(),
            primary: None,
            fallback: None,
        }
    }

    pub fn primary(mut self, source: PrimarySource) -> Self {
        self.primary = Some(source);
        self
    }

    pub fn fallback(mut self, source: FallbackSource) -> Self {
        self.fallback = Some(source);
        self
    }
}

// ============================================================================
// SOURCE STATUS
// ============================================================================

/// What happened to one source while building its candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    /// The attribute declares no such source
    NotConfigured,

    /// The named table was not supplied
    TableMissing { table: String },

    /// The table is there but lacks columns the source needs
    MissingColumns { table: String, columns: Vec<String> },

    /// The source produced a candidate
    Usable {
        table: String,
        /// Entities with a recorded value
        entities: usize,
        /// Present only for primary sources
        ordering: Option<OrderingPolicy>,
        invalid_timestamps: usize,
        rows_without_key: usize,
        /// Rows that repeated an identifier (fallback tables only)
        duplicate_keys: usize,
        /// Selected values missing from the lookup table
        unmatched_lookups: usize,
    },
}

impl SourceStatus {
    pub fn is_usable(&self) -> bool {
        matches!(self, SourceStatus::Usable { .. })
    }

    /// Short label for reports
    pub fn label(&self) -> String {
        match self {
            SourceStatus::NotConfigured => "not configured".to_string(),
            SourceStatus::TableMissing { table } => format!("{}: table missing", table),
            SourceStatus::MissingColumns { table, columns } => {
                format!("{}: missing {}", table, columns.join(", "))
            }
            SourceStatus::Usable {
                table, entities, ..
            } => format!("{}: {} entities", table, entities),
        }
    }
}

// ============================================================================
// CANDIDATE
// ============================================================================

/// Candidate - (identifier, value) pairs offered by one source
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    values: BTreeMap<EntityId, Value>,
    status: SourceStatus,
}

impl Candidate {
    /// A candidate offering nothing
    pub fn empty(status: SourceStatus) -> Self {
        Candidate {
            values: BTreeMap::new(),
            status,
        }
    }

    /// Project an already reduced table to (identifier, value)
    ///
    /// Unknown values count as "no record". If an identifier repeats, the
    /// later row wins and the repeat is counted, so a later unknown row clears
    /// an earlier value.
    pub fn from_reduced(table: &Table, key_column: &str, value_column: &str) -> Self {
        let missing = table.missing_columns(&[key_column, value_column]);
        if !missing.is_empty() {
            return Candidate::empty(SourceStatus::MissingColumns {
                table: table.name().to_string(),
                columns: missing,
            });
        }

        let mut values = BTreeMap::new();
        let mut seen = HashSet::new();
        let mut duplicate_keys = 0;
        let mut rows_without_key = 0;

        if let (Some(keys), Some(cells)) = (table.column_values(key_column), table.column_values(value_column)) {
            for (key, value) in keys.zip(cells) {
                let Some(id) = EntityId::from_value(key) else {
                    rows_without_key += 1;
                    continue;
                };
                if !seen.insert(id.clone()) {
                    duplicate_keys += 1;
                }
                if value.is_unknown() {
                    values.remove(&id);
                } else {
                    values.insert(id, value.clone());
                }
            }
        }

        let entities = values.len();
        Candidate {
            values,
            status: SourceStatus::Usable {
                table: table.name().to_string(),
                entities,
                ordering: None,
                invalid_timestamps: 0,
                rows_without_key,
                duplicate_keys,
                unmatched_lookups: 0,
            },
        }
    }

    pub fn values(&self) -> &BTreeMap<EntityId, Value> {
        &self.values
    }

    pub fn get(&self, id: &EntityId) -> Option<&Value> {
        self.values.get(id)
    }

    pub fn status(&self) -> &SourceStatus {
        &self.status
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Build the primary candidate: latest row per entity, then optional lookup
pub fn primary_candidate(
    inputs: &TableSet,
    key_column: &str,
    source: Option<&PrimarySource>,
) -> ReconcileResult<Candidate> {
    let Some(source) = source else {
        return Ok(Candidate::empty(SourceStatus::NotConfigured));
    };

    let Some(table) = inputs.get(&source.table) else {
        return Ok(Candidate::empty(SourceStatus::TableMissing {
            table: source.table.clone(),
        }));
    };

    let missing = table.missing_columns(&[key_column, source.value_column.as_str()]);
    if !missing.is_empty() {
        return Ok(Candidate::empty(SourceStatus::MissingColumns {
            table: source.table.clone(),
            columns: missing,
        }));
    }

    // Resolve the lookup before selecting so a broken lookup short-circuits
    let lookup = match &source.lookup {
        Some(lookup) => match lookup_map(inputs, lookup) {
            Ok(map) => Some((lookup.table.as_str(), map)),
            Err(status) => return Ok(Candidate::empty(status)),
        },
        None => None,
    };

    let selection = select_latest(table, key_column, &source.order_column)?;
    let (ordering, invalid_timestamps, rows_without_key) = match selection.outcome {
        SelectionOutcome::Selected {
            ordering,
            invalid_timestamps,
            rows_without_key,
            ..
        } => (ordering, invalid_timestamps, rows_without_key),
        SelectionOutcome::MissingKeyColumn { .. } => {
            return Ok(Candidate::empty(SourceStatus::MissingColumns {
                table: source.table.clone(),
                columns: vec![key_column.to_string()],
            }))
        }
    };

    let mut candidate = Candidate::from_reduced(&selection.table, key_column, &source.value_column);

    let mut unmatched_lookups = 0;
    if let Some((lookup_table, map)) = lookup {
        let mut mapped = BTreeMap::new();
        for (id, raw) in candidate.values {
            let hit = EntityId::from_value(&raw).and_then(|k| map.get(&k));
            match hit {
                Some(value) if value.is_present() => {
                    mapped.insert(id, value.clone());
                }
                _ => unmatched_lookups += 1,
            }
        }
        debug!(
            table = %source.table,
            lookup = lookup_table,
            matched = mapped.len(),
            unmatched = unmatched_lookups,
            "applied lookup"
        );
        candidate.values = mapped;
    }

    candidate.status = SourceStatus::Usable {
        table: source.table.clone(),
        entities: candidate.values.len(),
        ordering: Some(ordering),
        invalid_timestamps,
        rows_without_key,
        duplicate_keys: 0,
        unmatched_lookups,
    };

    Ok(candidate)
}

/// Build the fallback candidate from a pre-aggregated table
pub fn fallback_candidate(inputs: &TableSet, key_column: &str, source: Option<&FallbackSource>) -> Candidate {
    let Some(source) = source else {
        return Candidate::empty(SourceStatus::NotConfigured);
    };

    match inputs.get(&source.table) {
        Some(table) => Candidate::from_reduced(table, key_column, &source.value_column),
        None => Candidate::empty(SourceStatus::TableMissing {
            table: source.table.clone(),
        }),
    }
}

/// Dimension table as key → value. First row wins for repeated keys.
fn lookup_map(inputs: &TableSet, lookup: &Lookup) -> Result<HashMap<EntityId, Value>, SourceStatus> {
    let table = inputs.get(&lookup.table).ok_or_else(|| SourceStatus::TableMissing {
        table: lookup.table.clone(),
    })?;

    let (Some(keys), Some(values)) = (
        table.column_values(&lookup.key_column),
        table.column_values(&lookup.value_column),
    ) else {
        return Err(SourceStatus::MissingColumns {
            table: lookup.table.clone(),
            columns: table.missing_columns(&[lookup.key_column.as_str(), lookup.value_column.as_str()]),
        });
    };

    let mut map = HashMap::new();
    for (key, value) in keys.zip(values) {
        if let Some(id) = EntityId::from_value(key) {
            map.entry(id).or_insert_with(|| value.clone());
        }
    }
    Ok(map)
}

// ============================================================================
// RESOLUTION
// ============================================================================

/// Which source supplied a resolved value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    Primary,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedValue {
    pub value: Value,
    pub source: ValueSource,
}

/// ResolvedAttribute - At most one value per entity
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAttribute {
    pub name: String,
    values: BTreeMap<EntityId, ResolvedValue>,
}

impl ResolvedAttribute {
    pub fn get(&self, id: &EntityId) -> Option<&ResolvedValue> {
        self.values.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &ResolvedValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn count_from(&self, source: ValueSource) -> usize {
        self.values.values().filter(|v| v.source == source).count()
    }

    /// Two-column (identifier, value) view ordered by identifier
    pub fn to_table(&self, key_column: &str) -> ReconcileResult<Table> {
        Table::from_rows(
            self.name.clone(),
            [key_column, self.name.as_str()],
            self.values
                .iter()
                .map(|(id, resolved)| vec![id.to_value(), resolved.value.clone()]),
        )
    }
}

/// Merge two candidates, primary first
pub fn resolve_attribute(name: impl Into<String>, primary: &Candidate, fallback: &Candidate) -> ResolvedAttribute {
    let mut values: BTreeMap<EntityId, ResolvedValue> = fallback
        .values
        .iter()
        .map(|(id, value)| {
            (
                id.clone(),
                ResolvedValue {
                    value: value.clone(),
                    source: ValueSource::Fallback,
                },
            )
        })
        .collect();

    for (id, value) in &primary.values {
        values.insert(
            id.clone(),
            ResolvedValue {
                value: value.clone(),
                source: ValueSource::Primary,
            },
        );
    }

    ResolvedAttribute {
        name: name.into(),
        values,
    }
}

// ============================================================================
// TESTS
// ============================================================================
