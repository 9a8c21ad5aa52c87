// 🕐 Latest-Record Selector
// One row per entity: the most current one.
//
// Policy:
// - Stable sort by (identifier, ordering key) ascending, keep the last row
//   of each identifier group
// - Equal ordering keys resolve to the later row in input order
// - Missing ordering column: every row gets the sentinel key, so the last
//   row per entity in input order wins
// - Missing identifier column: empty result, flagged as not applicable

use crate::error::{ReconcileError, ReconcileResult};
use crate::table::{EntityId, Table};
use crate::temporal::OrderKey;
use serde::Serialize;

// ============================================================================
// SELECTION OUTCOME
// ============================================================================

/// How the "most current" row was decided
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "policy", content = "column", rename_all = "snake_case")]
pub enum OrderingPolicy {
    /// Sorted by the named timestamp column
    Column(String),
    /// Ordering column absent: input order decides
    InputOrder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SelectionOutcome {
    /// The identifier column is absent; nothing can be selected
    MissingKeyColumn { key_column: String },

    /// One row per entity was selected
    Selected {
        ordering: OrderingPolicy,
        input_rows: usize,
        entities: usize,
        /// Ordering cells that were present but not timestamps
        invalid_timestamps: usize,
        /// Rows whose identifier cell was empty or unusable
        rows_without_key: usize,
    },
}

impl SelectionOutcome {
    pub fn is_applicable(&self) -> bool {
        matches!(self, SelectionOutcome::Selected { .. })
    }
}

/// Selected rows plus how they were chosen
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub table: Table,
    pub outcome: SelectionOutcome,
}

// ============================================================================
// SELECTOR
// ============================================================================

/// Pick the most current row per entity
///
/// Output rows keep the input header and are ordered by identifier. Only an
/// empty `key_column` name is an error; every data problem degrades.
pub fn select_latest(table: &Table, key_column: &str, order_column: &str) -> ReconcileResult<Selection> {
    if key_column.is_empty() {
        return Err(ReconcileError::EmptyKeyColumn);
    }

    let Some(key_idx) = table.column_index(key_column) else {
        return Ok(Selection {
            table: table.empty_like(),
            outcome: SelectionOutcome::MissingKeyColumn {
                key_column: key_column.to_string(),
            },
        });
    };

    let order_idx = table.column_index(order_column);
    let ordering = match order_idx {
        Some(_) => OrderingPolicy::Column(order_column.to_string()),
        None => OrderingPolicy::InputOrder,
    };

    let mut rows_without_key = 0;
    let mut invalid_timestamps = 0;
    let mut keyed: Vec<(EntityId, OrderKey, usize)> = Vec::with_capacity(table.len());

    for (row_idx, row) in table.rows().iter().enumerate() {
        let Some(id) = EntityId::from_value(&row[key_idx]) else {
            rows_without_key += 1;
            continue;
        };

        let key = match order_idx {
            Some(idx) => {
                let key = OrderKey::from_value(&row[idx]);
                if key.is_sentinel() && row[idx].is_present() {
                    invalid_timestamps += 1;
                }
                key
            }
            None => OrderKey::Sentinel,
        };

        keyed.push((id, key, row_idx));
    }

    // sort_by is stable: equal (id, key) pairs keep input order
    keyed.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));

    let mut selected = table.empty_like();
    for (i, (id, _, row_idx)) in keyed.iter().enumerate() {
        let last_in_group = keyed.get(i + 1).map_or(true, |next| &next.0 != id);
        if last_in_group {
            selected.push_row(table.rows()[*row_idx].clone())?;
        }
    }

    let outcome = SelectionOutcome::Selected {
        ordering,
        input_rows: table.len(),
        entities: selected.len(),
        invalid_timestamps,
        rows_without_key,
    };

    Ok(Selection {
        table: selected,
        outcome,
    })
}

// ============================================================================
// TESTS
// ============================================================================
