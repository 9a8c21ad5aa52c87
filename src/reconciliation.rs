// ⚖️ Reconciliation Engine - History tables → one row per employee
//
// Pipeline for one call:
//   base registry (deduplicated) → derived fields (one as-of instant)
//     → per attribute: primary candidate + fallback candidate → resolve
//     → left join onto the base
//
// The engine is a pure function of its inputs. It never reads files, never
// reads the clock, never mutates what it is given.

use crate::diagnostics::{Diagnostic, Diagnostics, Issue};
use crate::error::{ReconcileError, ReconcileResult};
use crate::latest::OrderingPolicy;
use crate::resolver::{
    fallback_candidate, primary_candidate, resolve_attribute, AttributeSpec, ResolvedAttribute,
    SourceStatus, ValueSource,
};
use crate::table::{EntityId, Table, TableSet, Value, DEFAULT_UNKNOWN_MARKER};
use crate::temporal::AsOf;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// Name given to the output table
pub const SNAPSHOT_TABLE: &str = "entity_snapshot";

// ============================================================================
// REQUEST
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedKind {
    /// As-of year minus birth year
    AgeYears,
    /// Days since the date / 365.25
    TenureYears,
}

/// A column computed on the base table before any join
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedField {
    pub name: String,
    pub source_column: String,
    pub kind: DerivedKind,
}

impl DerivedField {
    pub fn new(name: impl Into<String>, source_column: impl Into<String>, kind: DerivedKind) -> Self {
        DerivedField {
            name: name.into(),
            source_column: source_column.into(),
            kind,
        }
    }

    fn compute(&self, as_of: &AsOf, source: &Value) -> Value {
        match self.kind {
            DerivedKind::AgeYears => as_of.age_years(source),
            DerivedKind::TenureYears => as_of.tenure_years(source),
        }
    }
}

/// SnapshotRequest - What the snapshot should contain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotRequest {
    /// Table whose entities form the output universe
    pub base_table: String,
    /// Canonical identifier column shared by every input
    pub key_column: String,
    pub attributes: Vec<AttributeSpec>,
    pub derived: Vec<DerivedField>,
}

impl SnapshotRequest {
    pub fn new(base_table: impl Into<String>, key_column: impl Into<String>) -> Self {
        SnapshotRequest {
            base_table: base_table.into(),
            key_column: key_column.into(),
            attributes: Vec::new(),
            derived: Vec::new(),
        }
    }

    pub fn attribute(mut self, spec: AttributeSpec) -> Self {
        self.attributes.push(spec);
        self
    }

    pub fn derive(mut self, field: DerivedField) -> Self {
        self.derived.push(field);
        self
    }

    /// Every column name the request guarantees in the output
    pub fn output_names(&self) -> Vec<&str> {
        let mut names = vec![self.key_column.as_str()];
        names.extend(self.derived.iter().map(|d| d.name.as_str()));
        names.extend(self.attributes.iter().map(|a| a.name.as_str()));
        names
    }

    /// Every input table the request reads, base first, without repeats
    pub fn source_tables(&self) -> Vec<&str> {
        let mut tables = vec![self.base_table.as_str()];
        for spec in &self.attributes {
            if let Some(primary) = &spec.primary {
                tables.push(primary.table.as_str());
                if let Some(lookup) = &primary.lookup {
                    tables.push(lookup.table.as_str());
                }
            }
            if let Some(fallback) = &spec.fallback {
                tables.push(fallback.table.as_str());
            }
        }

        let mut seen = HashSet::new();
        tables.retain(|t| seen.insert(*t));
        tables
    }

    /// Contract checks: these fail loudly instead of degrading
    pub fn validate(&self) -> ReconcileResult<()> {
        if self.key_column.is_empty() {
            return Err(ReconcileError::EmptyKeyColumn);
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let names = self
            .derived
            .iter()
            .map(|d| d.name.as_str())
            .chain(self.attributes.iter().map(|a| a.name.as_str()));

        for name in names {
            if name.is_empty() {
                return Err(ReconcileError::EmptyAttributeName);
            }
            if name == self.key_column || !seen.insert(name) {
                return Err(ReconcileError::DuplicateAttribute(name.to_string()));
            }
        }

        Ok(())
    }
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// Which path an attribute's values took, across the base entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPath {
    PrimaryOnly,
    FallbackOnly,
    Mixed,
    Unresolved,
}

impl ResolutionPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionPath::PrimaryOnly => "primary",
            ResolutionPath::FallbackOnly => "fallback",
            ResolutionPath::Mixed => "primary+fallback",
            ResolutionPath::Unresolved => "unresolved",
        }
    }
}

/// Per-attribute account of how the column was filled
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeOutcome {
    pub name: String,
    pub primary: SourceStatus,
    pub fallback: SourceStatus,
    pub from_primary: usize,
    pub from_fallback: usize,
    pub unresolved: usize,
    /// Which source filled each base entity that got a value
    pub provenance: BTreeMap<EntityId, ValueSource>,
}

impl AttributeOutcome {
    pub fn path(&self) -> ResolutionPath {
        match (self.from_primary, self.from_fallback) {
            (0, 0) => ResolutionPath::Unresolved,
            (_, 0) => ResolutionPath::PrimaryOnly,
            (0, _) => ResolutionPath::FallbackOnly,
            _ => ResolutionPath::Mixed,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} (primary {}, fallback {}, unknown {}) [primary: {}; fallback: {}]",
            self.name,
            self.path().as_str(),
            self.from_primary,
            self.from_fallback,
            self.unresolved,
            self.primary.label(),
            self.fallback.label()
        )
    }
}

/// Result of joining resolved attributes onto the base
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub snapshot: Table,
    pub joins: Vec<AttributeJoin>,
}

/// Join statistics for one attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeJoin {
    pub name: String,
    pub from_primary: usize,
    pub from_fallback: usize,
    pub unresolved: usize,
    pub provenance: BTreeMap<EntityId, ValueSource>,
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    #[serde(skip)]
    pub snapshot: Table,
    pub key_column: String,
    pub as_of: AsOf,
    pub unknown_marker: String,
    pub entity_count: usize,
    pub attributes: Vec<AttributeOutcome>,
    pub diagnostics: Diagnostics,
    /// SHA-256 of the rendered snapshot
    pub fingerprint: String,
}

impl ReconciliationReport {
    pub fn attribute(&self, name: &str) -> Option<&AttributeOutcome> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Which source filled `attribute` for `entity` (None = unknown)
    pub fn provenance(&self, entity: &EntityId, attribute: &str) -> Option<ValueSource> {
        self.attribute(attribute)
            .and_then(|a| a.provenance.get(entity))
            .copied()
    }

    /// Snapshot row for one entity
    pub fn row_for(&self, entity: &EntityId) -> Option<&[Value]> {
        let idx = self.snapshot.column_index(&self.key_column)?;
        self.snapshot
            .rows()
            .iter()
            .find(|row| EntityId::from_value(&row[idx]).as_ref() == Some(entity))
            .map(|row| row.as_slice())
    }

    /// Cell lookup by entity and column
    pub fn value(&self, entity: &EntityId, column: &str) -> Option<&Value> {
        let idx = self.snapshot.column_index(column)?;
        self.row_for(entity).map(|row| &row[idx])
    }

    pub fn summary(&self) -> String {
        format!(
            "Snapshot as of {}: {} entities, {} attributes, {}",
            self.as_of.date(),
            self.entity_count,
            self.attributes.len(),
            self.diagnostics.summary()
        )
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    /// How unknown cells render in the fingerprint and outputs (default: "N/A")
    pub unknown_marker: String,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine {
            unknown_marker: DEFAULT_UNKNOWN_MARKER.to_string(),
        }
    }

    pub fn with_unknown_marker(marker: impl Into<String>) -> Self {
        ReconciliationEngine {
            unknown_marker: marker.into(),
        }
    }

    /// Build the snapshot for `request` from `inputs`
    ///
    /// Fails only on contract violations (see `SnapshotRequest::validate`).
    /// Every data problem is reported in `diagnostics` instead.
    pub fn reconcile(
        &self,
        inputs: &TableSet,
        request: &SnapshotRequest,
        as_of: &AsOf,
    ) -> ReconcileResult<ReconciliationReport> {
        request.validate()?;

        let key = request.key_column.as_str();
        let mut diagnostics = Diagnostics::new();
        let mut resolved = Vec::with_capacity(request.attributes.len());
        let mut statuses = Vec::with_capacity(request.attributes.len());

        for spec in &request.attributes {
            let primary = primary_candidate(inputs, key, spec.primary.as_ref())?;
            let fallback = fallback_candidate(inputs, key, spec.fallback.as_ref());

            report_source(&spec.name, spec.primary.as_ref().map(|p| p.order_column.as_str()), primary.status(), &mut diagnostics);
            report_source(&spec.name, None, fallback.status(), &mut diagnostics);

            if !primary.status().is_usable() && spec.primary.is_some() {
                warn!(
                    attribute = %spec.name,
                    status = %primary.status().label(),
                    "primary source unusable, relying on fallback"
                );
            }

            resolved.push(resolve_attribute(spec.name.clone(), &primary, &fallback));
            statuses.push((primary.status().clone(), fallback.status().clone()));
        }

        let composition = self.compose(
            inputs.get(&request.base_table),
            &request.base_table,
            key,
            &request.derived,
            &resolved,
            as_of,
            &mut diagnostics,
        )?;

        let attributes: Vec<AttributeOutcome> = composition
            .joins
            .into_iter()
            .zip(statuses)
            .map(|(join, (primary, fallback))| AttributeOutcome {
                name: join.name,
                primary,
                fallback,
                from_primary: join.from_primary,
                from_fallback: join.from_fallback,
                unresolved: join.unresolved,
                provenance: join.provenance,
            })
            .collect();

        for outcome in &attributes {
            debug!(
                attribute = %outcome.name,
                path = outcome.path().as_str(),
                primary = outcome.from_primary,
                fallback = outcome.from_fallback,
                unknown = outcome.unresolved,
                "resolved attribute"
            );
        }

        let snapshot = composition.snapshot;
        let fingerprint = snapshot.fingerprint(&self.unknown_marker);

        Ok(ReconciliationReport {
            entity_count: snapshot.len(),
            snapshot,
            key_column: request.key_column.clone(),
            as_of: *as_of,
            unknown_marker: self.unknown_marker.clone(),
            attributes,
            diagnostics,
            fingerprint,
        })
    }

    /// Left-join resolved attributes onto the base registry
    ///
    /// - One output row per base entity (repeated ids: last row kept, at the
    ///   position of the first)
    /// - Base rows without an id are kept; their attributes are unknown
    /// - Derived fields are computed before the joins, all against `as_of`
    /// - Every derived and attribute name becomes a column, even if empty
    #[allow(clippy::too_many_arguments)]
    pub fn compose(
        &self,
        base: Option<&Table>,
        base_name: &str,
        key_column: &str,
        derived: &[DerivedField],
        attributes: &[ResolvedAttribute],
        as_of: &AsOf,
        diagnostics: &mut Diagnostics,
    ) -> ReconcileResult<Composition> {
        if key_column.is_empty() {
            return Err(ReconcileError::EmptyKeyColumn);
        }

        let mut snapshot = prepare_base(base, base_name, key_column, diagnostics)?.rename(SNAPSHOT_TABLE);

        let keys: Vec<Option<EntityId>> = match snapshot.column_values(key_column) {
            Some(cells) => cells.map(EntityId::from_value).collect(),
            None => vec![None; snapshot.len()],
        };

        for field in derived {
            let values: Vec<Value> = match snapshot.column_values(&field.source_column) {
                Some(cells) => cells.map(|v| field.compute(as_of, v)).collect(),
                None => {
                    diagnostics.push(
                        Diagnostic::warning(Issue::ColumnMissing {
                            column: field.source_column.clone(),
                        })
                        .for_table(base_name)
                        .for_attribute(&field.name),
                    );
                    vec![Value::Unknown; snapshot.len()]
                }
            };

            let invalid = values.iter().filter(|v| v.is_invalid()).count();
            if invalid > 0 {
                diagnostics.push(
                    Diagnostic::warning(Issue::InvalidCells {
                        column: field.source_column.clone(),
                        count: invalid,
                    })
                    .for_table(base_name)
                    .for_attribute(&field.name),
                );
            }

            shadow_check(&snapshot, &field.name, base_name, diagnostics);
            snapshot.set_column(&field.name, values)?;
        }

        let mut joins = Vec::with_capacity(attributes.len());
        for attribute in attributes {
            let mut join = AttributeJoin {
                name: attribute.name.clone(),
                from_primary: 0,
                from_fallback: 0,
                unresolved: 0,
                provenance: BTreeMap::new(),
            };

            let mut values = Vec::with_capacity(keys.len());
            for key in &keys {
                let hit = key.as_ref().and_then(|id| attribute.get(id).map(|r| (id, r)));
                match hit {
                    Some((id, resolved)) => {
                        match resolved.source {
                            ValueSource::Primary => join.from_primary += 1,
                            ValueSource::Fallback => join.from_fallback += 1,
                        }
                        join.provenance.insert(id.clone(), resolved.source);
                        values.push(resolved.value.clone());
                    }
                    None => {
                        join.unresolved += 1;
                        values.push(Value::Unknown);
                    }
                }
            }

            if join.unresolved > 0 {
                diagnostics.push(
                    Diagnostic::warning(Issue::AttributeUnresolved {
                        count: join.unresolved,
                    })
                    .for_attribute(&attribute.name),
                );
            }

            shadow_check(&snapshot, &attribute.name, base_name, diagnostics);
            snapshot.set_column(&attribute.name, values)?;
            joins.push(join);
        }

        Ok(Composition { snapshot, joins })
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Owned, deduplicated copy of the base registry with a key column
fn prepare_base(
    base: Option<&Table>,
    base_name: &str,
    key_column: &str,
    diagnostics: &mut Diagnostics,
) -> ReconcileResult<Table> {
    let Some(base) = base else {
        warn!(table = base_name, "base registry missing, snapshot is empty");
        diagnostics.push(Diagnostic::critical(Issue::TableMissing).for_table(base_name));
        return Table::new(base_name, [key_column]);
    };

    let Some(key_idx) = base.column_index(key_column) else {
        warn!(table = base_name, column = key_column, "base registry has no identifier column");
        diagnostics.push(
            Diagnostic::critical(Issue::ColumnMissing {
                column: key_column.to_string(),
            })
            .for_table(base_name),
        );
        let mut table = base.clone();
        table.set_column(key_column, vec![Value::Unknown; base.len()])?;
        return Ok(table);
    };

    let mut rows: Vec<Vec<Value>> = Vec::with_capacity(base.len());
    let mut position: HashMap<EntityId, usize> = HashMap::new();
    let mut duplicates = 0;
    let mut without_key = 0;

    for row in base.rows() {
        let mut row = row.clone();
        match EntityId::from_value(&row[key_idx]) {
            Some(id) => {
                row[key_idx] = id.to_value();
                match position.get(&id) {
                    Some(&at) => {
                        rows[at] = row;
                        duplicates += 1;
                    }
                    None => {
                        position.insert(id, rows.len());
                        rows.push(row);
                    }
                }
            }
            None => {
                without_key += 1;
                rows.push(row);
            }
        }
    }

    if duplicates > 0 {
        diagnostics.push(Diagnostic::warning(Issue::DuplicateKeys { count: duplicates }).for_table(base_name));
    }
    if without_key > 0 {
        diagnostics.push(Diagnostic::warning(Issue::RowsWithoutKey { count: without_key }).for_table(base_name));
    }

    Table::from_rows(base.name(), base.columns().to_vec(), rows)
}

fn shadow_check(snapshot: &Table, column: &str, base_name: &str, diagnostics: &mut Diagnostics) {
    if snapshot.has_column(column) {
        diagnostics.push(
            Diagnostic::info(Issue::BaseColumnShadowed)
                .for_table(base_name)
                .for_attribute(column),
        );
    }
}

/// Translate a source status into diagnostics
fn report_source(attribute: &str, order_column: Option<&str>, status: &SourceStatus, diagnostics: &mut Diagnostics) {
    match status {
        SourceStatus::NotConfigured => {}
        SourceStatus::TableMissing { table } => {
            diagnostics.push(
                Diagnostic::warning(Issue::TableMissing)
                    .for_table(table)
                    .for_attribute(attribute),
            );
        }
        SourceStatus::MissingColumns { table, columns } => {
            for column in columns {
                diagnostics.push(
                    Diagnostic::warning(Issue::ColumnMissing {
                        column: column.clone(),
                    })
                    .for_table(table)
                    .for_attribute(attribute),
                );
            }
        }
        SourceStatus::Usable {
            table,
            ordering,
            invalid_timestamps,
            rows_without_key,
            duplicate_keys,
            unmatched_lookups,
            ..
        } => {
            let scoped = |issue: Issue| Diagnostic::warning(issue).for_table(table).for_attribute(attribute);

            if let (Some(OrderingPolicy::InputOrder), Some(column)) = (ordering, order_column) {
                diagnostics.push(
                    Diagnostic::info(Issue::InputOrderUsed {
                        column: column.to_string(),
                    })
                    .for_table(table)
                    .for_attribute(attribute),
                );
            }
            if *invalid_timestamps > 0 {
                diagnostics.push(scoped(Issue::InvalidTimestamps {
                    column: order_column.unwrap_or_default().to_string(),
                    count: *invalid_timestamps,
                }));
            }
            if *rows_without_key > 0 {
                diagnostics.push(scoped(Issue::RowsWithoutKey {
                    count: *rows_without_key,
                }));
            }
            if *duplicate_keys > 0 {
                diagnostics.push(scoped(Issue::DuplicateKeys {
                    count: *duplicate_keys,
                }));
            }
            if *unmatched_lookups > 0 {
                diagnostics.push(scoped(Issue::LookupUnmatched {
                    table: table.clone(),
                    count: *unmatched_lookups,
                }));
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use crate::resolver::{FallbackSource, PrimarySource};
    use chrono::NaiveDate;

    fn as_of() -> AsOf {
        AsOf::from_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    fn ids(ids: &[i64]) -> Table {
        Table::from_rows(
            "employee",
            ["employee_id"],
            ids.iter().map(|id| vec![Value::Int(*id)]).collect::<Vec<_>>(),
        )
        .unwrap()
    }

    fn scenario_inputs() -> TableSet {
        let salary = Table::from_rows(
            "salary",
            ["employee_id", "amount", "from_date"],
            vec![
                vec![Value::Int(1), Value::Int(100), Value::text("2020-01-01")],
                vec![Value::Int(1), Value::Int(150), Value::text("2021-01-01")],
                vec![Value::Int(2), Value::Int(200), Value::text("2020-01-01")],
            ],
        )
        .unwrap();

        let departments = Table::from_rows(
            "snapshot",
            ["employee_id", "dept_name"],
            vec![vec![Value::Int(3), Value::text("Ops")]],
        )
        .unwrap();

        TableSet::new().with(ids(&[1, 2, 3])).with(salary).with(departments)
    }

    fn scenario_request() -> SnapshotRequest {
        SnapshotRequest::new("employee", "employee_id")
            .attribute(
                AttributeSpec::new("latest_salary")
                    .primary(PrimarySource::new("salary", "amount", "from_date")),
            )
            .attribute(
                AttributeSpec::new("dept_name")
                    .primary(PrimarySource::new("dept_emp", "dept_id", "from_date"))
                    .fallback(FallbackSource::new("snapshot", "dept_name")),
            )
    }

    #[test]
    fn test_example_scenario() {
        let engine = ReconciliationEngine::new();
        let report = engine
            .reconcile(&scenario_inputs(), &scenario_request(), &as_of())
            .unwrap();

        let e = |id: i64| EntityId::Int(id);
        assert_eq!(report.entity_count, 3);
        assert_eq!(report.value(&e(1), "latest_salary"), Some(&Value::Int(150)));
        assert_eq!(report.value(&e(2), "latest_salary"), Some(&Value::Int(200)));
        assert_eq!(report.value(&e(3), "latest_salary"), Some(&Value::Unknown));
        assert_eq!(report.value(&e(1), "dept_name"), Some(&Value::Unknown));
        assert_eq!(report.value(&e(2), "dept_name"), Some(&Value::Unknown));
        assert_eq!(report.value(&e(3), "dept_name"), Some(&Value::text("Ops")));

        assert_eq!(report.provenance(&e(1), "latest_salary"), Some(ValueSource::Primary));
        assert_eq!(report.provenance(&e(3), "dept_name"), Some(ValueSource::Fallback));
        assert_eq!(report.provenance(&e(3), "latest_salary"), None);

        let dept = report.attribute("dept_name").unwrap();
        assert_eq!(dept.path(), ResolutionPath::FallbackOnly);
        assert_eq!(
            dept.primary,
            SourceStatus::TableMissing {
                table: "dept_emp".into()
            }
        );
        assert_eq!(report.attribute("latest_salary").unwrap().path(), ResolutionPath::PrimaryOnly);
    }

    #[test]
    fn test_column_contract_holds_with_no_sources() {
        let inputs = TableSet::new().with(ids(&[7, 8]));
        let request = SnapshotRequest::new("employee", "employee_id")
            .attribute(AttributeSpec::new("title"))
            .derive(DerivedField::new("age", "birth_date", DerivedKind::AgeYears));

        let report = ReconciliationEngine::new()
            .reconcile(&inputs, &request, &as_of())
            .unwrap();

        assert_eq!(report.snapshot.columns(), &["employee_id", "age", "title"]);
        assert!(report
            .snapshot
            .column_values("title")
            .unwrap()
            .all(|v| v.is_unknown()));
        assert_eq!(report.attribute("title").unwrap().path(), ResolutionPath::Unresolved);
    }

    #[test]
    fn test_empty_source_tables_let_fallback_dominate() {
        let request = SnapshotRequest::new("employee", "employee_id").attribute(
            AttributeSpec::new("latest_salary")
                .primary(PrimarySource::new("salary", "amount", "from_date"))
                .fallback(FallbackSource::new("snapshot", "latest_salary")),
        );
        let fallback = Table::from_rows(
            "snapshot",
            ["employee_id", "latest_salary"],
            vec![
                vec![Value::Int(1), Value::Int(500)],
                vec![Value::Int(2), Value::Int(600)],
            ],
        )
        .unwrap();
        let header_only = Table::new("salary", ["employee_id", "amount", "from_date"]).unwrap();

        for salary in [Table::empty("salary"), header_only] {
            let inputs = TableSet::new()
                .with(ids(&[1, 2, 3]))
                .with(salary)
                .with(fallback.clone());
            let report = ReconciliationEngine::new()
                .reconcile(&inputs, &request, &as_of())
                .unwrap();

            assert_eq!(report.snapshot.columns(), &["employee_id", "latest_salary"]);
            assert_eq!(report.value(&EntityId::Int(1), "latest_salary"), Some(&Value::Int(500)));
            assert_eq!(report.provenance(&EntityId::Int(2), "latest_salary"), Some(ValueSource::Fallback));
            assert_eq!(report.value(&EntityId::Int(3), "latest_salary"), Some(&Value::Unknown));
            assert_eq!(
                report.attribute("latest_salary").unwrap().path(),
                ResolutionPath::FallbackOnly
            );
        }

        // Both sources empty: the column is still there, every cell unknown
        let inputs = TableSet::new()
            .with(ids(&[1]))
            .with(Table::empty("salary"))
            .with(Table::empty("snapshot"));
        let report = ReconciliationEngine::new()
            .reconcile(&inputs, &request, &as_of())
            .unwrap();
        assert_eq!(report.snapshot.columns(), &["employee_id", "latest_salary"]);
        assert_eq!(report.value(&EntityId::Int(1), "latest_salary"), Some(&Value::Unknown));
        assert_eq!(report.attribute("latest_salary").unwrap().path(), ResolutionPath::Unresolved);
    }

    #[test]
    fn test_missing_base_yields_empty_snapshot_with_columns() {
        let request = scenario_request();
        let report = ReconciliationEngine::new()
            .reconcile(&TableSet::new(), &request, &as_of())
            .unwrap();

        assert!(report.snapshot.is_empty());
        assert_eq!(
            report.snapshot.columns(),
            &["employee_id", "latest_salary", "dept_name"]
        );
        assert!(report.diagnostics.has_critical());
    }

    #[test]
    fn test_base_without_key_keeps_rows() {
        let base = Table::from_rows(
            "employee",
            ["name"],
            vec![vec![Value::text("Ada")], vec![Value::text("Grace")]],
        )
        .unwrap();
        let inputs = TableSet::new().with(base);
        let report = ReconciliationEngine::new()
            .reconcile(&inputs, &scenario_request(), &as_of())
            .unwrap();

        assert_eq!(report.snapshot.len(), 2);
        assert!(report.snapshot.has_column("employee_id"));
        assert_eq!(report.attribute("latest_salary").unwrap().unresolved, 2);
    }

    #[test]
    fn test_duplicate_base_ids_collapse() {
        let base = Table::from_rows(
            "employee",
            ["employee_id", "name"],
            vec![
                vec![Value::text("1"), Value::text("Old")],
                vec![Value::Int(2), Value::text("Bob")],
                vec![Value::Int(1), Value::text("New")],
            ],
        )
        .unwrap();
        let inputs = TableSet::new().with(base);
        let report = ReconciliationEngine::new()
            .reconcile(&inputs, &SnapshotRequest::new("employee", "employee_id"), &as_of())
            .unwrap();

        assert_eq!(report.snapshot.len(), 2);
        assert_eq!(report.snapshot.value(0, "name"), Some(&Value::text("New")));
        assert_eq!(report.snapshot.value(0, "employee_id"), Some(&Value::Int(1)));
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.issue == Issue::DuplicateKeys { count: 1 }));
    }

    #[test]
    fn test_entities_outside_base_are_excluded() {
        let mut inputs = scenario_inputs();
        inputs.insert(ids(&[2]));
        let report = ReconciliationEngine::new()
            .reconcile(&inputs, &scenario_request(), &as_of())
            .unwrap();

        assert_eq!(report.entity_count, 1);
        assert!(report.row_for(&EntityId::Int(1)).is_none());
    }

    #[test]
    fn test_derived_fields_share_as_of() {
        let base = Table::from_rows(
            "employee",
            ["employee_id", "birth_date", "hire_date"],
            vec![
                vec![Value::Int(1), Value::text("1990-05-05"), Value::text("2020-01-01")],
                vec![Value::Int(2), Value::Unknown, Value::text("bogus")],
            ],
        )
        .unwrap();
        let request = SnapshotRequest::new("employee", "employee_id")
            .derive(DerivedField::new("age", "birth_date", DerivedKind::AgeYears))
            .derive(DerivedField::new("company_tenure", "hire_date", DerivedKind::TenureYears));

        let report = ReconciliationEngine::new()
            .reconcile(&TableSet::new().with(base), &request, &as_of())
            .unwrap();

        let e1 = EntityId::Int(1);
        let e2 = EntityId::Int(2);
        assert_eq!(report.value(&e1, "age"), Some(&Value::Int(34)));
        let tenure = report.value(&e1, "company_tenure").and_then(|v| v.as_f64()).unwrap();
        assert!((tenure - 4.0).abs() < 1e-9);
        assert_eq!(report.value(&e2, "age"), Some(&Value::Unknown));
        assert_eq!(report.value(&e2, "company_tenure"), Some(&Value::Invalid("bogus".into())));
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Warning
                && d.issue == Issue::InvalidCells {
                    column: "hire_date".into(),
                    count: 1
                }));
    }

    #[test]
    fn test_attribute_shadows_base_column() {
        let base = Table::from_rows(
            "employee",
            ["employee_id", "latest_salary"],
            vec![vec![Value::Int(1), Value::Int(1)]],
        )
        .unwrap();
        let mut inputs = scenario_inputs();
        inputs.insert(base);

        let report = ReconciliationEngine::new()
            .reconcile(&inputs, &scenario_request(), &as_of())
            .unwrap();

        assert_eq!(
            report.snapshot.columns(),
            &["employee_id", "latest_salary", "dept_name"]
        );
        assert_eq!(report.value(&EntityId::Int(1), "latest_salary"), Some(&Value::Int(150)));
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.issue == Issue::BaseColumnShadowed));
    }

    #[test]
    fn test_input_order_policy_reported() {
        let title = Table::from_rows(
            "title",
            ["employee_id", "title"],
            vec![
                vec![Value::Int(1), Value::text("Engineer")],
                vec![Value::Int(1), Value::text("Manager")],
            ],
        )
        .unwrap();
        let inputs = TableSet::new().with(ids(&[1])).with(title);
        let request = SnapshotRequest::new("employee", "employee_id").attribute(
            AttributeSpec::new("title").primary(PrimarySource::new("title", "title", "from_date")),
        );

        let report = ReconciliationEngine::new()
            .reconcile(&inputs, &request, &as_of())
            .unwrap();

        assert_eq!(report.value(&EntityId::Int(1), "title"), Some(&Value::text("Manager")));
        assert!(report.diagnostics.iter().any(|d| d.issue
            == Issue::InputOrderUsed {
                column: "from_date".into()
            }));
    }

    #[test]
    fn test_contract_violations_fail_loudly() {
        let engine = ReconciliationEngine::new();
        let inputs = scenario_inputs();

        let empty_key = SnapshotRequest::new("employee", "");
        assert_eq!(
            engine.reconcile(&inputs, &empty_key, &as_of()).unwrap_err(),
            ReconcileError::EmptyKeyColumn
        );

        let twice = SnapshotRequest::new("employee", "employee_id")
            .attribute(AttributeSpec::new("title"))
            .attribute(AttributeSpec::new("title"));
        assert_eq!(
            engine.reconcile(&inputs, &twice, &as_of()).unwrap_err(),
            ReconcileError::DuplicateAttribute("title".into())
        );

        let unnamed = SnapshotRequest::new("employee", "employee_id").attribute(AttributeSpec::new(""));
        assert_eq!(
            engine.reconcile(&inputs, &unnamed, &as_of()).unwrap_err(),
            ReconcileError::EmptyAttributeName
        );
    }

    #[test]
    fn test_deterministic_fingerprint() {
        let engine = ReconciliationEngine::new();
        let inputs = scenario_inputs();
        let request = scenario_request();

        let first = engine.reconcile(&inputs, &request, &as_of()).unwrap();
        let second = engine.reconcile(&inputs, &request, &as_of()).unwrap();

        assert_eq!(first.snapshot, second.snapshot);
        assert_eq!(first.fingerprint, second.fingerprint);
        assert!(!first.summary().is_empty());
    }
}
