// 🔗 Pipeline - load → normalize → reconcile
// Diagnostics are kept in stage order: loader, normalizer, reconciler.

use crate::config::SnapshotConfig;
use crate::diagnostics::Diagnostics;
use crate::hr;
use crate::loader::{DataLoader, LoadOutcome};
use crate::reconciliation::{ReconciliationEngine, ReconciliationReport, SnapshotRequest};
use crate::schema::SchemaNormalizer;
use crate::table::TableSet;
use crate::temporal::AsOf;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

/// Result of one full run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub report: ReconciliationReport,
    /// Normalized inputs the report was built from
    pub inputs: TableSet,
    /// Table name → file it was read from
    pub sources: BTreeMap<String, PathBuf>,
}

pub struct SnapshotPipeline {
    loader: DataLoader,
    normalizer: SchemaNormalizer,
    request: SnapshotRequest,
    engine: ReconciliationEngine,
}

impl SnapshotPipeline {
    pub fn new(config: SnapshotConfig, normalizer: SchemaNormalizer, request: SnapshotRequest) -> Self {
        let engine = ReconciliationEngine::with_unknown_marker(config.unknown_marker.clone());
        SnapshotPipeline {
            loader: DataLoader::new(config),
            normalizer,
            request,
            engine,
        }
    }

    /// The employee snapshot preset
    pub fn hr(config: SnapshotConfig) -> Self {
        Self::new(config, hr::normalizer(), hr::snapshot_request())
    }

    /// Read every source table from disk, then reconcile
    pub fn run(&mut self, as_of: &AsOf) -> Result<PipelineOutcome> {
        let tables = self.request.source_tables();
        let loaded = self.loader.load_all(&tables);
        info!(
            tables = loaded.tables.len(),
            missing = tables.len() - loaded.tables.len(),
            "inputs loaded"
        );
        self.reconcile_loaded(loaded, as_of)
    }

    /// Normalize and reconcile tables that are already in memory
    pub fn reconcile_loaded(&self, loaded: LoadOutcome, as_of: &AsOf) -> Result<PipelineOutcome> {
        let normalized = self.normalizer.normalize_all(loaded.tables);

        let mut report = self
            .engine
            .reconcile(&normalized.value, &self.request, as_of)
            .context("Snapshot request rejected")?;

        let mut diagnostics = loaded.diagnostics;
        diagnostics.extend(normalized.diagnostics);
        diagnostics.extend(std::mem::take(&mut report.diagnostics));
        report.diagnostics = diagnostics;

        info!(
            entities = report.entity_count,
            fingerprint = %report.fingerprint,
            "{}",
            report.diagnostics.summary()
        );

        Ok(PipelineOutcome {
            report,
            inputs: normalized.value,
            sources: loaded.sources,
        })
    }

    /// Reconcile in-memory tables with no load diagnostics
    pub fn reconcile_tables(&self, tables: TableSet, as_of: &AsOf) -> Result<PipelineOutcome> {
        self.reconcile_loaded(
            LoadOutcome {
                tables,
                diagnostics: Diagnostics::new(),
                sources: BTreeMap::new(),
            },
            as_of,
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Issue;
    use crate::table::{EntityId, Table, Value};
    use chrono::NaiveDate;

    fn as_of() -> AsOf {
        AsOf::from_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    fn text_table(name: &str, columns: &[&str], rows: &[&[&str]]) -> Table {
        Table::from_rows(
            name,
            columns.iter().copied(),
            rows.iter()
                .map(|r| r.iter().map(|c| Value::text(*c)).collect::<Vec<_>>()),
        )
        .unwrap()
    }

    #[test]
    fn test_raw_text_tables_are_normalized_before_reconciling() {
        let tables = TableSet::new()
            .with(text_table(
                hr::EMPLOYEE,
                &["id", "birth_date", "hire_date", "Sex"],
                &[&["1", "1990-06-15", "2020-01-01", "F"], &["2", "not a date", "2021-01-01", "M"]],
            ))
            .with(text_table(
                hr::SALARY,
                &["employee_id", "salary", "from_date"],
                &[
                    &["1", "$50,000", "2020-01-01"],
                    &["1", "55000", "2022-01-01"],
                    &["2", "abc", "2021-01-01"],
                ],
            ));

        let pipeline = SnapshotPipeline::hr(SnapshotConfig::default());
        let outcome = pipeline.reconcile_tables(tables, &as_of()).unwrap();
        let report = &outcome.report;

        assert_eq!(report.entity_count, 2);
        assert_eq!(report.value(&EntityId::Int(1), hr::LATEST_SALARY), Some(&Value::Int(55_000)));
        assert_eq!(report.value(&EntityId::Int(1), hr::AGE), Some(&Value::Int(34)));
        assert!(report
            .value(&EntityId::Int(2), hr::LATEST_SALARY)
            .unwrap()
            .is_invalid());
        assert!(report.value(&EntityId::Int(2), hr::AGE).unwrap().is_invalid());

        // alias rename + invalid amounts surface from the normalizer
        assert!(report
            .diagnostics
            .iter()
            .any(|d| matches!(&d.issue, Issue::ColumnRenamed { from, .. } if from == "Sex")));
        assert!(report
            .diagnostics
            .iter()
            .any(|d| matches!(&d.issue, Issue::InvalidCells { column, .. } if column == "amount")));
    }

    #[test]
    fn test_load_diagnostics_come_first() {
        let mut loaded = LoadOutcome::default();
        loaded.diagnostics.push(
            crate::diagnostics::Diagnostic::warning(Issue::TableMissing).for_table(hr::TITLE),
        );
        loaded.tables.insert(text_table(hr::EMPLOYEE, &["employee_id"], &[&["7"]]));

        let pipeline = SnapshotPipeline::hr(SnapshotConfig::default());
        let outcome = pipeline.reconcile_loaded(loaded, &as_of()).unwrap();

        let first = outcome.report.diagnostics.iter().next().unwrap();
        assert_eq!(first.table.as_deref(), Some(hr::TITLE));
        assert_eq!(outcome.report.entity_count, 1);
        assert_eq!(outcome.report.snapshot.columns().len(), 6);
    }

    #[test]
    fn test_unknown_marker_follows_config() {
        let config = SnapshotConfig {
            unknown_marker: "-".into(),
            ..SnapshotConfig::default()
        };
        let pipeline = SnapshotPipeline::hr(config);
        let outcome = pipeline
            .reconcile_tables(
                TableSet::new().with(text_table(hr::EMPLOYEE, &["employee_id"], &[&["1"]])),
                &as_of(),
            )
            .unwrap();

        assert_eq!(outcome.report.unknown_marker, "-");
        let rendered = outcome.report.snapshot.render_rows("-");
        assert_eq!(rendered[0][1..], ["-", "-", "-", "-", "-"]);
    }
}
