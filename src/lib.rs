// HR Snapshot - Core Library
// Current-state employee snapshot reconciled from historical exports

pub mod error;          // Contract violations (ReconcileError)
pub mod table;          // Tables, cells, entity ids
pub mod diagnostics;    // Data-quality findings reported alongside results
pub mod temporal;       // Timestamps, ordering keys, as-of instant
pub mod latest;         // Latest-record selector
pub mod resolver;       // Primary / fallback attribute resolution
pub mod reconciliation; // Snapshot composer
pub mod schema;         // Column aliases and type coercion
pub mod hr;             // Employee preset: tables, schemas, attributes
pub mod summary;        // Headcount, age groups, salary aggregates
pub mod config;         // TOML configuration
pub mod loader;         // CSV loading + table cache
pub mod pipeline;       // load → normalize → reconcile

#[cfg(feature = "tui")]
pub mod ui;             // Terminal viewer

// Re-export commonly used types
pub use error::{ReconcileError, ReconcileResult};
pub use table::{EntityId, Table, TableSet, Value, DEFAULT_UNKNOWN_MARKER};
pub use diagnostics::{Diagnostic, Diagnostics, Issue, Severity};
pub use temporal::{parse_timestamp, AsOf, OrderKey};
pub use latest::{select_latest, OrderingPolicy, Selection, SelectionOutcome};
pub use resolver::{
    fallback_candidate, primary_candidate, resolve_attribute,
    AttributeSpec, Candidate, FallbackSource, Lookup, PrimarySource,
    ResolvedAttribute, ResolvedValue, SourceStatus, ValueSource,
};
pub use reconciliation::{
    AttributeOutcome, DerivedField, DerivedKind, ReconciliationEngine,
    ReconciliationReport, ResolutionPath, SnapshotRequest,
};
pub use schema::{SchemaNormalizer, TableSchema};
pub use summary::WorkforceSummary;
pub use config::SnapshotConfig;
pub use loader::{
    load_csv_table, read_csv_table, save_csv_table, write_csv_table,
    DataLoader, LoadOutcome, TableCache,
};
pub use pipeline::{PipelineOutcome, SnapshotPipeline};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
