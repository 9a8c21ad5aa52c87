// 📂 Loader - CSV exports → Tables
// Reads every configured export, data folder first, then the working directory.
// A missing or unreadable file never aborts the run: the table is left out
// of the set (the reconciler treats it as empty) and a diagnostic says why.

use crate::config::SnapshotConfig;
use crate::diagnostics::{Diagnostic, Diagnostics, Issue};
use crate::table::{Table, TableSet, Value};
use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Cell texts that load as unknown (same spellings spreadsheet exports use)
const MISSING_CELLS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "NULL", "null", "None", "#N/A", "<NA>",
];

fn parse_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if MISSING_CELLS.contains(&trimmed) {
        Value::Unknown
    } else {
        Value::text(trimmed)
    }
}

// ============================================================================
// CSV I/O
// ============================================================================

/// Read one CSV into a table of text cells. Typing happens in `schema`.
pub fn read_csv_table<R: Read>(name: &str, reader: R) -> Result<Table> {
    let mut rdr = csv::Reader::from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut table = Table::new(name, headers)?;

    for (line, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read record {}", line + 1))?;
        let row = record.iter().map(parse_cell).collect();
        table.push_row(row)?;
    }

    Ok(table)
}

pub fn load_csv_table(name: &str, path: &Path) -> Result<Table> {
    let file = File::open(path).context("Failed to open CSV file")?;
    read_csv_table(name, file).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Write a table as CSV, unknown cells rendered with `unknown_marker`
pub fn write_csv_table<W: Write>(table: &Table, writer: W, unknown_marker: &str) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(table.columns())
        .context("Failed to write CSV header")?;

    for row in table.render_rows(unknown_marker) {
        wtr.write_record(&row).context("Failed to write CSV record")?;
    }

    wtr.flush().context("Failed to flush CSV output")?;
    Ok(())
}

pub fn save_csv_table(table: &Table, path: &Path, unknown_marker: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_csv_table(table, file, unknown_marker)
}

// ============================================================================
// TABLE CACHE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn read(path: &Path) -> Result<Self> {
        let meta = fs::metadata(path).with_context(|| format!("Failed to stat {}", path.display()))?;
        Ok(FileStamp {
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }
}

#[derive(Debug, Clone)]
struct CachedTable {
    stamp: FileStamp,
    table: Table,
}

/// TableCache - Loaded tables keyed by path
///
/// An entry is reused while the file's modification time and length are
/// unchanged. Nothing expires on its own otherwise.
#[derive(Debug, Default)]
pub struct TableCache {
    entries: HashMap<PathBuf, CachedTable>,
    loads: usize,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached table for `path`, re-reading it if the file changed
    pub fn get_or_load(&mut self, name: &str, path: &Path) -> Result<Table> {
        let stamp = FileStamp::read(path)?;

        if let Some(cached) = self.entries.get(path) {
            if cached.stamp == stamp {
                debug!(table = name, path = %path.display(), "cache hit");
                return Ok(cached.table.clone().rename(name));
            }
        }

        let table = load_csv_table(name, path)?;
        self.loads += 1;
        self.entries.insert(
            path.to_path_buf(),
            CachedTable {
                stamp,
                table: table.clone(),
            },
        );
        Ok(table)
    }

    /// Forget one path. Returns whether it was cached.
    pub fn invalidate(&mut self, path: &Path) -> bool {
        self.entries.remove(path).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of actual file reads so far
    pub fn loads(&self) -> usize {
        self.loads
    }
}

// ============================================================================
// DATA LOADER
// ============================================================================

/// Everything one load pass produced
#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    pub tables: TableSet,
    pub diagnostics: Diagnostics,
    /// Table name → file it came from
    pub sources: BTreeMap<String, PathBuf>,
}

pub struct DataLoader {
    config: SnapshotConfig,
    cache: TableCache,
}

impl DataLoader {
    pub fn new(config: SnapshotConfig) -> Self {
        DataLoader {
            config,
            cache: TableCache::new(),
        }
    }

    pub fn cache(&self) -> &TableCache {
        &self.cache
    }

    /// First existing candidate path for a table
    pub fn locate(&self, table: &str) -> Option<PathBuf> {
        self.config
            .candidate_paths(table)
            .into_iter()
            .find(|p| p.is_file())
    }

    /// Load one table into `outcome`
    pub fn load_into(&mut self, table: &str, outcome: &mut LoadOutcome) {
        let Some(path) = self.locate(table) else {
            warn!(table, "no file found");
            outcome
                .diagnostics
                .push(Diagnostic::warning(Issue::TableMissing).for_table(table));
            return;
        };

        match self.cache.get_or_load(table, &path) {
            Ok(loaded) => {
                info!(table, path = %path.display(), rows = loaded.len(), "loaded");
                outcome.tables.insert(loaded);
                outcome.sources.insert(table.to_string(), path);
            }
            Err(err) => {
                warn!(table, path = %path.display(), error = %err, "unreadable");
                outcome.diagnostics.push(
                    Diagnostic::warning(Issue::FileUnreadable {
                        reason: format!("{:#}", err),
                    })
                    .for_table(table),
                );
            }
        }
    }

    pub fn load_all(&mut self, tables: &[&str]) -> LoadOutcome {
        let mut outcome = LoadOutcome::default();
        for table in tables {
            self.load_into(table, &mut outcome);
        }
        outcome
    }
}

// ============================================================================
// TESTS
// ============================================================================
