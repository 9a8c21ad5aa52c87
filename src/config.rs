// ⚙️ Configuration - Where the exports live and how output looks
//
// Lookup order:
// 1. explicit path (--config)
// 2. $HR_SNAPSHOT_CONFIG
// 3. ./hr-snapshot.toml if it exists
// 4. built-in defaults

use crate::hr;
use crate::table::DEFAULT_UNKNOWN_MARKER;
use crate::temporal::AsOf;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "hr-snapshot.toml";
pub const CONFIG_ENV_VAR: &str = "HR_SNAPSHOT_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SnapshotConfig {
    /// Folder searched first for every export
    pub data_folder: PathBuf,

    /// Also look in the working directory when a file is not in `data_folder`
    pub search_working_dir: bool,

    /// Rendering of unknown cells in outputs
    pub unknown_marker: String,

    /// Where `reconcile` writes the snapshot CSV
    pub output: PathBuf,

    /// Fixed reference date; defaults to "now" at startup.
    /// Either a TOML date (`2024-01-01`) or a quoted `"YYYY-MM-DD"` string.
    #[serde(deserialize_with = "deserialize_as_of")]
    pub as_of: Option<NaiveDate>,

    /// Table name → file name overrides
    pub files: BTreeMap<String, String>,
}

/// Native TOML dates arrive as datetimes, quoted ones as strings
fn deserialize_as_of<'de, D>(deserializer: D) -> std::result::Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    match toml::Value::deserialize(deserializer)? {
        toml::Value::String(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map(Some)
            .map_err(|e| de::Error::custom(format!("invalid as_of date `{}`: {}", s, e))),
        toml::Value::Datetime(dt) => {
            let Some(date) = dt.date else {
                return Err(de::Error::custom("as_of needs a date, not just a time"));
            };
            NaiveDate::from_ymd_opt(date.year as i32, date.month as u32, date.day as u32)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid as_of date `{}`", dt)))
        }
        other => Err(de::Error::custom(format!(
            "as_of must be a date, found {}",
            other.type_str()
        ))),
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        SnapshotConfig {
            data_folder: PathBuf::from("data"),
            search_working_dir: true,
            unknown_marker: DEFAULT_UNKNOWN_MARKER.to_string(),
            output: PathBuf::from("snapshot.csv"),
            as_of: None,
            files: BTreeMap::new(),
        }
    }
}

impl SnapshotConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("Failed to parse configuration")
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Resolve the configuration using the lookup order above
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                return Self::from_path(Path::new(&path));
            }
        }

        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            return Self::from_path(default_path);
        }

        Ok(Self::default())
    }

    /// File name for a table: override, then preset default, then `<table>.csv`
    pub fn file_name(&self, table: &str) -> String {
        self.files
            .get(table)
            .cloned()
            .or_else(|| hr::default_file(table).map(str::to_string))
            .unwrap_or_else(|| format!("{}.csv", table))
    }

    /// Candidate paths for a table, in lookup order
    pub fn candidate_paths(&self, table: &str) -> Vec<PathBuf> {
        let file = self.file_name(table);
        let mut paths = vec![self.data_folder.join(&file)];
        if self.search_working_dir {
            paths.push(PathBuf::from(file));
        }
        paths
    }

    /// Configured as-of date, else `now`
    pub fn as_of_or(&self, now: DateTime<Utc>) -> AsOf {
        match self.as_of {
            Some(date) => AsOf::from_date(date),
            None => AsOf::new(now),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
