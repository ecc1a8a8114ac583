use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::error::{SourceError, SourceReadError};
use crate::models::RawRecord;

/// Loaded session documents, in file-name order. Read-only once built.
#[derive(Debug, Default)]
pub struct RawRecordStore {
    records: Vec<RawRecord>,
}

impl RawRecordStore {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug)]
pub struct LoadReport {
    pub store: RawRecordStore,
    pub skipped: Vec<SourceReadError>,
}

pub struct RecordSource {
    config: SourceConfig,
}

impl RecordSource {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    /// Parses every `*.json` file in the data directory.
    ///
    /// Files that fail to load are reported in `skipped`; only an unreadable
    /// data directory is an error.
    pub fn load(&self) -> anyhow::Result<LoadReport> {
        let paths = json_files(&self.config.data_dir)?;
        info!(
            dir = %self.config.data_dir.display(),
            files = paths.len(),
            "found session files"
        );

        let mut records = Vec::with_capacity(paths.len());
        let mut skipped = Vec::new();

        for path in paths {
            match read_document(&path) {
                Ok(record) => {
                    debug!(path = %path.display(), "loaded session document");
                    records.push(record);
                }
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping session file");
                    skipped.push(SourceReadError { path, error });
                }
            }
        }

        info!(
            loaded = records.len(),
            skipped = skipped.len(),
            "session documents loaded"
        );
        Ok(LoadReport {
            store: RawRecordStore::new(records),
            skipped,
        })
    }
}

fn json_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to read data directory {}", dir.display()))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to list {}", dir.display()))?
            .path();
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        if is_json && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

pub fn read_document(path: &Path) -> Result<RawRecord, SourceError> {
    let contents = fs::read_to_string(path)?;
    parse_document(path, &contents)
}

pub fn parse_document(path: &Path, contents: &str) -> Result<RawRecord, SourceError> {
    match serde_json::from_str::<Value>(contents)? {
        Value::Object(document) => Ok(RawRecord {
            source: path.to_path_buf(),
            document,
        }),
        _ => Err(SourceError::NotAnObject),
    }
}
