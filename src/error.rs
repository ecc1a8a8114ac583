use std::path::PathBuf;

use thiserror::Error;

/// Why a single session document could not be loaded.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("top-level value is not an object")]
    NotAnObject,
}

/// A document skipped during loading. Never fatal to the run.
#[derive(Debug)]
pub struct SourceReadError {
    pub path: PathBuf,
    pub error: SourceError,
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("workbook error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("row for table '{0}' did not serialize to an object")]
    RowShape(&'static str),
}
