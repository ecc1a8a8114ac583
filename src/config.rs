//! Explicit configuration handed to each stage at construction.
//!
//! Defaults belong to the command line layer; nothing here reads the
//! environment or assumes a working directory.

use std::path::PathBuf;

use clap::ValueEnum;

pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// Spreadsheet workbook with one sheet per table
    Workbook,
    /// One CSV file per table
    Csv,
    /// Single JSON document holding every table
    Json,
    /// Workbook and CSV files
    Both,
    /// Workbook, CSV files and JSON document
    All,
}

impl ExportFormat {
    pub fn includes_workbook(self) -> bool {
        matches!(
            self,
            ExportFormat::Workbook | ExportFormat::Both | ExportFormat::All
        )
    }

    pub fn includes_csv(self) -> bool {
        matches!(self, ExportFormat::Csv | ExportFormat::Both | ExportFormat::All)
    }

    pub fn includes_json(self) -> bool {
        matches!(self, ExportFormat::Json | ExportFormat::All)
    }
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    pub format: ExportFormat,
    pub workbook_name: String,
    pub report_name: String,
}

impl ExportConfig {
    pub fn workbook_path(&self) -> PathBuf {
        self.output_dir.join(&self.workbook_name)
    }

    /// The JSON document sits next to the workbook under the same stem.
    pub fn json_path(&self) -> PathBuf {
        self.workbook_path().with_extension("json")
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join(&self.report_name)
    }
}
