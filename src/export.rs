use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Workbook, Worksheet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::ExportError;
use crate::extract::ExtractedTables;
use crate::models::{
    ChallengePointRow, CriticalActionRow, GroupComparisonRow, OverviewRow, PerformanceRow,
    ScenarioRow, TranscriptRow,
};

/// Logical tables produced by a run. Serialized as its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "&'static str", try_from = "String")]
pub enum TableName {
    StudentOverview,
    OverallPerformance,
    ScenarioPerformance,
    CriticalActions,
    ChallengePoints,
    AarTranscripts,
    AbComparison,
}

impl TableName {
    pub const ALL: [TableName; 7] = [
        TableName::StudentOverview,
        TableName::OverallPerformance,
        TableName::ScenarioPerformance,
        TableName::CriticalActions,
        TableName::ChallengePoints,
        TableName::AarTranscripts,
        TableName::AbComparison,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TableName::StudentOverview => "Student Overview",
            TableName::OverallPerformance => "Overall Performance",
            TableName::ScenarioPerformance => "Scenario Performance",
            TableName::CriticalActions => "Critical Actions",
            TableName::ChallengePoints => "Challenge Points",
            TableName::AarTranscripts => "AAR Transcripts",
            TableName::AbComparison => "AB Comparison",
        }
    }

    pub fn file_stem(self) -> &'static str {
        match self {
            TableName::StudentOverview => "students_overview",
            TableName::OverallPerformance => "performance_metrics",
            TableName::ScenarioPerformance => "scenario_performance",
            TableName::CriticalActions => "critical_actions_timeline",
            TableName::ChallengePoints => "challenge_points_usage",
            TableName::AarTranscripts => "aar_transcripts",
            TableName::AbComparison => "ab_comparison",
        }
    }
}

impl From<TableName> for &'static str {
    fn from(name: TableName) -> Self {
        name.label()
    }
}

impl TryFrom<String> for TableName {
    type Error = String;

    fn try_from(label: String) -> Result<Self, Self::Error> {
        TableName::ALL
            .into_iter()
            .find(|name| name.label() == label)
            .ok_or_else(|| format!("unknown table '{label}'"))
    }
}

/// A row type with a fixed column order.
///
/// Column names must match the serialized field names.
pub trait TableRow: Serialize {
    const COLUMNS: &'static [&'static str];
}

impl TableRow for OverviewRow {
    const COLUMNS: &'static [&'static str] = &[
        "student_id",
        "student_name",
        "student_email",
        "ab_group",
        "registered_at",
        "session_started",
        "session_completed",
        "total_duration",
        "scenarios_completed",
        "total_messages",
        "challenge_points_enabled",
        "session_complete",
    ];
}

impl TableRow for PerformanceRow {
    const COLUMNS: &'static [&'static str] = &[
        "student_id",
        "overall_score",
        "performance_level",
        "optimal_decisions",
        "acceptable_decisions",
        "suboptimal_decisions",
        "dangerous_decisions",
        "total_cdps",
        "medication_errors",
        "critical_actions_count",
    ];
}

impl TableRow for ScenarioRow {
    const COLUMNS: &'static [&'static str] = &[
        "student_id",
        "scenario_number",
        "scenario_id",
        "scenario_title",
        "duration",
        "final_state",
        "final_hr",
        "final_rr",
        "final_spo2",
    ];
}

impl TableRow for CriticalActionRow {
    const COLUMNS: &'static [&'static str] = &[
        "student_id",
        "action_number",
        "action_type",
        "action_name",
        "timestamp",
        "details",
    ];
}

impl TableRow for ChallengePointRow {
    const COLUMNS: &'static [&'static str] = &[
        "student_id",
        "ab_group",
        "challenge_number",
        "challenge_text",
        "timestamp",
        "context",
    ];
}

impl TableRow for TranscriptRow {
    const COLUMNS: &'static [&'static str] =
        &["student_id", "message_number", "role", "content", "timestamp"];
}

impl TableRow for GroupComparisonRow {
    const COLUMNS: &'static [&'static str] = &[
        "ab_group",
        "student_id_count",
        "overall_score_mean",
        "overall_score_std",
        "overall_score_min",
        "overall_score_max",
        "total_cdps_mean",
        "optimal_decisions_mean",
        "medication_errors_sum",
        "scenarios_completed_mean",
    ];
}

/// Named, ordered rows with a column schema. Cells are JSON scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: TableName,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn from_rows<T: TableRow>(name: TableName, rows: &[T]) -> Result<Self, ExportError> {
        let mut cells = Vec::with_capacity(rows.len());
        for row in rows {
            let Value::Object(mut fields) = serde_json::to_value(row)? else {
                return Err(ExportError::RowShape(name.label()));
            };
            cells.push(
                T::COLUMNS
                    .iter()
                    .map(|column| fields.remove(*column).unwrap_or(Value::Null))
                    .collect(),
            );
        }

        Ok(Self {
            name,
            columns: T::COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: cells,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows rendered as text, the way a flat file stores them.
    pub fn text_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect()
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Builds the seven export tables in their canonical order.
pub fn build_tables(
    extracted: &ExtractedTables,
    comparison: &[GroupComparisonRow],
) -> Result<Vec<Table>, ExportError> {
    Ok(vec![
        Table::from_rows(TableName::StudentOverview, &extracted.overview)?,
        Table::from_rows(TableName::OverallPerformance, &extracted.performance)?,
        Table::from_rows(TableName::ScenarioPerformance, &extracted.scenarios)?,
        Table::from_rows(TableName::CriticalActions, &extracted.critical_actions)?,
        Table::from_rows(TableName::ChallengePoints, &extracted.challenge_points)?,
        Table::from_rows(TableName::AarTranscripts, &extracted.transcripts)?,
        Table::from_rows(TableName::AbComparison, comparison)?,
    ])
}

/// Destination for exported tables.
pub trait TableSink {
    fn write_table(&mut self, table: &Table) -> Result<(), ExportError>;

    /// Flushes anything buffered and returns the paths written.
    fn finish(self: Box<Self>) -> Result<Vec<PathBuf>, ExportError>;
}

/// One CSV file per table, named after the table's file stem.
pub struct CsvDirectorySink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl CsvDirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Vec::new(),
        }
    }
}

impl TableSink for CsvDirectorySink {
    fn write_table(&mut self, table: &Table) -> Result<(), ExportError> {
        let label = table.name.label();
        if table.is_empty() {
            warn!(table = label, "no rows, skipping CSV file");
            return Ok(());
        }

        let path = self.dir.join(format!("{}.csv", table.name.file_stem()));
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(&table.columns)?;
        for row in table.text_rows() {
            writer.write_record(&row)?;
        }
        writer.flush()?;

        info!(table = label, rows = table.rows.len(), path = %path.display(), "wrote CSV");
        self.written.push(path);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Vec<PathBuf>, ExportError> {
        Ok(self.written)
    }
}

/// Longest text Excel accepts in one cell.
const XLSX_MAX_TEXT: usize = 32_767;

/// Spreadsheet workbook with one worksheet per non-empty table.
pub struct XlsxWorkbookSink {
    path: PathBuf,
    workbook: Workbook,
    sheets: usize,
}

impl XlsxWorkbookSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            workbook: Workbook::new(),
            sheets: 0,
        }
    }
}

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, value: &Value) -> Result<(), ExportError> {
    match value {
        Value::Null => {}
        Value::Bool(flag) => {
            sheet.write_boolean(row, col, *flag)?;
        }
        Value::Number(number) => match number.as_f64() {
            Some(n) => {
                sheet.write_number(row, col, n)?;
            }
            None => {
                sheet.write_string(row, col, number.to_string())?;
            }
        },
        Value::String(text) if text.chars().count() > XLSX_MAX_TEXT => {
            warn!(row, col, "cell text exceeds spreadsheet limit, truncating");
            let truncated: String = text.chars().take(XLSX_MAX_TEXT).collect();
            sheet.write_string(row, col, truncated)?;
        }
        Value::String(text) => {
            sheet.write_string(row, col, text)?;
        }
        other => {
            sheet.write_string(row, col, other.to_string())?;
        }
    }
    Ok(())
}

impl TableSink for XlsxWorkbookSink {
    fn write_table(&mut self, table: &Table) -> Result<(), ExportError> {
        let label = table.name.label();
        if table.is_empty() {
            warn!(sheet = label, "no rows, skipping sheet");
            return Ok(());
        }

        let sheet = self.workbook.add_worksheet();
        sheet.set_name(label)?;
        for (col, column) in table.columns.iter().enumerate() {
            sheet.write_string(0, col as u16, column)?;
        }
        for (idx, row) in table.rows.iter().enumerate() {
            for (col, value) in row.iter().enumerate() {
                write_cell(sheet, idx as u32 + 1, col as u16, value)?;
            }
        }

        info!(sheet = label, rows = table.rows.len(), "added sheet");
        self.sheets += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<Vec<PathBuf>, ExportError> {
        if self.sheets == 0 {
            warn!(path = %self.path.display(), "no tables with rows, workbook not written");
            return Ok(Vec::new());
        }
        self.workbook.save(&self.path)?;
        info!(path = %self.path.display(), sheets = self.sheets, "wrote workbook");
        Ok(vec![self.path])
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonWorkbook {
    pub sheets: Vec<Table>,
}

/// Single JSON document with one entry per non-empty table.
pub struct JsonSink {
    path: PathBuf,
    document: JsonWorkbook,
}

impl JsonSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            document: JsonWorkbook { sheets: Vec::new() },
        }
    }
}

impl TableSink for JsonSink {
    fn write_table(&mut self, table: &Table) -> Result<(), ExportError> {
        if table.is_empty() {
            warn!(sheet = table.name.label(), "no rows, skipping sheet");
            return Ok(());
        }
        self.document.sheets.push(table.clone());
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Vec<PathBuf>, ExportError> {
        let writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(writer, &self.document)?;
        info!(path = %self.path.display(), sheets = self.document.sheets.len(), "wrote JSON tables");
        Ok(vec![self.path])
    }
}

/// Writes every table to every sink.
pub fn export_tables(
    tables: &[Table],
    sinks: Vec<Box<dyn TableSink>>,
) -> Result<Vec<PathBuf>, ExportError> {
    let mut written = Vec::new();
    for mut sink in sinks {
        for table in tables {
            sink.write_table(table)?;
        }
        written.extend(sink.finish()?);
    }
    Ok(written)
}

/// Reads a CSV export back as a text table.
pub fn read_csv_table(path: &Path, name: TableName) -> Result<Table, ExportError> {
    let mut reader = csv::Reader::from_path(path)?;
    let columns = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|cell| Value::String(cell.to_string())).collect());
    }

    Ok(Table {
        name,
        columns,
        rows,
    })
}

pub fn read_json_workbook(path: &Path) -> Result<JsonWorkbook, ExportError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
