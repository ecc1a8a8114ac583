use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use knowthyself_session_analysis::config::{self, ExportConfig, ExportFormat, SourceConfig};
use knowthyself_session_analysis::export::{
    self, CsvDirectorySink, JsonSink, TableSink, XlsxWorkbookSink,
};
use knowthyself_session_analysis::extract::{self, ExtractedTables};
use knowthyself_session_analysis::models::{GroupComparisonRow, StatisticalResult};
use knowthyself_session_analysis::source::{LoadReport, RecordSource};
use knowthyself_session_analysis::{compare, report, stats};

#[derive(Parser)]
#[command(name = "knowthyself-session-analysis")]
#[command(about = "Flatten training-session records and compare A/B group performance", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract every table, export it and write the statistical report
    Run {
        #[arg(long, default_value = "data/students")]
        data_dir: PathBuf,
        #[arg(long, default_value = "data/exports")]
        output_dir: PathBuf,
        #[arg(long, value_enum, default_value_t = ExportFormat::Both)]
        format: ExportFormat,
        #[arg(long, default_value = "student_data_analysis.xlsx")]
        workbook_name: String,
        #[arg(long, default_value = "ab_testing_report.txt")]
        report_name: String,
    },
    /// Print the group comparison and test results without writing files
    Summary {
        #[arg(long, default_value = "data/students")]
        data_dir: PathBuf,
    },
    /// Write only the statistical report
    Report {
        #[arg(long, default_value = "data/students")]
        data_dir: PathBuf,
        #[arg(long, default_value = "ab_testing_report.txt")]
        out: PathBuf,
    },
}

struct Analysis {
    load: LoadReport,
    tables: ExtractedTables,
    comparison: Vec<GroupComparisonRow>,
    stats: Option<StatisticalResult>,
}

fn analyze_dir(data_dir: &Path) -> anyhow::Result<Option<Analysis>> {
    let source = RecordSource::new(SourceConfig {
        data_dir: data_dir.to_path_buf(),
    });
    let load = source.load()?;
    report_skipped(&load);

    if load.store.is_empty() {
        println!("No student data found in {}.", data_dir.display());
        return Ok(None);
    }

    let tables = extract::extract_all(&load.store);
    let comparison = compare::compare(&tables.overview, &tables.performance);
    info!(groups = comparison.len(), "group comparison complete");
    let stats = stats::analyze(&tables.overview, &tables.performance);

    Ok(Some(Analysis {
        load,
        tables,
        comparison,
        stats,
    }))
}

fn report_skipped(load: &LoadReport) {
    if load.skipped.is_empty() {
        return;
    }
    println!("Skipped {} unreadable file(s):", load.skipped.len());
    for skipped in &load.skipped {
        println!("- {}: {}", skipped.path.display(), skipped.error);
    }
}

fn render_report(analysis: &Analysis) -> String {
    report::build_report(
        &analysis.comparison,
        analysis.stats.as_ref(),
        chrono::Local::now().naive_local(),
    )
}

fn run(data_dir: &Path, config: &ExportConfig) -> anyhow::Result<()> {
    let Some(analysis) = analyze_dir(data_dir)? else {
        return Ok(());
    };

    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "failed to create output directory {}",
            config.output_dir.display()
        )
    })?;

    let tables = export::build_tables(&analysis.tables, &analysis.comparison)?;
    let mut sinks: Vec<Box<dyn TableSink>> = Vec::new();
    if config.format.includes_workbook() {
        sinks.push(Box::new(XlsxWorkbookSink::new(config.workbook_path())));
    }
    if config.format.includes_json() {
        sinks.push(Box::new(JsonSink::new(config.json_path())));
    }
    if config.format.includes_csv() {
        sinks.push(Box::new(CsvDirectorySink::new(&config.output_dir)));
    }
    let written = export::export_tables(&tables, sinks).context("failed to export tables")?;

    let report_path = config.report_path();
    std::fs::write(&report_path, render_report(&analysis))
        .with_context(|| format!("failed to write report {}", report_path.display()))?;

    println!("Students analyzed: {}", analysis.tables.overview.len());
    println!("Scenarios: {}", analysis.tables.scenarios.len());
    println!("Critical actions: {}", analysis.tables.critical_actions.len());
    println!("Skipped files: {}", analysis.load.skipped.len());
    println!("Files written: {}", written.len() + 1);
    println!("Output saved to {}.", config.output_dir.display());
    Ok(())
}

fn summary(data_dir: &Path) -> anyhow::Result<()> {
    let Some(analysis) = analyze_dir(data_dir)? else {
        return Ok(());
    };

    if analysis.comparison.is_empty() {
        println!("No data to compare.");
        return Ok(());
    }

    println!("Group comparison:");
    print!("{}", report::comparison_table(&analysis.comparison));

    match &analysis.stats {
        Some(result) => {
            println!(
                "t-statistic {} | p-value {} | Cohen's d {:.3} | significant: {}",
                result
                    .t_statistic
                    .map_or_else(|| "n/a".to_string(), |t| format!("{t:.3}")),
                result
                    .p_value
                    .map_or_else(|| "n/a".to_string(), |p| format!("{p:.4}")),
                result.cohens_d,
                if result.significant { "yes" } else { "no" }
            );
        }
        None => println!("Not enough data in groups A and B for statistical tests."),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            data_dir,
            output_dir,
            format,
            workbook_name,
            report_name,
        } => {
            let config = ExportConfig {
                output_dir,
                format,
                workbook_name,
                report_name,
            };
            run(&data_dir, &config)?;
        }
        Commands::Summary { data_dir } => {
            summary(&data_dir)?;
        }
        Commands::Report { data_dir, out } => {
            let Some(analysis) = analyze_dir(&data_dir)? else {
                return Ok(());
            };
            std::fs::write(&out, render_report(&analysis))
                .with_context(|| format!("failed to write report {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
