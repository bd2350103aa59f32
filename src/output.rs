//! Write pulled reports as CSV, JSON or an xlsx workbook.
use std::{path::Path, pin::Pin, str::FromStr};

use anyhow::{bail, Context, Result};
use clap::Parser;
use rust_xlsxwriter::{Format, Workbook};
use tokio::{
    fs::File,
    io::{AsyncWrite, AsyncWriteExt, BufWriter},
};
use tracing::info;

use crate::{
    metrics::{column_name, MetricKind, AVERAGE_METRICS, PEAK_METRICS},
    pull::AccountReport,
    source::COST_DATE_FORMAT,
};

/// Worksheet of the per-broker table.
pub const CLUSTER_DATA_SHEET: &str = "ClusterData";

/// Worksheet of the cost table.
pub const COSTS_SHEET: &str = "Costs";

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Two CSV tables per account, cluster data and costs.
    Csv,

    /// One pretty-printed JSON document per account.
    Json,

    /// One workbook per account with a sheet per table.
    Xlsx,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "xlsx" => Ok(Self::Xlsx),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

/// CLI config for report output.
#[derive(Debug, Parser)]
pub struct OutputCLIConfig {
    /// Directory to write the results in.
    ///
    /// Use `-` to write to stdout. CSV tables on stdout are separated by an
    /// empty line, xlsx cannot be written to stdout.
    #[clap(short = 'd', long = "out-dir", default_value = ".")]
    out_dir: String,

    /// Output format.
    ///
    /// Use "csv", "json" or "xlsx".
    #[clap(long, default_value = "csv")]
    format: OutputFormat,
}

/// A rendered output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub name: String,
    pub contents: Vec<u8>,
}

/// Table cell.
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Text(String),
    Number(f64),
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Header plus rows, shared by the CSV and xlsx writers.
#[derive(Debug, Clone, PartialEq)]
struct Table {
    header: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

/// Render `report` into its output files.
pub fn render(report: &AccountReport, format: OutputFormat) -> Result<Vec<OutputFile>> {
    let stem = file_stem(&report.account, &report.region);
    let files = match format {
        OutputFormat::Csv => vec![
            OutputFile {
                name: format!("{stem}-cluster-data.csv"),
                contents: render_csv(&cluster_table(report))?,
            },
            OutputFile {
                name: format!("{stem}-costs.csv"),
                contents: render_csv(&costs_table(report))?,
            },
        ],
        OutputFormat::Json => {
            let mut contents = serde_json::to_vec_pretty(report)?;
            contents.push(b'\n');
            vec![OutputFile {
                name: format!("{stem}.json"),
                contents,
            }]
        }
        OutputFormat::Xlsx => vec![OutputFile {
            name: format!("{stem}.xlsx"),
            contents: render_xlsx(&[
                (CLUSTER_DATA_SHEET, cluster_table(report)),
                (COSTS_SHEET, costs_table(report)),
            ])?,
        }],
    };
    Ok(files)
}

/// Write `report` to the configured destination.
pub async fn write_report(config: &OutputCLIConfig, report: &AccountReport) -> Result<()> {
    let files = render(report, config.format)?;

    if config.out_dir == "-" {
        let contents = stdout_contents(files, config.format)?;
        let mut out = open_output(None).await?;
        out.write_all(&contents).await?;
        out.flush().await?;
        return Ok(());
    }

    let dir = Path::new(&config.out_dir);
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("create output directory {dir:?}"))?;
    for file in files {
        let path = dir.join(&file.name);
        let mut out = open_output(Some(&path)).await?;
        out.write_all(&file.contents).await?;
        out.flush().await?;
        info!(path = %path.display(), "wrote output");
    }

    Ok(())
}

/// Concatenate rendered files for stdout, CSV tables separated by an empty line.
fn stdout_contents(files: Vec<OutputFile>, format: OutputFormat) -> Result<Vec<u8>> {
    if format == OutputFormat::Xlsx {
        bail!("xlsx output needs an output directory, it cannot be written to stdout");
    }

    let mut contents = vec![];
    for (i, file) in files.into_iter().enumerate() {
        if i > 0 {
            contents.push(b'\n');
        }
        contents.extend(file.contents);
    }
    Ok(contents)
}

/// Open output stream, stdout for `None`.
async fn open_output(path: Option<&Path>) -> Result<Pin<Box<dyn AsyncWrite>>> {
    match path {
        None => Ok(Box::pin(BufWriter::new(tokio::io::stdout()))),
        Some(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("create output file {path:?}"))?;
            Ok(Box::pin(BufWriter::new(file)))
        }
    }
}

fn cluster_table(report: &AccountReport) -> Table {
    let mut header: Vec<String> = ["Region", "ClusterName", "NodeId", "NodeType", "KafkaVersion"]
        .into_iter()
        .map(String::from)
        .collect();
    header.extend(
        AVERAGE_METRICS
            .iter()
            .map(|m| column_name(m, MetricKind::Average, report.period_days)),
    );
    header.extend(
        PEAK_METRICS
            .iter()
            .map(|m| column_name(m, MetricKind::Peak, report.period_days)),
    );

    let rows = report
        .brokers
        .iter()
        .map(|broker| {
            let mut row = vec![
                Cell::Text(broker.region.clone()),
                Cell::Text(broker.cluster_name.clone()),
                Cell::Number(f64::from(broker.node_id)),
                Cell::Text(broker.node_type.clone()),
                Cell::Text(broker.kafka_version.clone()),
            ];
            row.extend(
                broker
                    .averages
                    .iter()
                    .chain(&broker.peaks)
                    .map(|m| Cell::Number(m.value)),
            );
            row
        })
        .collect();

    Table { header, rows }
}

fn costs_table(report: &AccountReport) -> Table {
    let costs = &report.costs;
    Table {
        header: ["Region", "Start", "End", "Costs"]
            .into_iter()
            .map(String::from)
            .collect(),
        rows: vec![vec![
            Cell::Text(costs.region.clone()),
            Cell::Text(costs.start.format(COST_DATE_FORMAT).to_string()),
            Cell::Text(costs.end.format(COST_DATE_FORMAT).to_string()),
            Cell::Number(costs.costs),
        ]],
    }
}

fn render_csv(table: &Table) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(&table.header)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|cell| cell.to_string()))?;
    }
    Ok(writer.into_inner().map_err(|e| e.into_error())?)
}

fn render_xlsx(sheets: &[(&str, Table)]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    for (name, table) in sheets {
        let sheet = workbook.add_worksheet();
        sheet.set_name(*name)?;

        for (col, title) in table.header.iter().enumerate() {
            sheet.write_string_with_format(0, u16::try_from(col)?, title, &bold)?;
        }
        for (row, cells) in table.rows.iter().enumerate() {
            let row = u32::try_from(row + 1)?;
            for (col, cell) in cells.iter().enumerate() {
                let col = u16::try_from(col)?;
                match cell {
                    Cell::Text(text) => sheet.write_string(row, col, text)?,
                    Cell::Number(number) => sheet.write_number(row, col, *number)?,
                };
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// `<account>-<region>`, without path separators.
fn file_stem(account: &str, region: &str) -> String {
    format!("{account}-{region}")
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect()
}
