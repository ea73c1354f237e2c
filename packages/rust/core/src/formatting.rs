//! Formatting stage: download results → review sheet.
//!
//! Downloaded rows come first, then a separator row, then rows that only
//! have a link for manual review. The separator is the structural row the
//! analysis stage skips.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use litscreen_shared::{Result, SEPARATOR_MARKER};
use litscreen_storage::{RecordStore, ReportTable};
use regex::Regex;
use tracing::{info, instrument};

use crate::resume::LINK_COLUMN;

pub const CITATION_COLUMN: &str = "Full Citation";
pub const AUTH_COLUMN: &str = "Auth";
pub const YEAR_COLUMN: &str = "Year";
pub const ABSTRACT_COLUMN: &str = "Full Abstract";
pub const METHOD_COLUMN: &str = "Method";

/// Output header, in order.
pub const OUTPUT_COLUMNS: [&str; 6] = [
    CITATION_COLUMN,
    LINK_COLUMN,
    AUTH_COLUMN,
    YEAR_COLUMN,
    ABSTRACT_COLUMN,
    METHOD_COLUMN,
];

/// Citation text of the separator row.
pub const SEPARATOR_CITATION: &str = "--- END OF DOWNLOADED FILES --- (Manual Review Below)";

const SOURCE_CITATION: &str = "Generated_Citation";
const SOURCE_LINK: &str = "PDF_Link";
const SOURCE_YEAR: &str = "Year";
const SOURCE_ABSTRACT: &str = "Abstract";
const SOURCE_STATUS: &str = "Download_Status";

const DOWNLOADED: &str = "Success";
const UNKNOWN_AUTHOR: &str = "Unknown";

/// Counts for the formatting report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormattingSummary {
    /// Rows with a downloaded artifact.
    pub downloaded: usize,
    /// Rows with only a link.
    pub links_only: usize,
    /// All rows written, separator included.
    pub total_rows: usize,
}

/// Author block of an APA-style citation: everything before `(YYYY)` or `(n.d.)`.
pub fn extract_author(citation: &str) -> String {
    static AUTHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(.*?)\s*\((\d{4}|n\.d\.)\)").expect("valid author regex")
    });

    AUTHOR_RE
        .captures(citation)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string())
}

fn output_row(source: &RecordStore, row: litscreen_shared::RowId) -> Vec<String> {
    let citation = source.cell(row, SOURCE_CITATION);
    vec![
        citation.to_string(),
        source.cell(row, SOURCE_LINK).to_string(),
        extract_author(citation),
        source.cell(row, SOURCE_YEAR).to_string(),
        source.cell(row, SOURCE_ABSTRACT).to_string(),
        String::new(),
    ]
}

/// Build the review sheet from a loaded download table.
pub fn format_records(source: &RecordStore, target: &Path) -> Result<(RecordStore, FormattingSummary)> {
    source.require_column(SOURCE_CITATION)?;
    source.require_column(SOURCE_STATUS)?;

    let (downloaded, rest): (Vec<_>, Vec<_>) = source
        .row_ids()
        .partition(|&row| source.cell(row, SOURCE_STATUS) == DOWNLOADED);
    let links_only: Vec<_> = rest
        .into_iter()
        .filter(|&row| !source.cell(row, SOURCE_LINK).trim().is_empty())
        .collect();

    let mut sheet = RecordStore::new(
        OUTPUT_COLUMNS.iter().map(|c| c.to_string()).collect(),
        target,
    );
    for &row in &downloaded {
        sheet.push_row(output_row(source, row));
    }

    let mut separator = vec![SEPARATOR_MARKER.to_string(); OUTPUT_COLUMNS.len()];
    separator[0] = SEPARATOR_CITATION.to_string();
    sheet.push_row(separator);

    for &row in &links_only {
        sheet.push_row(output_row(source, row));
    }

    let summary = FormattingSummary {
        downloaded: downloaded.len(),
        links_only: links_only.len(),
        total_rows: sheet.len(),
    };
    Ok((sheet, summary))
}

/// Run the formatting stage: read, reshape, write the sheet and report.
#[instrument(skip_all, fields(input = %input.display()))]
pub fn run_formatting(input: &Path, output: &Path, report: &Path) -> Result<FormattingSummary> {
    let source = RecordStore::open(input, PathBuf::from(input))?;
    let (sheet, summary) = format_records(&source, output)?;
    sheet.checkpoint()?;

    let mut table = ReportTable::new(&["Metric", "Value"]);
    table.push(["Input File Used".to_string(), input.display().to_string()]);
    table.push(["Output File Generated".to_string(), output.display().to_string()]);
    table.push([
        "Group A (Downloaded - AI Ready)".to_string(),
        summary.downloaded.to_string(),
    ]);
    table.push([
        "Group B (Links Only - Manual Review)".to_string(),
        summary.links_only.to_string(),
    ]);
    table.push([
        "Total Rows in Final Sheet".to_string(),
        summary.total_rows.to_string(),
    ]);
    table.write(report)?;

    info!(
        downloaded = summary.downloaded,
        links_only = summary.links_only,
        "formatting complete"
    );
    Ok(summary)
}
