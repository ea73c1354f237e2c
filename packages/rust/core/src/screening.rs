//! Relevance screening (Batch Classifier).
//!
//! Pending rows go through a local pre-flight check first. Rows that fail it
//! are rejected without any service call. The rest are sent in sequential
//! fixed-size batches; decisions are collected in memory and merged into the
//! store once, after the last batch.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use litscreen_classifier::{ClassificationService, ServiceError};
use litscreen_shared::{BatchDecision, BatchItem, Result, RowId, ScreeningConfig};
use litscreen_storage::{RecordStore, ReportTable};
use tracing::{debug, info, instrument, warn};

use crate::progress::StageProgress;
use crate::resume::{is_separator_row, open_or_seed, pending_screening};

pub const INCLUDED_COLUMN: &str = "Included";
pub const REJECTION_REASON_COLUMN: &str = "Rejection_Reason";

const ID_COLUMN: &str = "ID";
const TITLE_COLUMN: &str = "Title";
const ABSTRACT_COLUMN: &str = "Abstract";
const DOI_COLUMN: &str = "DOI";

const INCLUDED: &str = "true";
const EXCLUDED: &str = "false";

/// Titles in the rejection listing are cut to this many characters.
const REPORT_TITLE_CHARS: usize = 80;

// ---------------------------------------------------------------------------
// Options / summary
// ---------------------------------------------------------------------------

/// Paths and settings for one screening run.
#[derive(Debug, Clone)]
pub struct ScreeningOptions {
    /// Search-stage CSV.
    pub input: PathBuf,
    /// Included rows only.
    pub output: PathBuf,
    pub report: PathBuf,
    /// Checkpoint holding every row with its decision.
    pub state: PathBuf,
    pub config: ScreeningConfig,
}

/// Counts over the whole store after a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreeningSummary {
    pub evaluated: usize,
    pub included: usize,
    pub rejected: usize,
    pub unresolved: usize,
    /// Rows rejected by pre-flight during this run.
    pub auto_rejected: usize,
    /// Batches sent during this run.
    pub batches: usize,
    /// Batches given up on during this run.
    pub batches_abandoned: usize,
}

/// In-memory result of the batching phase.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// First decision seen per row.
    pub decisions: HashMap<RowId, BatchDecision>,
    pub batches: usize,
    pub abandoned: usize,
}

// ---------------------------------------------------------------------------
// Pre-flight
// ---------------------------------------------------------------------------

/// Local content check. Returns the rejection reason, if any.
pub fn preflight(abstract_text: &str, doi: &str, config: &ScreeningConfig) -> Option<&'static str> {
    if abstract_text.chars().count() < config.min_abstract_length {
        return Some("Auto-Reject: Abstract too short");
    }

    let lowered = abstract_text.to_lowercase();
    if config
        .placeholder_phrases
        .iter()
        .any(|phrase| lowered.contains(&phrase.to_lowercase()))
    {
        return Some("Auto-Reject: Placeholder text");
    }

    if config.require_doi && doi.trim().is_empty() {
        return Some("Auto-Reject: Missing DOI");
    }

    None
}

/// Resolve every pending row that fails pre-flight. Returns the rows that passed.
pub fn apply_preflight(
    store: &mut RecordStore,
    pending: &[RowId],
    config: &ScreeningConfig,
) -> Result<(Vec<RowId>, usize)> {
    let mut passed = Vec::with_capacity(pending.len());
    let mut rejected = 0;

    for &row in pending {
        let reason = preflight(
            store.cell(row, ABSTRACT_COLUMN),
            store.cell(row, DOI_COLUMN),
            config,
        );
        match reason {
            Some(reason) => {
                store.set(row, INCLUDED_COLUMN, EXCLUDED)?;
                store.set(row, REJECTION_REASON_COLUMN, reason)?;
                rejected += 1;
            }
            None => passed.push(row),
        }
    }

    Ok((passed, rejected))
}

// ---------------------------------------------------------------------------
// Batching
// ---------------------------------------------------------------------------

fn batch_item(store: &RecordStore, row: RowId, max_abstract_chars: usize) -> BatchItem {
    BatchItem {
        id: row,
        title: store.cell(row, TITLE_COLUMN).to_string(),
        abstract_text: store
            .cell(row, ABSTRACT_COLUMN)
            .chars()
            .take(max_abstract_chars)
            .collect(),
    }
}

/// Call the service for one batch, retrying only rate-limit failures.
///
/// Makes at most `max_attempts` calls and sleeps `retry_delay` between them.
pub async fn classify_with_retry<S: ClassificationService>(
    service: &S,
    items: &[BatchItem],
    config: &ScreeningConfig,
) -> std::result::Result<Vec<BatchDecision>, ServiceError> {
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match service.classify_batch(items).await {
            Ok(decisions) => return Ok(decisions),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                warn!(attempt, max_attempts, error = %e, "rate limited, retrying batch");
                tokio::time::sleep(config.retry_delay()).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Send `rows` in sequential batches and collect the decisions.
///
/// Failed batches are abandoned and leave their rows unresolved. Decisions
/// for ids outside the batch are dropped.
#[instrument(skip_all, fields(rows = rows.len(), batch_size = config.batch_size))]
pub async fn classify_pending<S: ClassificationService>(
    service: &S,
    store: &RecordStore,
    rows: &[RowId],
    config: &ScreeningConfig,
    progress: &dyn StageProgress,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    let batch_size = config.batch_size.max(1);
    let total = rows.len().div_ceil(batch_size);

    for (index, chunk) in rows.chunks(batch_size).enumerate() {
        if index > 0 {
            tokio::time::sleep(config.inter_batch_delay()).await;
        }

        let items: Vec<BatchItem> = chunk
            .iter()
            .map(|&row| batch_item(store, row, config.max_abstract_chars))
            .collect();
        let batch_ids: HashSet<RowId> = chunk.iter().copied().collect();
        outcome.batches += 1;

        match classify_with_retry(service, &items, config).await {
            Ok(decisions) => {
                let returned = decisions.len();
                for decision in decisions {
                    if !batch_ids.contains(&decision.id) {
                        debug!(id = %decision.id, "decision for an id outside the batch, ignoring");
                        continue;
                    }
                    outcome.decisions.entry(decision.id).or_insert(decision);
                }
                debug!(batch = index + 1, sent = items.len(), returned, "batch classified");
            }
            Err(e) => {
                outcome.abandoned += 1;
                warn!(batch = index + 1, items = items.len(), error = %e, "batch abandoned");
            }
        }

        progress.advance(index + 1, total, &format!("batch {}/{total}", index + 1));
    }

    outcome
}

/// Write decisions into the store. Returns how many rows were updated.
pub fn merge_decisions(
    store: &mut RecordStore,
    decisions: &HashMap<RowId, BatchDecision>,
) -> Result<usize> {
    let mut ordered: Vec<&BatchDecision> = decisions.values().collect();
    ordered.sort_by_key(|d| d.id);

    for decision in &ordered {
        let value = if decision.included { INCLUDED } else { EXCLUDED };
        store.set(decision.id, INCLUDED_COLUMN, value)?;
        store.set(decision.id, REJECTION_REASON_COLUMN, decision.reason.as_str())?;
    }
    Ok(ordered.len())
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

fn is_included(store: &RecordStore, row: RowId) -> bool {
    store.cell(row, INCLUDED_COLUMN).trim().eq_ignore_ascii_case(INCLUDED)
}

fn summarize(store: &RecordStore, auto_rejected: usize, outcome: &BatchOutcome) -> ScreeningSummary {
    let mut summary = ScreeningSummary {
        auto_rejected,
        batches: outcome.batches,
        batches_abandoned: outcome.abandoned,
        ..Default::default()
    };
    for row in store.row_ids().filter(|&row| !is_separator_row(store, row, TITLE_COLUMN)) {
        summary.evaluated += 1;
        let cell = store.cell(row, INCLUDED_COLUMN).trim();
        if cell.is_empty() {
            summary.unresolved += 1;
        } else if cell.eq_ignore_ascii_case(INCLUDED) {
            summary.included += 1;
        } else {
            summary.rejected += 1;
        }
    }
    summary
}

/// Build the screening report: summary rows, then every row not included.
pub fn build_report(
    store: &RecordStore,
    options: &ScreeningOptions,
    summary: &ScreeningSummary,
) -> ReportTable {
    let mut report = ReportTable::new(&["Input File", "Output File", "Status/Reason"]);
    report.push([
        options.input.display().to_string(),
        options.output.display().to_string(),
        "SUMMARY STATS".to_string(),
    ]);
    report.push(["Total Evaluated".to_string(), summary.evaluated.to_string()]);
    report.push(["Total Relevant (Kept)".to_string(), summary.included.to_string()]);
    report.push(["Total Irrelevant (Rejected)".to_string(), summary.rejected.to_string()]);
    report.push(["Total Unresolved".to_string(), summary.unresolved.to_string()]);
    report.push_separator();
    report.push(["PAPER ID", "TITLE", "REJECTION REASON"]);

    let rejected = store
        .row_ids()
        .filter(|&row| !is_included(store, row) && !is_separator_row(store, row, TITLE_COLUMN));
    for row in rejected {
        let id = match store.cell(row, ID_COLUMN) {
            "" => row.to_string(),
            id => id.to_string(),
        };
        let title: String = store
            .cell(row, TITLE_COLUMN)
            .chars()
            .take(REPORT_TITLE_CHARS)
            .collect();
        let reason = match store.cell(row, REJECTION_REASON_COLUMN) {
            "" => "Unresolved".to_string(),
            reason => reason.to_string(),
        };
        report.push([id, title, reason]);
    }

    report
}

/// Run the screening stage end to end.
///
/// Resume-load, pre-flight, checkpoint, batches, merge, checkpoint, then the
/// filtered output and the report.
#[instrument(skip_all, fields(input = %options.input.display()))]
pub async fn run_screening<S: ClassificationService>(
    service: &S,
    options: &ScreeningOptions,
    progress: &dyn StageProgress,
) -> Result<ScreeningSummary> {
    let config = &options.config;

    progress.phase("Loading records");
    let (mut store, _origin) = open_or_seed(
        &options.input,
        &options.state,
        &[INCLUDED_COLUMN, REJECTION_REASON_COLUMN],
    )?;
    store.require_column(TITLE_COLUMN)?;
    store.require_column(ABSTRACT_COLUMN)?;

    progress.phase("Pre-flight checks");
    let pending = pending_screening(&store, INCLUDED_COLUMN, TITLE_COLUMN);
    let (queued, auto_rejected) = apply_preflight(&mut store, &pending, config)?;
    store.checkpoint()?;
    info!(
        pending = pending.len(),
        auto_rejected,
        queued = queued.len(),
        "pre-flight complete"
    );

    progress.phase("Screening batches");
    let outcome = classify_pending(service, &store, &queued, config, progress).await;

    let merged = merge_decisions(&mut store, &outcome.decisions)?;
    store.checkpoint()?;

    let kept = store.write_filtered(&options.output, |row| is_included(&store, row))?;

    let summary = summarize(&store, auto_rejected, &outcome);
    build_report(&store, options, &summary).write(&options.report)?;
    progress.finish();

    info!(
        merged,
        kept,
        rejected = summary.rejected,
        unresolved = summary.unresolved,
        abandoned = summary.batches_abandoned,
        "screening complete"
    );

    Ok(summary)
}
