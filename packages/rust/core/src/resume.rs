//! Resume Controller.
//!
//! There is no resume log. A stage loads its last checkpoint if one exists,
//! otherwise the fresh input, and decides what is left to do from the cell
//! contents alone. Evaluating the predicates twice over the same store
//! gives the same answer, which is what makes reruns idempotent.

use std::path::Path;

use litscreen_shared::{ERROR_CATEGORY, Result, RowId, SEPARATOR_MARKER, is_unresolved};
use litscreen_storage::RecordStore;
use tracing::info;

/// Column holding the artifact link in formatted tables.
pub const LINK_COLUMN: &str = "Link";

/// Link marker for rows that have no local artifact to analyze.
pub const ONLINE_ONLY_MARKER: &str = "Online Link Only";

/// Where the store was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// No checkpoint existed; the store was seeded from the input.
    Fresh,
    /// The store was loaded from an existing checkpoint.
    Resumed,
}

/// Load the store for a stage and bind it to `checkpoint`.
///
/// `columns` are added (empty) before anything is written, so the column
/// set is fixed for the rest of the run. A fresh store is checkpointed
/// immediately so the run is resumable from the start.
pub fn open_or_seed(
    input: &Path,
    checkpoint: &Path,
    columns: &[&str],
) -> Result<(RecordStore, Origin)> {
    let (mut store, origin) = if checkpoint.is_file() {
        (RecordStore::open(checkpoint, checkpoint)?, Origin::Resumed)
    } else {
        (RecordStore::open(input, checkpoint)?, Origin::Fresh)
    };

    let before = store.headers().len();
    for column in columns {
        store.ensure_column(column);
    }

    if origin == Origin::Fresh || store.headers().len() != before {
        store.checkpoint()?;
    }

    match origin {
        Origin::Fresh => info!(input = %input.display(), rows = store.len(), "loaded fresh input"),
        Origin::Resumed => {
            info!(checkpoint = %checkpoint.display(), rows = store.len(), "resuming from checkpoint")
        }
    }

    Ok((store, origin))
}

/// Whether `row` is a structural separator rather than a work item.
pub fn is_separator_row(store: &RecordStore, row: RowId, key_column: &str) -> bool {
    store.cell(row, key_column).contains(SEPARATOR_MARKER)
}

/// Rows whose screening decision is still empty, skipping separator rows.
pub fn pending_screening(store: &RecordStore, included_column: &str, key_column: &str) -> Vec<RowId> {
    store
        .row_ids()
        .filter(|&row| store.cell(row, included_column).trim().is_empty())
        .filter(|&row| !is_separator_row(store, row, key_column))
        .collect()
}

/// Columns the analysis predicate reads.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisColumns<'a> {
    pub citation: &'a str,
    pub result: &'a str,
}

/// Whether a row still needs document classification.
///
/// The result must be unresolved (or `Error` when `retry_errors` is set),
/// the citation must be present and not a separator, and the link must not
/// mark the row as online-only.
pub fn is_pending_analysis(
    store: &RecordStore,
    row: RowId,
    columns: AnalysisColumns<'_>,
    retry_errors: bool,
) -> bool {
    let result = store.cell(row, columns.result).trim();
    let unresolved = is_unresolved(result) || (retry_errors && result == ERROR_CATEGORY);
    if !unresolved {
        return false;
    }

    if store.cell(row, columns.citation).trim().is_empty()
        || is_separator_row(store, row, columns.citation)
    {
        return false;
    }

    !store.cell(row, LINK_COLUMN).contains(ONLINE_ONLY_MARKER)
}

/// All rows that still need document classification, in file order.
pub fn pending_analysis(
    store: &RecordStore,
    columns: AnalysisColumns<'_>,
    retry_errors: bool,
) -> Vec<RowId> {
    store
        .row_ids()
        .filter(|&row| is_pending_analysis(store, row, columns, retry_errors))
        .collect()
}

/// Result values that count toward a category distribution.
pub fn is_reportable_category(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && value != "nan" && value != SEPARATOR_MARKER
}
