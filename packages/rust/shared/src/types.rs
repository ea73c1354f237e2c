//! Core domain types shared by the pipeline stages.

use serde::{Deserialize, Serialize};

/// Category recorded when classifying a single document failed.
pub const ERROR_CATEGORY: &str = "Error";

/// Result-cell values that mean "not yet classified".
pub const UNRESOLVED_SENTINELS: &[&str] = &["", "nan", "None", "Unknown"];

/// Marker carried by structural separator rows (see the formatting stage).
pub const SEPARATOR_MARKER: &str = "---";

// ---------------------------------------------------------------------------
// RowId
// ---------------------------------------------------------------------------

/// Position of a row in the Record Store.
///
/// Rows are never removed or reordered, so the position doubles as the
/// stable identifier sent to the classification service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub usize);

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Batch mode
// ---------------------------------------------------------------------------

/// One record as submitted for relevance screening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub id: RowId,
    pub title: String,
    pub abstract_text: String,
}

/// Inclusion decision returned for one item of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDecision {
    pub id: RowId,
    pub included: bool,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Document mode
// ---------------------------------------------------------------------------

/// Classification of a single document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentVerdict {
    /// Category label chosen by the service, or [`ERROR_CATEGORY`].
    pub category: String,
    /// Free-text justification (error description for failures).
    pub reason: String,
}

impl DocumentVerdict {
    /// Verdict recorded for an item whose classification call failed.
    pub fn error(description: impl Into<String>) -> Self {
        Self {
            category: ERROR_CATEGORY.to_string(),
            reason: description.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.category == ERROR_CATEGORY
    }
}

/// Whether a result cell still counts as unresolved.
pub fn is_unresolved(cell: &str) -> bool {
    UNRESOLVED_SENTINELS.contains(&cell.trim())
}
