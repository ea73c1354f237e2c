//! Fuzzy joining of records to local artifact files.
//!
//! There is no exact key between a citation and the file it was saved
//! under, so records are joined to artifacts by token-set similarity of
//! their normalized text. The candidate set is built once per run from a
//! directory listing and is read-only afterwards.

mod normalize;
mod similarity;

use std::path::{Path, PathBuf};

use litscreen_shared::{LitScreenError, Result};
use tracing::debug;

pub use normalize::normalize;
pub use similarity::{ratio, token_set_ratio};

/// Extension (case-insensitive) of files admitted to a [`CandidateSet`] scan.
pub const ARTIFACT_EXTENSION: &str = "pdf";

/// Best-scoring candidate for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match<'a> {
    /// Candidate as originally given (file name for directory scans).
    pub candidate: &'a str,
    /// Token-set similarity in `0..=100`.
    pub score: u8,
}

impl Match<'_> {
    /// A match is accepted only when its score is strictly above `threshold`.
    pub fn is_accepted(&self, threshold: u8) -> bool {
        self.score > threshold
    }
}

/// Score every candidate and return the best one.
///
/// Ties keep the first candidate encountered at the maximum score.
/// Returns `None` only for an empty candidate list.
pub fn best_match<'a, S: AsRef<str>>(query: &str, candidates: &'a [S]) -> Option<Match<'a>> {
    let query = normalize(Some(query));
    let mut best: Option<Match<'a>> = None;
    for candidate in candidates {
        let candidate = candidate.as_ref();
        let score = token_set_ratio(&query, &normalize(Some(candidate)));
        if best.is_none_or(|b| score > b.score) {
            best = Some(Match { candidate, score });
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Candidate set
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Candidate {
    name: String,
    normalized: String,
}

/// Immutable set of artifact names with their normalized forms precomputed.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    root: Option<PathBuf>,
    entries: Vec<Candidate>,
}

impl CandidateSet {
    /// Build from names, keeping the given order for tie-breaks.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = names
            .into_iter()
            .map(|n| {
                let name = n.into();
                let normalized = normalize(Some(&name));
                Candidate { name, normalized }
            })
            .collect();
        Self {
            root: None,
            entries,
        }
    }

    /// List the artifact files directly inside `dir`, sorted by name.
    ///
    /// Sorting makes tie-breaks independent of filesystem enumeration order.
    pub fn scan_dir(dir: &Path) -> Result<Self> {
        let listing = std::fs::read_dir(dir).map_err(|e| LitScreenError::io(dir, e))?;

        let mut names = Vec::new();
        for entry in listing {
            let entry = entry.map_err(|e| LitScreenError::io(dir, e))?;
            let path = entry.path();
            let is_artifact = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(ARTIFACT_EXTENSION));
            if !is_artifact || !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();

        debug!(dir = %dir.display(), artifacts = names.len(), "candidate set scanned");

        let mut set = Self::from_names(names);
        set.root = Some(dir.to_path_buf());
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Candidate names in tie-break order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|c| c.name.as_str())
    }

    /// Full path of a candidate when the set came from [`CandidateSet::scan_dir`].
    pub fn path_of(&self, name: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Same contract as [`best_match`], reusing the precomputed normal forms.
    pub fn best_match(&self, query: &str) -> Option<Match<'_>> {
        let query = normalize(Some(query));
        let mut best: Option<Match<'_>> = None;
        for candidate in &self.entries {
            let score = token_set_ratio(&query, &candidate.normalized);
            if best.is_none_or(|b| score > b.score) {
                best = Some(Match {
                    candidate: &candidate.name,
                    score,
                });
            }
        }
        best
    }
}
