//! Durable tabular state for the pipeline stages.
//!
//! The [`RecordStore`] holds one row per work item as plain string cells,
//! exactly as read from CSV. It is loaded once at stage start and rewritten
//! wholesale on every checkpoint.
//!
//! **Write rules:**
//! - Checkpoints go to a temporary sibling file that is atomically renamed
//!   over the target, so readers never observe a half-written table.
//! - Columns are only added through [`RecordStore::ensure_column`], which
//!   stages call before their first checkpoint.

mod report;

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use litscreen_shared::{LitScreenError, Result, RowId};
use tempfile::NamedTempFile;

pub use report::ReportTable;

/// In-memory Record Store bound to a checkpoint target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordStore {
    target: PathBuf,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RecordStore {
    /// Create an empty store with the given header row.
    pub fn new(headers: Vec<String>, target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            headers,
            rows: Vec::new(),
        }
    }

    /// Read `source` and bind the store to `target` for checkpoints.
    ///
    /// Rows shorter than the header are padded with empty cells; rows longer
    /// than the header are rejected.
    pub fn open(source: &Path, target: impl Into<PathBuf>) -> Result<Self> {
        let file = File::open(source).map_err(|e| LitScreenError::io(source, e))?;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(file);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| LitScreenError::csv(source, e))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| LitScreenError::csv(source, e))?;
            if record.len() > headers.len() {
                return Err(LitScreenError::csv(
                    source,
                    format!(
                        "row {} has {} fields but the header has {}",
                        line + 1,
                        record.len(),
                        headers.len()
                    ),
                ));
            }
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        tracing::debug!(path = %source.display(), rows = rows.len(), "record store loaded");

        Ok(Self {
            target: target.into(),
            headers,
            rows,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All row identifiers in file order.
    pub fn row_ids(&self) -> impl Iterator<Item = RowId> + use<> {
        (0..self.rows.len()).map(RowId)
    }

    /// Append a row, padding or truncating it to the header width.
    pub fn push_row(&mut self, mut cells: Vec<String>) -> RowId {
        cells.resize(self.headers.len(), String::new());
        self.rows.push(cells);
        RowId(self.rows.len() - 1)
    }

    /// Index of a column, if present.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Index of a column, or a validation error naming it.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column(name).ok_or_else(|| {
            LitScreenError::validation(format!(
                "column '{name}' not found in {}",
                self.target.display()
            ))
        })
    }

    /// Add an empty column if missing. Returns its index.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column(name) {
            return idx;
        }
        self.headers.push(name.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.headers.len() - 1
    }

    /// Cell text, or `""` for a missing column or row.
    pub fn cell(&self, row: RowId, column: &str) -> &str {
        self.column(column)
            .and_then(|idx| self.rows.get(row.0).map(|r| r[idx].as_str()))
            .unwrap_or("")
    }

    /// Full row cells in header order.
    pub fn row(&self, row: RowId) -> Option<&[String]> {
        self.rows.get(row.0).map(Vec::as_slice)
    }

    /// Overwrite one cell. The column must already exist.
    pub fn set(&mut self, row: RowId, column: &str, value: impl Into<String>) -> Result<()> {
        let idx = self
            .column(column)
            .ok_or_else(|| LitScreenError::Store(format!("unknown column '{column}'")))?;
        let cells = self
            .rows
            .get_mut(row.0)
            .ok_or_else(|| LitScreenError::Store(format!("row {row} out of range")))?;
        cells[idx] = value.into();
        Ok(())
    }

    /// Rewrite the whole table to the checkpoint target.
    pub fn checkpoint(&self) -> Result<()> {
        self.write_rows(&self.target, |_| true)?;
        tracing::trace!(path = %self.target.display(), rows = self.rows.len(), "checkpoint written");
        Ok(())
    }

    /// Write only the rows accepted by `keep`. Returns how many were written.
    pub fn write_filtered(&self, path: &Path, keep: impl Fn(RowId) -> bool) -> Result<usize> {
        self.write_rows(path, keep)
    }

    fn write_rows(&self, path: &Path, keep: impl Fn(RowId) -> bool) -> Result<usize> {
        let mut written = 0;
        write_atomically(path, |file| {
            let mut writer = csv::Writer::from_writer(file);
            writer
                .write_record(&self.headers)
                .map_err(|e| LitScreenError::csv(path, e))?;
            for (idx, row) in self.rows.iter().enumerate() {
                if keep(RowId(idx)) {
                    writer
                        .write_record(row)
                        .map_err(|e| LitScreenError::csv(path, e))?;
                    written += 1;
                }
            }
            writer.flush().map_err(|e| LitScreenError::io(path, e))
        })?;
        Ok(written)
    }
}

/// Write through a temporary file in the destination directory, then rename.
pub(crate) fn write_atomically(
    path: &Path,
    fill: impl FnOnce(&mut File) -> Result<()>,
) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| LitScreenError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| LitScreenError::io(dir, e))?;
    fill(tmp.as_file_mut())?;
    tmp.as_file_mut()
        .flush()
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| LitScreenError::io(path, e))?;
    tmp.persist(path)
        .map_err(|e| LitScreenError::io(path, e.error))?;
    Ok(())
}
