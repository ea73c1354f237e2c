//! Stage report tables.
//!
//! Reports are observational only: written once at the end of a stage and
//! never read back by the pipeline.

use std::path::Path;

use litscreen_shared::{LitScreenError, Result};

use crate::write_atomically;

/// A small fixed-width table written as CSV.
#[derive(Debug, Clone, Default)]
pub struct ReportTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ReportTable {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row; missing trailing cells are left empty.
    pub fn push<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        let mut row: Vec<String> = cells.into_iter().map(|c| c.to_string()).collect();
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    /// Append a `---` row across every column.
    pub fn push_separator(&mut self) {
        self.rows.push(vec!["---".to_string(); self.headers.len()]);
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_atomically(path, |file| {
            let mut writer = csv::Writer::from_writer(file);
            writer
                .write_record(&self.headers)
                .map_err(|e| LitScreenError::csv(path, e))?;
            for row in &self.rows {
                writer
                    .write_record(row)
                    .map_err(|e| LitScreenError::csv(path, e))?;
            }
            writer.flush().map_err(|e| LitScreenError::io(path, e))
        })?;
        tracing::info!(path = %path.display(), rows = self.rows.len(), "report written");
        Ok(())
    }
}
