#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use litscreen_classifier::{ClassificationService, ServiceError};
use litscreen_shared::{BatchDecision, BatchItem, DocumentVerdict};
use litscreen_storage::RecordStore;

type BatchFn = dyn Fn(&[BatchItem]) -> Result<Vec<BatchDecision>, ServiceError> + Send + Sync;
type DocumentFn = dyn Fn(&Path) -> Result<DocumentVerdict, ServiceError> + Send + Sync;
type DelayFn = dyn Fn(&Path) -> Duration + Send + Sync;

/// In-process classification service with scripted answers and call logs.
pub struct ScriptedService {
    batch: Box<BatchFn>,
    document: Box<DocumentFn>,
    delay: Box<DelayFn>,
    batch_calls: Mutex<Vec<Vec<BatchItem>>>,
    document_calls: Mutex<Vec<PathBuf>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedService {
    /// Includes every batch item; classifies documents by file name.
    pub fn new() -> Self {
        Self {
            batch: Box::new(|items| {
                Ok(items
                    .iter()
                    .map(|item| BatchDecision {
                        id: item.id,
                        included: true,
                        reason: "on topic".into(),
                    })
                    .collect())
            }),
            document: Box::new(|path| Ok(verdict_for(path))),
            delay: Box::new(|_| Duration::ZERO),
            batch_calls: Mutex::new(Vec::new()),
            document_calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_batch(
        mut self,
        f: impl Fn(&[BatchItem]) -> Result<Vec<BatchDecision>, ServiceError> + Send + Sync + 'static,
    ) -> Self {
        self.batch = Box::new(f);
        self
    }

    pub fn with_document(
        mut self,
        f: impl Fn(&Path) -> Result<DocumentVerdict, ServiceError> + Send + Sync + 'static,
    ) -> Self {
        self.document = Box::new(f);
        self
    }

    pub fn with_delay(mut self, f: impl Fn(&Path) -> Duration + Send + Sync + 'static) -> Self {
        self.delay = Box::new(f);
        self
    }

    pub fn batch_calls(&self) -> Vec<Vec<BatchItem>> {
        self.batch_calls.lock().unwrap().clone()
    }

    pub fn document_calls(&self) -> Vec<PathBuf> {
        self.document_calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl ClassificationService for ScriptedService {
    async fn classify_batch(&self, items: &[BatchItem]) -> Result<Vec<BatchDecision>, ServiceError> {
        self.batch_calls.lock().unwrap().push(items.to_vec());
        (self.batch)(items)
    }

    async fn classify_document(&self, artifact: &Path) -> Result<DocumentVerdict, ServiceError> {
        self.document_calls.lock().unwrap().push(artifact.to_path_buf());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep((self.delay)(artifact)).await;
        let result = (self.document)(artifact);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        result
    }
}

/// Deterministic verdict derived from the file name.
pub fn verdict_for(path: &Path) -> DocumentVerdict {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let category = ["Category A", "Category B", "Other"][name.len() % 3];
    DocumentVerdict {
        category: category.into(),
        reason: format!("classified {name}"),
    }
}

/// Write a CSV table through the Record Store.
pub fn write_table(path: &Path, headers: &[&str], rows: &[Vec<String>]) {
    let mut store = RecordStore::new(headers.iter().map(|h| h.to_string()).collect(), path);
    for row in rows {
        store.push_row(row.clone());
    }
    store.checkpoint().unwrap();
}

pub fn read_table(path: &Path) -> RecordStore {
    RecordStore::open(path, path).unwrap()
}

/// Create empty artifact files.
pub fn touch_artifacts(dir: &Path, names: &[&str]) {
    std::fs::create_dir_all(dir).unwrap();
    for name in names {
        std::fs::write(dir.join(name), b"%PDF-1.4\n").unwrap();
    }
}
