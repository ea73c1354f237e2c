//! Document classification (Concurrent Item Analyzer).
//!
//! Each pending row is fuzzy-matched to a file in the artifact directory.
//! Accepted matches become tasks on a shared queue drained by a fixed pool
//! of worker tasks, so at most `workers` documents are with the service at
//! any moment.
//!
//! **Merge rules:**
//! - A worker takes the store lock, writes its row, checkpoints the whole
//!   store on the blocking pool, and only then releases the lock.
//! - A failed classification (including a panic in the service call) is
//!   recorded as an `Error` result for that row and never stops the run.
//! - A failed checkpoint stops the pool: no new tasks are started, tasks in
//!   flight finish, and the stage returns the first checkpoint error.

use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::FutureExt;
use litscreen_classifier::ClassificationService;
use litscreen_matcher::CandidateSet;
use litscreen_shared::{AnalysisConfig, DocumentVerdict, LitScreenError, Result, RowId};
use litscreen_storage::{RecordStore, ReportTable};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::progress::StageProgress;
use crate::resume::{AnalysisColumns, is_reportable_category, open_or_seed, pending_analysis};

// ---------------------------------------------------------------------------
// Options / summary
// ---------------------------------------------------------------------------

/// Paths and settings for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Formatted sheet.
    pub input: PathBuf,
    /// Output sheet, also the checkpoint the next run resumes from.
    pub output: PathBuf,
    pub report: PathBuf,
    /// Directory holding the downloaded documents.
    pub artifact_dir: PathBuf,
    pub config: AnalysisConfig,
}

/// What one run did, plus the category distribution over the whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisSummary {
    /// Rows that were pending at start.
    pub pending: usize,
    /// Rows matched to an artifact and sent for classification.
    pub evaluated: usize,
    /// Pending rows with no artifact above the match threshold.
    pub skipped_no_match: usize,
    /// Tasks whose result is a category.
    pub classified: usize,
    /// Tasks whose result is `Error`.
    pub errors: usize,
    /// Count per result value over every row, largest first.
    pub distribution: Vec<(String, usize)>,
}

/// One accepted match waiting for classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub row: RowId,
    pub artifact: PathBuf,
    pub score: u8,
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Match pending rows to artifacts. Returns the tasks and the number skipped.
///
/// Rows below the threshold are skipped, not failed: they stay pending for
/// a later run with more artifacts.
pub fn plan_tasks(
    store: &RecordStore,
    pending: &[RowId],
    candidates: &CandidateSet,
    config: &AnalysisConfig,
) -> (Vec<Task>, usize) {
    let mut tasks = Vec::with_capacity(pending.len());
    let mut skipped = 0;

    for &row in pending {
        let citation = store.cell(row, &config.citation_column);
        match candidates.best_match(citation) {
            Some(m) if m.is_accepted(config.match_threshold) => tasks.push(Task {
                row,
                artifact: candidates.path_of(m.candidate),
                score: m.score,
            }),
            best => {
                debug!(
                    %row,
                    score = best.map(|m| m.score),
                    "no artifact above threshold, skipping"
                );
                skipped += 1;
            }
        }
    }

    (tasks, skipped)
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

/// Columns a completed task writes.
#[derive(Debug, Clone)]
pub struct ResultColumns {
    pub result: String,
    pub reason: String,
}

/// Counters from one pool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolOutcome {
    pub classified: usize,
    pub errors: usize,
}

struct Shared {
    store: Arc<Mutex<RecordStore>>,
    queue: Mutex<VecDeque<Task>>,
    columns: ResultColumns,
    total: usize,
    halted: AtomicBool,
    completed: AtomicUsize,
    errors: AtomicUsize,
    failure: Mutex<Option<LitScreenError>>,
}

impl Shared {
    async fn next_task(&self) -> Option<Task> {
        if self.halted.load(Ordering::SeqCst) {
            return None;
        }
        self.queue.lock().await.pop_front()
    }

    /// Merge one verdict and checkpoint while holding the store lock.
    ///
    /// The guard moves into the blocking write and drops when it finishes.
    async fn merge(&self, row: RowId, verdict: &DocumentVerdict) -> Result<()> {
        let mut store = Arc::clone(&self.store).lock_owned().await;
        store.set(row, &self.columns.result, verdict.category.as_str())?;
        store.set(row, &self.columns.reason, verdict.reason.as_str())?;
        tokio::task::spawn_blocking(move || store.checkpoint())
            .await
            .map_err(|e| LitScreenError::Store(format!("checkpoint task failed: {e}")))?
    }

    async fn halt(&self, error: LitScreenError) {
        self.halted.store(true, Ordering::SeqCst);
        let mut failure = self.failure.lock().await;
        if failure.is_none() {
            *failure = Some(error);
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("classification panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("classification panicked: {s}")
    } else {
        "classification panicked".to_string()
    }
}

/// Classify one artifact, turning every failure into an `Error` verdict.
async fn classify_guarded<S: ClassificationService>(service: &S, artifact: &Path) -> DocumentVerdict {
    match AssertUnwindSafe(service.classify_document(artifact))
        .catch_unwind()
        .await
    {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(e)) => DocumentVerdict::error(e.to_string()),
        Err(payload) => DocumentVerdict::error(panic_message(payload)),
    }
}

async fn worker<S: ClassificationService + 'static>(
    id: usize,
    service: Arc<S>,
    shared: Arc<Shared>,
    progress: Arc<dyn StageProgress>,
) {
    while let Some(task) = shared.next_task().await {
        let verdict = classify_guarded(service.as_ref(), &task.artifact).await;

        if let Err(e) = shared.merge(task.row, &verdict).await {
            warn!(worker = id, row = %task.row, error = %e, "checkpoint failed, halting pool");
            shared.halt(e).await;
            break;
        }

        if verdict.is_error() {
            shared.errors.fetch_add(1, Ordering::SeqCst);
            warn!(row = %task.row, artifact = %task.artifact.display(), reason = %verdict.reason, "document classification failed");
        } else {
            debug!(row = %task.row, category = %verdict.category, "document classified");
        }

        let done = shared.completed.fetch_add(1, Ordering::SeqCst) + 1;
        progress.advance(
            done,
            shared.total,
            &format!("row {}: {}", task.row, verdict.category),
        );
    }
}

/// Run `tasks` on a pool of `workers` tasks and return the updated store.
///
/// The store's checkpoint target receives a full rewrite after every
/// completion.
#[instrument(skip_all, fields(tasks = tasks.len(), workers = workers))]
pub async fn run_pool<S: ClassificationService + 'static>(
    service: Arc<S>,
    store: RecordStore,
    tasks: Vec<Task>,
    columns: ResultColumns,
    workers: usize,
    progress: Arc<dyn StageProgress>,
) -> Result<(RecordStore, PoolOutcome)> {
    let total = tasks.len();
    let shared = Arc::new(Shared {
        store: Arc::new(Mutex::new(store)),
        queue: Mutex::new(tasks.into()),
        columns,
        total,
        halted: AtomicBool::new(false),
        completed: AtomicUsize::new(0),
        errors: AtomicUsize::new(0),
        failure: Mutex::new(None),
    });

    let mut pool = JoinSet::new();
    for id in 0..workers.clamp(1, total.max(1)) {
        pool.spawn(worker(
            id,
            Arc::clone(&service),
            Arc::clone(&shared),
            Arc::clone(&progress),
        ));
    }
    while let Some(joined) = pool.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "analysis worker ended abnormally");
        }
    }

    let shared = Arc::try_unwrap(shared)
        .map_err(|_| LitScreenError::Store("record store still shared after pool shutdown".into()))?;
    if let Some(error) = shared.failure.into_inner() {
        return Err(error);
    }

    let store = Arc::try_unwrap(shared.store)
        .map_err(|_| LitScreenError::Store("record store still locked after pool shutdown".into()))?
        .into_inner();
    let completed = shared.completed.into_inner();
    let errors = shared.errors.into_inner();
    Ok((
        store,
        PoolOutcome {
            classified: completed - errors,
            errors,
        },
    ))
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Count of each reportable result value, largest first, ties by name.
pub fn category_distribution(store: &RecordStore, result_column: &str) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for row in store.row_ids() {
        let value = store.cell(row, result_column).trim();
        if is_reportable_category(value) {
            *counts.entry(value).or_default() += 1;
        }
    }

    let mut distribution: Vec<(String, usize)> =
        counts.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    distribution.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    distribution
}

fn build_report(options: &AnalysisOptions, summary: &AnalysisSummary) -> ReportTable {
    let mut report = ReportTable::new(&["Metric", "Value"]);
    report.push(["Input File Used".to_string(), options.input.display().to_string()]);
    report.push(["Output File Generated".to_string(), options.output.display().to_string()]);
    report.push(["Total Papers Evaluated by AI".to_string(), summary.evaluated.to_string()]);
    report.push(["Skipped (No Matching File)".to_string(), summary.skipped_no_match.to_string()]);
    report.push(["Errors".to_string(), summary.errors.to_string()]);
    report.push_separator();
    report.push(["METHODOLOGY DISTRIBUTION", ""]);
    for (category, count) in &summary.distribution {
        report.push([category.clone(), count.to_string()]);
    }
    report
}

/// Run the analysis stage end to end.
#[instrument(skip_all, fields(input = %options.input.display(), artifacts = %options.artifact_dir.display()))]
pub async fn run_analysis<S: ClassificationService + 'static>(
    service: Arc<S>,
    options: &AnalysisOptions,
    progress: Arc<dyn StageProgress>,
) -> Result<AnalysisSummary> {
    let config = &options.config;
    let columns = AnalysisColumns {
        citation: &config.citation_column,
        result: &config.result_column,
    };

    progress.phase("Loading records");
    let (store, _origin) = open_or_seed(
        &options.input,
        &options.output,
        &[config.result_column.as_str(), config.reason_column.as_str()],
    )?;
    store.require_column(&config.citation_column)?;

    progress.phase("Matching documents");
    let candidates = CandidateSet::scan_dir(&options.artifact_dir)?;
    let pending = pending_analysis(&store, columns, config.retry_errors);
    let (tasks, skipped_no_match) = plan_tasks(&store, &pending, &candidates, config);
    info!(
        pending = pending.len(),
        matched = tasks.len(),
        skipped = skipped_no_match,
        artifacts = candidates.len(),
        "documents matched"
    );

    let evaluated = tasks.len();
    let (store, outcome) = if tasks.is_empty() {
        (store, PoolOutcome::default())
    } else {
        progress.phase("Classifying documents");
        run_pool(
            service,
            store,
            tasks,
            ResultColumns {
                result: config.result_column.clone(),
                reason: config.reason_column.clone(),
            },
            config.workers,
            Arc::clone(&progress),
        )
        .await?
    };

    let summary = AnalysisSummary {
        pending: pending.len(),
        evaluated,
        skipped_no_match,
        classified: outcome.classified,
        errors: outcome.errors,
        distribution: category_distribution(&store, &config.result_column),
    };
    build_report(options, &summary).write(&options.report)?;
    progress.finish();

    info!(
        evaluated,
        classified = summary.classified,
        errors = summary.errors,
        "analysis complete"
    );
    Ok(summary)
}
