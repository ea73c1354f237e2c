mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::{ScriptedService, read_table, touch_artifacts, write_table};
use litscreen_classifier::ServiceError;
use litscreen_core::{AnalysisOptions, SilentProgress, run_analysis};
use litscreen_shared::{AnalysisConfig, RowId};

const HEADERS: [&str; 6] = ["Full Citation", "Link", "Auth", "Year", "Full Abstract", "Method"];

const PAPERS: [(&str, &str); 4] = [
    ("Smith, J. (2020). Deep Learning.", "smith_2020_deep_learning.pdf"),
    ("Jones, K. (2019). Graph Theory.", "jones_2019_graph_theory.pdf"),
    ("Garcia, L. (2018). Protein Folding.", "garcia_2018_protein_folding.pdf"),
    ("Chen, W. (2021). Quantum Error Correction.", "chen_2021_quantum_error_correction.pdf"),
];

fn sheet_row(citation: &str, link: &str) -> Vec<String> {
    vec![
        citation.into(),
        link.into(),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
    ]
}

fn write_sheet(path: &Path) {
    let mut rows: Vec<Vec<String>> = PAPERS
        .iter()
        .map(|(citation, _)| sheet_row(citation, "https://example.org/paper.pdf"))
        .collect();
    let mut separator = vec!["---".to_string(); HEADERS.len()];
    separator[0] = "--- END OF DOWNLOADED FILES --- (Manual Review Below)".into();
    rows.push(separator);
    rows.push(sheet_row("Brown, T. (2017). Deep Learning Survey.", "Online Link Only"));
    write_table(path, &HEADERS, &rows);
}

fn options(dir: &Path, workers: usize) -> AnalysisOptions {
    AnalysisOptions {
        input: dir.join("formatted.csv"),
        output: dir.join("analyzed.csv"),
        report: dir.join("analysis_report.csv"),
        artifact_dir: dir.join("pdfs"),
        config: AnalysisConfig {
            workers,
            ..Default::default()
        },
    }
}

fn all_artifacts() -> Vec<&'static str> {
    PAPERS.iter().map(|(_, file)| *file).collect()
}

#[tokio::test]
async fn resumed_runs_match_a_single_complete_run() {
    // Two partial runs: half the artifacts, then all of them.
    let split = tempfile::tempdir().unwrap();
    let opts = options(split.path(), 2);
    write_sheet(&opts.input);
    touch_artifacts(&opts.artifact_dir, &all_artifacts()[..2]);

    let first = Arc::new(ScriptedService::new());
    let summary = run_analysis(Arc::clone(&first), &opts, Arc::new(SilentProgress))
        .await
        .unwrap();
    assert_eq!(summary.evaluated, 2);
    assert_eq!(summary.skipped_no_match, 2);

    touch_artifacts(&opts.artifact_dir, &all_artifacts()[2..]);
    let second = Arc::new(ScriptedService::new());
    let summary = run_analysis(Arc::clone(&second), &opts, Arc::new(SilentProgress))
        .await
        .unwrap();
    assert_eq!(summary.evaluated, 2);
    let mut resent: Vec<String> = second
        .document_calls()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    resent.sort();
    assert_eq!(
        resent,
        ["chen_2021_quantum_error_correction.pdf", "garcia_2018_protein_folding.pdf"]
    );

    // One run over everything.
    let single = tempfile::tempdir().unwrap();
    let single_opts = options(single.path(), 2);
    write_sheet(&single_opts.input);
    touch_artifacts(&single_opts.artifact_dir, &all_artifacts());
    let once = Arc::new(ScriptedService::new());
    run_analysis(Arc::clone(&once), &single_opts, Arc::new(SilentProgress))
        .await
        .unwrap();
    assert_eq!(once.document_calls().len(), 4);

    assert_eq!(
        std::fs::read_to_string(&opts.output).unwrap(),
        std::fs::read_to_string(&single_opts.output).unwrap()
    );

    // Nothing left to do.
    let third = Arc::new(ScriptedService::new());
    let summary = run_analysis(Arc::clone(&third), &opts, Arc::new(SilentProgress))
        .await
        .unwrap();
    assert!(third.document_calls().is_empty());
    assert_eq!(summary.evaluated, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_completions_write_one_result_per_item() {
    let dir = tempfile::tempdir().unwrap();
    let opts = options(dir.path(), 4);

    let rows: Vec<Vec<String>> = (0..12)
        .map(|i| sheet_row(&format!("Author{i}, A. ({}). Topic{i} study.", 2000 + i), "https://example.org"))
        .collect();
    write_table(&opts.input, &HEADERS, &rows);
    let names: Vec<String> = (0..12)
        .map(|i| format!("author{i}_{}_topic{i}_study.pdf", 2000 + i))
        .collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    touch_artifacts(&opts.artifact_dir, &name_refs);

    let service = Arc::new(ScriptedService::new().with_delay(|path| {
        let len = path.as_os_str().len() as u64;
        Duration::from_millis(5 + len % 7 * 3)
    }));
    let summary = run_analysis(Arc::clone(&service), &opts, Arc::new(SilentProgress))
        .await
        .unwrap();

    assert_eq!(summary.evaluated, 12);
    assert_eq!(summary.classified, 12);
    assert!(service.max_in_flight() <= 4, "pool exceeded its bound");
    assert!(service.max_in_flight() >= 2, "pool never ran in parallel");

    let mut calls: Vec<_> = service.document_calls();
    calls.sort();
    calls.dedup();
    assert_eq!(calls.len(), 12);

    let output = read_table(&opts.output);
    assert_eq!(output.len(), 12);
    assert_eq!(output.headers().len(), HEADERS.len() + 1);
    for row in output.row_ids() {
        let expected = format!("author{}_{}_topic{}_study.pdf", row.0, 2000 + row.0, row.0);
        assert_eq!(output.cell(row, "Method_Reason"), format!("classified {expected}"));
        assert!(!output.cell(row, "Method").is_empty());
    }
}

#[tokio::test]
async fn unmatched_rows_are_skipped_not_failed() {
    let dir = tempfile::tempdir().unwrap();
    let opts = options(dir.path(), 2);
    write_table(
        &opts.input,
        &HEADERS,
        &[
            sheet_row("Smith, J. (2020). Deep Learning.", "https://example.org"),
            sheet_row("Zz Totally Unrelated", "https://example.org"),
        ],
    );
    touch_artifacts(
        &opts.artifact_dir,
        &["smith_2020_deep_learning.pdf", "jones_2018_graph_theory.pdf"],
    );

    let service = Arc::new(ScriptedService::new());
    let summary = run_analysis(Arc::clone(&service), &opts, Arc::new(SilentProgress))
        .await
        .unwrap();

    assert_eq!(summary.skipped_no_match, 1);
    assert_eq!(service.document_calls().len(), 1);
    let output = read_table(&opts.output);
    assert_ne!(output.cell(RowId(0), "Method"), "");
    assert_eq!(output.cell(RowId(1), "Method"), "");
}

#[tokio::test]
async fn separator_and_online_only_rows_are_never_sent() {
    let dir = tempfile::tempdir().unwrap();
    let opts = options(dir.path(), 2);
    write_sheet(&opts.input);
    // An artifact that would match the online-only row if it were considered.
    touch_artifacts(&opts.artifact_dir, &["brown_2017_deep_learning_survey.pdf"]);

    let service = Arc::new(ScriptedService::new());
    let summary = run_analysis(Arc::clone(&service), &opts, Arc::new(SilentProgress))
        .await
        .unwrap();

    assert_eq!(summary.pending, 4);
    let sent: Vec<String> = service
        .document_calls()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert!(!sent.contains(&"brown_2017_deep_learning_survey.pdf".to_string()));

    let output = read_table(&opts.output);
    assert_eq!(output.cell(RowId(4), "Method"), "---");
    assert_eq!(output.cell(RowId(5), "Method"), "");
}

#[tokio::test]
async fn failed_documents_are_recorded_and_retried_on_request() {
    let dir = tempfile::tempdir().unwrap();
    let mut opts = options(dir.path(), 2);
    write_sheet(&opts.input);
    touch_artifacts(&opts.artifact_dir, &all_artifacts());

    let failing = Arc::new(ScriptedService::new().with_document(|path| {
        if path.ends_with("jones_2019_graph_theory.pdf") {
            Err(ServiceError::IngestFailed("File processing failed".into()))
        } else {
            Ok(common::verdict_for(path))
        }
    }));
    let summary = run_analysis(Arc::clone(&failing), &opts, Arc::new(SilentProgress))
        .await
        .unwrap();
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.classified, 3);

    let output = read_table(&opts.output);
    assert_eq!(output.cell(RowId(1), "Method"), "Error");
    assert!(output.cell(RowId(1), "Method_Reason").contains("File processing failed"));

    // Errors count as resolved unless retry is requested.
    let plain = Arc::new(ScriptedService::new());
    run_analysis(Arc::clone(&plain), &opts, Arc::new(SilentProgress))
        .await
        .unwrap();
    assert!(plain.document_calls().is_empty());

    opts.config.retry_errors = true;
    let retry = Arc::new(ScriptedService::new());
    run_analysis(Arc::clone(&retry), &opts, Arc::new(SilentProgress))
        .await
        .unwrap();
    assert_eq!(retry.document_calls().len(), 1);
    let output = read_table(&opts.output);
    assert_ne!(output.cell(RowId(1), "Method"), "Error");
}

#[tokio::test]
async fn report_lists_category_distribution() {
    let dir = tempfile::tempdir().unwrap();
    let opts = options(dir.path(), 3);
    write_sheet(&opts.input);
    touch_artifacts(&opts.artifact_dir, &all_artifacts());

    let service = Arc::new(
        ScriptedService::new().with_document(|_| {
            Ok(litscreen_shared::DocumentVerdict {
                category: "Category A".into(),
                reason: "same".into(),
            })
        }),
    );
    run_analysis(Arc::clone(&service), &opts, Arc::new(SilentProgress))
        .await
        .unwrap();

    let report = std::fs::read_to_string(&opts.report).unwrap();
    let lines: Vec<&str> = report.lines().collect();
    assert_eq!(lines[0], "Metric,Value");
    assert!(lines.contains(&"Total Papers Evaluated by AI,4"));
    assert!(lines.contains(&"Skipped (No Matching File),0"));
    assert!(lines.contains(&"METHODOLOGY DISTRIBUTION,"));
    assert_eq!(*lines.last().unwrap(), "Category A,4");
}

#[tokio::test]
async fn missing_artifact_directory_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let opts = options(dir.path(), 2);
    write_sheet(&opts.input);

    let service = Arc::new(ScriptedService::new());
    let result = run_analysis(Arc::clone(&service), &opts, Arc::new(SilentProgress)).await;

    assert!(result.is_err());
    assert!(service.document_calls().is_empty());
}

#[tokio::test]
async fn checkpoint_failure_halts_the_pool() {
    let dir = tempfile::tempdir().unwrap();
    let mut opts = options(dir.path(), 1);
    let out_dir = dir.path().join("out");
    std::fs::create_dir(&out_dir).unwrap();
    opts.output = out_dir.join("analyzed.csv");
    write_sheet(&opts.input);
    touch_artifacts(&opts.artifact_dir, &all_artifacts());

    // Replace the output directory with a plain file so the next checkpoint fails.
    let blocker = out_dir.clone();
    let service = Arc::new(ScriptedService::new().with_document(move |path| {
        if blocker.is_dir() {
            std::fs::remove_dir_all(&blocker).unwrap();
            std::fs::write(&blocker, b"not a directory").unwrap();
        }
        Ok(common::verdict_for(path))
    }));

    let result = run_analysis(Arc::clone(&service), &opts, Arc::new(SilentProgress)).await;

    assert!(result.is_err());
    assert_eq!(service.document_calls().len(), 1);
}
