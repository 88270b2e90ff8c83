//! Verifies that lifecycle operations emit the expected spans and log lines.

mod common;

use chrono::Duration;
use tracing_test::traced_test;

use common::*;
use student_records::domain::import::{ImportBatch, ImportReconciler, ValidatedRow};
use student_records::domain::purge::run_cycle;

#[traced_test]
#[tokio::test]
async fn soft_delete_emits_span_with_student_id() {
    let h = harness(&[]);
    let s = h.engine.create(new_student("Traced", None)).await.unwrap();

    h.engine.soft_delete(s.id).await.unwrap();

    assert!(logs_contain("student_records.lifecycle.soft_delete"));
    assert!(logs_contain(&s.id.to_string()));
    assert!(logs_contain("student soft-deleted"));
}

#[traced_test]
#[tokio::test]
async fn refused_transition_is_logged_as_warning() {
    let h = harness(&["admin@uni.uz"]);
    let s = h
        .engine
        .create(new_student("Admin", Some("admin@uni.uz")))
        .await
        .unwrap();

    assert!(h.engine.soft_delete(s.id).await.is_err());

    assert!(logs_contain("refusing transition of protected student"));
}

#[traced_test]
#[tokio::test]
async fn import_logs_summary() {
    let h = harness(&[]);
    let reconciler = ImportReconciler::new(h.engine.clone());

    reconciler
        .reconcile(ImportBatch {
            rows: vec![ValidatedRow {
                row_index: 1,
                student: new_student("Imported", Some("i@uni.uz")),
            }],
            validation_errors: vec![],
        })
        .await
        .unwrap();

    assert!(logs_contain("student_records.import.reconcile"));
    assert!(logs_contain("import batch reconciled"));
}

#[traced_test]
#[tokio::test]
async fn purge_failure_on_one_record_is_logged() {
    let h = harness(&[]);
    let stuck = stored_student("Stuck", None, deleted_since(t0() - Duration::days(45)));
    h.repo.seed(stuck.clone());
    h.repo.fail_hard_delete_for(stuck.id);

    let report = run_cycle(&h.engine).await.unwrap();

    assert_eq!(report.failed, 1);
    assert!(logs_contain("failed to purge student"));
    assert!(logs_contain("purge cycle finished"));
}
