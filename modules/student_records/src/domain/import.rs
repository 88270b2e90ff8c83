//! Reconciliation of validated import batches against stored records.
//!
//! # Invariants
//! - Rows are classified in input order; the first row to claim an email wins.
//! - Every row ends up in exactly one bucket of the report.
//! - Classification uses two repository lookups per batch, never one per row.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::contract::model::{
    DuplicateRow, NewStudent, ReconciliationReport, RowFailure, RowValidationError, StateFilter,
    Student,
};
use crate::domain::error::DomainError;
use crate::domain::events::StudentDomainEvent;
use crate::domain::service::LifecycleEngine;

/// Row that passed schema validation, with its original 1-based index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRow {
    pub row_index: usize,
    pub student: NewStudent,
}

/// Output of the validation layer handed to the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportBatch {
    pub rows: Vec<ValidatedRow>,
    pub validation_errors: Vec<RowValidationError>,
}

impl ImportBatch {
    pub fn total_rows(&self) -> usize {
        self.rows.len() + self.validation_errors.len()
    }
}

/// Why a row was rejected as a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateOf {
    /// An active stored record already owns the email.
    ActiveRecord(Uuid),
    /// An earlier row of the same batch claimed the email.
    EarlierRow,
}

/// Classification of one validated row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowDecision {
    Insert,
    Restore { target: Uuid },
    Duplicate(DuplicateOf),
}

/// Classify rows against the active and soft-deleted records sharing their emails.
///
/// Pure function of its inputs. When several soft-deleted records share an
/// email, the most recently deleted one is the restore target.
pub fn classify(rows: &[ValidatedRow], active: &[Student], deleted: &[Student]) -> Vec<RowDecision> {
    let active_by_email: HashMap<&str, Uuid> = active
        .iter()
        .filter(|s| s.is_active())
        .filter_map(|s| s.email.as_deref().map(|e| (e, s.id)))
        .collect();

    let mut deleted_by_email: HashMap<&str, &Student> = HashMap::new();
    for student in deleted.iter().filter(|s| s.state.is_soft_deleted()) {
        let Some(email) = student.email.as_deref() else {
            continue;
        };
        deleted_by_email
            .entry(email)
            .and_modify(|current| {
                if student.deleted_at() > current.deleted_at() {
                    *current = student;
                }
            })
            .or_insert(student);
    }

    let mut seen: HashSet<&str> = HashSet::new();
    rows.iter()
        .map(|row| {
            let Some(email) = row.student.email.as_deref() else {
                return RowDecision::Insert;
            };
            if let Some(&id) = active_by_email.get(email) {
                return RowDecision::Duplicate(DuplicateOf::ActiveRecord(id));
            }
            if !seen.insert(email) {
                return RowDecision::Duplicate(DuplicateOf::EarlierRow);
            }
            match deleted_by_email.get(email) {
                Some(target) => RowDecision::Restore { target: target.id },
                None => RowDecision::Insert,
            }
        })
        .collect()
}

/// Drives the lifecycle engine to apply a classified batch.
#[derive(Clone)]
pub struct ImportReconciler {
    engine: LifecycleEngine,
}

impl ImportReconciler {
    pub fn new(engine: LifecycleEngine) -> Self {
        Self { engine }
    }

    /// Reconcile a validated batch and report what happened to every row.
    ///
    /// Inserts are written first in one bulk call; a failure there aborts the
    /// batch before anything was changed. Restores are applied one by one and
    /// a failing restore is reported without stopping the batch.
    #[instrument(
        name = "student_records.import.reconcile",
        skip(self, batch),
        fields(rows = batch.rows.len(), invalid = batch.validation_errors.len())
    )]
    pub async fn reconcile(&self, batch: ImportBatch) -> Result<ReconciliationReport, DomainError> {
        let ImportBatch {
            rows,
            validation_errors,
        } = batch;

        let mut report = ReconciliationReport {
            total_rows: rows.len() + validation_errors.len(),
            invalid_count: validation_errors.len() as u64,
            validation_errors,
            ..Default::default()
        };

        let emails = collect_emails(&rows);
        let (active, deleted) = if emails.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            let active = self
                .engine
                .find_by_emails(&emails, StateFilter::Active)
                .await?;
            let deleted = self
                .engine
                .find_by_emails(&emails, StateFilter::Deleted)
                .await?;
            (active, deleted)
        };
        debug!(
            emails = emails.len(),
            active_matches = active.len(),
            deleted_matches = deleted.len(),
            "loaded existing records for batch"
        );

        let decisions = classify(&rows, &active, &deleted);
        let deleted_by_id: HashMap<Uuid, &Student> = deleted.iter().map(|s| (s.id, s)).collect();

        let mut inserts = Vec::new();
        let mut restores = Vec::new();
        for (row, decision) in rows.into_iter().zip(decisions) {
            match decision {
                RowDecision::Insert => inserts.push(row),
                RowDecision::Restore { target } => restores.push((row, target)),
                RowDecision::Duplicate(_) => report.duplicates.push(DuplicateRow {
                    row_index: row.row_index,
                    email: row.student.email.unwrap_or_default(),
                    full_name: row.student.profile.full_name,
                }),
            }
        }
        report.duplicate_count = report.duplicates.len() as u64;

        let expected = inserts.len() as u64;
        let written = self
            .engine
            .bulk_create(inserts.into_iter().map(|r| r.student).collect())
            .await?;
        if written != expected {
            warn!(expected, written, "bulk insert wrote an unexpected number of rows");
        }
        report.inserted_count = written;

        for (row, target) in restores {
            let email = row.student.email.clone();
            let Some(existing) = deleted_by_id.get(&target) else {
                continue;
            };
            match self.engine.restore_with_update(existing, row.student).await {
                Ok(_) => report.restored_count += 1,
                Err(e) => {
                    warn!(row_index = row.row_index, student_id = %target, error = %e, "restore failed");
                    report.failures.push(RowFailure {
                        row_index: row.row_index,
                        email,
                        message: e.to_string(),
                    });
                }
            }
        }

        self.engine.publish(&StudentDomainEvent::Imported {
            inserted: report.inserted_count,
            restored: report.restored_count,
            at: self.engine.now(),
        });
        info!(
            inserted = report.inserted_count,
            restored = report.restored_count,
            duplicates = report.duplicate_count,
            invalid = report.invalid_count,
            failed = report.failed_count(),
            "import batch reconciled"
        );
        Ok(report)
    }
}

fn collect_emails(rows: &[ValidatedRow]) -> Vec<String> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|r| r.student.email.as_deref())
        .filter(|e| seen.insert(*e))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::model::{LifecycleState, StudentProfile, StudentStatus};
    use chrono::{Duration, NaiveDate, Utc};

    fn profile(name: &str) -> StudentProfile {
        StudentProfile {
            full_name: name.into(),
            faculty: "History".into(),
            group: "HS-20".into(),
            phone: None,
            birth_date: NaiveDate::from_ymd_opt(2002, 9, 1).unwrap(),
            enrollment_year: 2020,
            status: StudentStatus::Active,
        }
    }

    fn row(idx: usize, email: Option<&str>) -> ValidatedRow {
        ValidatedRow {
            row_index: idx,
            student: NewStudent {
                email: email.map(str::to_string),
                profile: profile("Row Student"),
            },
        }
    }

    fn stored(email: &str, state: LifecycleState) -> Student {
        let now = Utc::now();
        Student {
            id: Uuid::new_v4(),
            email: Some(email.into()),
            profile: profile("Stored Student"),
            state,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn rows_without_email_always_insert() {
        let rows = vec![row(1, None), row(2, None)];
        assert_eq!(
            classify(&rows, &[], &[]),
            vec![RowDecision::Insert, RowDecision::Insert]
        );
    }

    #[test]
    fn active_match_wins_over_soft_deleted_match() {
        let active = stored("a@x.uz", LifecycleState::Active);
        let deleted = stored(
            "a@x.uz",
            LifecycleState::SoftDeleted {
                since: Utc::now(),
            },
        );
        let rows = vec![row(1, Some("a@x.uz"))];
        assert_eq!(
            classify(&rows, &[active.clone()], &[deleted]),
            vec![RowDecision::Duplicate(DuplicateOf::ActiveRecord(active.id))]
        );
    }

    #[test]
    fn second_claim_of_a_restorable_email_is_a_duplicate() {
        let deleted = stored(
            "b@x.uz",
            LifecycleState::SoftDeleted {
                since: Utc::now(),
            },
        );
        let rows = vec![row(1, Some("b@x.uz")), row(2, Some("b@x.uz"))];
        assert_eq!(
            classify(&rows, &[], &[deleted.clone()]),
            vec![
                RowDecision::Restore { target: deleted.id },
                RowDecision::Duplicate(DuplicateOf::EarlierRow),
            ]
        );
    }

    #[test]
    fn most_recently_deleted_record_is_revived() {
        let now = Utc::now();
        let older = stored(
            "c@x.uz",
            LifecycleState::SoftDeleted {
                since: now - Duration::days(10),
            },
        );
        let newer = stored(
            "c@x.uz",
            LifecycleState::SoftDeleted {
                since: now - Duration::days(1),
            },
        );
        let rows = vec![row(1, Some("c@x.uz"))];
        assert_eq!(
            classify(&rows, &[], &[older, newer.clone()]),
            vec![RowDecision::Restore { target: newer.id }]
        );
    }

    #[test]
    fn collect_emails_dedupes_and_skips_missing() {
        let rows = vec![
            row(1, Some("a@x.uz")),
            row(2, None),
            row(3, Some("a@x.uz")),
            row(4, Some("b@x.uz")),
        ];
        assert_eq!(collect_emails(&rows), vec!["a@x.uz", "b@x.uz"]);
    }
}
