use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::contract::model::{
    BulkOutcome, DeletedStudent, LifecycleState, NewStudent, StateFilter, Student, StudentPage,
    StudentPatch, StudentQuery,
};
use crate::domain::clock::Clock;
use crate::domain::error::DomainError;
use crate::domain::events::StudentDomainEvent;
use crate::domain::ports::EventPublisher;
use crate::domain::protection::ProtectionGuard;
use crate::domain::repo::StudentsRepository;

const SECONDS_PER_DAY: i64 = 86_400;

/// Lifecycle engine: the only component that moves records between
/// `Active`, `SoftDeleted` and purged.
///
/// Depends only on ports, not on infra types. Every delete-class transition
/// consults the [`ProtectionGuard`] first and performs no write when it
/// reports the record as protected.
#[derive(Clone)]
pub struct LifecycleEngine {
    repo: Arc<dyn StudentsRepository>,
    guard: Arc<dyn ProtectionGuard>,
    events: Arc<dyn EventPublisher<StudentDomainEvent>>,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
}

/// Configuration for the lifecycle engine
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub retention_days: u32,
    pub deleted_listing_limit: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            retention_days: 30,
            deleted_listing_limit: 10_000,
        }
    }
}

impl ServiceConfig {
    pub fn retention(&self) -> Duration {
        Duration::days(i64::from(self.retention_days))
    }
}

/// Result of a single-record transition: whether a write actually happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Transition {
    Applied(Student),
    Unchanged(Student),
}

impl Transition {
    fn into_student(self) -> Student {
        match self {
            Transition::Applied(s) | Transition::Unchanged(s) => s,
        }
    }

    fn applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }
}

fn db_err(e: anyhow::Error) -> DomainError {
    DomainError::database(format!("{e:#}"))
}

impl LifecycleEngine {
    /// Create an engine with dependencies.
    pub fn new(
        repo: Arc<dyn StudentsRepository>,
        guard: Arc<dyn ProtectionGuard>,
        events: Arc<dyn EventPublisher<StudentDomainEvent>>,
        clock: Arc<dyn Clock>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            repo,
            guard,
            events,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Records soft-deleted at or before the returned instant are past retention.
    pub fn retention_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.config.retention()
    }

    // --- create / read / update ---

    #[instrument(
        name = "student_records.lifecycle.create",
        skip(self, new_student),
        fields(email = ?new_student.email)
    )]
    pub async fn create(&self, new_student: NewStudent) -> Result<Student, DomainError> {
        let now = self.clock.now();
        let student = Student {
            id: Uuid::new_v4(),
            email: new_student.email,
            profile: new_student.profile,
            state: LifecycleState::Active,
            created_at: now,
            updated_at: now,
        };

        let stored = self.repo.insert(student).await.map_err(db_err)?;

        self.events.publish(&StudentDomainEvent::Created {
            id: stored.id,
            at: stored.created_at,
        });
        info!(student_id = %stored.id, "student created");
        Ok(stored)
    }

    /// Active record by id.
    #[instrument(name = "student_records.lifecycle.get", skip(self), fields(student_id = %id))]
    pub async fn get(&self, id: Uuid) -> Result<Student, DomainError> {
        self.repo
            .find_by_id(id, false)
            .await
            .map_err(db_err)?
            .ok_or_else(|| DomainError::student_not_found(id))
    }

    /// Record by id in either lifecycle state.
    pub async fn get_any(&self, id: Uuid) -> Result<Student, DomainError> {
        self.repo
            .find_by_id(id, true)
            .await
            .map_err(db_err)?
            .ok_or_else(|| DomainError::student_not_found(id))
    }

    #[instrument(name = "student_records.lifecycle.update", skip(self, patch), fields(student_id = %id))]
    pub async fn update(&self, id: Uuid, patch: StudentPatch) -> Result<Student, DomainError> {
        let mut current = self.get(id).await?;
        if patch.is_empty() {
            return Ok(current);
        }

        if let Some(email) = patch.email {
            current.email = Some(email);
        }
        let profile = &mut current.profile;
        if let Some(full_name) = patch.full_name {
            profile.full_name = full_name;
        }
        if let Some(faculty) = patch.faculty {
            profile.faculty = faculty;
        }
        if let Some(group) = patch.group {
            profile.group = group;
        }
        if let Some(phone) = patch.phone {
            profile.phone = Some(phone);
        }
        if let Some(birth_date) = patch.birth_date {
            profile.birth_date = birth_date;
        }
        if let Some(year) = patch.enrollment_year {
            profile.enrollment_year = year;
        }
        if let Some(status) = patch.status {
            profile.status = status;
        }
        current.updated_at = self.clock.now();

        let updated = self
            .repo
            .update(current)
            .await
            .map_err(db_err)?
            .ok_or_else(|| DomainError::student_not_found(id))?;

        self.events.publish(&StudentDomainEvent::Updated {
            id,
            at: updated.updated_at,
        });
        Ok(updated)
    }

    pub async fn list(&self, filter: StateFilter) -> Result<Vec<Student>, DomainError> {
        self.repo.find_all(filter).await.map_err(db_err)
    }

    /// Active records matching `query`, one page at a time.
    #[instrument(name = "student_records.lifecycle.query", skip(self, query), fields(offset = query.skip, limit = ?query.take))]
    pub async fn query(&self, query: &StudentQuery) -> Result<StudentPage, DomainError> {
        let page = self.repo.query(query).await.map_err(db_err)?;
        debug!(total = page.total, returned = page.data.len(), "student query served");
        Ok(page)
    }

    /// Soft-deleted records, most recently deleted first, with their purge date.
    #[instrument(name = "student_records.lifecycle.list_deleted", skip(self))]
    pub async fn list_deleted(&self, limit: Option<u64>) -> Result<Vec<DeletedStudent>, DomainError> {
        let limit = limit.unwrap_or(self.config.deleted_listing_limit);
        let rows = self.repo.list_deleted(limit).await.map_err(db_err)?;
        let now = self.clock.now();
        let retention = self.config.retention();

        Ok(rows
            .into_iter()
            .filter_map(|student| {
                let deleted_at = student.deleted_at()?;
                let purge_at = deleted_at + retention;
                Some(DeletedStudent {
                    days_remaining: days_until(now, purge_at),
                    deleted_at,
                    purge_at,
                    student,
                })
            })
            .collect())
    }

    /// Soft-deleted records that the next purge cycle would consider.
    pub async fn count_expiring(&self) -> Result<u64, DomainError> {
        let cutoff = self.retention_cutoff(self.clock.now());
        self.repo.count_deleted_before(cutoff).await.map_err(db_err)
    }

    // --- single-record transitions ---

    #[instrument(name = "student_records.lifecycle.soft_delete", skip(self), fields(student_id = %id))]
    pub async fn soft_delete(&self, id: Uuid) -> Result<Student, DomainError> {
        self.soft_delete_inner(id).await.map(Transition::into_student)
    }

    #[instrument(name = "student_records.lifecycle.restore", skip(self), fields(student_id = %id))]
    pub async fn restore(&self, id: Uuid) -> Result<Student, DomainError> {
        self.restore_inner(id).await.map(Transition::into_student)
    }

    /// Irreversibly remove a record, whatever its state.
    #[instrument(name = "student_records.lifecycle.hard_delete", skip(self), fields(student_id = %id))]
    pub async fn hard_delete(&self, id: Uuid) -> Result<(), DomainError> {
        let current = self.get_any(id).await?;
        self.ensure_unprotected(&current).await?;
        self.remove(id).await
    }

    /// Purge a record only if it is still soft-deleted at or before `cutoff`.
    /// Returns false when the record no longer qualifies.
    pub(crate) async fn purge_if_expired(
        &self,
        id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let current = self.get_any(id).await?;
        match current.deleted_at() {
            Some(deleted_at) if deleted_at <= cutoff => {}
            _ => {
                debug!(student_id = %id, "record no longer expired; skipping purge");
                return Ok(false);
            }
        }
        self.ensure_unprotected(&current).await?;

        let purged = self
            .repo
            .purge_expired(id, cutoff)
            .await
            .map_err(db_err)?;
        if !purged {
            debug!(student_id = %id, "record restored or removed before purge; skipping");
            return Ok(false);
        }
        self.record_purge(id);
        Ok(true)
    }

    // --- bulk transitions ---

    /// Soft-delete each id; missing and protected ids are skipped.
    #[instrument(name = "student_records.lifecycle.bulk_soft_delete", skip(self, ids), fields(requested = ids.len()))]
    pub async fn bulk_soft_delete(&self, ids: &[Uuid]) -> Result<BulkOutcome, DomainError> {
        let mut outcome = BulkOutcome {
            requested: ids.len(),
            ..Default::default()
        };
        for &id in ids {
            match self.soft_delete_inner(id).await {
                Ok(t) if t.applied() => outcome.succeeded += 1,
                Ok(_) => {}
                Err(DomainError::StudentNotFound { .. }) => outcome.not_found.push(id),
                Err(DomainError::Protected { .. }) => outcome.protected.push(id),
                Err(e) => return Err(e),
            }
        }
        info!(
            succeeded = outcome.succeeded,
            skipped = outcome.skipped(),
            "bulk soft delete finished"
        );
        Ok(outcome)
    }

    /// Restore each id; missing ids are skipped.
    #[instrument(name = "student_records.lifecycle.bulk_restore", skip(self, ids), fields(requested = ids.len()))]
    pub async fn bulk_restore(&self, ids: &[Uuid]) -> Result<BulkOutcome, DomainError> {
        let mut outcome = BulkOutcome {
            requested: ids.len(),
            ..Default::default()
        };
        for &id in ids {
            match self.restore_inner(id).await {
                Ok(t) if t.applied() => outcome.succeeded += 1,
                Ok(_) => {}
                Err(DomainError::StudentNotFound { .. }) => outcome.not_found.push(id),
                Err(e) => return Err(e),
            }
        }
        Ok(outcome)
    }

    /// Soft-delete every active, unprotected record.
    #[instrument(name = "student_records.lifecycle.delete_all_active", skip(self))]
    pub async fn delete_all_active(&self) -> Result<u64, DomainError> {
        let active = self.list(StateFilter::Active).await?;
        let mut count = 0;
        for student in active {
            match self.soft_delete_inner(student.id).await {
                Ok(t) if t.applied() => count += 1,
                Ok(_) => {}
                Err(e) if e.is_item_error() => debug!(student_id = %student.id, error = %e, "skipped"),
                Err(e) => return Err(e),
            }
        }
        info!(count, "soft-deleted all active students");
        Ok(count)
    }

    /// Hard-delete every unprotected record, active or soft-deleted.
    #[instrument(name = "student_records.lifecycle.permanently_delete_all", skip(self))]
    pub async fn permanently_delete_all(&self) -> Result<u64, DomainError> {
        let all = self.list(StateFilter::Any).await?;
        let mut count = 0;
        for student in all {
            match self.hard_delete(student.id).await {
                Ok(()) => count += 1,
                Err(e) if e.is_item_error() => debug!(student_id = %student.id, error = %e, "skipped"),
                Err(e) => return Err(e),
            }
        }
        warn!(count, "permanently deleted all unprotected students");
        Ok(count)
    }

    /// Restore every soft-deleted record.
    #[instrument(name = "student_records.lifecycle.restore_all", skip(self))]
    pub async fn restore_all(&self) -> Result<u64, DomainError> {
        let deleted = self.list(StateFilter::Deleted).await?;
        let mut count = 0;
        for student in deleted {
            match self.restore_inner(student.id).await {
                Ok(t) if t.applied() => count += 1,
                Ok(_) => {}
                Err(e) if e.is_item_error() => debug!(student_id = %student.id, error = %e, "skipped"),
                Err(e) => return Err(e),
            }
        }
        info!(count, "restored all soft-deleted students");
        Ok(count)
    }

    /// Soft-deleted records with `deleted_at <= cutoff`.
    pub(crate) async fn expired_candidates(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Student>, DomainError> {
        self.repo.find_deleted_before(cutoff).await.map_err(db_err)
    }

    // --- import support ---

    pub(crate) async fn find_by_emails(
        &self,
        emails: &[String],
        filter: StateFilter,
    ) -> Result<Vec<Student>, DomainError> {
        self.repo.find_by_emails(emails, filter).await.map_err(db_err)
    }

    pub(crate) fn publish(&self, event: &StudentDomainEvent) {
        self.events.publish(event);
    }

    /// Insert new active records in one repository call.
    pub(crate) async fn bulk_create(&self, rows: Vec<NewStudent>) -> Result<u64, DomainError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let now = self.clock.now();
        let students: Vec<Student> = rows
            .into_iter()
            .map(|row| Student {
                id: Uuid::new_v4(),
                email: row.email,
                profile: row.profile,
                state: LifecycleState::Active,
                created_at: now,
                updated_at: now,
            })
            .collect();
        let ids: Vec<Uuid> = students.iter().map(|s| s.id).collect();

        let written = self.repo.bulk_insert(students).await.map_err(db_err)?;
        for id in ids {
            self.events
                .publish(&StudentDomainEvent::Created { id, at: now });
        }
        Ok(written)
    }

    /// Revive a soft-deleted record with new attributes in one write.
    pub(crate) async fn restore_with_update(
        &self,
        existing: &Student,
        data: NewStudent,
    ) -> Result<Student, DomainError> {
        let now = self.clock.now();
        let revived = Student {
            id: existing.id,
            email: data.email,
            profile: data.profile,
            state: LifecycleState::Active,
            created_at: existing.created_at,
            updated_at: now,
        };

        let restored = self
            .repo
            .restore_with(revived)
            .await
            .map_err(db_err)?
            .ok_or_else(|| DomainError::student_not_found(existing.id))?;

        self.events.publish(&StudentDomainEvent::Restored {
            id: restored.id,
            at: now,
        });
        Ok(restored)
    }

    // --- internals ---

    async fn soft_delete_inner(&self, id: Uuid) -> Result<Transition, DomainError> {
        let current = self.get_any(id).await?;
        self.ensure_unprotected(&current).await?;

        if current.state.is_soft_deleted() {
            debug!(student_id = %id, "already soft-deleted");
            return Ok(Transition::Unchanged(current));
        }

        let now = self.clock.now();
        match self.repo.soft_delete(id, now).await.map_err(db_err)? {
            Some(deleted) => {
                self.events
                    .publish(&StudentDomainEvent::SoftDeleted { id, at: now });
                info!(student_id = %id, "student soft-deleted");
                Ok(Transition::Applied(deleted))
            }
            // Lost a race with another transition of the same id.
            None => self.get_any(id).await.map(Transition::Unchanged),
        }
    }

    async fn restore_inner(&self, id: Uuid) -> Result<Transition, DomainError> {
        let current = self.get_any(id).await?;
        if current.is_active() {
            debug!(student_id = %id, "already active");
            return Ok(Transition::Unchanged(current));
        }

        let now = self.clock.now();
        match self.repo.restore(id, now).await.map_err(db_err)? {
            Some(restored) => {
                self.events
                    .publish(&StudentDomainEvent::Restored { id, at: now });
                info!(student_id = %id, "student restored");
                Ok(Transition::Applied(restored))
            }
            None => self.get_any(id).await.map(Transition::Unchanged),
        }
    }

    async fn remove(&self, id: Uuid) -> Result<(), DomainError> {
        let deleted = self.repo.hard_delete(id).await.map_err(db_err)?;
        if !deleted {
            return Err(DomainError::student_not_found(id));
        }
        self.record_purge(id);
        Ok(())
    }

    fn record_purge(&self, id: Uuid) {
        self.events.publish(&StudentDomainEvent::Purged {
            id,
            at: self.clock.now(),
        });
        info!(student_id = %id, "student purged");
    }

    async fn ensure_unprotected(&self, student: &Student) -> Result<(), DomainError> {
        let protected = self
            .guard
            .is_protected(student)
            .await
            .map_err(|e| DomainError::database(format!("protection lookup failed: {e:#}")))?;
        if protected {
            warn!(student_id = %student.id, "refusing transition of protected student");
            return Err(DomainError::protected(student.id));
        }
        Ok(())
    }
}

/// Whole days from `now` until `at`, rounded up. Zero or negative once passed.
fn days_until(now: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
    let secs = (at - now).num_seconds();
    if secs > 0 {
        (secs + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
    } else {
        secs / SECONDS_PER_DAY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn days_until_rounds_up_partial_days() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(days_until(now, now + Duration::hours(1)), 1);
        assert_eq!(days_until(now, now + Duration::days(7)), 7);
        assert_eq!(days_until(now, now + Duration::days(7) + Duration::seconds(1)), 8);
    }

    #[test]
    fn days_until_is_non_positive_once_expired() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(days_until(now, now), 0);
        assert_eq!(days_until(now, now - Duration::hours(5)), 0);
        assert_eq!(days_until(now, now - Duration::days(2)), -2);
    }

    #[test]
    fn default_config_uses_thirty_day_retention() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.retention_days, 30);
        assert_eq!(cfg.retention(), Duration::days(30));
        assert_eq!(cfg.deleted_listing_limit, 10_000);
    }
}
