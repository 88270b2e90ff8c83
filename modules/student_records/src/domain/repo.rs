use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::contract::model::{StateFilter, Student, StudentPage, StudentQuery};

/// Port for the domain layer: persistence operations the lifecycle needs.
/// Object-safe and async-friendly via `async_trait`.
///
/// Single-record transitions are keyed by id and conditioned on the current
/// state, so two concurrent callers cannot both apply the same transition.
#[async_trait]
pub trait StudentsRepository: Send + Sync {
    /// Insert a fully-formed record.
    ///
    /// Service computes id/timestamps; repo persists.
    async fn insert(&self, student: Student) -> anyhow::Result<Student>;

    /// Insert many records in one call. Returns the number written.
    async fn bulk_insert(&self, students: Vec<Student>) -> anyhow::Result<u64>;

    /// Load a record by id; soft-deleted records only when `include_deleted`.
    async fn find_by_id(&self, id: Uuid, include_deleted: bool) -> anyhow::Result<Option<Student>>;

    /// Records whose email is one of `emails`, restricted by `filter`.
    async fn find_by_emails(
        &self,
        emails: &[String],
        filter: StateFilter,
    ) -> anyhow::Result<Vec<Student>>;

    /// Every record matching `filter`, oldest first.
    async fn find_all(&self, filter: StateFilter) -> anyhow::Result<Vec<Student>>;

    /// Active records matching `query`, ordered and paged, with the total
    /// number of matches before paging.
    async fn query(&self, query: &StudentQuery) -> anyhow::Result<StudentPage>;

    /// Overwrite an active record's email, profile and `updated_at`.
    /// `None` when no active record has this id.
    async fn update(&self, student: Student) -> anyhow::Result<Option<Student>>;

    /// Mark an active record deleted at `at`.
    /// `None` when no active record has this id.
    async fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> anyhow::Result<Option<Student>>;

    /// Clear the deleted marker of a soft-deleted record.
    /// `None` when no soft-deleted record has this id.
    async fn restore(&self, id: Uuid, at: DateTime<Utc>) -> anyhow::Result<Option<Student>>;

    /// Restore a soft-deleted record and overwrite its email, profile and
    /// `updated_at` in the same write.
    /// `None` when no soft-deleted record has this id.
    async fn restore_with(&self, student: Student) -> anyhow::Result<Option<Student>>;

    /// Remove a record permanently. Returns true if a row was deleted.
    async fn hard_delete(&self, id: Uuid) -> anyhow::Result<bool>;

    /// Remove a record only if it is still soft-deleted with
    /// `deleted_at <= cutoff`. Returns true if a row was deleted.
    ///
    /// The state check and the delete are one statement, so a restore that
    /// lands after the caller's own checks keeps the record.
    async fn purge_expired(&self, id: Uuid, cutoff: DateTime<Utc>) -> anyhow::Result<bool>;

    /// Soft-deleted records, most recently deleted first.
    async fn list_deleted(&self, limit: u64) -> anyhow::Result<Vec<Student>>;

    /// Soft-deleted records with `deleted_at <= cutoff`.
    async fn find_deleted_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<Vec<Student>>;

    /// Count of soft-deleted records with `deleted_at <= cutoff`.
    async fn count_deleted_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64>;
}
