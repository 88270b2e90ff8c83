use async_trait::async_trait;
use uuid::Uuid;

use crate::contract::{
    error::StudentRecordsError,
    model::{
        BulkOutcome, DeletedStudent, NewStudent, PurgeReport, ReconciliationReport, StateFilter,
        Student, StudentPage, StudentPatch, StudentQuery,
    },
};

/// Tokens a caller must echo back before a whole-collection operation runs.
pub mod confirm {
    pub const DELETE_ALL_ACTIVE: &str = "DELETE_ALL_STUDENTS";
    pub const PERMANENTLY_DELETE_ALL: &str = "PERMANENTLY_DELETE_ALL_STUDENTS";
    pub const RESTORE_ALL: &str = "RESTORE_ALL_STUDENTS";
}

/// Public API trait for the student_records module that other modules can use
#[async_trait]
pub trait StudentRecordsApi: Send + Sync {
    /// Create a new active student
    async fn create_student(&self, new_student: NewStudent) -> Result<Student, StudentRecordsError>;

    /// Get an active student by ID
    async fn get_student(&self, id: Uuid) -> Result<Student, StudentRecordsError>;

    /// Update an active student with partial data
    async fn update_student(
        &self,
        id: Uuid,
        patch: StudentPatch,
    ) -> Result<Student, StudentRecordsError>;

    /// List students in the given lifecycle states
    async fn list_students(&self, filter: StateFilter) -> Result<Vec<Student>, StudentRecordsError>;

    /// Filter, search, sort and page active students.
    ///
    /// `take` defaults to [`StudentQuery::DEFAULT_PAGE_SIZE`] and must be in
    /// `1..=StudentQuery::MAX_PAGE_SIZE`.
    async fn find_students(&self, query: StudentQuery) -> Result<StudentPage, StudentRecordsError>;

    /// Soft-delete a student (idempotent)
    async fn soft_delete_student(&self, id: Uuid) -> Result<Student, StudentRecordsError>;

    /// Restore a soft-deleted student (idempotent)
    async fn restore_student(&self, id: Uuid) -> Result<Student, StudentRecordsError>;

    /// Permanently remove a student
    async fn hard_delete_student(&self, id: Uuid) -> Result<(), StudentRecordsError>;

    /// Soft-delete many students, skipping missing and protected ones
    async fn bulk_soft_delete(&self, ids: Vec<Uuid>) -> Result<BulkOutcome, StudentRecordsError>;

    /// Restore many students, skipping missing ones
    async fn bulk_restore(&self, ids: Vec<Uuid>) -> Result<BulkOutcome, StudentRecordsError>;

    /// Soft-delete every active, unprotected student. Requires [`confirm::DELETE_ALL_ACTIVE`].
    async fn delete_all_active(&self, confirmation: &str) -> Result<u64, StudentRecordsError>;

    /// Purge every unprotected student. Requires [`confirm::PERMANENTLY_DELETE_ALL`].
    async fn permanently_delete_all(&self, confirmation: &str) -> Result<u64, StudentRecordsError>;

    /// Restore every soft-deleted student. Requires [`confirm::RESTORE_ALL`].
    async fn restore_all(&self, confirmation: &str) -> Result<u64, StudentRecordsError>;

    /// Soft-deleted students, most recently deleted first
    async fn list_deleted(
        &self,
        limit: Option<u64>,
    ) -> Result<Vec<DeletedStudent>, StudentRecordsError>;

    /// Soft-deleted students already past retention, i.e. what the next purge cycle would take
    async fn count_expiring(&self) -> Result<u64, StudentRecordsError>;

    /// Parse, validate and reconcile a CSV upload
    async fn import_csv(&self, data: &[u8]) -> Result<ReconciliationReport, StudentRecordsError>;

    /// Render active students matching the query's filters and order as CSV.
    /// Paging is ignored.
    async fn export_csv(&self, query: StudentQuery) -> Result<String, StudentRecordsError>;

    /// Run one retention purge cycle now
    async fn purge_expired(&self) -> Result<PurgeReport, StudentRecordsError>;
}
