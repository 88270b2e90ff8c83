use async_trait::async_trait;
use chrono::Datelike;
use tracing::error;
use uuid::Uuid;

use crate::api::csv;
use crate::contract::{
    client::{confirm, StudentRecordsApi},
    error::StudentRecordsError,
    model::{
        BulkOutcome, DeletedStudent, NewStudent, PurgeReport, ReconciliationReport, StateFilter,
        Student, StudentPage, StudentPatch, StudentQuery,
    },
};
use crate::domain::{
    error::DomainError, import::ImportReconciler, purge, service::LifecycleEngine, validation,
};

/// Local implementation of the StudentRecordsApi trait that delegates to the domain layer.
///
/// Attribute validation and confirmation tokens are enforced here; the engine
/// below only sees well-formed input.
#[derive(Clone)]
pub struct StudentRecordsLocalClient {
    engine: LifecycleEngine,
    reconciler: ImportReconciler,
}

impl StudentRecordsLocalClient {
    pub fn new(engine: LifecycleEngine) -> Self {
        Self {
            reconciler: ImportReconciler::new(engine.clone()),
            engine,
        }
    }

    fn current_year(&self) -> i32 {
        self.engine.now().year()
    }
}

fn require_confirmation(operation: &str, expected: &str, got: &str) -> Result<(), StudentRecordsError> {
    if got == expected {
        Ok(())
    } else {
        Err(DomainError::confirmation_required(operation, expected).into())
    }
}

/// Apply the default page size and reject sizes outside `1..=MAX_PAGE_SIZE`.
fn checked_page(mut query: StudentQuery) -> Result<StudentQuery, DomainError> {
    let take = query.take.unwrap_or(StudentQuery::DEFAULT_PAGE_SIZE);
    if take == 0 || take > StudentQuery::MAX_PAGE_SIZE {
        return Err(DomainError::validation(
            "limit",
            format!("must be between 1 and {}", StudentQuery::MAX_PAGE_SIZE),
        ));
    }
    query.take = Some(take);
    Ok(query)
}

#[async_trait]
impl StudentRecordsApi for StudentRecordsLocalClient {
    async fn create_student(&self, new_student: NewStudent) -> Result<Student, StudentRecordsError> {
        validation::validate_new_student(&new_student, self.current_year())
            .map_err(DomainError::invalid)?;
        self.engine.create(new_student).await.map_err(Into::into)
    }

    async fn get_student(&self, id: Uuid) -> Result<Student, StudentRecordsError> {
        self.engine.get(id).await.map_err(Into::into)
    }

    async fn update_student(
        &self,
        id: Uuid,
        patch: StudentPatch,
    ) -> Result<Student, StudentRecordsError> {
        validation::validate_patch(&patch, self.current_year()).map_err(DomainError::invalid)?;
        self.engine.update(id, patch).await.map_err(Into::into)
    }

    async fn list_students(&self, filter: StateFilter) -> Result<Vec<Student>, StudentRecordsError> {
        self.engine.list(filter).await.map_err(Into::into)
    }

    async fn find_students(&self, query: StudentQuery) -> Result<StudentPage, StudentRecordsError> {
        let query = checked_page(query)?;
        self.engine.query(&query).await.map_err(Into::into)
    }

    async fn soft_delete_student(&self, id: Uuid) -> Result<Student, StudentRecordsError> {
        self.engine.soft_delete(id).await.map_err(Into::into)
    }

    async fn restore_student(&self, id: Uuid) -> Result<Student, StudentRecordsError> {
        self.engine.restore(id).await.map_err(Into::into)
    }

    async fn hard_delete_student(&self, id: Uuid) -> Result<(), StudentRecordsError> {
        self.engine.hard_delete(id).await.map_err(Into::into)
    }

    async fn bulk_soft_delete(&self, ids: Vec<Uuid>) -> Result<BulkOutcome, StudentRecordsError> {
        self.engine.bulk_soft_delete(&ids).await.map_err(Into::into)
    }

    async fn bulk_restore(&self, ids: Vec<Uuid>) -> Result<BulkOutcome, StudentRecordsError> {
        self.engine.bulk_restore(&ids).await.map_err(Into::into)
    }

    async fn delete_all_active(&self, confirmation: &str) -> Result<u64, StudentRecordsError> {
        require_confirmation("delete_all_active", confirm::DELETE_ALL_ACTIVE, confirmation)?;
        self.engine.delete_all_active().await.map_err(Into::into)
    }

    async fn permanently_delete_all(&self, confirmation: &str) -> Result<u64, StudentRecordsError> {
        require_confirmation(
            "permanently_delete_all",
            confirm::PERMANENTLY_DELETE_ALL,
            confirmation,
        )?;
        self.engine.permanently_delete_all().await.map_err(Into::into)
    }

    async fn restore_all(&self, confirmation: &str) -> Result<u64, StudentRecordsError> {
        require_confirmation("restore_all", confirm::RESTORE_ALL, confirmation)?;
        self.engine.restore_all().await.map_err(Into::into)
    }

    async fn list_deleted(
        &self,
        limit: Option<u64>,
    ) -> Result<Vec<DeletedStudent>, StudentRecordsError> {
        self.engine.list_deleted(limit).await.map_err(Into::into)
    }

    async fn count_expiring(&self) -> Result<u64, StudentRecordsError> {
        self.engine.count_expiring().await.map_err(Into::into)
    }

    async fn import_csv(&self, data: &[u8]) -> Result<ReconciliationReport, StudentRecordsError> {
        let batch = csv::parse_batch(data, self.current_year())
            .map_err(|e| StudentRecordsError::validation(e.to_string()))?;
        self.reconciler.reconcile(batch).await.map_err(Into::into)
    }

    async fn export_csv(&self, query: StudentQuery) -> Result<String, StudentRecordsError> {
        let page = self.engine.query(&query.unpaged()).await?;
        csv::render_students(&page.data).map_err(|e| {
            error!(error = %e, "failed to render CSV export");
            StudentRecordsError::internal()
        })
    }

    async fn purge_expired(&self) -> Result<PurgeReport, StudentRecordsError> {
        purge::run_cycle(&self.engine).await.map_err(Into::into)
    }
}
