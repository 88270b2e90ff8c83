//! SeaORM-backed implementation of [`StudentsRepository`].
//!
//! Generic over the connection so it can run on a `DatabaseConnection` or
//! inside a `DatabaseTransaction`. Lifecycle transitions are single
//! conditional `UPDATE`s on `deleted_at`, so a lost race shows up as zero
//! affected rows instead of a silent overwrite.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Func, LikeExpr, SimpleExpr};
use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, Order,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, TransactionTrait,
};
use uuid::Uuid;

use crate::contract::model::{
    SortDir, SortField, StateFilter, Student, StudentPage, StudentQuery,
};
use crate::domain::repo::StudentsRepository;
use crate::infra::storage::entity::{Column, Entity as StudentEntity};
use crate::infra::storage::mapper::{rows_to_students, to_active_model};

/// Rows per multi-row INSERT; keeps bound parameters under SQLite's limit.
const INSERT_CHUNK_ROWS: usize = 500;
/// Emails per `IN (...)` lookup.
const LOOKUP_CHUNK: usize = 500;

pub struct SeaOrmStudentsRepository<C>
where
    C: ConnectionTrait + TransactionTrait + Send + Sync,
{
    conn: C,
}

impl<C> SeaOrmStudentsRepository<C>
where
    C: ConnectionTrait + TransactionTrait + Send + Sync,
{
    pub fn new(conn: C) -> Self {
        Self { conn }
    }
}

fn with_state(query: Select<StudentEntity>, filter: StateFilter) -> Select<StudentEntity> {
    match filter {
        StateFilter::Active => query.filter(Column::DeletedAt.is_null()),
        StateFilter::Deleted => query.filter(Column::DeletedAt.is_not_null()),
        StateFilter::Any => query,
    }
}

fn sort_column(field: SortField) -> Column {
    match field {
        SortField::FullName => Column::FullName,
        SortField::Email => Column::Email,
        SortField::Faculty => Column::Faculty,
        SortField::Group => Column::Group,
        SortField::Phone => Column::Phone,
        SortField::BirthDate => Column::BirthDate,
        SortField::EnrollmentYear => Column::EnrollmentYear,
        SortField::Status => Column::Status,
        SortField::CreatedAt => Column::CreatedAt,
        SortField::UpdatedAt => Column::UpdatedAt,
    }
}

/// `%term%` with LIKE wildcards in `term` escaped by `\`.
fn contains_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

fn lower_like(col: Column, pattern: &str) -> SimpleExpr {
    Expr::expr(Func::lower(Expr::col(col))).like(LikeExpr::new(pattern).escape('\\'))
}

/// Active records passing every filter of `query`, ordered, not paged.
fn filtered(query: &StudentQuery) -> Select<StudentEntity> {
    let mut select = with_state(StudentEntity::find(), StateFilter::Active);
    if let Some(faculty) = &query.faculty {
        select = select.filter(Column::Faculty.eq(faculty.as_str()));
    }
    if let Some(group) = &query.group {
        select = select.filter(Column::Group.eq(group.as_str()));
    }
    if let Some(status) = query.status {
        select = select.filter(Column::Status.eq(status.as_str()));
    }
    if let Some(term) = query.search_term() {
        let pattern = contains_pattern(&term);
        select = select.filter(
            Condition::any()
                .add(lower_like(Column::FullName, &pattern))
                .add(lower_like(Column::Email, &pattern)),
        );
    }

    for key in &query.order {
        let order = match key.dir {
            SortDir::Asc => Order::Asc,
            SortDir::Desc => Order::Desc,
        };
        select = select.order_by(sort_column(key.field), order);
    }
    select
        .order_by_asc(Column::CreatedAt)
        .order_by_asc(Column::Id)
}

/// `Ok(None)` when a conditional single-row update matched nothing.
fn none_if_unmatched<T>(res: Result<T, DbErr>) -> Result<Option<T>, DbErr> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(DbErr::RecordNotUpdated) => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl<C> StudentsRepository for SeaOrmStudentsRepository<C>
where
    C: ConnectionTrait + TransactionTrait + Send + Sync + 'static,
{
    async fn insert(&self, student: Student) -> anyhow::Result<Student> {
        let row = StudentEntity::insert(to_active_model(student))
            .exec_with_returning(&self.conn)
            .await
            .context("insert failed")?;
        row.try_into()
    }

    async fn bulk_insert(&self, students: Vec<Student>) -> anyhow::Result<u64> {
        if students.is_empty() {
            return Ok(0);
        }

        let txn = self.conn.begin().await.context("bulk_insert: begin failed")?;
        let mut written = 0;
        let mut models = students.into_iter().map(to_active_model);
        loop {
            let chunk: Vec<_> = models.by_ref().take(INSERT_CHUNK_ROWS).collect();
            if chunk.is_empty() {
                break;
            }
            written += StudentEntity::insert_many(chunk)
                .exec_without_returning(&txn)
                .await
                .context("bulk_insert failed")?;
        }
        txn.commit().await.context("bulk_insert: commit failed")?;
        Ok(written)
    }

    async fn find_by_id(&self, id: Uuid, include_deleted: bool) -> anyhow::Result<Option<Student>> {
        let filter = if include_deleted {
            StateFilter::Any
        } else {
            StateFilter::Active
        };
        let found = with_state(StudentEntity::find_by_id(id), filter)
            .one(&self.conn)
            .await
            .context("find_by_id failed")?;
        found.map(Student::try_from).transpose()
    }

    async fn find_by_emails(
        &self,
        emails: &[String],
        filter: StateFilter,
    ) -> anyhow::Result<Vec<Student>> {
        let mut out = Vec::new();
        for chunk in emails.chunks(LOOKUP_CHUNK) {
            let rows = with_state(StudentEntity::find(), filter)
                .filter(Column::Email.is_in(chunk.iter().cloned()))
                .all(&self.conn)
                .await
                .context("find_by_emails failed")?;
            out.extend(rows_to_students(rows)?);
        }
        Ok(out)
    }

    async fn find_all(&self, filter: StateFilter) -> anyhow::Result<Vec<Student>> {
        let rows = with_state(StudentEntity::find(), filter)
            .order_by_asc(Column::CreatedAt)
            .order_by_asc(Column::Id)
            .all(&self.conn)
            .await
            .context("find_all failed")?;
        rows_to_students(rows)
    }

    async fn query(&self, query: &StudentQuery) -> anyhow::Result<StudentPage> {
        let select = filtered(query);
        let total = select
            .clone()
            .count(&self.conn)
            .await
            .context("query: count failed")?;

        // SQLite needs a LIMIT before an OFFSET
        let select = match query.take {
            Some(take) => select.offset(query.skip).limit(take),
            None if query.skip == 0 => select,
            None => select.offset(query.skip).limit(i64::MAX as u64),
        };
        let rows = select.all(&self.conn).await.context("query failed")?;
        Ok(StudentPage {
            total,
            data: rows_to_students(rows)?,
        })
    }

    async fn update(&self, student: Student) -> anyhow::Result<Option<Student>> {
        let mut am = to_active_model(student);
        am.deleted_at = NotSet;
        am.created_at = NotSet;
        let res = StudentEntity::update(am)
            .filter(Column::DeletedAt.is_null())
            .exec(&self.conn)
            .await;
        none_if_unmatched(res)
            .context("update failed")?
            .map(Student::try_from)
            .transpose()
    }

    async fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> anyhow::Result<Option<Student>> {
        let res = StudentEntity::update_many()
            .col_expr(Column::DeletedAt, Expr::value(Some(at)))
            .col_expr(Column::UpdatedAt, Expr::value(at))
            .filter(Column::Id.eq(id))
            .filter(Column::DeletedAt.is_null())
            .exec(&self.conn)
            .await
            .context("soft_delete failed")?;
        if res.rows_affected == 0 {
            return Ok(None);
        }
        self.find_by_id(id, true).await
    }

    async fn restore(&self, id: Uuid, at: DateTime<Utc>) -> anyhow::Result<Option<Student>> {
        let res = StudentEntity::update_many()
            .col_expr(Column::DeletedAt, Expr::value(Option::<DateTime<Utc>>::None))
            .col_expr(Column::UpdatedAt, Expr::value(at))
            .filter(Column::Id.eq(id))
            .filter(Column::DeletedAt.is_not_null())
            .exec(&self.conn)
            .await
            .context("restore failed")?;
        if res.rows_affected == 0 {
            return Ok(None);
        }
        self.find_by_id(id, false).await
    }

    async fn restore_with(&self, student: Student) -> anyhow::Result<Option<Student>> {
        let mut am = to_active_model(student);
        am.deleted_at = sea_orm::Set(None);
        am.created_at = NotSet;
        let res = StudentEntity::update(am)
            .filter(Column::DeletedAt.is_not_null())
            .exec(&self.conn)
            .await;
        none_if_unmatched(res)
            .context("restore_with failed")?
            .map(Student::try_from)
            .transpose()
    }

    async fn hard_delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = StudentEntity::delete_by_id(id)
            .exec(&self.conn)
            .await
            .context("hard_delete failed")?;
        Ok(res.rows_affected > 0)
    }

    async fn purge_expired(&self, id: Uuid, cutoff: DateTime<Utc>) -> anyhow::Result<bool> {
        let res = StudentEntity::delete_many()
            .filter(Column::Id.eq(id))
            .filter(Column::DeletedAt.is_not_null())
            .filter(Column::DeletedAt.lte(cutoff))
            .exec(&self.conn)
            .await
            .context("purge_expired failed")?;
        Ok(res.rows_affected > 0)
    }

    async fn list_deleted(&self, limit: u64) -> anyhow::Result<Vec<Student>> {
        let rows = with_state(StudentEntity::find(), StateFilter::Deleted)
            .order_by_desc(Column::DeletedAt)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("list_deleted failed")?;
        rows_to_students(rows)
    }

    async fn find_deleted_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<Vec<Student>> {
        let rows = StudentEntity::find()
            .filter(Column::DeletedAt.is_not_null())
            .filter(Column::DeletedAt.lte(cutoff))
            .order_by_asc(Column::DeletedAt)
            .all(&self.conn)
            .await
            .context("find_deleted_before failed")?;
        rows_to_students(rows)
    }

    async fn count_deleted_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        StudentEntity::find()
            .filter(Column::DeletedAt.is_not_null())
            .filter(Column::DeletedAt.lte(cutoff))
            .count(&self.conn)
            .await
            .context("count_deleted_before failed")
    }
}
