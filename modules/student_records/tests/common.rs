#![allow(dead_code)]

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use student_records::contract::model::{
    LifecycleState, NewStudent, SortDir, SortField, StateFilter, Student, StudentPage,
    StudentProfile, StudentQuery, StudentStatus,
};
use student_records::domain::clock::Clock;
use student_records::domain::events::StudentDomainEvent;
use student_records::domain::ports::{AdminDirectory, EventPublisher};
use student_records::domain::protection::AdminAccountGuard;
use student_records::domain::repo::StudentsRepository;
use student_records::domain::service::{LifecycleEngine, ServiceConfig};

// ----- Clock -----------------------------------------------------------------

/// Manually advanced clock.
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl FakeClock {
    pub fn at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).unwrap()
}

// ----- Repository ------------------------------------------------------------

/// In-memory repository with switchable failures.
#[derive(Default)]
pub struct InMemoryStudentsRepository {
    rows: Mutex<Vec<Student>>,
    fail_reads: AtomicBool,
    fail_bulk_insert: AtomicBool,
    fail_restore_with: Mutex<HashSet<Uuid>>,
    fail_hard_delete: Mutex<HashSet<Uuid>>,
}

impl InMemoryStudentsRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Place a record directly into storage, bypassing the engine.
    pub fn seed(&self, student: Student) {
        self.rows.lock().push(student);
    }

    pub fn snapshot(&self) -> Vec<Student> {
        self.rows.lock().clone()
    }

    pub fn get(&self, id: Uuid) -> Option<Student> {
        self.rows.lock().iter().find(|s| s.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_bulk_insert(&self, on: bool) {
        self.fail_bulk_insert.store(on, Ordering::SeqCst);
    }

    pub fn fail_restore_with_for(&self, id: Uuid) {
        self.fail_restore_with.lock().insert(id);
    }

    pub fn fail_hard_delete_for(&self, id: Uuid) {
        self.fail_hard_delete.lock().insert(id);
    }

    fn check_reads(&self) -> anyhow::Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            anyhow::bail!("database unavailable");
        }
        Ok(())
    }

    fn transition<F>(&self, id: Uuid, want_active: bool, apply: F) -> Option<Student>
    where
        F: FnOnce(&mut Student),
    {
        let mut rows = self.rows.lock();
        let row = rows
            .iter_mut()
            .find(|s| s.id == id && s.is_active() == want_active)?;
        apply(row);
        Some(row.clone())
    }
}

fn compare_by(field: SortField, a: &Student, b: &Student) -> CmpOrdering {
    let (pa, pb) = (&a.profile, &b.profile);
    match field {
        SortField::FullName => pa.full_name.cmp(&pb.full_name),
        SortField::Email => a.email.cmp(&b.email),
        SortField::Faculty => pa.faculty.cmp(&pb.faculty),
        SortField::Group => pa.group.cmp(&pb.group),
        SortField::Phone => pa.phone.cmp(&pb.phone),
        SortField::BirthDate => pa.birth_date.cmp(&pb.birth_date),
        SortField::EnrollmentYear => pa.enrollment_year.cmp(&pb.enrollment_year),
        SortField::Status => pa.status.as_str().cmp(pb.status.as_str()),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
    }
}

#[async_trait]
impl StudentsRepository for InMemoryStudentsRepository {
    async fn insert(&self, student: Student) -> anyhow::Result<Student> {
        self.rows.lock().push(student.clone());
        Ok(student)
    }

    async fn bulk_insert(&self, students: Vec<Student>) -> anyhow::Result<u64> {
        if self.fail_bulk_insert.load(Ordering::SeqCst) {
            anyhow::bail!("bulk insert rejected");
        }
        let n = students.len() as u64;
        self.rows.lock().extend(students);
        Ok(n)
    }

    async fn find_by_id(&self, id: Uuid, include_deleted: bool) -> anyhow::Result<Option<Student>> {
        self.check_reads()?;
        Ok(self
            .rows
            .lock()
            .iter()
            .find(|s| s.id == id && (include_deleted || s.is_active()))
            .cloned())
    }

    async fn find_by_emails(
        &self,
        emails: &[String],
        filter: StateFilter,
    ) -> anyhow::Result<Vec<Student>> {
        self.check_reads()?;
        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|s| filter.matches(&s.state))
            .filter(|s| s.email.as_ref().is_some_and(|e| emails.contains(e)))
            .cloned()
            .collect())
    }

    async fn find_all(&self, filter: StateFilter) -> anyhow::Result<Vec<Student>> {
        self.check_reads()?;
        let mut out: Vec<Student> = self
            .rows
            .lock()
            .iter()
            .filter(|s| filter.matches(&s.state))
            .cloned()
            .collect();
        out.sort_by_key(|s| s.created_at);
        Ok(out)
    }

    async fn query(&self, query: &StudentQuery) -> anyhow::Result<StudentPage> {
        self.check_reads()?;
        let mut matched: Vec<Student> = self
            .rows
            .lock()
            .iter()
            .filter(|s| query.matches(s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            query
                .order
                .iter()
                .map(|key| match key.dir {
                    SortDir::Asc => compare_by(key.field, a, b),
                    SortDir::Desc => compare_by(key.field, b, a),
                })
                .find(|o| o.is_ne())
                .unwrap_or_else(|| (a.created_at, a.id).cmp(&(b.created_at, b.id)))
        });

        let total = matched.len() as u64;
        let take = query.take.unwrap_or(u64::MAX);
        let data = matched
            .into_iter()
            .skip(query.skip as usize)
            .take(take.min(usize::MAX as u64) as usize)
            .collect();
        Ok(StudentPage { total, data })
    }

    async fn update(&self, student: Student) -> anyhow::Result<Option<Student>> {
        Ok(self.transition(student.id, true, |row| {
            row.email = student.email.clone();
            row.profile = student.profile.clone();
            row.updated_at = student.updated_at;
        }))
    }

    async fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> anyhow::Result<Option<Student>> {
        Ok(self.transition(id, true, |row| {
            row.state = LifecycleState::SoftDeleted { since: at };
            row.updated_at = at;
        }))
    }

    async fn restore(&self, id: Uuid, at: DateTime<Utc>) -> anyhow::Result<Option<Student>> {
        Ok(self.transition(id, false, |row| {
            row.state = LifecycleState::Active;
            row.updated_at = at;
        }))
    }

    async fn restore_with(&self, student: Student) -> anyhow::Result<Option<Student>> {
        if self.fail_restore_with.lock().contains(&student.id) {
            anyhow::bail!("restore rejected for {}", student.id);
        }
        Ok(self.transition(student.id, false, |row| {
            row.email = student.email.clone();
            row.profile = student.profile.clone();
            row.state = LifecycleState::Active;
            row.updated_at = student.updated_at;
        }))
    }

    async fn hard_delete(&self, id: Uuid) -> anyhow::Result<bool> {
        if self.fail_hard_delete.lock().contains(&id) {
            anyhow::bail!("delete rejected for {id}");
        }
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|s| s.id != id);
        Ok(rows.len() < before)
    }

    async fn purge_expired(&self, id: Uuid, cutoff: DateTime<Utc>) -> anyhow::Result<bool> {
        if self.fail_hard_delete.lock().contains(&id) {
            anyhow::bail!("delete rejected for {id}");
        }
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|s| !(s.id == id && s.deleted_at().is_some_and(|at| at <= cutoff)));
        Ok(rows.len() < before)
    }

    async fn list_deleted(&self, limit: u64) -> anyhow::Result<Vec<Student>> {
        self.check_reads()?;
        let mut out: Vec<Student> = self
            .rows
            .lock()
            .iter()
            .filter(|s| s.state.is_soft_deleted())
            .cloned()
            .collect();
        out.sort_by(|a, b| b.deleted_at().cmp(&a.deleted_at()));
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn find_deleted_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<Vec<Student>> {
        self.check_reads()?;
        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|s| s.deleted_at().is_some_and(|at| at <= cutoff))
            .cloned()
            .collect())
    }

    async fn count_deleted_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        Ok(self.find_deleted_before(cutoff).await?.len() as u64)
    }
}

// ----- Admin directory -------------------------------------------------------

#[derive(Default)]
pub struct InMemoryAdminDirectory {
    emails: Mutex<HashSet<String>>,
    broken: AtomicBool,
}

impl InMemoryAdminDirectory {
    pub fn with(emails: &[&str]) -> Arc<Self> {
        let dir = Self::default();
        dir.emails
            .lock()
            .extend(emails.iter().map(|e| e.to_lowercase()));
        Arc::new(dir)
    }

    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }
}

#[async_trait]
impl AdminDirectory for InMemoryAdminDirectory {
    async fn is_administrative_account(&self, email: &str) -> anyhow::Result<bool> {
        if self.broken.load(Ordering::SeqCst) {
            anyhow::bail!("admin registry unavailable");
        }
        Ok(self.emails.lock().contains(email))
    }
}

// ----- Events ----------------------------------------------------------------

#[derive(Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<StudentDomainEvent>>,
}

impl RecordingEventPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<StudentDomainEvent> {
        self.events.lock().clone()
    }
}

impl EventPublisher<StudentDomainEvent> for RecordingEventPublisher {
    fn publish(&self, event: &StudentDomainEvent) {
        self.events.lock().push(event.clone());
    }
}

// ----- Builders --------------------------------------------------------------

pub fn profile(full_name: &str) -> StudentProfile {
    StudentProfile {
        full_name: full_name.to_string(),
        faculty: "Computer Science".to_string(),
        group: "CS-21".to_string(),
        phone: Some("+998901234567".to_string()),
        birth_date: NaiveDate::from_ymd_opt(2003, 3, 14).unwrap(),
        enrollment_year: 2021,
        status: StudentStatus::Active,
    }
}

pub fn new_student(full_name: &str, email: Option<&str>) -> NewStudent {
    NewStudent {
        email: email.map(str::to_string),
        profile: profile(full_name),
    }
}

pub fn stored_student(full_name: &str, email: Option<&str>, state: LifecycleState) -> Student {
    let created = t0() - Duration::days(365);
    Student {
        id: Uuid::new_v4(),
        email: email.map(str::to_string),
        profile: profile(full_name),
        state,
        created_at: created,
        updated_at: created,
    }
}

pub fn deleted_since(since: DateTime<Utc>) -> LifecycleState {
    LifecycleState::SoftDeleted { since }
}

/// Engine plus handles on every fake it was built from.
pub struct Harness {
    pub engine: LifecycleEngine,
    pub repo: Arc<InMemoryStudentsRepository>,
    pub admins: Arc<InMemoryAdminDirectory>,
    pub clock: Arc<FakeClock>,
    pub events: Arc<RecordingEventPublisher>,
}

pub fn harness(admins: &[&str]) -> Harness {
    harness_with(admins, ServiceConfig::default())
}

pub fn harness_with(admins: &[&str], config: ServiceConfig) -> Harness {
    let repo = InMemoryStudentsRepository::new();
    let admins = InMemoryAdminDirectory::with(admins);
    let clock = FakeClock::at(t0());
    let events = RecordingEventPublisher::new();
    let engine = LifecycleEngine::new(
        repo.clone(),
        Arc::new(AdminAccountGuard::new(admins.clone())),
        events.clone(),
        clock.clone(),
        config,
    );
    Harness {
        engine,
        repo,
        admins,
        clock,
        events,
    }
}
