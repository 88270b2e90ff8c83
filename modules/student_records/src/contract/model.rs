use chrono::{DateTime, NaiveDate, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Academic status carried in the profile. Not interpreted by the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudentStatus {
    #[default]
    Active,
    Graduated,
    Expelled,
    AcademicLeave,
}

impl StudentStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            StudentStatus::Active => "active",
            StudentStatus::Graduated => "graduated",
            StudentStatus::Expelled => "expelled",
            StudentStatus::AcademicLeave => "academic_leave",
        }
    }
}

impl fmt::Display for StudentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StudentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(StudentStatus::Active),
            "graduated" => Ok(StudentStatus::Graduated),
            "expelled" => Ok(StudentStatus::Expelled),
            "academic_leave" => Ok(StudentStatus::AcademicLeave),
            other => Err(format!("unknown student status '{other}'")),
        }
    }
}

/// Lifecycle position of a stored record.
///
/// A purged record no longer exists in storage, so there is no variant for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LifecycleState {
    Active,
    SoftDeleted { since: DateTime<Utc> },
}

impl LifecycleState {
    /// Maps the storage representation (nullable timestamp) onto the tagged state.
    pub fn from_deleted_at(deleted_at: Option<DateTime<Utc>>) -> Self {
        match deleted_at {
            Some(since) => LifecycleState::SoftDeleted { since },
            None => LifecycleState::Active,
        }
    }

    #[inline]
    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            LifecycleState::Active => None,
            LifecycleState::SoftDeleted { since } => Some(*since),
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleState::Active)
    }

    #[inline]
    pub fn is_soft_deleted(&self) -> bool {
        matches!(self, LifecycleState::SoftDeleted { .. })
    }
}

/// Opaque attribute payload, passed through by the lifecycle core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub full_name: String,
    pub faculty: String,
    pub group: String,
    pub phone: Option<String>,
    pub birth_date: NaiveDate,
    pub enrollment_year: i32,
    pub status: StudentStatus,
}

/// Stored student record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    /// Reconciliation key. Unique among active records only.
    pub email: Option<String>,
    pub profile: StudentProfile,
    pub state: LifecycleState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Student {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    #[inline]
    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.state.deleted_at()
    }
}

/// Data for creating a new student
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStudent {
    pub email: Option<String>,
    pub profile: StudentProfile,
}

/// Partial update data for a student
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StudentPatch {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub faculty: Option<String>,
    pub group: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub enrollment_year: Option<i32>,
    pub status: Option<StudentStatus>,
}

impl StudentPatch {
    pub fn is_empty(&self) -> bool {
        *self == StudentPatch::default()
    }
}

/// Which lifecycle states a listing should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateFilter {
    #[default]
    Active,
    Deleted,
    Any,
}

impl StateFilter {
    pub fn matches(self, state: &LifecycleState) -> bool {
        match self {
            StateFilter::Active => state.is_active(),
            StateFilter::Deleted => state.is_soft_deleted(),
            StateFilter::Any => true,
        }
    }
}

/// Column a listing can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    FullName,
    Email,
    Faculty,
    Group,
    Phone,
    BirthDate,
    EnrollmentYear,
    Status,
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    pub const fn as_str(self) -> &'static str {
        match self {
            SortField::FullName => "full_name",
            SortField::Email => "email",
            SortField::Faculty => "faculty",
            SortField::Group => "group",
            SortField::Phone => "phone",
            SortField::BirthDate => "birth_date",
            SortField::EnrollmentYear => "enrollment_year",
            SortField::Status => "status",
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
        }
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "full_name" => Ok(SortField::FullName),
            "email" => Ok(SortField::Email),
            "faculty" => Ok(SortField::Faculty),
            "group" => Ok(SortField::Group),
            "phone" => Ok(SortField::Phone),
            "birth_date" => Ok(SortField::BirthDate),
            "enrollment_year" => Ok(SortField::EnrollmentYear),
            "status" => Ok(SortField::Status),
            "created_at" => Ok(SortField::CreatedAt),
            "updated_at" => Ok(SortField::UpdatedAt),
            other => Err(format!("unknown sort field '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderKey {
    pub field: SortField,
    pub dir: SortDir,
}

impl OrderKey {
    pub fn asc(field: SortField) -> Self {
        Self {
            field,
            dir: SortDir::Asc,
        }
    }

    pub fn desc(field: SortField) -> Self {
        Self {
            field,
            dir: SortDir::Desc,
        }
    }

    /// Parse a comma-separated sort list such as `faculty,-created_at`.
    /// A leading `-` sorts that field descending; blank entries are ignored.
    pub fn parse_list(spec: &str) -> Result<Vec<OrderKey>, String> {
        spec.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| match part.strip_prefix('-') {
                Some(name) => name.parse().map(OrderKey::desc),
                None => part.parse().map(OrderKey::asc),
            })
            .collect()
    }
}

/// Filtered, ordered and paged listing of active records.
///
/// `faculty`, `group` and `status` match exactly. `search` is a
/// case-insensitive substring match on the full name or the email. Records
/// are ordered by `order`, then by creation time and id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StudentQuery {
    pub faculty: Option<String>,
    pub group: Option<String>,
    pub status: Option<StudentStatus>,
    pub search: Option<String>,
    pub order: Vec<OrderKey>,
    pub skip: u64,
    /// Page size; `None` returns every match.
    pub take: Option<u64>,
}

impl StudentQuery {
    pub const DEFAULT_PAGE_SIZE: u64 = 10;
    pub const MAX_PAGE_SIZE: u64 = 500;

    /// Select the 1-based `page` of `limit` records. Zero counts as one.
    pub fn page(mut self, page: u64, limit: u64) -> Self {
        let limit = limit.max(1);
        self.skip = (page.max(1) - 1).saturating_mul(limit);
        self.take = Some(limit);
        self
    }

    /// Same filters and order, without paging.
    pub fn unpaged(&self) -> Self {
        Self {
            skip: 0,
            take: None,
            ..self.clone()
        }
    }

    /// Lower-cased search term; `None` when missing or blank.
    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
    }

    /// Whether an active record passes every filter. Ignores order and paging.
    pub fn matches(&self, student: &Student) -> bool {
        let p = &student.profile;
        student.is_active()
            && self.faculty.as_ref().map_or(true, |f| *f == p.faculty)
            && self.group.as_ref().map_or(true, |g| *g == p.group)
            && self.status.map_or(true, |s| s == p.status)
            && self.search_term().map_or(true, |term| {
                p.full_name.to_lowercase().contains(&term)
                    || student
                        .email
                        .as_deref()
                        .is_some_and(|e| e.to_lowercase().contains(&term))
            })
    }
}

/// One page of a [`StudentQuery`] plus the number of matches across all pages.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StudentPage {
    pub total: u64,
    pub data: Vec<Student>,
}

/// Soft-deleted record annotated with its position in the retention window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedStudent {
    pub student: Student,
    pub deleted_at: DateTime<Utc>,
    pub purge_at: DateTime<Utc>,
    /// Whole days until `purge_at`, rounded up; zero or negative once expired.
    pub days_remaining: i64,
}

/// Per-id outcome of a bulk transition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct BulkOutcome {
    pub requested: usize,
    pub succeeded: u64,
    pub not_found: Vec<Uuid>,
    pub protected: Vec<Uuid>,
}

impl BulkOutcome {
    pub fn skipped(&self) -> usize {
        self.not_found.len() + self.protected.len()
    }
}

/// Batch row rejected because its email is already claimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateRow {
    pub row_index: usize,
    pub email: String,
    pub full_name: String,
}

/// Batch row rejected by schema validation, with its 1-based row index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowValidationError {
    pub row_index: usize,
    pub messages: Vec<String>,
}

/// Batch row whose storage write failed after classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    pub row_index: usize,
    pub email: Option<String>,
    pub message: String,
}

/// Outcome of reconciling one import batch.
///
/// Serializes the derived `activated_count` and `failed_count` next to the
/// stored buckets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconciliationReport {
    pub total_rows: usize,
    pub inserted_count: u64,
    pub restored_count: u64,
    pub duplicate_count: u64,
    pub invalid_count: u64,
    pub duplicates: Vec<DuplicateRow>,
    pub validation_errors: Vec<RowValidationError>,
    pub failures: Vec<RowFailure>,
}

impl ReconciliationReport {
    /// Records now visible as active: brand new plus revived.
    pub fn activated_count(&self) -> u64 {
        self.inserted_count + self.restored_count
    }

    pub fn failed_count(&self) -> u64 {
        self.failures.len() as u64
    }

    /// Sum of every classification bucket; equals `total_rows`.
    pub fn classified_count(&self) -> u64 {
        self.inserted_count
            + self.restored_count
            + self.duplicate_count
            + self.invalid_count
            + self.failed_count()
    }
}

impl Serialize for ReconciliationReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut st = serializer.serialize_struct("ReconciliationReport", 10)?;
        st.serialize_field("total_rows", &self.total_rows)?;
        st.serialize_field("inserted_count", &self.inserted_count)?;
        st.serialize_field("restored_count", &self.restored_count)?;
        st.serialize_field("activated_count", &self.activated_count())?;
        st.serialize_field("duplicate_count", &self.duplicate_count)?;
        st.serialize_field("invalid_count", &self.invalid_count)?;
        st.serialize_field("failed_count", &self.failed_count())?;
        st.serialize_field("duplicates", &self.duplicates)?;
        st.serialize_field("validation_errors", &self.validation_errors)?;
        st.serialize_field("failures", &self.failures)?;
        st.end()
    }
}

/// Outcome of one retention purge cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub cutoff: DateTime<Utc>,
    pub candidates: usize,
    pub purged: u64,
    pub protected: u64,
    pub failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_list_parses_direction_prefixes() {
        let keys = OrderKey::parse_list("faculty, -created_at,,full_name").unwrap();
        assert_eq!(
            keys,
            vec![
                OrderKey::asc(SortField::Faculty),
                OrderKey::desc(SortField::CreatedAt),
                OrderKey::asc(SortField::FullName),
            ]
        );
        assert!(OrderKey::parse_list("").unwrap().is_empty());
    }

    #[test]
    fn unknown_sort_field_is_rejected() {
        let err = OrderKey::parse_list("full_name,-deleted_at").unwrap_err();
        assert!(err.contains("deleted_at"), "{err}");
    }

    #[test]
    fn page_turns_into_skip_and_take() {
        let q = StudentQuery::default().page(3, 20);
        assert_eq!((q.skip, q.take), (40, Some(20)));

        let q = StudentQuery::default().page(0, 0);
        assert_eq!((q.skip, q.take), (0, Some(1)));

        let unpaged = StudentQuery::default().page(3, 20).unpaged();
        assert_eq!((unpaged.skip, unpaged.take), (0, None));
    }

    #[test]
    fn blank_search_is_ignored() {
        let q = StudentQuery {
            search: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(q.search_term(), None);

        let q = StudentQuery {
            search: Some(" KarIM ".into()),
            ..Default::default()
        };
        assert_eq!(q.search_term().as_deref(), Some("karim"));
    }
}
