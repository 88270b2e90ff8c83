use anyhow::anyhow;
use sea_orm::Set;

use crate::contract::model::{LifecycleState, Student, StudentProfile, StudentStatus};
use crate::infra::storage::entity::{ActiveModel as StudentAM, Model as StudentRow};

impl TryFrom<StudentRow> for Student {
    type Error = anyhow::Error;

    fn try_from(row: StudentRow) -> Result<Self, Self::Error> {
        let status: StudentStatus = row
            .status
            .parse()
            .map_err(|e: String| anyhow!("student {}: {e}", row.id))?;
        Ok(Student {
            id: row.id,
            email: row.email,
            profile: StudentProfile {
                full_name: row.full_name,
                faculty: row.faculty,
                group: row.group,
                phone: row.phone,
                birth_date: row.birth_date,
                enrollment_year: row.enrollment_year,
                status,
            },
            state: LifecycleState::from_deleted_at(row.deleted_at),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Fully-set active model, lifecycle marker included.
pub fn to_active_model(s: Student) -> StudentAM {
    let deleted_at = s.deleted_at();
    let p = s.profile;
    StudentAM {
        id: Set(s.id),
        email: Set(s.email),
        full_name: Set(p.full_name),
        faculty: Set(p.faculty),
        group: Set(p.group),
        phone: Set(p.phone),
        birth_date: Set(p.birth_date),
        enrollment_year: Set(p.enrollment_year),
        status: Set(p.status.as_str().to_string()),
        deleted_at: Set(deleted_at),
        created_at: Set(s.created_at),
        updated_at: Set(s.updated_at),
    }
}

pub fn rows_to_students(rows: Vec<StudentRow>) -> anyhow::Result<Vec<Student>> {
    rows.into_iter().map(Student::try_from).collect()
}
