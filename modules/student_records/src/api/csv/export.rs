use crate::contract::model::Student;

pub const EXPORT_HEADER: [&str; 11] = [
    "id",
    "full_name",
    "faculty",
    "group",
    "email",
    "phone",
    "birth_date",
    "enrollment_year",
    "status",
    "created_at",
    "updated_at",
];

/// Render records as CSV with [`EXPORT_HEADER`]. Missing optional fields are empty cells.
pub fn render_students(students: &[Student]) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(EXPORT_HEADER)?;

    for s in students {
        let p = &s.profile;
        writer.write_record([
            s.id.to_string(),
            p.full_name.clone(),
            p.faculty.clone(),
            p.group.clone(),
            s.email.clone().unwrap_or_default(),
            p.phone.clone().unwrap_or_default(),
            p.birth_date.format("%Y-%m-%d").to_string(),
            p.enrollment_year.to_string(),
            p.status.to_string(),
            s.created_at.to_rfc3339(),
            s.updated_at.to_rfc3339(),
        ])?;
    }

    let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::model::{LifecycleState, StudentProfile, StudentStatus};
    use chrono::{NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    #[test]
    fn renders_header_and_quotes_embedded_commas() {
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 9, 30, 0).unwrap();
        let student = Student {
            id: Uuid::nil(),
            email: None,
            profile: StudentProfile {
                full_name: "Karimov, Aziz".into(),
                faculty: "Physics".into(),
                group: "PH-21".into(),
                phone: Some("+998901112233".into()),
                birth_date: NaiveDate::from_ymd_opt(2003, 4, 12).unwrap(),
                enrollment_year: 2021,
                status: StudentStatus::AcademicLeave,
            },
            state: LifecycleState::Active,
            created_at: at,
            updated_at: at,
        };

        let out = render_students(&[student]).unwrap();
        let mut lines = out.lines();
        assert_eq!(
            lines.next(),
            Some("id,full_name,faculty,group,email,phone,birth_date,enrollment_year,status,created_at,updated_at")
        );
        assert_eq!(
            lines.next(),
            Some("00000000-0000-0000-0000-000000000000,\"Karimov, Aziz\",Physics,PH-21,,+998901112233,2003-04-12,2021,academic_leave,2024-02-01T09:30:00+00:00,2024-02-01T09:30:00+00:00")
        );
        assert_eq!(lines.next(), None);
    }
}
