use std::collections::HashMap;

use chrono::{DateTime, NaiveDate};
use tracing::{debug, instrument};

use crate::contract::model::{NewStudent, RowValidationError, StudentProfile, StudentStatus};
use crate::domain::error::FieldError;
use crate::domain::import::{ImportBatch, ValidatedRow};
use crate::domain::validation;

/// The upload could not be read as CSV at all.
#[derive(Debug, thiserror::Error)]
pub enum CsvImportError {
    #[error("failed to read CSV headers: {0}")]
    Headers(#[source] csv::Error),
    #[error("CSV upload has no header row")]
    Empty,
}

/// Canonical column name for a normalized header, if the header is known.
fn canonical_column(normalized: &str) -> Option<&'static str> {
    let column = match normalized {
        "full_name" | "name" | "fullname" => "full_name",
        "faculty" => "faculty",
        "group" => "group",
        "email" => "email",
        "phone" => "phone",
        "birth_date" | "birthdate" => "birth_date",
        "enrollment_year" | "enrollmentyear" => "enrollment_year",
        "status" => "status",
        _ => return None,
    };
    Some(column)
}

fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase().replace(' ', "_")
}

/// Parse a CSV upload into validated rows and per-row validation failures.
///
/// Data rows are numbered from 1, not counting the header. Unknown columns
/// are ignored. Only an unreadable header fails the whole upload.
#[instrument(name = "student_records.csv.parse", skip(input), fields(bytes = input.len()))]
pub fn parse_batch(input: &[u8], current_year: i32) -> Result<ImportBatch, CsvImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers = reader.headers().map_err(CsvImportError::Headers)?.clone();
    if headers.is_empty() {
        return Err(CsvImportError::Empty);
    }

    let mut columns: HashMap<&'static str, usize> = HashMap::new();
    for (idx, header) in headers.iter().enumerate() {
        match canonical_column(&normalize_header(header)) {
            // First occurrence of an aliased column wins.
            Some(column) => {
                columns.entry(column).or_insert(idx);
            }
            None => debug!(header, "ignoring unknown CSV column"),
        }
    }

    let mut batch = ImportBatch::default();
    for (offset, record) in reader.records().enumerate() {
        let row_index = offset + 1;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                batch.validation_errors.push(RowValidationError {
                    row_index,
                    messages: vec![format!("unreadable row: {e}")],
                });
                continue;
            }
        };

        let field = |name: &str| -> Option<String> {
            columns
                .get(name)
                .and_then(|&idx| record.get(idx))
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        match row_to_student(&field, current_year) {
            Ok(student) => batch.rows.push(ValidatedRow { row_index, student }),
            Err(errors) => batch.validation_errors.push(RowValidationError {
                row_index,
                messages: errors.iter().map(ToString::to_string).collect(),
            }),
        }
    }

    debug!(
        valid = batch.rows.len(),
        invalid = batch.validation_errors.len(),
        "parsed CSV upload"
    );
    Ok(batch)
}

fn row_to_student<F>(field: &F, current_year: i32) -> Result<NewStudent, Vec<FieldError>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut errors = Vec::new();

    let birth_date = match field("birth_date") {
        Some(raw) => parse_date(&raw).unwrap_or_else(|| {
            errors.push(FieldError::new(
                "birth_date",
                format!("'{raw}' is not a valid date (expected YYYY-MM-DD)"),
            ));
            NaiveDate::MIN
        }),
        None => {
            errors.push(FieldError::new("birth_date", "is required"));
            NaiveDate::MIN
        }
    };

    let enrollment_year = match field("enrollment_year") {
        Some(raw) => raw.parse::<i32>().unwrap_or_else(|_| {
            errors.push(FieldError::new(
                "enrollment_year",
                format!("'{raw}' is not a number"),
            ));
            current_year
        }),
        None => {
            errors.push(FieldError::new("enrollment_year", "is required"));
            current_year
        }
    };

    let status = match field("status") {
        Some(raw) => raw.parse::<StudentStatus>().unwrap_or_else(|msg| {
            errors.push(FieldError::new("status", msg));
            StudentStatus::default()
        }),
        None => StudentStatus::default(),
    };

    let email = field("email");
    if let Some(email) = &email {
        validation::check_email(email, &mut errors);
    }

    let profile = StudentProfile {
        full_name: field("full_name").unwrap_or_default(),
        faculty: field("faculty").unwrap_or_default(),
        group: field("group").unwrap_or_default(),
        phone: field("phone"),
        birth_date,
        enrollment_year,
        status,
    };
    validation::check_profile(&profile, current_year, &mut errors);

    if errors.is_empty() {
        Ok(NewStudent { email, profile })
    } else {
        Err(errors)
    }
}

/// `YYYY-MM-DD`, or the date part of an RFC 3339 timestamp.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}
