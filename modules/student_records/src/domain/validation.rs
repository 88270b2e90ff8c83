//! Schema rules for student attributes.
//!
//! Applied at the boundaries (direct create/update and CSV import); the
//! lifecycle engine itself treats attributes as opaque.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::contract::model::{NewStudent, StudentPatch, StudentProfile};
use crate::domain::error::FieldError;

pub const MIN_FULL_NAME_CHARS: usize = 2;
pub const MAX_FULL_NAME_CHARS: usize = 100;
pub const MIN_ENROLLMENT_YEAR: i32 = 2000;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+998\d{9}$").expect("valid phone regex"));

pub fn validate_new_student(new_student: &NewStudent, current_year: i32) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();
    if let Some(email) = &new_student.email {
        check_email(email, &mut errors);
    }
    check_profile(&new_student.profile, current_year, &mut errors);
    finish(errors)
}

pub fn validate_patch(patch: &StudentPatch, current_year: i32) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();
    if let Some(email) = &patch.email {
        check_email(email, &mut errors);
    }
    if let Some(full_name) = &patch.full_name {
        check_full_name(full_name, &mut errors);
    }
    if let Some(faculty) = &patch.faculty {
        check_required("faculty", faculty, &mut errors);
    }
    if let Some(group) = &patch.group {
        check_required("group", group, &mut errors);
    }
    if let Some(phone) = &patch.phone {
        check_phone(phone, &mut errors);
    }
    if let Some(year) = patch.enrollment_year {
        check_enrollment_year(year, current_year, &mut errors);
    }
    finish(errors)
}

pub(crate) fn check_profile(profile: &StudentProfile, current_year: i32, errors: &mut Vec<FieldError>) {
    check_full_name(&profile.full_name, errors);
    check_required("faculty", &profile.faculty, errors);
    check_required("group", &profile.group, errors);
    if let Some(phone) = &profile.phone {
        check_phone(phone, errors);
    }
    check_enrollment_year(profile.enrollment_year, current_year, errors);
}

pub(crate) fn check_email(email: &str, errors: &mut Vec<FieldError>) {
    if !EMAIL_RE.is_match(email) {
        errors.push(FieldError::new("email", format!("invalid email '{email}'")));
    }
}

fn check_full_name(full_name: &str, errors: &mut Vec<FieldError>) {
    let len = full_name.trim().chars().count();
    if len < MIN_FULL_NAME_CHARS {
        errors.push(FieldError::new(
            "full_name",
            format!("must be at least {MIN_FULL_NAME_CHARS} characters"),
        ));
    } else if len > MAX_FULL_NAME_CHARS {
        errors.push(FieldError::new(
            "full_name",
            format!("must be at most {MAX_FULL_NAME_CHARS} characters (got {len})"),
        ));
    }
}

fn check_required(field: &str, value: &str, errors: &mut Vec<FieldError>) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, "must not be empty"));
    }
}

fn check_phone(phone: &str, errors: &mut Vec<FieldError>) {
    if !PHONE_RE.is_match(phone) {
        errors.push(FieldError::new(
            "phone",
            format!("'{phone}' must match +998XXXXXXXXX"),
        ));
    }
}

fn check_enrollment_year(year: i32, current_year: i32, errors: &mut Vec<FieldError>) {
    if !(MIN_ENROLLMENT_YEAR..=current_year).contains(&year) {
        errors.push(FieldError::new(
            "enrollment_year",
            format!("{year} is outside {MIN_ENROLLMENT_YEAR}..={current_year}"),
        ));
    }
}

fn finish(errors: Vec<FieldError>) -> Result<(), Vec<FieldError>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
