//! Field-level input validation.
//!
//! Handlers collect every failing field into a [`Validator`] and only then
//! bail out, so a client sees the complete list in one response.

use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

use crate::errors::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    /// Trimmed length must be within `min..=max` characters.
    pub fn string_length(&mut self, field: &str, value: &str, min: usize, max: usize) {
        let len = value.trim().chars().count();
        if len < min {
            if min == 1 {
                self.push(field, "must not be empty");
            } else {
                self.push(field, format!("must be at least {min} characters"));
            }
        } else if len > max {
            self.push(field, format!("must be at most {max} characters"));
        }
    }

    pub fn optional_string_length(&mut self, field: &str, value: Option<&str>, min: usize, max: usize) {
        if let Some(value) = value {
            self.string_length(field, value, min, max);
        }
    }

    pub fn date_order(&mut self, start_field: &str, start: NaiveDate, end_field: &str, end: NaiveDate) {
        if end < start {
            self.push(end_field, format!("must be on or after {start_field}"));
        }
    }

    pub fn range(&mut self, field: &str, value: i64, min: i64, max: i64) {
        if value < min || value > max {
            self.push(field, format!("must be between {min} and {max}"));
        }
    }

    /// Parses `value` with `parse`, recording a failure that lists `allowed`.
    pub fn parse_enum<T>(&mut self, field: &str, value: &str, allowed: &[&str], parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        match parse(value) {
            Some(parsed) => Some(parsed),
            None => {
                self.push(field, format!("must be one of: {}", allowed.join(", ")));
                None
            }
        }
    }

    pub fn email(&mut self, field: &str, value: &str) {
        let value = value.trim();
        let valid = value.len() <= 255
            && value
                .split_once('@')
                .map(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.'))
                .unwrap_or(false);
        if !valid {
            self.push(field, "must be a valid email address");
        }
    }

    /// `#RRGGBB`.
    pub fn hex_color(&mut self, field: &str, value: &str) {
        let valid = value.len() == 7
            && value.starts_with('#')
            && value[1..].chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            self.push(field, "must be a hex color like #3B82F6");
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_all_failures() {
        let mut v = Validator::new();
        v.string_length("name", "   ", 1, 255);
        v.range("progress", 120, 0, 100);
        v.date_order(
            "start_date",
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            "end_date",
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        );

        match v.finish() {
            Err(AppError::Validation(fields)) => {
                let names: Vec<_> = fields.iter().map(|f| f.field.as_str()).collect();
                assert_eq!(names, vec!["name", "progress", "end_date"]);
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn same_day_range_is_valid() {
        let mut v = Validator::new();
        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        v.date_order("start_date", day, "end_date", day);
        assert!(v.finish().is_ok());
    }

    #[test]
    fn email_shape() {
        let mut v = Validator::new();
        v.email("email", "ada@example.com");
        assert!(v.is_empty());
        v.email("email", "not-an-email");
        v.email("email", "x@localhost");
        assert!(v.finish().is_err());
    }

    #[test]
    fn hex_colors() {
        let mut v = Validator::new();
        v.hex_color("color", "#3b82F6");
        assert!(v.is_empty());
        v.hex_color("color", "3B82F6");
        v.hex_color("color", "#3B82FZ");
        v.hex_color("color", "#éé");
        match v.finish() {
            Err(AppError::Validation(fields)) => assert_eq!(fields.len(), 3),
            other => panic!("expected validation failure, got {other:?}"),
        }
    }
}
