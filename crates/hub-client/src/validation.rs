//! Client-side form checks run before a request is sent.
//!
//! Results use the same field-keyed shape as server validation errors.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::FieldErrors;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\d\s\-+()]+$").expect("valid phone regex"));
static SPECIAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[!@#$%^&*(),.?":{}|<>]"#).expect("valid special-char regex"));

pub const MIN_PASSWORD_LEN: usize = 8;
const MIN_PHONE_DIGITS: usize = 10;

pub fn validate_email(email: &str) -> Result<(), String> {
    if EMAIL_RE.is_match(email.trim()) {
        Ok(())
    } else {
        Err("Please enter a valid email address".to_string())
    }
}

/// Every unmet password rule, in a fixed order.
pub fn validate_password(password: &str) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LEN
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one number".to_string());
    }
    if !SPECIAL_RE.is_match(password) {
        errors.push("Password must contain at least one special character".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn validate_phone(phone: &str) -> Result<(), String> {
    let cleaned: String = phone.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.chars().count() < MIN_PHONE_DIGITS {
        return Err(format!(
            "Phone number must be at least {} digits long",
            MIN_PHONE_DIGITS
        ));
    }
    if !PHONE_RE.is_match(phone) {
        return Err(
            "Phone number can only contain digits, spaces, and + - ( ) characters".to_string(),
        );
    }
    Ok(())
}

pub fn validate_required(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} is required", field_name))
    } else {
        Ok(())
    }
}

/// Accumulates the first error per field.
#[derive(Debug, Default)]
pub(crate) struct FieldCheck {
    errors: FieldErrors,
}

impl FieldCheck {
    pub(crate) fn check(&mut self, field: &str, result: Result<(), String>) -> &mut Self {
        if let Err(message) = result {
            self.errors.entry(field.to_string()).or_insert(message);
        }
        self
    }

    pub(crate) fn finish(&mut self) -> FieldErrors {
        std::mem::take(&mut self.errors)
    }
}
