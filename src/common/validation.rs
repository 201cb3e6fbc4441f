// Common validation types, traits and shared field rules

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn add_error(&mut self, field: &str, message: &str) {
        self.is_valid = false;
        self.errors.push(ValidationError {
            field: field.to_string(),
            message: message.to_string(),
        });
    }
}

pub trait Validator<T> {
    fn validate(&self, data: &T) -> ValidationResult;
}

const PASSWORD_SPECIALS: &str = "@$!%*?&";

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
            .expect("email pattern compiles")
    })
}

pub fn check_email(result: &mut ValidationResult, field: &str, email: &str) {
    if !email_pattern().is_match(email.trim()) {
        result.add_error(field, "Please provide a valid email address");
    }
}

/// 8+ characters with upper, lower, digit and one of `@$!%*?&`
pub fn check_password_policy(result: &mut ValidationResult, field: &str, password: &str) {
    if password.chars().count() < 8 {
        result.add_error(field, "Password must be at least 8 characters long");
        return;
    }
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| PASSWORD_SPECIALS.contains(c));
    if !(has_lower && has_upper && has_digit && has_special) {
        result.add_error(
            field,
            "Password must contain at least one uppercase letter, one lowercase letter, one number, and one special character",
        );
    }
}

pub fn check_display_name(result: &mut ValidationResult, field: &str, name: &str) {
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    if !(2..=50).contains(&len) {
        result.add_error(field, "Name must be between 2 and 50 characters");
    } else if !trimmed.chars().all(|c| c.is_ascii_alphabetic() || c == ' ') {
        result.add_error(field, "Name can only contain letters and spaces");
    }
}

pub fn check_otp_format(result: &mut ValidationResult, field: &str, otp: &str) {
    if otp.len() != 6 || !otp.chars().all(|c| c.is_ascii_digit()) {
        result.add_error(field, "OTP must be 6 digits");
    }
}

pub fn check_required(result: &mut ValidationResult, field: &str, value: &str, message: &str) {
    if value.is_empty() {
        result.add_error(field, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_rule() {
        let mut result = ValidationResult::new();
        check_email(&mut result, "email", "a@x.com");
        assert!(result.is_valid);

        check_email(&mut result, "email", "not-an-email");
        assert!(!result.is_valid);
        assert_eq!(result.errors[0].field, "email");
    }

    #[test]
    fn test_password_policy() {
        let mut ok = ValidationResult::new();
        check_password_policy(&mut ok, "password", "Str0ng!pass");
        assert!(ok.is_valid);

        for weak in ["short1!", "alllowercase1!", "NoDigits!!", "NoSpecial123"] {
            let mut result = ValidationResult::new();
            check_password_policy(&mut result, "password", weak);
            assert!(!result.is_valid, "{} should be rejected", weak);
        }
    }

    #[test]
    fn test_display_name_rule() {
        let mut result = ValidationResult::new();
        check_display_name(&mut result, "name", "Ada Lovelace");
        assert!(result.is_valid);

        check_display_name(&mut result, "name", "R2-D2");
        assert!(!result.is_valid);
    }

    #[test]
    fn test_otp_format() {
        let mut result = ValidationResult::new();
        check_otp_format(&mut result, "otp", "123456");
        assert!(result.is_valid);
        check_otp_format(&mut result, "otp", "12345a");
        assert!(!result.is_valid);
    }
}
