// src/auth/validators.rs

use super::models::*;
use crate::common::validation::{
    check_display_name, check_email, check_otp_format, check_password_policy, check_required,
};
use crate::common::{ApiError, ValidationResult, Validator};
use tracing::warn;

pub struct AuthValidator;

impl Validator<PreRegisterRequest> for AuthValidator {
    fn validate(&self, data: &PreRegisterRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_email(&mut result, "email", &data.email);
        check_password_policy(&mut result, "password", &data.password);
        check_display_name(&mut result, "name", &data.name);
        result
    }
}

impl Validator<VerifyRegistrationRequest> for AuthValidator {
    fn validate(&self, data: &VerifyRegistrationRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_email(&mut result, "email", &data.email);
        check_otp_format(&mut result, "otp", &data.otp);
        result
    }
}

impl Validator<LoginRequest> for AuthValidator {
    fn validate(&self, data: &LoginRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_email(&mut result, "email", &data.email);
        check_required(&mut result, "password", &data.password, "Password is required");
        result
    }
}

impl Validator<UpdateProfileRequest> for AuthValidator {
    fn validate(&self, data: &UpdateProfileRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        if let Some(name) = &data.name {
            check_display_name(&mut result, "name", name);
        }
        if let Some(url) = &data.avatar_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                result.add_error("avatar_url", "Avatar URL must be a valid URL");
            }
        }
        result
    }
}

impl Validator<ChangePasswordRequest> for AuthValidator {
    fn validate(&self, data: &ChangePasswordRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_required(
            &mut result,
            "currentPassword",
            &data.current_password,
            "Current password is required",
        );
        check_password_policy(&mut result, "newPassword", &data.new_password);
        result
    }
}

impl Validator<EmailRequest> for AuthValidator {
    fn validate(&self, data: &EmailRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_email(&mut result, "email", &data.email);
        result
    }
}

impl Validator<VerifyEmailRequest> for AuthValidator {
    fn validate(&self, data: &VerifyEmailRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_email(&mut result, "email", &data.email);
        check_otp_format(&mut result, "otp", &data.otp);
        result
    }
}

impl Validator<OtpRequest> for AuthValidator {
    fn validate(&self, data: &OtpRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_otp_format(&mut result, "otp", &data.otp);
        result
    }
}

impl Validator<ResetPasswordRequest> for AuthValidator {
    fn validate(&self, data: &ResetPasswordRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_email(&mut result, "email", &data.email);
        check_otp_format(&mut result, "otp", &data.otp);
        check_password_policy(&mut result, "newPassword", &data.new_password);
        result
    }
}

/// Run the validator and turn failures into an `ApiError`
pub fn validate<T>(data: &T) -> Result<(), ApiError>
where
    AuthValidator: Validator<T>,
{
    let validation_result = AuthValidator.validate(data);
    if !validation_result.is_valid {
        warn!(errors = ?validation_result.errors, "Request validation failed");
        return Err(ApiError::from(validation_result));
    }
    Ok(())
}
