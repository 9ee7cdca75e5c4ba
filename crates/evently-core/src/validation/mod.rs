//! Input validation at the HTTP boundary.
//!
//! Registration and profile edits go through these checks before any
//! credential is hashed or stored.

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;
use validator::ValidateEmail;

/// Validation error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Input exceeds maximum allowed length.
    #[error("{field} must be at most {max} characters (got {actual})")]
    TooLong {
        /// Field name.
        field: &'static str,
        /// Maximum allowed length.
        max: usize,
        /// Actual input length.
        actual: usize,
    },

    /// Required input is empty or whitespace.
    #[error("{field} cannot be blank")]
    Blank {
        /// Field name.
        field: &'static str,
    },

    /// Email does not look like an address.
    #[error("Email address is not valid")]
    InvalidEmail,

    /// Password does not meet the policy.
    #[error("Password {0}")]
    WeakPassword(&'static str),
}

/// Size limits per input type.
pub mod limits {
    /// Maximum display name length, in characters.
    pub const MAX_NAME_LENGTH: usize = 30;

    /// Minimum password length, in characters.
    pub const MIN_PASSWORD_LENGTH: usize = 8;

    /// Maximum password length, in bytes.
    pub const MAX_PASSWORD_LENGTH: usize = 128;

    /// Maximum email length, in bytes.
    pub const MAX_EMAIL_LENGTH: usize = 254;
}

/// Validate an email address and return it trimmed.
///
/// Case is preserved: addresses are compared exactly as stored.
///
/// # Errors
///
/// Returns `Blank`, `TooLong` or `InvalidEmail`.
pub fn validate_email(input: &str) -> Result<String, ValidationError> {
    let email = input.trim().to_string();

    if email.is_empty() {
        return Err(ValidationError::Blank { field: "email" });
    }

    if email.len() > limits::MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong {
            field: "email",
            max: limits::MAX_EMAIL_LENGTH,
            actual: email.len(),
        });
    }

    if !email.validate_email() {
        return Err(ValidationError::InvalidEmail);
    }

    Ok(email)
}

/// Check a password against the policy: at least 8 characters with an
/// uppercase letter, a digit and a non-alphanumeric character.
///
/// # Errors
///
/// Returns `WeakPassword` naming the first unmet rule, or `TooLong`.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < limits::MIN_PASSWORD_LENGTH {
        return Err(ValidationError::WeakPassword(
            "must be at least 8 characters long",
        ));
    }

    if password.len() > limits::MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong {
            field: "password",
            max: limits::MAX_PASSWORD_LENGTH,
            actual: password.len(),
        });
    }

    if !password.chars().any(char::is_uppercase) {
        return Err(ValidationError::WeakPassword(
            "must contain an uppercase letter",
        ));
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ValidationError::WeakPassword("must contain a digit"));
    }

    if password.chars().all(char::is_alphanumeric) {
        return Err(ValidationError::WeakPassword(
            "must contain a special character",
        ));
    }

    Ok(())
}

/// Validate and sanitize a display name.
///
/// Strips control characters, applies NFKC normalization and trims.
///
/// # Errors
///
/// Returns `Blank` or `TooLong`.
pub fn validate_name(input: &str) -> Result<String, ValidationError> {
    let name = sanitize(input);

    if name.is_empty() {
        return Err(ValidationError::Blank { field: "name" });
    }

    let actual = name.chars().count();
    if actual > limits::MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: "name",
            max: limits::MAX_NAME_LENGTH,
            actual,
        });
    }

    Ok(name)
}

/// Best-effort display name from third-party profile data.
///
/// Never fails: blank names fall back to the email local part and long
/// names are cut at the limit.
#[must_use]
pub fn display_name_or_fallback(name: &str, email: &str) -> String {
    let mut name = sanitize(name);
    if name.is_empty() {
        name = email.split('@').next().unwrap_or_default().to_string();
    }
    name.chars().take(limits::MAX_NAME_LENGTH).collect()
}

fn sanitize(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .nfkc()
        .collect::<String>()
        .trim()
        .to_string()
}
