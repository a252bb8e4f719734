//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject static directories that could escape the app directory
//! - Require certificate material when HTTPS is enabled
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::AppConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.static_dir.local_path.contains("./") {
        errors.push(ValidationError::new(
            "static_dir.local_path",
            "must not contain './'",
        ));
    }

    if config.http.https {
        if config.http.cert_path.is_empty() {
            errors.push(ValidationError::new(
                "http.cert_path",
                "required when https is enabled",
            ));
        }
        if config.http.key_path.is_empty() {
            errors.push(ValidationError::new(
                "http.key_path",
                "required when https is enabled",
            ));
        }
    }

    if !config.rate.per_second.is_finite() {
        errors.push(ValidationError::new("rate.per_second", "must be finite"));
    }

    if config.http.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "http.request_timeout_secs",
            "must be greater than 0",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
