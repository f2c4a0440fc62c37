//! Configuration validation system.

use std::collections::HashSet;

use super::types::GatewayConfig;
use crate::ip_allow::{MAX_METHODS, WELL_KNOWN_METHODS};

/// A single validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// Error message.
    pub message: String,
    /// Severity level.
    pub severity: ValidationSeverity,
}

impl ValidationError {
    /// Create a new error.
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Error,
        }
    }

    /// Create a new warning.
    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Warning,
        }
    }
}

/// Severity of validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    /// Error - configuration is invalid.
    Error,
    /// Warning - configuration may have issues.
    Warning,
}

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// Create a new empty (valid) result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error to the result.
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Check if the validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self
            .errors
            .iter()
            .any(|e| e.severity == ValidationSeverity::Error)
    }

    /// Get all validation errors.
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Get only errors (not warnings).
    #[must_use]
    pub fn errors_only(&self) -> Vec<&ValidationError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ValidationSeverity::Error)
            .collect()
    }

    /// Get only warnings.
    #[must_use]
    pub fn warnings(&self) -> Vec<&ValidationError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ValidationSeverity::Warning)
            .collect()
    }

    /// Merge another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
    }
}

/// Trait for configuration validators.
pub trait Validator: std::fmt::Debug + Send + Sync {
    /// Validate a configuration and return any errors.
    fn validate(&self, config: &GatewayConfig) -> ValidationResult;
}

/// Built-in validator for basic configuration checks.
#[derive(Debug, Default)]
pub struct BasicValidator;

impl BasicValidator {
    /// Create a new basic validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Validator for BasicValidator {
    fn validate(&self, config: &GatewayConfig) -> ValidationResult {
        let mut result = ValidationResult::new();
        let ip_allow = &config.ip_allow;

        if config.gateway.name.is_empty() {
            result.add_error(ValidationError::error(
                "gateway.name",
                "Gateway name cannot be empty",
            ));
        }

        if ip_allow.rules_file.as_os_str().is_empty() {
            result.add_error(ValidationError::error(
                "ip_allow.rules_file",
                "Rules file cannot be empty",
            ));
        }

        if ip_allow.hot_reload && ip_allow.poll_interval_secs == 0 {
            result.add_error(ValidationError::error(
                "ip_allow.poll_interval_secs",
                "Poll interval cannot be 0 when hot reload is enabled",
            ));
        }

        if ip_allow.grace_delay_secs == 0 && ip_allow.hot_reload {
            result.add_error(ValidationError::warning(
                "ip_allow.grace_delay_secs",
                "Replaced tables are released as soon as their last reader finishes",
            ));
        }

        let mut seen: HashSet<String> = WELL_KNOWN_METHODS
            .iter()
            .map(|m| (*m).to_string())
            .collect();
        for method in &ip_allow.extra_methods {
            if method.is_empty() {
                result.add_error(ValidationError::error(
                    "ip_allow.extra_methods",
                    "Method name cannot be empty",
                ));
            } else if !seen.insert(method.to_ascii_uppercase()) {
                result.add_error(ValidationError::error(
                    format!("ip_allow.extra_methods.{method}"),
                    format!("Duplicate method name: {method}"),
                ));
            }
        }

        if WELL_KNOWN_METHODS.len() + ip_allow.extra_methods.len() > MAX_METHODS {
            result.add_error(ValidationError::error(
                "ip_allow.extra_methods",
                format!("At most {MAX_METHODS} methods can be registered"),
            ));
        }

        result
    }
}
