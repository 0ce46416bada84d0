//! Prompt template errors and field validation

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use super::variable::VariableType;

/// Identifier rule shared by variable names and substitution markers
static IDENTIFIER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Template construction, composition and rendering errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TemplateError {
    #[error("Template validation failed: {message}")]
    Validation { message: String },

    #[error("Missing required variable: {name}")]
    MissingVariable { name: String },

    #[error("Cannot coerce variable '{name}' to {expected}: {reason}")]
    Coercion {
        name: String,
        expected: VariableType,
        reason: String,
    },

    #[error("Circular template reference: {}", chain.join(" -> "))]
    CircularReference { chain: Vec<String> },

    #[error("Unresolved template reference '{reference}' in template '{template}'")]
    UnresolvedReference { template: String, reference: String },
}

impl TemplateError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Check that a name is a valid substitution identifier
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER_PATTERN.is_match(name)
}

/// Reject empty or whitespace-only required text fields
pub fn require_non_empty(field: &str, value: &str) -> Result<(), TemplateError> {
    if value.trim().is_empty() {
        return Err(TemplateError::validation(format!("{} cannot be empty", field)));
    }

    Ok(())
}

/// Reject a floating point field outside an inclusive range
pub fn require_range(field: &str, value: f64, min: f64, max: f64) -> Result<(), TemplateError> {
    if value.is_nan() || value < min || value > max {
        return Err(TemplateError::validation(format!(
            "{} must be between {} and {}, got {}",
            field, min, max, value
        )));
    }

    Ok(())
}
