//! Experiment errors and validation utilities

use thiserror::Error;

use super::entity::ExperimentStatus;

/// Errors raised by experiment construction, lifecycle and recording
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExperimentError {
    #[error("Experiment validation failed: {message}")]
    Validation { message: String },

    #[error("Variant '{variant_id}' is not part of this experiment")]
    InvalidVariant { variant_id: String },

    #[error("Invalid experiment status transition from {current} to {attempted}")]
    InvalidTransition {
        current: ExperimentStatus,
        attempted: ExperimentStatus,
    },
}

impl ExperimentError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Validate a traffic split percentage routed to variant A
pub fn validate_traffic_split(split: u8) -> Result<(), ExperimentError> {
    if split > 100 {
        return Err(ExperimentError::validation(format!(
            "traffic_split must be between 0 and 100, got {}",
            split
        )));
    }

    Ok(())
}

/// Validate the confidence threshold, which must lie in (0, 1]
pub fn validate_confidence_threshold(threshold: f64) -> Result<(), ExperimentError> {
    if threshold.is_nan() || threshold <= 0.0 || threshold > 1.0 {
        return Err(ExperimentError::validation(format!(
            "confidence_threshold must be in (0, 1], got {}",
            threshold
        )));
    }

    Ok(())
}

/// Validate the minimum number of runs per variant before a winner can be declared
pub fn validate_min_sample_size(size: u64) -> Result<(), ExperimentError> {
    if size < 1 {
        return Err(ExperimentError::validation("min_sample_size must be at least 1"));
    }

    Ok(())
}
