//! Error types for survey targeting.
//!
//! Configuration problems are rejected when a trigger, survey, or engine
//! config is constructed. Collaborator failures are typed so the engine can
//! downgrade them to permissive or indeterminate outcomes at its boundary.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Validation errors raised while constructing triggers, surveys, or config.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Unknown trigger kind '{kind}'")]
    UnknownTriggerKind {
        kind: String,
    },

    #[error("Trigger kind '{kind}' requires field '{field}'")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("Trigger kind '{kind}' must not set field '{field}'")]
    UnexpectedField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("Trigger kind '{kind}' field '{field}' must be numeric, got '{value}'")]
    NonNumericValue {
        kind: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Invalid regular expression '{pattern}': {reason}")]
    InvalidRegex {
        pattern: String,
        reason: String,
    },

    #[error("Field '{field}' value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("Invalid schedule: starts_at ({starts_at}) must be before ends_at ({ends_at})")]
    InvalidSchedule {
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    },

    #[error("Invalid engine configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Execution errors raised by collaborators during evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("Storage error: {message}")]
    Storage {
        message: String,
    },

    #[error("DOM query failed: {message}")]
    DomQuery {
        message: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Operation cancelled by caller")]
    Cancelled,
}

/// Top-level error type for the targeting engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TargetingError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
}

impl TargetingError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Execution(e) => matches!(
                e,
                ExecutionError::Timeout { .. } | ExecutionError::Storage { .. } | ExecutionError::DomQuery { .. }
            ),
        }
    }
}

impl From<crate::storage::StorageError> for ExecutionError {
    fn from(err: crate::storage::StorageError) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }
}

impl From<crate::storage::StorageError> for TargetingError {
    fn from(err: crate::storage::StorageError) -> Self {
        Self::Execution(err.into())
    }
}

/// Result type alias for targeting operations.
pub type TargetingResult<T> = Result<T, TargetingError>;
