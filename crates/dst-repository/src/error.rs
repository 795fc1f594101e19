//! Error types for the repository model
//!
//! - [`RepositoryError`]: session and transaction failures reported by the
//!   repository collaborator
//! - [`ValidationError`]: value-domain violations found by
//!   [`ParameterType::validate`](crate::ParameterType::validate)

use crate::id::ThingId;
use crate::scale::NumberSet;

/// Repository session / persistence errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// No iteration is open in the session
    #[error("no iteration is open")]
    NoOpenIteration,

    /// Thing could not be resolved
    #[error("thing not found: {0}")]
    ThingNotFound(ThingId),

    /// Write was rejected by the repository
    #[error("write rejected: {0}")]
    WriteRejected(String),

    /// Refresh of the session failed
    #[error("refresh failed: {0}")]
    RefreshFailed(String),

    /// Transport-level failure
    #[error("session error: {0}")]
    Session(String),
}

/// Value-domain validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Value is not a number
    #[error("'{value}' is not a number")]
    NotANumber { value: String },

    /// Value violates the scale's number set
    #[error("'{value}' is not in the {number_set:?} number set")]
    NumberSetViolation { value: String, number_set: NumberSet },

    /// Value outside the scale's bounds
    #[error("{value} is outside the range of scale '{scale}'")]
    OutOfRange { value: f64, scale: String },

    /// Value is not a boolean literal
    #[error("'{value}' is not a boolean")]
    NotABoolean { value: String },

    /// Value is not one of the enumeration literals
    #[error("'{value}' is not one of {allowed:?}")]
    NotAnEnumerationLiteral { value: String, allowed: Vec<String> },

    /// Multiple literals given to a single-select enumeration
    #[error("enumeration does not allow multiple selections: '{value}'")]
    MultiSelectNotAllowed { value: String },

    /// Value is not a date / date-time
    #[error("'{value}' is not a valid {expected}")]
    InvalidDate { value: String, expected: &'static str },

    /// Number of values does not match the type's arity
    #[error("expected {expected} values, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    /// Deprecated types never accept values
    #[error("parameter type '{0}' is deprecated")]
    Deprecated(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_error_display() {
        let err = RepositoryError::WriteRejected("conflict".to_string());
        assert!(err.to_string().contains("write rejected"));
    }

    #[test]
    fn validation_error_display() {
        let err = ValidationError::NotANumber {
            value: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "'abc' is not a number");
    }
}
