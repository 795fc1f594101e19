//! Error types for the synchronization core
//!
//! Provides error handling for:
//! - Engine connection failures
//! - Type-incompatible mappings
//! - Stale correspondences
//! - Transfer failures
//! - Shape mismatches during array reconstruction

use crate::session::SessionState;
use dst_repository::{RepositoryError, ThingId, ValidationError};
use dst_workspace::{DecompositionError, EngineError, ScriptError};
use std::path::PathBuf;

/// Main synchronization error type
#[derive(Debug, thiserror::Error)]
pub enum DstError {
    /// Engine reported an error
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Engine session could not be opened
    #[error("engine version {version} is unavailable")]
    EngineUnavailable { version: String },

    /// Repository reported an error
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Value rejected by the repository's value domain
    #[error("incompatible value: {0}")]
    Validation(#[from] ValidationError),

    /// Structured value could not be laid out
    #[error("reconstruction failed: {0}")]
    Reconstruction(#[from] ReconstructionError),

    /// Malformed workspace array
    #[error("decomposition failed: {0}")]
    Decomposition(#[from] DecompositionError),

    /// Script could not be loaded
    #[error("script error: {0}")]
    Script(#[from] ScriptError),

    /// Correspondence points at a thing that no longer resolves
    #[error("stale correspondence: {thing} no longer resolves")]
    StaleCorrespondence { thing: ThingId },

    /// Transfer aborted
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// Operation not allowed in the current session state
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Audit history tampered with
    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Correspondence could not be encoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File system failure
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Bug or broken invariant
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Engine unreachable or version missing
    Connection,
    /// Mapping rejected by the validity checker
    TypeIncompatibility,
    /// Saved mapping no longer resolves
    StaleCorrespondence,
    /// Transaction build / commit failure
    Transfer,
    /// Array layout does not fit the parameter type
    ShapeMismatch,
    /// Bad configuration or input files
    Configuration,
    /// Broken invariant
    Internal,
}

impl DstError {
    /// Classify error
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Engine(_) | Self::EngineUnavailable { .. } => ErrorCategory::Connection,
            Self::Validation(_) => ErrorCategory::TypeIncompatibility,
            Self::StaleCorrespondence { .. } => ErrorCategory::StaleCorrespondence,
            Self::Repository(_) | Self::Transfer(_) => ErrorCategory::Transfer,
            Self::Reconstruction(_) | Self::Decomposition(_) => ErrorCategory::ShapeMismatch,
            Self::Script(_) | Self::Configuration(_) | Self::Io { .. } => ErrorCategory::Configuration,
            Self::Session(_) | Self::Audit(_) | Self::Serialization(_) | Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Whether the controller stays usable and the caller may retry
    ///
    /// Transfer failures are not retried automatically; partial writes are
    /// left to the repository's own atomicity.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.category(), ErrorCategory::Transfer | ErrorCategory::Internal)
    }

    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Array reconstruction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconstructionError {
    /// Parameter type holds a single value
    #[error("parameter type '{0}' is not structured")]
    NotStructured(String),

    /// Assignment count differs from the type's arity
    #[error("{actual} assignments for a type of arity {expected}")]
    ArityMismatch { expected: usize, actual: usize },

    /// An index is unassigned, duplicated or out of range
    #[error("assignments do not claim every index exactly once")]
    IncompleteAssignments,

    /// Value count is not a whole number of samples
    #[error("{values} values cannot be split into samples of {arity}")]
    ValueCount { values: usize, arity: usize },

    /// Array does not have the expected extent
    #[error("expected {expected} cells on the value axis, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Time axis requested but not assigned
    #[error("no assignment is flagged as the time axis")]
    NoTimeAxis,
}

/// Session state machine errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Transition not in the allowed set
    #[error("illegal transition {from:?} -> {to:?}")]
    IllegalTransition { from: SessionState, to: SessionState },

    /// Operation needs an open engine session
    #[error("operation requires a connected session (state: {0:?})")]
    NotConnected(SessionState),

    /// No script is loaded
    #[error("no script is loaded")]
    NoScript,
}

/// Audit trail errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    /// Hash chain broken at an entry
    #[error("audit chain broken at entry {index}")]
    IntegrityViolation { index: usize },
}
