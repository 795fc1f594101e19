//! Error types for the workspace side
//!
//! - [`DecompositionError`]: malformed arrays
//! - [`EngineError`]: numeric engine collaborator failures
//! - [`ScriptError`]: script input discovery failures

use std::path::PathBuf;

/// Array shape errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecompositionError {
    /// Cell count does not match the declared shape
    #[error("shape {rows}x{cols} needs {expected} cells, got {actual}")]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        expected: usize,
        actual: usize,
    },

    /// Rows of different lengths
    #[error("row {row} has {actual} cells, expected {expected}")]
    RaggedRows {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

/// Numeric engine errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Engine not reachable or requested version missing
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// No open session
    #[error("engine session is not open")]
    NotConnected,

    /// Command failed inside the engine
    #[error("'{command}' failed: {message}")]
    Execution { command: String, message: String },

    /// Variable does not exist in the workspace
    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    /// IPC / transport failure
    #[error("transport error: {0}")]
    Transport(String),
}

/// Script input discovery errors
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// Script file could not be read or copied
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Literal could not be parsed
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
}

impl ScriptError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
