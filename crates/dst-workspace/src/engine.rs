//! Numeric engine collaborator
//!
//! The engine owns the live workspace. The synchronization core only talks
//! to it through [`NumericEngine`]; the transport (COM, IPC, in-process) is
//! the implementor's concern.

use crate::error::EngineError;
use crate::variable::WorkspaceVariable;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine release to attach to (e.g. `R2021a`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineVersion(pub String);

impl EngineVersion {
    #[inline]
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Default for EngineVersion {
    fn default() -> Self {
        Self::new("R2021a")
    }
}

/// Session with the numeric computing engine
#[async_trait]
pub trait NumericEngine: Send + Sync {
    /// Attach to the engine; `false` if the version is unavailable
    async fn connect(&self, version: &EngineVersion) -> bool;

    /// Detach from the engine
    async fn disconnect(&self);

    /// Run a command in the engine and return its textual output
    ///
    /// # Errors
    /// Returns error if the command fails or no session is open
    async fn execute_function(&self, command: &str) -> Result<String, EngineError>;

    /// Read a variable from the workspace
    ///
    /// Returns `None` if the name is not defined.
    async fn get_variable(&self, name: &str) -> Option<WorkspaceVariable>;

    /// Write a variable (its [`engine_value`](WorkspaceVariable::engine_value))
    ///
    /// # Errors
    /// Returns error if the engine rejects the value
    async fn put_variable(&self, variable: &WorkspaceVariable) -> Result<(), EngineError>;
}
