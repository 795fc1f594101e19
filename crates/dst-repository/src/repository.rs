//! Repository session collaborator
//!
//! The persistence, session and transaction substrate is external. This trait
//! is the whole surface the synchronization core consumes.

use crate::error::RepositoryError;
use crate::external_map::ExternalIdentifierMap;
use crate::id::ThingId;
use crate::model::{Iteration, Thing};
use crate::transaction::{LogEntry, Transaction};
use async_trait::async_trait;

/// Session with the engineering data repository
#[async_trait]
pub trait Repository: Send + Sync {
    /// Snapshot of the open iteration, if any
    fn open_iteration(&self) -> Option<Iteration>;

    /// Resolve a thing in the open iteration
    ///
    /// Returns `None` for dangling references.
    fn get_thing_by_id(&self, id: ThingId) -> Option<Thing>;

    /// Commit a transaction
    ///
    /// # Errors
    /// Returns error if the repository rejects the write
    async fn write(&self, transaction: Transaction) -> Result<(), RepositoryError>;

    /// Reload the session cache from the server
    ///
    /// # Errors
    /// Returns error if the session cannot be refreshed
    async fn refresh(&self) -> Result<(), RepositoryError>;

    /// External identifier maps owned by a tool
    fn available_external_identifier_maps(&self, tool_name: &str) -> Vec<ExternalIdentifierMap> {
        self.open_iteration()
            .map(|iteration| {
                iteration
                    .external_identifier_maps
                    .into_iter()
                    .filter(|m| m.tool_name == tool_name)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Attach a log entry to a transaction
    fn register_log_entry(&self, content: &str, transaction: &mut Transaction) {
        transaction.attach_log_entry(LogEntry::new(content));
    }
}
