//! Log entry capture collaborator

use async_trait::async_trait;

/// Asks the user for the log entry attached to a repository transfer
#[async_trait]
pub trait LogEntryProvider: Send + Sync {
    /// `summary` describes the pending transfer; `None` cancels it
    async fn request_log_entry(&self, summary: &str) -> Option<String>;
}

/// Accepts every transfer with the summary as entry
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryLogEntry;

#[async_trait]
impl LogEntryProvider for SummaryLogEntry {
    async fn request_log_entry(&self, summary: &str) -> Option<String> {
        Some(summary.to_string())
    }
}
