//! Transfer audit trail
//!
//! Entries are staged while a transfer is being built. A successful commit
//! appends them to a SHA-256 hash chain; a cancel discards them.

use crate::error::AuditError;
use crate::types::MappingDirection;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What happened to the subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    Created,
    Updated,
    ValueTransferred,
    MappingSaved,
}

impl AuditAction {
    fn as_u8(self) -> u8 {
        match self {
            AuditAction::Created => 0,
            AuditAction::Updated => 1,
            AuditAction::ValueTransferred => 2,
            AuditAction::MappingSaved => 3,
        }
    }
}

/// One audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub direction: MappingDirection,
    /// Thing or variable the entry is about
    pub subject: String,
    pub action: AuditAction,
    pub detail: String,
    pub prev_hash: [u8; 32],
    pub hash: [u8; 32],
}

impl AuditEntry {
    #[must_use]
    pub fn new(
        direction: MappingDirection,
        subject: impl Into<String>,
        action: AuditAction,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            direction,
            subject: subject.into(),
            action,
            detail: detail.into(),
            prev_hash: [0u8; 32],
            hash: [0u8; 32],
        }
    }
}

/// Pending entries plus the committed, hash-chained history
#[derive(Debug, Default)]
pub struct AuditTrail {
    pending: Mutex<Vec<AuditEntry>>,
    history: Mutex<Vec<AuditEntry>>,
}

impl AuditTrail {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an entry for the running transfer
    pub fn record(
        &self,
        direction: MappingDirection,
        subject: impl Into<String>,
        action: AuditAction,
        detail: impl Into<String>,
    ) {
        self.pending
            .lock()
            .push(AuditEntry::new(direction, subject, action, detail));
    }

    /// Staged entries
    pub fn pending(&self) -> Vec<AuditEntry> {
        self.pending.lock().clone()
    }

    /// Append staged entries to the chain; returns how many were committed
    pub fn commit(&self) -> usize {
        let staged: Vec<AuditEntry> = std::mem::take(&mut *self.pending.lock());
        let mut history = self.history.lock();
        let count = staged.len();
        for mut entry in staged {
            entry.prev_hash = history.last().map_or([0u8; 32], |e| e.hash);
            entry.hash = compute_hash(&entry);
            history.push(entry);
        }
        count
    }

    /// Drop staged entries; returns how many were dropped
    pub fn discard_pending(&self) -> usize {
        let mut pending = self.pending.lock();
        let count = pending.len();
        pending.clear();
        count
    }

    /// Committed entries
    pub fn history(&self) -> Vec<AuditEntry> {
        self.history.lock().clone()
    }

    /// Hex hash of the chain head
    pub fn head(&self) -> Option<String> {
        self.history.lock().last().map(|e| hex::encode(e.hash))
    }

    /// Re-hash the chain
    ///
    /// # Errors
    /// Returns `IntegrityViolation` at the first broken link
    pub fn verify_integrity(&self) -> Result<(), AuditError> {
        let history = self.history.lock();
        let mut prev = [0u8; 32];
        for (index, entry) in history.iter().enumerate() {
            if entry.prev_hash != prev || entry.hash != compute_hash(entry) {
                return Err(AuditError::IntegrityViolation { index });
            }
            prev = entry.hash;
        }
        Ok(())
    }

    #[cfg(test)]
    fn tamper(&self, index: usize, detail: &str) {
        if let Some(entry) = self.history.lock().get_mut(index) {
            entry.detail = detail.to_string();
        }
    }
}

fn compute_hash(entry: &AuditEntry) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(entry.timestamp.timestamp_micros().to_le_bytes());
    hasher.update([match entry.direction {
        MappingDirection::DstToHub => 0u8,
        MappingDirection::HubToDst => 1u8,
    }]);
    hasher.update(entry.subject.as_bytes());
    hasher.update([0]);
    hasher.update([entry.action.as_u8()]);
    hasher.update(entry.detail.as_bytes());
    hasher.update([0]);
    hasher.update(entry.prev_hash);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_chains_entries() {
        let trail = AuditTrail::new();
        trail.record(MappingDirection::DstToHub, "sat", AuditAction::Created, "element");
        trail.record(MappingDirection::DstToHub, "mass", AuditAction::Updated, "12 -> 13");
        assert_eq!(trail.pending().len(), 2);

        assert_eq!(trail.commit(), 2);
        assert!(trail.pending().is_empty());

        let history = trail.history();
        assert_eq!(history[1].prev_hash, history[0].hash);
        assert!(trail.verify_integrity().is_ok());
        assert_eq!(trail.head().map(|h| h.len()), Some(64));
    }

    #[test]
    fn discard_drops_only_pending() {
        let trail = AuditTrail::new();
        trail.record(MappingDirection::HubToDst, "x", AuditAction::ValueTransferred, "1");
        trail.commit();
        trail.record(MappingDirection::HubToDst, "y", AuditAction::ValueTransferred, "2");
        assert_eq!(trail.discard_pending(), 1);
        assert_eq!(trail.history().len(), 1);
    }

    #[test]
    fn tampering_is_detected() {
        let trail = AuditTrail::new();
        for i in 0..3 {
            trail.record(MappingDirection::DstToHub, format!("p{i}"), AuditAction::Updated, "v");
        }
        trail.commit();
        trail.tamper(1, "forged");
        assert_eq!(
            trail.verify_integrity(),
            Err(AuditError::IntegrityViolation { index: 1 })
        );
    }
}
