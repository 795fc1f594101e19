//! External identifier maps
//!
//! The repository-side storage for mapping correspondences: a named map per
//! tool whose entries link an internal thing to an opaque external id string.

use crate::id::ThingId;
use serde::{Deserialize, Serialize};

/// One persisted link between a repository thing and an external identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdCorrespondence {
    pub id: ThingId,
    /// Repository side
    pub internal_thing: ThingId,
    /// Tool side (opaque to the repository)
    pub external_id: String,
}

impl IdCorrespondence {
    #[must_use]
    pub fn new(internal_thing: ThingId, external_id: impl Into<String>) -> Self {
        Self {
            id: ThingId::new(),
            internal_thing,
            external_id: external_id.into(),
        }
    }
}

/// Named collection of correspondences owned by one tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentifierMap {
    pub id: ThingId,
    /// Mapping configuration name
    pub name: String,
    /// Tool that owns the map
    pub tool_name: String,
    pub correspondences: Vec<IdCorrespondence>,
}

impl ExternalIdentifierMap {
    #[must_use]
    pub fn new(name: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            id: ThingId::new(),
            name: name.into(),
            tool_name: tool_name.into(),
            correspondences: Vec::new(),
        }
    }

    /// Correspondences pointing at a thing
    pub fn correspondences_for(&self, internal_thing: ThingId) -> impl Iterator<Item = &IdCorrespondence> {
        self.correspondences
            .iter()
            .filter(move |c| c.internal_thing == internal_thing)
    }
}
