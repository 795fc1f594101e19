//! Copy-on-write transactions
//!
//! A transaction collects deep copies of the things to create or update in
//! one write. Registering the same thing twice keeps the first operation kind
//! and the latest payload, so callers can refine a clone as they go.

use crate::id::ThingId;
use crate::model::{ClassKind, Iteration, Thing};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

/// Log entry attached to a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub id: ThingId,
    pub content: String,
    pub created_on: DateTime<Utc>,
}

impl LogEntry {
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: ThingId::new(),
            content: content.into(),
            created_on: Utc::now(),
        }
    }
}

/// One change in a transaction
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Thing does not exist in the repository yet
    Create(Thing),
    /// Thing exists; payload is the modified clone
    Update(Thing),
}

impl Operation {
    /// Payload
    #[inline]
    #[must_use]
    pub fn thing(&self) -> &Thing {
        match self {
            Operation::Create(t) | Operation::Update(t) => t,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_create(&self) -> bool {
        matches!(self, Operation::Create(_))
    }
}

/// Pending write against an iteration
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    context: ThingId,
    operations: IndexMap<ThingId, Operation>,
    log_entry: Option<LogEntry>,
}

impl Transaction {
    /// Start transaction in the context of an iteration
    #[inline]
    #[must_use]
    pub fn new(context: ThingId) -> Self {
        Self {
            context,
            operations: IndexMap::new(),
            log_entry: None,
        }
    }

    /// Iteration this transaction writes into
    #[inline]
    #[must_use]
    pub fn context(&self) -> ThingId {
        self.context
    }

    /// Register a clone as created or updated depending on whether the
    /// iteration already contains it
    pub fn create_or_update(&mut self, thing: Thing, iteration: &Iteration) {
        let exists = iteration.contains(thing.id());
        self.register(thing, exists);
    }

    /// Register a new thing
    pub fn create(&mut self, thing: Thing) {
        self.register(thing, false);
    }

    /// Register a modified clone of an existing thing
    pub fn update(&mut self, thing: Thing) {
        self.register(thing, true);
    }

    fn register(&mut self, thing: Thing, exists: bool) {
        let id = thing.id();
        let operation = match self.operations.get(&id) {
            Some(Operation::Create(_)) => Operation::Create(thing),
            Some(Operation::Update(_)) => Operation::Update(thing),
            None if exists => Operation::Update(thing),
            None => Operation::Create(thing),
        };
        self.operations.insert(id, operation);
    }

    /// Attach log entry
    pub fn attach_log_entry(&mut self, entry: LogEntry) {
        self.log_entry = Some(entry);
    }

    #[inline]
    #[must_use]
    pub fn log_entry(&self) -> Option<&LogEntry> {
        self.log_entry.as_ref()
    }

    /// Operations in registration order
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.values()
    }

    /// Operation registered for a thing
    #[inline]
    #[must_use]
    pub fn operation(&self, id: ThingId) -> Option<&Operation> {
        self.operations.get(&id)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, id: ThingId) -> bool {
        self.operations.contains_key(&id)
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Number of operations touching a class of thing
    #[must_use]
    pub fn count_of(&self, kind: ClassKind) -> usize {
        self.operations
            .values()
            .filter(|op| op.thing().class_kind() == kind)
            .count()
    }
}
