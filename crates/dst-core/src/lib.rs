//! DST Core - engine/repository synchronization
//!
//! The adapter between a numeric engine workspace and an engineering data
//! repository:
//! - Validates variable/parameter pairings and lays structured values out
//!   as engine arrays (and back)
//! - Maps variables to element definitions and parameters to variables
//! - Persists correspondences in the repository so mappings survive restarts
//! - Transfers selected map results in either direction inside a single
//!   repository transaction, with a hash-chained audit trail
//!
//! # Example
//!
//! ```rust,ignore
//! use dst_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     engine: Arc<dyn NumericEngine>,
//! #     repository: Arc<dyn Repository>,
//! # ) -> Result<(), DstError> {
//! let config = DstConfig::default();
//! let mut controller =
//!     SynchronizationController::new(config, engine, repository, Arc::new(SummaryLogEntry));
//!
//! controller.connect(&EngineVersion::default()).await;
//! controller.load_script("model.m").await?;
//! controller.run_script().await?;
//!
//! controller.select_all_for_transfer_to_repository();
//! let outcome = controller.transfer_to_repository().await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod array;
pub mod audit;
pub mod config;
pub mod controller;
pub mod difference;
pub mod error;
pub mod log_entry;
pub mod mapping_store;
pub mod observable;
pub mod rules;
pub mod session;
pub mod telemetry;
pub mod types;
pub mod validity;

pub use array::{ArrayReconstructor, TimeTaggedRow, TimeTaggedValues};
pub use audit::{AuditAction, AuditEntry, AuditTrail};
pub use config::DstConfig;
pub use controller::{LoadedScript, SynchronizationController};
pub use difference::{DifferenceComputer, ValueDifference};
pub use error::{AuditError, DstError, ErrorCategory, ReconstructionError, SessionError};
pub use log_entry::{LogEntryProvider, SummaryLogEntry};
pub use mapping_store::{CorrespondenceKind, ExternalIdentifier, MappingCorrespondenceStore};
pub use observable::{CollectionChange, ObservableMap};
pub use rules::{MappingRule, ParameterToVariableRule, VariableToElementRule};
pub use session::{SessionState, SessionTracker};
pub use types::{MappedElement, MappingDirection, ParameterToVariableMapping, TransferOutcome};
pub use validity::ValidityChecker;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving a synchronization
    pub use crate::{
        DstConfig, DstError, LogEntryProvider, MappedElement, MappingDirection,
        ParameterToVariableMapping, SessionState, SummaryLogEntry, SynchronizationController,
        TransferOutcome,
    };
    pub use dst_repository::{Repository, ThingId};
    pub use dst_workspace::{EngineVersion, NumericEngine, Value, WorkspaceVariable};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
