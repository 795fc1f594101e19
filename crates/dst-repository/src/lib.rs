//! DST Repository - engineering data model
//!
//! The strongly-typed side of the synchronization:
//! - Element definitions, usages, parameters and their value sets
//! - Parameter types (scalar, array, sampled function) and measurement scales
//! - Value-domain validation delegated to by the validity checker
//! - Copy-on-write transactions
//! - External identifier maps that persist mapping correspondences
//! - The [`Repository`] session collaborator
//!
//! # Example
//!
//! ```rust,ignore
//! use dst_repository::{MeasurementScale, Parameter, ParameterType};
//!
//! let mass = ParameterType::quantity("mass", "m", MeasurementScale::real("kilogram", "kg"));
//! let mut parameter = Parameter::new(mass, None);
//! parameter.value_sets[0].set_manual(vec!["12.5".to_string()]);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod error;
pub mod external_map;
pub mod id;
pub mod model;
pub mod parameter_type;
pub mod repository;
pub mod scale;
pub mod transaction;
pub mod validation;

pub use error::{RepositoryError, ValidationError};
pub use external_map::{ExternalIdentifierMap, IdCorrespondence};
pub use id::ThingId;
pub use model::{
    ActualFiniteState, ClassKind, DomainOption, ElementDefinition, ElementUsage, Iteration,
    Parameter, ParameterOverride, ParameterSwitchKind, Thing, ValueSet,
};
pub use parameter_type::{ParameterType, ParameterTypeAssignment, ParameterTypeKind};
pub use repository::Repository;
pub use scale::{MeasurementScale, NumberSet};
pub use transaction::{LogEntry, Operation, Transaction};

/// Marker the repository uses for "no value"
pub const PLACEHOLDER_VALUE: &str = "-";
