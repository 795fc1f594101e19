//! DST Workspace - numeric engine side of the synchronization
//!
//! Provides:
//! - [`Value`] / [`ArrayValue`]: scalars and 2-D arrays (nesting expresses
//!   higher dimensions)
//! - [`WorkspaceVariable`]: a named value plus its mapping selectors, with
//!   deterministic row-major decomposition into scalar leaves
//! - [`recompose`] and [`plan_reconciliation`] for the inverse direction and
//!   for merging a re-read array into an existing decomposition
//! - [`NumericEngine`]: the engine collaborator
//! - [`ScriptParser`]: input discovery in plain-text scripts
//!
//! # Example
//!
//! ```rust,ignore
//! use dst_workspace::{ArrayValue, Value, WorkspaceVariable};
//!
//! let matrix = ArrayValue::from_rows(vec![
//!     vec![Value::Number(1.0), Value::Number(2.0)],
//!     vec![Value::Number(3.0), Value::Number(4.0)],
//! ])?;
//! let mut variable = WorkspaceVariable::new("m", Value::Array(matrix));
//! let flattened = variable.decompose();
//! assert_eq!(flattened.len(), 5);
//! assert_eq!(flattened[2].name, "m[0,1]");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod engine;
pub mod error;
pub mod script;
pub mod selection;
pub mod value;
pub mod variable;

pub use engine::{EngineVersion, NumericEngine};
pub use error::{DecompositionError, EngineError, ScriptError};
pub use script::{AssignmentScriptParser, ScriptParser};
pub use selection::{IndexAssignment, MappingValidity, RowColumnSelection, TypeCompatibility};
pub use value::{ArrayValue, Value};
pub use variable::{plan_reconciliation, recompose, ReconciliationPlan, WorkspaceVariable};
