//! Mapping selectors carried by a workspace variable

use crate::variable::WorkspaceVariable;
use dst_repository::{MeasurementScale, ParameterType};
use serde::{Deserialize, Serialize};

/// Which array axis holds the samples of a sampled function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RowColumnSelection {
    /// Each row is a sample, each column a component
    #[default]
    Column,
    /// Each column is a sample, each row a component
    Row,
}

/// Pins one component of a sampled function to one row/column index
///
/// `index` is kept as text because it is chosen from the list of available
/// indexes; [`index_value`](Self::index_value) parses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexAssignment {
    /// Short name of the sampled function component
    pub component: String,
    /// Chosen row/column index
    pub index: String,
    /// Whether this component is the time axis
    pub is_time_axis: bool,
}

impl IndexAssignment {
    #[must_use]
    pub fn new(component: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            index: index.into(),
            is_time_axis: false,
        }
    }

    /// Mark as the time axis
    #[inline]
    #[must_use]
    pub fn time_axis(mut self) -> Self {
        self.is_time_axis = true;
        self
    }

    /// Parsed index
    #[inline]
    #[must_use]
    pub fn index_value(&self) -> Option<usize> {
        self.index.trim().parse().ok()
    }
}

/// Tri-state mapping validity observed by the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MappingValidity {
    #[default]
    NotEvaluated,
    Valid,
    Invalid,
}

impl From<bool> for MappingValidity {
    fn from(valid: bool) -> Self {
        if valid {
            MappingValidity::Valid
        } else {
            MappingValidity::Invalid
        }
    }
}

/// Type/shape compatibility between a variable and a parameter type
///
/// Implemented by the validity checker; kept as a trait so the variable model
/// does not depend on the synchronization core.
pub trait TypeCompatibility {
    /// Whether `variable` may be mapped to a parameter of `parameter_type`
    fn is_compatible(
        &self,
        variable: &WorkspaceVariable,
        parameter_type: &ParameterType,
        scale: Option<&MeasurementScale>,
    ) -> bool;
}
