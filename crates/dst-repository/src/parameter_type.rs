//! Parameter types
//!
//! Scalar kinds hold one value per value set. Structured kinds hold an
//! ordered collection of sub-values:
//! - [`ParameterTypeKind::Array`]: fixed dimension, homogeneous cells, row-major
//! - [`ParameterTypeKind::SampledFunction`]: samples of independent and
//!   dependent components, each sample laid out in declaration order

use crate::id::ThingId;
use crate::scale::MeasurementScale;
use serde::{Deserialize, Serialize};

/// Repository parameter type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterType {
    /// Identifier
    pub id: ThingId,
    /// Name
    pub name: String,
    /// Short name
    pub short_name: String,
    /// Deprecated types are never offered as mapping candidates
    pub is_deprecated: bool,
    /// Value domain
    pub kind: ParameterTypeKind,
}

/// Value domain of a parameter type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterTypeKind {
    /// Quantity kind (numeric, scaled)
    Quantity {
        /// Scale used when the parameter does not specify one
        default_scale: Option<MeasurementScale>,
        /// Scales a parameter may choose from
        possible_scales: Vec<MeasurementScale>,
    },
    /// True / false
    Boolean,
    /// Free text
    Text,
    /// Calendar date
    Date,
    /// Date and time
    DateTime,
    /// One (or several) of a fixed set of literals
    Enumeration {
        /// Accepted literals
        literals: Vec<String>,
        /// Whether `a | b` selections are allowed
        allow_multi_select: bool,
    },
    /// Fixed-dimension homogeneous array
    Array {
        /// Extent per dimension
        dimension: Vec<usize>,
        /// Cell domain
        component: Box<ParameterTypeKind>,
    },
    /// Sampled function
    SampledFunction {
        /// Independent components (e.g. time)
        independent: Vec<ParameterTypeAssignment>,
        /// Dependent components
        dependent: Vec<ParameterTypeAssignment>,
    },
}

/// One component of a sampled function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterTypeAssignment {
    /// Short name of the component type
    pub short_name: String,
    /// Component domain
    pub kind: ParameterTypeKind,
    /// Component scale
    pub scale: Option<MeasurementScale>,
}

impl ParameterTypeAssignment {
    /// Create component
    #[inline]
    #[must_use]
    pub fn new(short_name: impl Into<String>, kind: ParameterTypeKind) -> Self {
        Self {
            short_name: short_name.into(),
            kind,
            scale: None,
        }
    }

    /// With scale
    #[inline]
    #[must_use]
    pub fn with_scale(mut self, scale: MeasurementScale) -> Self {
        self.scale = Some(scale);
        self
    }
}

impl ParameterType {
    /// Create parameter type of any kind
    #[must_use]
    pub fn new(name: impl Into<String>, short_name: impl Into<String>, kind: ParameterTypeKind) -> Self {
        Self {
            id: ThingId::new(),
            name: name.into(),
            short_name: short_name.into(),
            is_deprecated: false,
            kind,
        }
    }

    /// Quantity kind with a default scale
    #[must_use]
    pub fn quantity(name: impl Into<String>, short_name: impl Into<String>, scale: MeasurementScale) -> Self {
        Self::new(
            name,
            short_name,
            ParameterTypeKind::Quantity {
                possible_scales: vec![scale.clone()],
                default_scale: Some(scale),
            },
        )
    }

    /// Mark as deprecated
    #[inline]
    #[must_use]
    pub fn deprecated(mut self) -> Self {
        self.is_deprecated = true;
        self
    }

    /// Whether values are an ordered collection of sub-values
    #[inline]
    #[must_use]
    pub fn is_structured(&self) -> bool {
        matches!(
            self.kind,
            ParameterTypeKind::Array { .. } | ParameterTypeKind::SampledFunction { .. }
        )
    }

    /// Whether this is a sampled function type
    #[inline]
    #[must_use]
    pub fn is_sampled_function(&self) -> bool {
        matches!(self.kind, ParameterTypeKind::SampledFunction { .. })
    }

    /// Number of scalar values one value set (or one sample) holds
    ///
    /// - scalar kinds: 1
    /// - array: product of the dimensions
    /// - sampled function: independent + dependent components per sample
    #[must_use]
    pub fn value_arity(&self) -> usize {
        match &self.kind {
            ParameterTypeKind::Array { dimension, .. } => dimension.iter().product(),
            ParameterTypeKind::SampledFunction {
                independent,
                dependent,
            } => independent.len() + dependent.len(),
            _ => 1,
        }
    }

    /// Components of a sampled function in value-set order
    #[must_use]
    pub fn sampled_components(&self) -> Vec<&ParameterTypeAssignment> {
        match &self.kind {
            ParameterTypeKind::SampledFunction {
                independent,
                dependent,
            } => independent.iter().chain(dependent.iter()).collect(),
            _ => Vec::new(),
        }
    }

    /// Default scale of a quantity kind
    #[inline]
    #[must_use]
    pub fn default_scale(&self) -> Option<&MeasurementScale> {
        match &self.kind {
            ParameterTypeKind::Quantity { default_scale, .. } => default_scale.as_ref(),
            _ => None,
        }
    }

    /// Array dimension
    #[inline]
    #[must_use]
    pub fn dimension(&self) -> Option<&[usize]> {
        match &self.kind {
            ParameterTypeKind::Array { dimension, .. } => Some(dimension),
            _ => None,
        }
    }
}

impl ParameterTypeKind {
    /// Short label used in shape descriptions and logs
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            ParameterTypeKind::Quantity { .. } => "quantity",
            ParameterTypeKind::Boolean => "boolean",
            ParameterTypeKind::Text => "text",
            ParameterTypeKind::Date => "date",
            ParameterTypeKind::DateTime => "date-time",
            ParameterTypeKind::Enumeration { .. } => "enumeration",
            ParameterTypeKind::Array { .. } => "array",
            ParameterTypeKind::SampledFunction { .. } => "sampled function",
        }
    }
}
