//! Measurement scales
//!
//! Quantity-kind parameters carry a scale that constrains which numbers are
//! acceptable: the number set (natural, integer, rational, real) and optional
//! bounds.

use crate::id::ThingId;
use serde::{Deserialize, Serialize};

/// Set of numbers a scale accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumberSet {
    /// 0, 1, 2, ...
    Natural,
    /// ..., -1, 0, 1, ...
    Integer,
    /// Any finite decimal
    Rational,
    /// Any finite number
    Real,
}

impl NumberSet {
    /// Check whether a parsed number belongs to this set
    #[inline]
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match self {
            NumberSet::Natural => value >= 0.0 && value.fract() == 0.0,
            NumberSet::Integer => value.fract() == 0.0,
            NumberSet::Rational | NumberSet::Real => true,
        }
    }
}

/// Measurement scale (unit plus numeric domain)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementScale {
    /// Identifier
    pub id: ThingId,
    /// Human-readable name
    pub name: String,
    /// Short name (unit symbol)
    pub short_name: String,
    /// Accepted number set
    pub number_set: NumberSet,
    /// Lower bound
    pub minimum: Option<f64>,
    /// Whether the lower bound is inclusive
    pub minimum_inclusive: bool,
    /// Upper bound
    pub maximum: Option<f64>,
    /// Whether the upper bound is inclusive
    pub maximum_inclusive: bool,
}

impl MeasurementScale {
    /// Create unbounded scale
    #[must_use]
    pub fn new(name: impl Into<String>, short_name: impl Into<String>, number_set: NumberSet) -> Self {
        Self {
            id: ThingId::new(),
            name: name.into(),
            short_name: short_name.into(),
            number_set,
            minimum: None,
            minimum_inclusive: true,
            maximum: None,
            maximum_inclusive: true,
        }
    }

    /// Create unbounded real-valued scale
    #[inline]
    #[must_use]
    pub fn real(name: impl Into<String>, short_name: impl Into<String>) -> Self {
        Self::new(name, short_name, NumberSet::Real)
    }

    /// With inclusive lower bound
    #[inline]
    #[must_use]
    pub fn with_minimum(mut self, minimum: f64, inclusive: bool) -> Self {
        self.minimum = Some(minimum);
        self.minimum_inclusive = inclusive;
        self
    }

    /// With upper bound
    #[inline]
    #[must_use]
    pub fn with_maximum(mut self, maximum: f64, inclusive: bool) -> Self {
        self.maximum = Some(maximum);
        self.maximum_inclusive = inclusive;
        self
    }

    /// Check a value against the bounds
    #[must_use]
    pub fn in_range(&self, value: f64) -> bool {
        let above_min = match self.minimum {
            Some(min) if self.minimum_inclusive => value >= min,
            Some(min) => value > min,
            None => true,
        };
        let below_max = match self.maximum {
            Some(max) if self.maximum_inclusive => value <= max,
            Some(max) => value < max,
            None => true,
        };
        above_min && below_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_set_membership() {
        assert!(NumberSet::Natural.contains(3.0));
        assert!(!NumberSet::Natural.contains(-1.0));
        assert!(!NumberSet::Integer.contains(1.5));
        assert!(NumberSet::Real.contains(-1.5));
        assert!(!NumberSet::Real.contains(f64::NAN));
    }

    #[test]
    fn scale_bounds() {
        let scale = MeasurementScale::real("percent", "%")
            .with_minimum(0.0, true)
            .with_maximum(100.0, false);

        assert!(scale.in_range(0.0));
        assert!(scale.in_range(99.9));
        assert!(!scale.in_range(100.0));
        assert!(!scale.in_range(-0.1));
    }
}
