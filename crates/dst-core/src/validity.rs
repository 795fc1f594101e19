//! Variable / parameter type compatibility
//!
//! Scalar types delegate to the repository's value-domain validation.
//! Structured types need an unflattened array of the right extent and, for
//! sampled functions, a complete set of index assignments.

use dst_repository::{Iteration, MeasurementScale, ParameterType, ParameterTypeKind};
use dst_workspace::{
    ArrayValue, IndexAssignment, RowColumnSelection, TypeCompatibility, Value, WorkspaceVariable,
};

/// Decides whether a pairing may be mapped
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidityChecker;

impl ValidityChecker {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Whether a scalar value fits a scalar parameter type
    ///
    /// Arrays and placeholders never fit a scalar type.
    #[must_use]
    pub fn is_type_compatible(
        &self,
        parameter_type: &ParameterType,
        value: &Value,
        scale: Option<&MeasurementScale>,
    ) -> bool {
        if parameter_type.is_structured() || value.is_array() || value.is_placeholder() {
            return false;
        }
        match parameter_type.validate(&value.to_repository_value(), scale) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(parameter_type = %parameter_type.name, error = %e, "value rejected");
                false
            }
        }
    }

    /// Whether an array fits a structured parameter type
    #[must_use]
    pub fn is_structure_compatible(
        &self,
        parameter_type: &ParameterType,
        array: &ArrayValue,
        selection: RowColumnSelection,
        assignments: &[IndexAssignment],
    ) -> bool {
        let arity = parameter_type.value_arity();
        match &parameter_type.kind {
            ParameterTypeKind::Array { component, .. } => {
                let cell_type = ParameterType::new(&parameter_type.name, &parameter_type.short_name, (**component).clone());
                array.len() == arity
                    && array
                        .cells()
                        .iter()
                        .all(|cell| self.is_type_compatible(&cell_type, cell, parameter_type.default_scale()))
            }
            ParameterTypeKind::SampledFunction { .. } => {
                let axis = match selection {
                    RowColumnSelection::Column => array.cols(),
                    RowColumnSelection::Row => array.rows(),
                };
                axis == arity
                    && assignments.len() == arity
                    && Self::assignments_are_complete(assignments, &Self::available_indexes(array, selection))
            }
            _ => false,
        }
    }

    /// True iff every available index is claimed by exactly one assignment
    #[must_use]
    pub fn assignments_are_complete(assignments: &[IndexAssignment], available_indexes: &[String]) -> bool {
        assignments.len() == available_indexes.len()
            && available_indexes
                .iter()
                .all(|index| assignments.iter().filter(|a| a.index.trim() == index.as_str()).count() == 1)
    }

    /// Indexes along the component axis of an array
    #[must_use]
    pub fn available_indexes(array: &ArrayValue, selection: RowColumnSelection) -> Vec<String> {
        let extent = match selection {
            RowColumnSelection::Column => array.cols(),
            RowColumnSelection::Row => array.rows(),
        };
        (0..extent).map(|i| i.to_string()).collect()
    }

    /// Non-deprecated parameter types of an iteration
    pub fn candidate_parameter_types(iteration: &Iteration) -> impl Iterator<Item = &ParameterType> {
        iteration.parameter_types.iter().filter(|t| !t.is_deprecated)
    }

    /// Parameter types a variable could be mapped to as it stands
    #[must_use]
    pub fn compatible_parameter_types<'a>(
        &self,
        variable: &WorkspaceVariable,
        iteration: &'a Iteration,
    ) -> Vec<&'a ParameterType> {
        Self::candidate_parameter_types(iteration)
            .filter(|t| match variable.unflattened_array() {
                Some(array) if t.is_structured() => match &t.kind {
                    ParameterTypeKind::SampledFunction { .. } => {
                        let arity = t.value_arity();
                        array.cols() == arity || array.rows() == arity
                    }
                    _ => array.len() == t.value_arity(),
                },
                Some(_) => false,
                None => self.is_type_compatible(t, &variable.actual_value, None),
            })
            .collect()
    }
}

impl TypeCompatibility for ValidityChecker {
    fn is_compatible(
        &self,
        variable: &WorkspaceVariable,
        parameter_type: &ParameterType,
        scale: Option<&MeasurementScale>,
    ) -> bool {
        if parameter_type.is_deprecated {
            return false;
        }
        if parameter_type.is_structured() {
            return variable.unflattened_array().is_some_and(|array| {
                self.is_structure_compatible(
                    parameter_type,
                    array,
                    variable.row_column_selection,
                    &variable.index_assignments,
                )
            });
        }
        self.is_type_compatible(parameter_type, &variable.actual_value, scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dst_repository::{NumberSet, ParameterTypeAssignment};

    fn indexes(values: &[&str]) -> Vec<IndexAssignment> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| IndexAssignment::new(format!("c{i}"), *v))
            .collect()
    }

    fn available() -> Vec<String> {
        vec!["0".to_string(), "1".to_string()]
    }

    #[test]
    fn duplicated_index_is_incomplete() {
        assert!(!ValidityChecker::assignments_are_complete(&indexes(&["1", "1"]), &available()));
        assert!(ValidityChecker::assignments_are_complete(&indexes(&["0", "1"]), &available()));
        assert!(ValidityChecker::assignments_are_complete(&indexes(&["1", "0"]), &available()));
        assert!(!ValidityChecker::assignments_are_complete(&indexes(&["0"]), &available()));
        assert!(!ValidityChecker::assignments_are_complete(&indexes(&["0", "1", "2"]), &available()));
    }

    fn bounded_mass() -> ParameterType {
        let scale = MeasurementScale::new("kilogram", "kg", NumberSet::Real).with_minimum(0.0, true);
        ParameterType::quantity("mass", "m", scale)
    }

    #[test]
    fn scalar_delegates_to_value_domain() {
        let checker = ValidityChecker::new();
        assert!(checker.is_type_compatible(&bounded_mass(), &Value::Number(3.0), None));
        assert!(!checker.is_type_compatible(&bounded_mass(), &Value::Number(-3.0), None));
        assert!(!checker.is_type_compatible(&bounded_mass(), &Value::Text("abc".into()), None));

        let array = Value::Array(ArrayValue::from_numbers(&[vec![1.0]]).unwrap());
        assert!(!checker.is_type_compatible(&bounded_mass(), &array, None));
    }

    #[test]
    fn deprecated_types_are_never_compatible() {
        let checker = ValidityChecker::new();
        let deprecated = bounded_mass().deprecated();
        let variable = WorkspaceVariable::new("m", Value::Number(1.0));
        assert!(!checker.is_compatible(&variable, &deprecated, None));

        let mut iteration = Iteration::new();
        iteration.parameter_types = vec![deprecated, bounded_mass()];
        assert_eq!(ValidityChecker::candidate_parameter_types(&iteration).count(), 1);
    }

    fn sampled_function() -> ParameterType {
        let real = || ParameterTypeKind::Quantity {
            default_scale: None,
            possible_scales: Vec::new(),
        };
        ParameterType::new(
            "profile",
            "p",
            ParameterTypeKind::SampledFunction {
                independent: vec![
                    ParameterTypeAssignment::new("t", real()),
                    ParameterTypeAssignment::new("x", real()),
                ],
                dependent: vec![ParameterTypeAssignment::new("y", real())],
            },
        )
    }

    #[test]
    fn sampled_function_needs_matching_axis_and_assignments() {
        let checker = ValidityChecker::new();
        let mut variable = WorkspaceVariable::new(
            "s",
            Value::Array(ArrayValue::from_numbers(&[vec![0.0, 1.0, 2.0], vec![1.0, 2.0, 3.0]]).unwrap()),
        );
        variable.decompose();
        let pt = sampled_function();

        assert!(!checker.is_compatible(&variable, &pt, None));

        variable.set_assignments(RowColumnSelection::Column, indexes(&["0", "1", "2"]));
        assert!(checker.is_compatible(&variable, &pt, None));

        variable.set_assignments(RowColumnSelection::Column, indexes(&["0", "0", "2"]));
        assert!(!checker.is_compatible(&variable, &pt, None));

        variable.set_assignments(RowColumnSelection::Row, indexes(&["0", "1", "2"]));
        assert!(!checker.is_compatible(&variable, &pt, None));
    }

    #[test]
    fn array_type_needs_matching_cell_count() {
        let checker = ValidityChecker::new();
        let pt = ParameterType::new(
            "matrix",
            "mx",
            ParameterTypeKind::Array {
                dimension: vec![2, 2],
                component: Box::new(ParameterTypeKind::Quantity {
                    default_scale: None,
                    possible_scales: Vec::new(),
                }),
            },
        );
        let square = WorkspaceVariable::new(
            "a",
            Value::Array(ArrayValue::from_numbers(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap()),
        );
        let row = WorkspaceVariable::new("b", Value::Array(ArrayValue::from_numbers(&[vec![1.0, 2.0]]).unwrap()));
        assert!(checker.is_compatible(&square, &pt, None));
        assert!(!checker.is_compatible(&row, &pt, None));
    }
}
