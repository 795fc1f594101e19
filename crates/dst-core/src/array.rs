//! Array reconstruction for structured parameter types
//!
//! A value set stores a structured value as a flat sequence:
//! - array types: cells in row-major order of the declared dimension
//! - sampled functions: one sample after another, each sample holding its
//!   components in declaration order (independent first)
//!
//! In the engine a sampled function is a 2-D array whose long axis runs over
//! samples. `Column` puts samples on rows and components on columns; `Row`
//! is the transpose. Index assignments say which column (or row) holds which
//! component.

use crate::error::ReconstructionError;
use dst_repository::{ParameterType, ParameterTypeKind};
use dst_workspace::{ArrayValue, IndexAssignment, RowColumnSelection, Value};
use once_cell::sync::OnceCell;

/// Converts between value sets and workspace arrays
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayReconstructor;

impl ArrayReconstructor {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Lay out value-set values as a workspace array
    ///
    /// # Errors
    /// - `NotStructured` for scalar types
    /// - `ArityMismatch` / `IncompleteAssignments` for bad assignments
    /// - `ValueCount` / `ShapeMismatch` when the values do not fit the type
    pub fn to_workspace_array(
        &self,
        parameter_type: &ParameterType,
        values: &[String],
        selection: RowColumnSelection,
        assignments: &[IndexAssignment],
    ) -> Result<ArrayValue, ReconstructionError> {
        match &parameter_type.kind {
            ParameterTypeKind::SampledFunction { .. } => {
                let columns = component_indexes(parameter_type, assignments)?;
                let arity = columns.len();
                if values.len() % arity != 0 {
                    return Err(ReconstructionError::ValueCount {
                        values: values.len(),
                        arity,
                    });
                }
                let samples = values.len() / arity;
                if samples == 0 {
                    return Ok(empty(selection, arity));
                }

                let mut cells = vec![Value::Number(0.0); samples * arity];
                for (k, sample) in values.chunks(arity).enumerate() {
                    for (component, raw) in sample.iter().enumerate() {
                        let slot = columns[component];
                        let at = match selection {
                            RowColumnSelection::Column => k * arity + slot,
                            RowColumnSelection::Row => slot * samples + k,
                        };
                        cells[at] = Value::parse_repository_value(raw);
                    }
                }
                let (rows, cols) = match selection {
                    RowColumnSelection::Column => (samples, arity),
                    RowColumnSelection::Row => (arity, samples),
                };
                ArrayValue::new(rows, cols, cells).map_err(|_| ReconstructionError::ShapeMismatch {
                    expected: rows * cols,
                    actual: values.len(),
                })
            }
            ParameterTypeKind::Array { dimension, .. } => {
                let (rows, cols) = matrix_shape(dimension);
                if values.len() != rows * cols {
                    return Err(ReconstructionError::ShapeMismatch {
                        expected: rows * cols,
                        actual: values.len(),
                    });
                }
                let parsed: Vec<Value> = values.iter().map(|v| Value::parse_repository_value(v)).collect();
                let array = ArrayValue::new(rows, cols, parsed).map_err(|_| ReconstructionError::ShapeMismatch {
                    expected: rows * cols,
                    actual: values.len(),
                })?;
                Ok(match selection {
                    RowColumnSelection::Column => array,
                    RowColumnSelection::Row => transpose(&array),
                })
            }
            _ => Err(ReconstructionError::NotStructured(parameter_type.name.clone())),
        }
    }

    /// Flatten a workspace array back into value-set order
    ///
    /// # Errors
    /// Same conditions as [`to_workspace_array`](Self::to_workspace_array)
    pub fn to_parameter_values(
        &self,
        parameter_type: &ParameterType,
        array: &ArrayValue,
        selection: RowColumnSelection,
        assignments: &[IndexAssignment],
    ) -> Result<Vec<String>, ReconstructionError> {
        match &parameter_type.kind {
            ParameterTypeKind::SampledFunction { .. } => {
                let columns = component_indexes(parameter_type, assignments)?;
                let arity = columns.len();
                let (samples, components) = match selection {
                    RowColumnSelection::Column => (array.rows(), array.cols()),
                    RowColumnSelection::Row => (array.cols(), array.rows()),
                };
                if array.is_empty() {
                    return Ok(Vec::new());
                }
                if components != arity {
                    return Err(ReconstructionError::ShapeMismatch {
                        expected: arity,
                        actual: components,
                    });
                }

                let mut values = Vec::with_capacity(samples * arity);
                for k in 0..samples {
                    for &slot in &columns {
                        let cell = match selection {
                            RowColumnSelection::Column => array.get(k, slot),
                            RowColumnSelection::Row => array.get(slot, k),
                        };
                        values.push(cell.map(Value::to_repository_value).unwrap_or_default());
                    }
                }
                Ok(values)
            }
            ParameterTypeKind::Array { .. } => {
                let expected = parameter_type.value_arity();
                if array.len() != expected {
                    return Err(ReconstructionError::ShapeMismatch {
                        expected,
                        actual: array.len(),
                    });
                }
                let ordered = match selection {
                    RowColumnSelection::Column => array.clone(),
                    RowColumnSelection::Row => transpose(array),
                };
                Ok(ordered.cells().iter().map(Value::to_repository_value).collect())
            }
            _ => Err(ReconstructionError::NotStructured(parameter_type.name.clone())),
        }
    }

    /// Group sampled-function values by the time axis
    ///
    /// # Errors
    /// `NoTimeAxis` when no assignment is flagged, otherwise as
    /// [`to_workspace_array`](Self::to_workspace_array)
    pub fn time_tagged(
        &self,
        parameter_type: &ParameterType,
        values: &[String],
        assignments: &[IndexAssignment],
    ) -> Result<TimeTaggedValues, ReconstructionError> {
        let columns = component_indexes(parameter_type, assignments)?;
        let components = parameter_type.sampled_components();
        let time_component = assignments
            .iter()
            .enumerate()
            .find(|(_, a)| a.is_time_axis)
            .map(|(i, a)| {
                components
                    .iter()
                    .position(|c| c.short_name == a.component)
                    .unwrap_or(i)
            })
            .ok_or(ReconstructionError::NoTimeAxis)?;

        let array = self.to_workspace_array(parameter_type, values, RowColumnSelection::Column, assignments)?;
        let time_column = columns[time_component];

        let mut other: Vec<(usize, String)> = components
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != time_component)
            .map(|(i, c)| (columns[i], c.short_name.clone()))
            .collect();
        other.sort_by_key(|(column, _)| *column);

        let rows = (0..array.rows())
            .map(|k| TimeTaggedRow {
                time: array.get(k, time_column).and_then(Value::as_number).unwrap_or(f64::NAN),
                values: other
                    .iter()
                    .map(|(column, _)| array.get(k, *column).cloned().unwrap_or(Value::Number(f64::NAN)))
                    .collect(),
            })
            .collect();

        Ok(TimeTaggedValues {
            time_component: components
                .get(time_component)
                .map(|c| c.short_name.clone())
                .unwrap_or_default(),
            columns: other.into_iter().map(|(_, name)| name).collect(),
            rows,
            averaged: OnceCell::new(),
            show_averaged: false,
        })
    }
}

/// One sample keyed by its time value
#[derive(Debug, Clone, PartialEq)]
pub struct TimeTaggedRow {
    pub time: f64,
    /// Non-time components in column order
    pub values: Vec<Value>,
}

/// Sampled function grouped by time, with a lazily computed averaged view
#[derive(Debug, Clone)]
pub struct TimeTaggedValues {
    time_component: String,
    columns: Vec<String>,
    rows: Vec<TimeTaggedRow>,
    averaged: OnceCell<Vec<TimeTaggedRow>>,
    show_averaged: bool,
}

impl TimeTaggedValues {
    #[inline]
    #[must_use]
    pub fn time_component(&self) -> &str {
        &self.time_component
    }

    #[inline]
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Toggle the averaged projection
    pub fn set_averaged(&mut self, averaged: bool) {
        self.show_averaged = averaged;
    }

    #[inline]
    #[must_use]
    pub fn is_averaged(&self) -> bool {
        self.show_averaged
    }

    /// Rows of the active projection
    pub fn rows(&self) -> &[TimeTaggedRow] {
        if self.show_averaged {
            self.averaged.get_or_init(|| average_by_time(&self.rows))
        } else {
            &self.rows
        }
    }

    /// Every sample, regardless of the toggle
    #[inline]
    #[must_use]
    pub fn samples(&self) -> &[TimeTaggedRow] {
        &self.rows
    }
}

/// One row per distinct time, numeric columns averaged, others first seen
#[allow(clippy::cast_precision_loss)]
fn average_by_time(rows: &[TimeTaggedRow]) -> Vec<TimeTaggedRow> {
    let mut groups: Vec<(f64, Vec<&TimeTaggedRow>)> = Vec::new();
    for row in rows {
        match groups.iter_mut().find(|(t, _)| t.to_bits() == row.time.to_bits()) {
            Some((_, members)) => members.push(row),
            None => groups.push((row.time, vec![row])),
        }
    }

    groups
        .into_iter()
        .map(|(time, members)| {
            let width = members.first().map_or(0, |r| r.values.len());
            let values = (0..width)
                .map(|c| {
                    let numbers: Option<Vec<f64>> = members.iter().map(|r| r.values[c].as_number()).collect();
                    match numbers {
                        Some(ns) if !ns.is_empty() => Value::Number(ns.iter().sum::<f64>() / ns.len() as f64),
                        _ => members[0].values[c].clone(),
                    }
                })
                .collect();
            TimeTaggedRow { time, values }
        })
        .collect()
}

/// Column (or row) index of each component in declaration order
fn component_indexes(
    parameter_type: &ParameterType,
    assignments: &[IndexAssignment],
) -> Result<Vec<usize>, ReconstructionError> {
    let components = parameter_type.sampled_components();
    if components.is_empty() {
        return Err(ReconstructionError::NotStructured(parameter_type.name.clone()));
    }
    let arity = components.len();
    if assignments.len() != arity {
        return Err(ReconstructionError::ArityMismatch {
            expected: arity,
            actual: assignments.len(),
        });
    }

    let by_name = components
        .iter()
        .all(|c| assignments.iter().filter(|a| a.component == c.short_name).count() == 1);

    let indexes: Vec<usize> = components
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let assignment = if by_name {
                assignments.iter().find(|a| a.component == c.short_name)
            } else {
                assignments.get(i)
            };
            assignment
                .and_then(IndexAssignment::index_value)
                .ok_or(ReconstructionError::IncompleteAssignments)
        })
        .collect::<Result<_, _>>()?;

    let mut claimed = vec![false; arity];
    for &index in &indexes {
        if index >= arity || claimed[index] {
            return Err(ReconstructionError::IncompleteAssignments);
        }
        claimed[index] = true;
    }
    Ok(indexes)
}

fn matrix_shape(dimension: &[usize]) -> (usize, usize) {
    match dimension {
        [] => (0, 0),
        [n] => (1, *n),
        [rows, rest @ ..] => (*rows, rest.iter().product()),
    }
}

fn empty(selection: RowColumnSelection, arity: usize) -> ArrayValue {
    match selection {
        RowColumnSelection::Column => ArrayValue::empty(0, arity),
        RowColumnSelection::Row => ArrayValue::empty(arity, 0),
    }
}

fn transpose(array: &ArrayValue) -> ArrayValue {
    let (rows, cols) = array.shape();
    let mut cells = Vec::with_capacity(array.len());
    for j in 0..cols {
        for i in 0..rows {
            if let Some(cell) = array.get(i, j) {
                cells.push(cell.clone());
            }
        }
    }
    ArrayValue::new(cols, rows, cells).unwrap_or_else(|_| ArrayValue::empty(0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dst_repository::ParameterTypeAssignment;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn real() -> ParameterTypeKind {
        ParameterTypeKind::Quantity {
            default_scale: None,
            possible_scales: Vec::new(),
        }
    }

    /// Two independent (`t`, `x`) and one dependent (`y`) component
    fn sampled_function() -> ParameterType {
        ParameterType::new(
            "trajectory",
            "traj",
            ParameterTypeKind::SampledFunction {
                independent: vec![
                    ParameterTypeAssignment::new("t", real()),
                    ParameterTypeAssignment::new("x", real()),
                ],
                dependent: vec![ParameterTypeAssignment::new("y", real())],
            },
        )
    }

    fn assign(pairs: &[(&str, &str)]) -> Vec<IndexAssignment> {
        pairs.iter().map(|(c, i)| IndexAssignment::new(*c, *i)).collect()
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn column_layout_has_one_row_per_sample() {
        let values = strings(&["0", "1", "10", "1", "2", "20", "2", "3", "30", "3", "4", "40"]);
        let array = ArrayReconstructor::new()
            .to_workspace_array(
                &sampled_function(),
                &values,
                RowColumnSelection::Column,
                &assign(&[("t", "0"), ("x", "1"), ("y", "2")]),
            )
            .unwrap();

        assert_eq!(array.shape(), (4, 3));
        assert_eq!(array.get(2, 2), Some(&Value::Number(30.0)));
    }

    #[test]
    fn assignments_permute_columns() {
        let values = strings(&["0", "1", "10"]);
        let array = ArrayReconstructor::new()
            .to_workspace_array(
                &sampled_function(),
                &values,
                RowColumnSelection::Column,
                &assign(&[("t", "2"), ("x", "0"), ("y", "1")]),
            )
            .unwrap();
        let row: Vec<f64> = array.row(0).unwrap().iter().filter_map(Value::as_number).collect();
        assert_eq!(row, vec![1.0, 10.0, 0.0]);
    }

    #[test]
    fn row_layout_is_the_transpose() {
        let values = strings(&["0", "1", "10", "1", "2", "20"]);
        let array = ArrayReconstructor::new()
            .to_workspace_array(
                &sampled_function(),
                &values,
                RowColumnSelection::Row,
                &assign(&[("t", "0"), ("x", "1"), ("y", "2")]),
            )
            .unwrap();
        assert_eq!(array.shape(), (3, 2));
        assert_eq!(array.get(2, 1), Some(&Value::Number(20.0)));
    }

    #[test]
    fn empty_values_give_empty_array() {
        let array = ArrayReconstructor::new()
            .to_workspace_array(
                &sampled_function(),
                &[],
                RowColumnSelection::Column,
                &assign(&[("t", "0"), ("x", "1"), ("y", "2")]),
            )
            .unwrap();
        assert_eq!(array.shape(), (0, 3));
        assert!(array.is_empty());
    }

    #[test]
    fn bad_assignments_are_rejected_before_layout() {
        let r = ArrayReconstructor::new();
        let values = strings(&["0", "1", "10"]);
        assert_eq!(
            r.to_workspace_array(&sampled_function(), &values, RowColumnSelection::Column, &assign(&[("t", "0")])),
            Err(ReconstructionError::ArityMismatch { expected: 3, actual: 1 })
        );
        assert_eq!(
            r.to_workspace_array(
                &sampled_function(),
                &values,
                RowColumnSelection::Column,
                &assign(&[("t", "1"), ("x", "1"), ("y", "2")])
            ),
            Err(ReconstructionError::IncompleteAssignments)
        );
        assert_eq!(
            r.to_workspace_array(
                &sampled_function(),
                &strings(&["0", "1"]),
                RowColumnSelection::Column,
                &assign(&[("t", "0"), ("x", "1"), ("y", "2")])
            ),
            Err(ReconstructionError::ValueCount { values: 2, arity: 3 })
        );
    }

    #[test]
    fn array_type_uses_declared_dimension() {
        let pt = ParameterType::new(
            "m",
            "m",
            ParameterTypeKind::Array {
                dimension: vec![2, 3],
                component: Box::new(real()),
            },
        );
        let values = strings(&["1", "2", "3", "4", "5", "6"]);
        let r = ArrayReconstructor::new();
        let array = r.to_workspace_array(&pt, &values, RowColumnSelection::Column, &[]).unwrap();
        assert_eq!(array.shape(), (2, 3));
        assert_eq!(array.get(1, 0), Some(&Value::Number(4.0)));

        let back = r.to_parameter_values(&pt, &array, RowColumnSelection::Column, &[]).unwrap();
        assert_eq!(back, values);

        assert!(matches!(
            r.to_workspace_array(&pt, &values[..4], RowColumnSelection::Column, &[]),
            Err(ReconstructionError::ShapeMismatch { expected: 6, actual: 4 })
        ));
    }

    #[test]
    fn scalar_types_are_not_structured() {
        let pt = ParameterType::new("flag", "f", ParameterTypeKind::Boolean);
        assert!(matches!(
            ArrayReconstructor::new().to_workspace_array(&pt, &[], RowColumnSelection::Column, &[]),
            Err(ReconstructionError::NotStructured(_))
        ));
    }

    #[test]
    fn time_tagged_averages_duplicate_times_lazily() {
        let values = strings(&["0", "1", "10", "0", "3", "20", "1", "5", "50"]);
        let mut assignments = assign(&[("t", "0"), ("x", "1"), ("y", "2")]);
        assignments[0] = assignments[0].clone().time_axis();

        let mut tagged = ArrayReconstructor::new()
            .time_tagged(&sampled_function(), &values, &assignments)
            .unwrap();
        assert_eq!(tagged.time_component(), "t");
        assert_eq!(tagged.columns(), ["x".to_string(), "y".to_string()]);
        assert_eq!(tagged.rows().len(), 3);

        tagged.set_averaged(true);
        let averaged = tagged.rows();
        assert_eq!(averaged.len(), 2);
        assert_eq!(averaged[0].time, 0.0);
        assert_eq!(averaged[0].values, vec![Value::Number(2.0), Value::Number(15.0)]);
        assert_eq!(tagged.samples().len(), 3);
    }

    #[test]
    fn time_tagged_requires_a_time_axis() {
        let err = ArrayReconstructor::new()
            .time_tagged(&sampled_function(), &[], &assign(&[("t", "0"), ("x", "1"), ("y", "2")]))
            .unwrap_err();
        assert_eq!(err, ReconstructionError::NoTimeAxis);
    }

    proptest! {
        #[test]
        fn sampled_values_round_trip(
            samples in proptest::collection::vec((0i32..100, -50i32..50, -50i32..50), 0..12),
            row_layout in any::<bool>(),
        ) {
            let values: Vec<String> = samples
                .iter()
                .flat_map(|(t, x, y)| [t.to_string(), x.to_string(), y.to_string()])
                .collect();
            let selection = if row_layout { RowColumnSelection::Row } else { RowColumnSelection::Column };
            let assignments = assign(&[("t", "1"), ("x", "2"), ("y", "0")]);
            let r = ArrayReconstructor::new();

            let array = r.to_workspace_array(&sampled_function(), &values, selection, &assignments).unwrap();
            let back = r.to_parameter_values(&sampled_function(), &array, selection, &assignments).unwrap();
            prop_assert_eq!(back, values);
        }
    }
}
