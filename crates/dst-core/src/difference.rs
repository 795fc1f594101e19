//! Old/new value deltas for pending transfers

use dst_repository::{Iteration, Parameter, ValueSet, PLACEHOLDER_VALUE};
use dst_workspace::WorkspaceVariable;
use serde::Serialize;

/// One changed (or unchanged) value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueDifference {
    pub parameter_name: String,
    /// Option short name for option dependent parameters
    pub option: Option<String>,
    /// State short name for state dependent parameters
    pub state: Option<String>,
    /// Position in the value array
    pub index: usize,
    pub old_value: String,
    pub new_value: String,
    /// `new - old` when both are numbers
    pub difference: Option<f64>,
    /// Relative change in percent when both are numbers and old is non-zero
    pub percent_change: Option<f64>,
}

impl ValueDifference {
    fn between(parameter_name: &str, index: usize, old_value: &str, new_value: &str) -> Self {
        let numbers = old_value
            .trim()
            .parse::<f64>()
            .ok()
            .zip(new_value.trim().parse::<f64>().ok());
        let difference = numbers.map(|(old, new)| new - old);
        let percent_change = numbers
            .filter(|(old, _)| *old != 0.0)
            .map(|(old, new)| (new - old) / old.abs() * 100.0);

        Self {
            parameter_name: parameter_name.to_string(),
            option: None,
            state: None,
            index,
            old_value: old_value.to_string(),
            new_value: new_value.to_string(),
            difference,
            percent_change,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_changed(&self) -> bool {
        self.old_value != self.new_value
    }
}

/// Computes value deltas
#[derive(Debug, Clone, Copy, Default)]
pub struct DifferenceComputer;

impl DifferenceComputer {
    /// Per (option, state, index) deltas between two versions of a parameter
    ///
    /// Value sets are matched by combination; a combination missing from
    /// `old` compares against the placeholder. Option and state ids are
    /// resolved to short names through `names`.
    #[must_use]
    pub fn parameter_differences(old: &Parameter, new: &Parameter, names: &Iteration) -> Vec<ValueDifference> {
        let mut differences = Vec::new();
        for value_set in &new.value_sets {
            let previous = old.value_set(value_set.option, value_set.actual_state);
            differences.extend(Self::value_set_differences(new.name(), previous, value_set, names));
        }
        differences
    }

    fn value_set_differences<'a>(
        parameter_name: &'a str,
        old: Option<&'a ValueSet>,
        new: &'a ValueSet,
        names: &'a Iteration,
    ) -> impl Iterator<Item = ValueDifference> + 'a {
        let option = new.option.and_then(|id| names.option_name(id)).map(str::to_string);
        let state = new
            .actual_state
            .and_then(|id| names.state_name(id))
            .map(str::to_string);

        new.actual_value().iter().enumerate().map(move |(index, new_value)| {
            let old_value = old
                .and_then(|vs| vs.actual_value().get(index))
                .map_or(PLACEHOLDER_VALUE, String::as_str);
            ValueDifference {
                option: option.clone(),
                state: state.clone(),
                ..ValueDifference::between(parameter_name, index, old_value, new_value)
            }
        })
    }

    /// Delta between a variable's initial value and its current one
    ///
    /// `None` for array parents; their cells are compared individually.
    #[must_use]
    pub fn variable_difference(variable: &WorkspaceVariable) -> Option<ValueDifference> {
        if variable.unflattened_array().is_some() || variable.actual_value.is_array() {
            return None;
        }
        Some(ValueDifference::between(
            &variable.name,
            0,
            &variable.initial_value.to_repository_value(),
            &variable.engine_value().to_repository_value(),
        ))
    }
}
