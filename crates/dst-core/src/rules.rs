//! Mapping rules
//!
//! A rule turns the caller's mapping input for one direction into the map
//! results the controller stages for transfer. Rules are pluggable; the
//! controller only knows the [`MappingRule`] trait.

use crate::array::ArrayReconstructor;
use crate::error::DstError;
use crate::types::{MappedElement, ParameterToVariableMapping};
use crate::validity::ValidityChecker;
use dst_repository::{ElementDefinition, Parameter, ParameterOverride, ParameterType, ThingId};
use dst_workspace::WorkspaceVariable;
use indexmap::IndexMap;
use tracing::{debug, warn};

/// Direction-typed transformation
pub trait MappingRule<I, O>: Send + Sync {
    /// Transform the input
    ///
    /// # Errors
    /// Returns error when a valid input cannot be transformed (e.g. shape
    /// mismatch)
    fn transform(&self, input: I) -> Result<O, DstError>;
}

/// Engine variables to element definition clones
#[derive(Debug, Clone, Copy, Default)]
pub struct VariableToElementRule {
    checker: ValidityChecker,
    reconstructor: ArrayReconstructor,
}

impl VariableToElementRule {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn map_variable(&self, variable: &WorkspaceVariable) -> Result<Option<MappedElement>, DstError> {
        let Some(parameter_type) = variable.target_parameter_type().cloned() else {
            return Ok(None);
        };

        let mut element = variable
            .selected_element_definition
            .clone()
            .unwrap_or_else(|| ElementDefinition::new(&variable.name, short_name_of(&variable.name)));

        let mut parameter = Self::target_parameter(variable, &element, &parameter_type);
        if let Some(scale) = &variable.selected_scale {
            parameter.scale = Some(scale.clone());
        }

        let values = self.values_of(variable, &parameter_type)?;
        let option = variable
            .selected_option
            .as_ref()
            .filter(|_| parameter.is_option_dependent())
            .map(|o| o.id);
        let state = variable
            .selected_state
            .as_ref()
            .filter(|_| parameter.is_state_dependent())
            .map(|s| s.id);

        let Some(value_set) = parameter.value_set_mut(option, state) else {
            warn!(variable = %variable.name, parameter = %parameter.name(), "no value set for the selected option/state");
            return Ok(None);
        };
        value_set.set_manual(values.clone());

        element.upsert_parameter(parameter.clone());
        let mut mapped = MappedElement::new(element);
        mapped.sources.insert(parameter.id, variable.identifier());

        for usage in &variable.selected_element_usages {
            let mut usage = usage.clone();
            let mut parameter_override = usage
                .override_of(parameter.id)
                .cloned()
                .unwrap_or_else(|| ParameterOverride::of(&parameter));
            match parameter_override.value_set_mut(option, state) {
                Some(value_set) => value_set.set_manual(values.clone()),
                None => {
                    warn!(usage = %usage.name, "override has no value set for the selected option/state");
                    continue;
                }
            }
            match usage.overrides.iter_mut().find(|o| o.parameter == parameter.id) {
                Some(slot) => *slot = parameter_override,
                None => usage.overrides.push(parameter_override),
            }
            mapped.usages.push(usage);
        }

        debug!(variable = %variable.name, element = %mapped.element.name, "variable mapped");
        Ok(Some(mapped))
    }

    /// Selected parameter, the element's parameter of the type, or a new one
    fn target_parameter(
        variable: &WorkspaceVariable,
        element: &ElementDefinition,
        parameter_type: &ParameterType,
    ) -> Parameter {
        if let Some(selected) = &variable.selected_parameter {
            return element.parameter(selected.id).cloned().unwrap_or_else(|| selected.clone());
        }
        if let Some(existing) = element.parameter_of_type(parameter_type.id) {
            return existing.clone();
        }

        let mut parameter = Parameter::new(parameter_type.clone(), variable.effective_scale().cloned());
        if let Some(option) = &variable.selected_option {
            parameter = parameter.with_options(vec![option.id]);
        }
        if let Some(state) = &variable.selected_state {
            parameter = parameter.with_states(vec![state.id]);
        }
        parameter
    }

    fn values_of(&self, variable: &WorkspaceVariable, parameter_type: &ParameterType) -> Result<Vec<String>, DstError> {
        if !parameter_type.is_structured() {
            return Ok(vec![variable.engine_value().to_repository_value()]);
        }
        let array = variable
            .unflattened_array()
            .ok_or_else(|| DstError::Internal(format!("{} holds no array", variable.name)))?;
        Ok(self.reconstructor.to_parameter_values(
            parameter_type,
            array,
            variable.row_column_selection,
            &variable.index_assignments,
        )?)
    }
}

impl MappingRule<Vec<WorkspaceVariable>, Vec<MappedElement>> for VariableToElementRule {
    fn transform(&self, input: Vec<WorkspaceVariable>) -> Result<Vec<MappedElement>, DstError> {
        let mut by_element: IndexMap<ThingId, MappedElement> = IndexMap::new();
        for mut variable in input {
            if !variable.is_valid(&self.checker) {
                warn!(variable = %variable.name, "skipping invalid mapping");
                continue;
            }
            if let Some(mapped) = self.map_variable(&variable)? {
                match by_element.get_mut(&mapped.id()) {
                    Some(existing) => existing.merge(mapped),
                    None => {
                        by_element.insert(mapped.id(), mapped);
                    }
                }
            }
        }
        Ok(by_element.into_values().collect())
    }
}

/// Repository parameters to engine variable rows
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterToVariableRule;

impl ParameterToVariableRule {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl MappingRule<Vec<ParameterToVariableMapping>, Vec<ParameterToVariableMapping>> for ParameterToVariableRule {
    fn transform(
        &self,
        input: Vec<ParameterToVariableMapping>,
    ) -> Result<Vec<ParameterToVariableMapping>, DstError> {
        Ok(input
            .into_iter()
            .filter_map(|mut row| {
                row.refresh();
                if row.is_valid() {
                    Some(row)
                } else {
                    warn!(
                        parameter = row.parameter().map_or("<none>", Parameter::name),
                        variable = row.variable().map_or("<none>", |v| v.name.as_str()),
                        "skipping invalid mapping"
                    );
                    None
                }
            })
            .collect())
    }
}

fn short_name_of(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
