//! Core types for the synchronization
//!
//! - [`MappingDirection`]: which side is the source of truth
//! - [`MappedElement`]: an engine→repository map result
//! - [`ParameterToVariableMapping`]: a repository→engine map row
//! - [`TransferOutcome`]: what a transfer did

use crate::array::{ArrayReconstructor, TimeTaggedValues};
use crate::error::ReconstructionError;
use crate::validity::ValidityChecker;
use dst_repository::{
    ActualFiniteState, DomainOption, ElementDefinition, ElementUsage, Parameter, ThingId,
    PLACEHOLDER_VALUE,
};
use dst_workspace::{IndexAssignment, MappingValidity, RowColumnSelection, Value, WorkspaceVariable};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MappingDirection {
    /// Engine to repository
    DstToHub,
    /// Repository to engine
    HubToDst,
}

impl std::fmt::Display for MappingDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MappingDirection::DstToHub => f.write_str("engine -> repository"),
            MappingDirection::HubToDst => f.write_str("repository -> engine"),
        }
    }
}

/// Element definition clone carrying mapped parameter values
///
/// `element` is a deep copy; the repository's original is untouched until the
/// transfer writes the copy.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedElement {
    /// Clone (or new element) with the mapped parameters upserted
    pub element: ElementDefinition,
    /// Usage clones carrying parameter overrides
    pub usages: Vec<ElementUsage>,
    /// Mapped parameter id -> source variable identifier
    pub sources: IndexMap<ThingId, String>,
}

impl MappedElement {
    #[must_use]
    pub fn new(element: ElementDefinition) -> Self {
        Self {
            element,
            usages: Vec::new(),
            sources: IndexMap::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> ThingId {
        self.element.id
    }

    /// Mapped parameters, in mapping order
    pub fn mapped_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.sources.keys().filter_map(|id| self.element.parameter(*id))
    }

    /// Fold a newer result for the same element into this one
    ///
    /// Parameters are last-write-wins by id; usages are replaced by id with
    /// their overrides merged by overridden parameter.
    pub fn merge(&mut self, newer: MappedElement) {
        for (parameter_id, source) in newer.sources {
            if let Some(parameter) = newer.element.parameter(parameter_id) {
                self.element.upsert_parameter(parameter.clone());
            }
            self.sources.insert(parameter_id, source);
        }

        for usage in newer.usages {
            match self.usages.iter_mut().find(|u| u.id == usage.id) {
                Some(existing) => {
                    for ov in usage.overrides {
                        match existing.overrides.iter_mut().find(|o| o.parameter == ov.parameter) {
                            Some(slot) => *slot = ov,
                            None => existing.overrides.push(ov),
                        }
                    }
                }
                None => self.usages.push(usage),
            }
        }
    }

    /// Drop a parameter from the mapped set (the element clone keeps it)
    pub fn forget(&mut self, parameter_id: ThingId) -> bool {
        self.sources.shift_remove(&parameter_id).is_some()
    }
}

/// Repository parameter proposed as the source of an engine variable
///
/// Validity is re-evaluated by every setter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterToVariableMapping {
    parameter: Option<Parameter>,
    element_name: Option<String>,
    option: Option<DomainOption>,
    state: Option<ActualFiniteState>,
    variable: Option<WorkspaceVariable>,
    values: Vec<String>,
    row_column: RowColumnSelection,
    assignments: Vec<IndexAssignment>,
    validity: MappingValidity,
}

impl ParameterToVariableMapping {
    /// Empty row
    #[must_use]
    pub fn new() -> Self {
        Self {
            parameter: None,
            element_name: None,
            option: None,
            state: None,
            variable: None,
            values: Vec::new(),
            row_column: RowColumnSelection::default(),
            assignments: Vec::new(),
            validity: MappingValidity::NotEvaluated,
        }
    }

    /// Row for a parameter and variable pair
    #[must_use]
    pub fn between(parameter: Parameter, variable: WorkspaceVariable) -> Self {
        let mut row = Self::new();
        row.parameter = Some(parameter);
        row.variable = Some(variable);
        row.refresh();
        row
    }

    #[must_use]
    pub fn with_element_name(mut self, name: impl Into<String>) -> Self {
        self.element_name = Some(name.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn parameter(&self) -> Option<&Parameter> {
        self.parameter.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn variable(&self) -> Option<&WorkspaceVariable> {
        self.variable.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn element_name(&self) -> Option<&str> {
        self.element_name.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn option(&self) -> Option<&DomainOption> {
        self.option.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> Option<&ActualFiniteState> {
        self.state.as_ref()
    }

    /// Values drawn from the parameter's value set for the option/state
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// First value, the whole value for scalar types
    #[inline]
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    #[inline]
    #[must_use]
    pub fn row_column(&self) -> RowColumnSelection {
        self.row_column
    }

    #[inline]
    #[must_use]
    pub fn assignments(&self) -> &[IndexAssignment] {
        &self.assignments
    }

    #[inline]
    #[must_use]
    pub fn validity(&self) -> MappingValidity {
        self.validity
    }

    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validity == MappingValidity::Valid
    }

    /// Sampled-function values grouped by the assigned time axis
    ///
    /// `None` when the row has no sampled-function parameter.
    ///
    /// # Errors
    /// Returns error if no time axis is assigned or the values do not fit
    pub fn time_tagged(&self) -> Result<Option<TimeTaggedValues>, ReconstructionError> {
        let Some(parameter) = self.parameter.as_ref().filter(|p| p.parameter_type.is_sampled_function()) else {
            return Ok(None);
        };
        ArrayReconstructor::new()
            .time_tagged(&parameter.parameter_type, &self.values, &self.assignments)
            .map(Some)
    }

    pub fn set_parameter(&mut self, parameter: Option<Parameter>) {
        self.parameter = parameter;
        self.refresh();
    }

    pub fn set_variable(&mut self, variable: Option<WorkspaceVariable>) {
        self.variable = variable;
        self.refresh();
    }

    pub fn set_option(&mut self, option: Option<DomainOption>) {
        self.option = option;
        self.refresh();
    }

    pub fn set_state(&mut self, state: Option<ActualFiniteState>) {
        self.state = state;
        self.refresh();
    }

    pub fn set_assignments(&mut self, row_column: RowColumnSelection, assignments: Vec<IndexAssignment>) {
        self.row_column = row_column;
        self.assignments = assignments;
        self.refresh();
    }

    /// Re-read values from the parameter and re-evaluate validity
    pub fn refresh(&mut self) {
        self.values = self
            .parameter
            .as_ref()
            .and_then(|p| {
                p.value_set(self.option.as_ref().map(|o| o.id), self.state.as_ref().map(|s| s.id))
                    .or_else(|| p.value_sets.first())
            })
            .map(|vs| vs.actual_value().to_vec())
            .unwrap_or_default();
        self.validity = MappingValidity::from(self.evaluate());
    }

    fn evaluate(&self) -> bool {
        let (Some(parameter), Some(variable)) = (&self.parameter, &self.variable) else {
            return false;
        };
        if self.values.is_empty() || self.values.iter().any(|v| v.trim() == PLACEHOLDER_VALUE) {
            return false;
        }

        let parameter_type = &parameter.parameter_type;
        let scale = parameter.scale.as_ref();
        // scalars never land on arrays; arrays never land inside another array's cell
        let holds_array = variable.unflattened_array().is_some();
        if parameter_type.is_structured() != holds_array && (holds_array || variable.is_child()) {
            return false;
        }
        if parameter_type.is_structured() {
            if parameter_type.validate_values(&self.values, scale).is_err() {
                return false;
            }
            if parameter_type.is_sampled_function() {
                let available: Vec<String> = (0..parameter_type.value_arity()).map(|i| i.to_string()).collect();
                return ValidityChecker::assignments_are_complete(&self.assignments, &available);
            }
            return true;
        }

        self.values.len() == 1
            && ValidityChecker::new().is_type_compatible(
                parameter_type,
                &Value::parse_repository_value(&self.values[0]),
                scale,
            )
    }
}

impl Default for ParameterToVariableMapping {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a transfer request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Written and refreshed
    Completed {
        direction: MappingDirection,
        /// Things written in the main transaction
        things_written: usize,
        /// Parameters (engine→repository) or variables (repository→engine) moved
        values_transferred: usize,
    },
    /// Selection was empty
    NothingSelected,
    /// Log entry capture was declined
    Cancelled,
}

impl TransferOutcome {
    #[inline]
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, TransferOutcome::Completed { .. })
    }
}
