//! Repository things
//!
//! Plain owned values. Cloning a thing yields a deep copy, which is what the
//! transaction layer relies on: originals are never mutated in place, edits
//! are made on a clone and the clone is handed to a [`Transaction`](crate::Transaction).

use crate::external_map::ExternalIdentifierMap;
use crate::id::ThingId;
use crate::parameter_type::ParameterType;
use crate::scale::MeasurementScale;
use crate::PLACEHOLDER_VALUE;
use serde::{Deserialize, Serialize};

/// Kind of repository thing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassKind {
    ElementDefinition,
    ElementUsage,
    Parameter,
    ParameterOverride,
    ParameterType,
    MeasurementScale,
    Option,
    ActualFiniteState,
    ExternalIdentifierMap,
}

/// Any resolvable repository thing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Thing {
    ElementDefinition(ElementDefinition),
    ElementUsage(ElementUsage),
    Parameter(Parameter),
    ParameterOverride(ParameterOverride),
    ParameterType(ParameterType),
    MeasurementScale(MeasurementScale),
    Option(DomainOption),
    ActualFiniteState(ActualFiniteState),
    ExternalIdentifierMap(ExternalIdentifierMap),
}

impl Thing {
    /// Identifier of the wrapped thing
    #[must_use]
    pub fn id(&self) -> ThingId {
        match self {
            Thing::ElementDefinition(t) => t.id,
            Thing::ElementUsage(t) => t.id,
            Thing::Parameter(t) => t.id,
            Thing::ParameterOverride(t) => t.id,
            Thing::ParameterType(t) => t.id,
            Thing::MeasurementScale(t) => t.id,
            Thing::Option(t) => t.id,
            Thing::ActualFiniteState(t) => t.id,
            Thing::ExternalIdentifierMap(t) => t.id,
        }
    }

    /// Class of the wrapped thing
    #[must_use]
    pub fn class_kind(&self) -> ClassKind {
        match self {
            Thing::ElementDefinition(_) => ClassKind::ElementDefinition,
            Thing::ElementUsage(_) => ClassKind::ElementUsage,
            Thing::Parameter(_) => ClassKind::Parameter,
            Thing::ParameterOverride(_) => ClassKind::ParameterOverride,
            Thing::ParameterType(_) => ClassKind::ParameterType,
            Thing::MeasurementScale(_) => ClassKind::MeasurementScale,
            Thing::Option(_) => ClassKind::Option,
            Thing::ActualFiniteState(_) => ClassKind::ActualFiniteState,
            Thing::ExternalIdentifierMap(_) => ClassKind::ExternalIdentifierMap,
        }
    }
}

/// Design option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainOption {
    pub id: ThingId,
    pub name: String,
    pub short_name: String,
}

impl DomainOption {
    #[must_use]
    pub fn new(name: impl Into<String>, short_name: impl Into<String>) -> Self {
        Self {
            id: ThingId::new(),
            name: name.into(),
            short_name: short_name.into(),
        }
    }
}

/// Actual finite state (e.g. "launch", "cruise")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualFiniteState {
    pub id: ThingId,
    pub name: String,
    pub short_name: String,
}

impl ActualFiniteState {
    #[must_use]
    pub fn new(name: impl Into<String>, short_name: impl Into<String>) -> Self {
        Self {
            id: ThingId::new(),
            name: name.into(),
            short_name: short_name.into(),
        }
    }
}

/// Which of a value set's arrays is the actual value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParameterSwitchKind {
    #[default]
    Manual,
    Computed,
    Reference,
}

/// Values of one parameter for one (option, state) combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSet {
    pub id: ThingId,
    pub option: Option<ThingId>,
    pub actual_state: Option<ThingId>,
    pub manual: Vec<String>,
    pub computed: Vec<String>,
    pub reference: Vec<String>,
    pub published: Vec<String>,
    pub switch: ParameterSwitchKind,
}

impl ValueSet {
    /// Create value set filled with placeholders
    #[must_use]
    pub fn new(option: Option<ThingId>, actual_state: Option<ThingId>, arity: usize) -> Self {
        let empty = vec![PLACEHOLDER_VALUE.to_string(); arity];
        Self {
            id: ThingId::new(),
            option,
            actual_state,
            manual: empty.clone(),
            computed: empty.clone(),
            reference: empty.clone(),
            published: empty,
            switch: ParameterSwitchKind::Manual,
        }
    }

    /// The array selected by the switch
    #[must_use]
    pub fn actual_value(&self) -> &[String] {
        match self.switch {
            ParameterSwitchKind::Manual => &self.manual,
            ParameterSwitchKind::Computed => &self.computed,
            ParameterSwitchKind::Reference => &self.reference,
        }
    }

    /// Whether this value set belongs to the given combination
    #[inline]
    #[must_use]
    pub fn matches(&self, option: Option<ThingId>, actual_state: Option<ThingId>) -> bool {
        self.option == option && self.actual_state == actual_state
    }

    /// Overwrite the manual value and switch to it
    pub fn set_manual(&mut self, values: Vec<String>) {
        self.manual = values;
        self.switch = ParameterSwitchKind::Manual;
    }

    /// Overwrite the computed value and switch to it
    pub fn set_computed(&mut self, values: Vec<String>) {
        self.computed = values;
        self.switch = ParameterSwitchKind::Computed;
    }
}

fn value_set_combinations(options: &[ThingId], states: &[ThingId]) -> Vec<(Option<ThingId>, Option<ThingId>)> {
    let options: Vec<Option<ThingId>> = if options.is_empty() {
        vec![None]
    } else {
        options.iter().copied().map(Some).collect()
    };
    let states: Vec<Option<ThingId>> = if states.is_empty() {
        vec![None]
    } else {
        states.iter().copied().map(Some).collect()
    };

    options
        .iter()
        .flat_map(|o| states.iter().map(move |s| (*o, *s)))
        .collect()
}

/// Keep existing value sets for combinations that survive, create the rest
fn rebuild_value_sets(
    existing: &[ValueSet],
    options: &[ThingId],
    states: &[ThingId],
    arity: usize,
) -> Vec<ValueSet> {
    value_set_combinations(options, states)
        .into_iter()
        .map(|(o, s)| {
            existing
                .iter()
                .find(|vs| vs.matches(o, s))
                .cloned()
                .unwrap_or_else(|| ValueSet::new(o, s, arity))
        })
        .collect()
}

/// Parameter of an element definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: ThingId,
    pub parameter_type: ParameterType,
    pub scale: Option<MeasurementScale>,
    /// Options the value sets are split by (empty: option independent)
    pub options: Vec<ThingId>,
    /// States the value sets are split by (empty: state independent)
    pub states: Vec<ThingId>,
    pub value_sets: Vec<ValueSet>,
}

impl Parameter {
    /// Create option/state independent parameter with one placeholder value set
    #[must_use]
    pub fn new(parameter_type: ParameterType, scale: Option<MeasurementScale>) -> Self {
        let arity = parameter_type.value_arity();
        Self {
            id: ThingId::new(),
            scale: scale.or_else(|| parameter_type.default_scale().cloned()),
            parameter_type,
            options: Vec::new(),
            states: Vec::new(),
            value_sets: vec![ValueSet::new(None, None, arity)],
        }
    }

    /// Make option dependent
    #[must_use]
    pub fn with_options(mut self, options: Vec<ThingId>) -> Self {
        self.options = options;
        self.value_sets = rebuild_value_sets(
            &self.value_sets,
            &self.options,
            &self.states,
            self.parameter_type.value_arity(),
        );
        self
    }

    /// Make state dependent
    #[must_use]
    pub fn with_states(mut self, states: Vec<ThingId>) -> Self {
        self.states = states;
        self.value_sets = rebuild_value_sets(
            &self.value_sets,
            &self.options,
            &self.states,
            self.parameter_type.value_arity(),
        );
        self
    }

    /// Parameter name (its type's name)
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.parameter_type.name
    }

    #[inline]
    #[must_use]
    pub fn is_option_dependent(&self) -> bool {
        !self.options.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn is_state_dependent(&self) -> bool {
        !self.states.is_empty()
    }

    /// Value set for a combination
    #[must_use]
    pub fn value_set(&self, option: Option<ThingId>, actual_state: Option<ThingId>) -> Option<&ValueSet> {
        self.value_sets.iter().find(|vs| vs.matches(option, actual_state))
    }

    /// Mutable value set for a combination
    pub fn value_set_mut(
        &mut self,
        option: Option<ThingId>,
        actual_state: Option<ThingId>,
    ) -> Option<&mut ValueSet> {
        self.value_sets
            .iter_mut()
            .find(|vs| vs.matches(option, actual_state))
    }
}

/// Override of a parameter on an element usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterOverride {
    pub id: ThingId,
    /// Overridden parameter
    pub parameter: ThingId,
    pub parameter_type: ParameterType,
    pub scale: Option<MeasurementScale>,
    pub value_sets: Vec<ValueSet>,
}

impl ParameterOverride {
    /// Override a parameter, copying its current value sets
    #[must_use]
    pub fn of(parameter: &Parameter) -> Self {
        Self {
            id: ThingId::new(),
            parameter: parameter.id,
            parameter_type: parameter.parameter_type.clone(),
            scale: parameter.scale.clone(),
            value_sets: parameter
                .value_sets
                .iter()
                .map(|vs| ValueSet {
                    id: ThingId::new(),
                    ..vs.clone()
                })
                .collect(),
        }
    }

    /// View as a parameter carrying the override's identity and values
    #[must_use]
    pub fn as_parameter(&self) -> Parameter {
        let mut options: Vec<ThingId> = self.value_sets.iter().filter_map(|vs| vs.option).collect();
        options.dedup();
        let mut states: Vec<ThingId> = self
            .value_sets
            .iter()
            .filter_map(|vs| vs.actual_state)
            .collect();
        states.sort();
        states.dedup();
        Parameter {
            id: self.id,
            parameter_type: self.parameter_type.clone(),
            scale: self.scale.clone(),
            options,
            states,
            value_sets: self.value_sets.clone(),
        }
    }

    /// Mutable value set for a combination
    pub fn value_set_mut(
        &mut self,
        option: Option<ThingId>,
        actual_state: Option<ThingId>,
    ) -> Option<&mut ValueSet> {
        self.value_sets
            .iter_mut()
            .find(|vs| vs.matches(option, actual_state))
    }
}

/// Usage of an element definition inside another one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementUsage {
    pub id: ThingId,
    pub name: String,
    pub short_name: String,
    /// Definition this usage instantiates
    pub element_definition: ThingId,
    pub overrides: Vec<ParameterOverride>,
}

impl ElementUsage {
    #[must_use]
    pub fn new(name: impl Into<String>, short_name: impl Into<String>, element_definition: ThingId) -> Self {
        Self {
            id: ThingId::new(),
            name: name.into(),
            short_name: short_name.into(),
            element_definition,
            overrides: Vec::new(),
        }
    }

    /// Override of a given parameter
    #[must_use]
    pub fn override_of(&self, parameter: ThingId) -> Option<&ParameterOverride> {
        self.overrides.iter().find(|o| o.parameter == parameter)
    }
}

/// Element definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDefinition {
    pub id: ThingId,
    pub name: String,
    pub short_name: String,
    pub parameters: Vec<Parameter>,
    pub contained_usages: Vec<ElementUsage>,
}

impl ElementDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>, short_name: impl Into<String>) -> Self {
        Self {
            id: ThingId::new(),
            name: name.into(),
            short_name: short_name.into(),
            parameters: Vec::new(),
            contained_usages: Vec::new(),
        }
    }

    /// With parameter
    #[must_use]
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Parameter by id
    #[must_use]
    pub fn parameter(&self, id: ThingId) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.id == id)
    }

    /// Parameter of a given type
    #[must_use]
    pub fn parameter_of_type(&self, parameter_type: ThingId) -> Option<&Parameter> {
        self.parameters
            .iter()
            .find(|p| p.parameter_type.id == parameter_type)
    }

    /// Insert or replace a parameter (by id)
    pub fn upsert_parameter(&mut self, parameter: Parameter) {
        match self.parameters.iter_mut().find(|p| p.id == parameter.id) {
            Some(existing) => *existing = parameter,
            None => self.parameters.push(parameter),
        }
    }
}

/// Iteration: the open model snapshot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Iteration {
    pub id: ThingId,
    pub element_definitions: Vec<ElementDefinition>,
    pub options: Vec<DomainOption>,
    pub actual_finite_states: Vec<ActualFiniteState>,
    pub parameter_types: Vec<ParameterType>,
    pub scales: Vec<MeasurementScale>,
    pub external_identifier_maps: Vec<ExternalIdentifierMap>,
}

impl Iteration {
    /// Create empty iteration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve any thing contained in this iteration
    #[must_use]
    pub fn find_thing(&self, id: ThingId) -> Option<Thing> {
        for element in &self.element_definitions {
            if element.id == id {
                return Some(Thing::ElementDefinition(element.clone()));
            }
            if let Some(parameter) = element.parameter(id) {
                return Some(Thing::Parameter(parameter.clone()));
            }
            for usage in &element.contained_usages {
                if usage.id == id {
                    return Some(Thing::ElementUsage(usage.clone()));
                }
                if let Some(o) = usage.overrides.iter().find(|o| o.id == id) {
                    return Some(Thing::ParameterOverride(o.clone()));
                }
            }
        }

        self.options
            .iter()
            .find(|o| o.id == id)
            .map(|o| Thing::Option(o.clone()))
            .or_else(|| {
                self.actual_finite_states
                    .iter()
                    .find(|s| s.id == id)
                    .map(|s| Thing::ActualFiniteState(s.clone()))
            })
            .or_else(|| {
                self.parameter_types
                    .iter()
                    .find(|t| t.id == id)
                    .map(|t| Thing::ParameterType(t.clone()))
            })
            .or_else(|| {
                self.scales
                    .iter()
                    .find(|s| s.id == id)
                    .map(|s| Thing::MeasurementScale(s.clone()))
            })
            .or_else(|| {
                self.external_identifier_maps
                    .iter()
                    .find(|m| m.id == id)
                    .map(|m| Thing::ExternalIdentifierMap(m.clone()))
            })
    }

    /// Whether a thing with this id exists
    #[inline]
    #[must_use]
    pub fn contains(&self, id: ThingId) -> bool {
        self.find_thing(id).is_some()
    }

    /// Element definition by id
    #[must_use]
    pub fn element_definition(&self, id: ThingId) -> Option<&ElementDefinition> {
        self.element_definitions.iter().find(|e| e.id == id)
    }

    /// Element definition owning a parameter
    #[must_use]
    pub fn parameter_owner(&self, parameter: ThingId) -> Option<&ElementDefinition> {
        self.element_definitions
            .iter()
            .find(|e| e.parameter(parameter).is_some())
    }

    /// Element usage by id
    #[must_use]
    pub fn element_usage(&self, id: ThingId) -> Option<&ElementUsage> {
        self.element_definitions
            .iter()
            .flat_map(|e| e.contained_usages.iter())
            .find(|u| u.id == id)
    }

    /// Option display name
    #[must_use]
    pub fn option_name(&self, id: ThingId) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.id == id)
            .map(|o| o.short_name.as_str())
    }

    /// State display name
    #[must_use]
    pub fn state_name(&self, id: ThingId) -> Option<&str> {
        self.actual_finite_states
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.short_name.as_str())
    }

    /// External identifier map by tool and name
    #[must_use]
    pub fn external_identifier_map(&self, tool_name: &str, name: &str) -> Option<&ExternalIdentifierMap> {
        self.external_identifier_maps
            .iter()
            .find(|m| m.tool_name == tool_name && m.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter_type::ParameterTypeKind;

    fn mass() -> ParameterType {
        ParameterType::quantity("mass", "m", MeasurementScale::real("kilogram", "kg"))
    }

    #[test]
    fn parameter_defaults_to_type_scale_and_placeholder() {
        let p = Parameter::new(mass(), None);
        assert_eq!(p.scale.as_ref().map(|s| s.short_name.as_str()), Some("kg"));
        assert_eq!(p.value_sets.len(), 1);
        assert_eq!(p.value_sets[0].actual_value(), ["-".to_string()]);
    }

    #[test]
    fn option_state_dependence_builds_combinations() {
        let o1 = ThingId::new();
        let o2 = ThingId::new();
        let s1 = ThingId::new();
        let p = Parameter::new(mass(), None)
            .with_options(vec![o1, o2])
            .with_states(vec![s1]);

        assert_eq!(p.value_sets.len(), 2);
        assert!(p.value_set(Some(o2), Some(s1)).is_some());
        assert!(p.value_set(None, None).is_none());
    }

    #[test]
    fn rebuilding_keeps_surviving_values() {
        let o1 = ThingId::new();
        let mut p = Parameter::new(mass(), None).with_options(vec![o1]);
        p.value_set_mut(Some(o1), None)
            .unwrap()
            .set_manual(vec!["4".into()]);

        let p = p.with_options(vec![o1, ThingId::new()]);
        assert_eq!(p.value_set(Some(o1), None).unwrap().manual, vec!["4".to_string()]);
    }

    #[test]
    fn switch_selects_actual_value() {
        let mut vs = ValueSet::new(None, None, 1);
        vs.set_computed(vec!["7".into()]);
        assert_eq!(vs.actual_value(), ["7".to_string()]);
        vs.switch = ParameterSwitchKind::Reference;
        assert_eq!(vs.actual_value(), ["-".to_string()]);
    }

    #[test]
    fn iteration_resolves_nested_things() {
        let parameter = Parameter::new(mass(), None);
        let parameter_id = parameter.id;
        let mut element = ElementDefinition::new("battery", "bat").with_parameter(parameter);
        let mut usage = ElementUsage::new("battery 1", "bat1", element.id);
        usage.overrides.push(ParameterOverride::of(&element.parameters[0]));
        let override_id = usage.overrides[0].id;
        let usage_id = usage.id;
        element.contained_usages.push(usage);

        let mut iteration = Iteration::new();
        iteration.element_definitions.push(element);
        iteration
            .parameter_types
            .push(ParameterType::new("t", "t", ParameterTypeKind::Text));

        assert_eq!(
            iteration.find_thing(parameter_id).map(|t| t.class_kind()),
            Some(ClassKind::Parameter)
        );
        assert_eq!(
            iteration.find_thing(usage_id).map(|t| t.class_kind()),
            Some(ClassKind::ElementUsage)
        );
        assert_eq!(
            iteration.find_thing(override_id).map(|t| t.class_kind()),
            Some(ClassKind::ParameterOverride)
        );
        assert!(iteration.find_thing(ThingId::new()).is_none());
        assert!(iteration.parameter_owner(parameter_id).is_some());
    }

    #[test]
    fn override_view_keeps_identity() {
        let parameter = Parameter::new(mass(), None);
        let over = ParameterOverride::of(&parameter);
        let view = over.as_parameter();
        assert_eq!(view.id, over.id);
        assert_ne!(view.id, parameter.id);
        assert_eq!(view.value_sets.len(), 1);
    }
}
