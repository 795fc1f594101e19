//! Testing utilities for the DST workspace
//!
//! In-memory collaborators and fixtures shared by integration tests.

#![allow(missing_docs)]

use async_trait::async_trait;
use dst_core::LogEntryProvider;
use dst_repository::{
    ElementDefinition, ElementUsage, Iteration, MeasurementScale, Parameter, ParameterType,
    ParameterTypeAssignment, ParameterTypeKind, Repository, RepositoryError, Thing, ThingId, Transaction,
};
use dst_workspace::{EngineError, EngineVersion, NumericEngine, Value, WorkspaceVariable};
use indexmap::IndexMap;
use parking_lot::Mutex;

// -------------------------------------------------------------------
// Repository
// -------------------------------------------------------------------

type ParameterRewrite = Box<dyn Fn(&mut Parameter) + Send>;

#[derive(Default)]
struct RepositoryState {
    iteration: Option<Iteration>,
    transactions: Vec<Transaction>,
    refreshes: usize,
    fail_next_write: bool,
    rewrite_next_write: Option<ParameterRewrite>,
}

impl std::fmt::Debug for RepositoryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryState")
            .field("iteration", &self.iteration)
            .field("transactions", &self.transactions.len())
            .field("refreshes", &self.refreshes)
            .field("fail_next_write", &self.fail_next_write)
            .finish_non_exhaustive()
    }
}

/// Repository session backed by an owned iteration
///
/// Writes are applied immediately; refresh only counts calls.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: Mutex<RepositoryState>,
}

impl InMemoryRepository {
    pub fn new(iteration: Iteration) -> Self {
        Self {
            state: Mutex::new(RepositoryState {
                iteration: Some(iteration),
                ..RepositoryState::default()
            }),
        }
    }

    /// Session without an open iteration
    pub fn closed() -> Self {
        Self::default()
    }

    /// Reject the next write
    pub fn fail_next_write(&self) {
        self.state.lock().fail_next_write = true;
    }

    /// Store the next write's parameters the way the server derives them
    ///
    /// The transaction itself is recorded as sent.
    pub fn rewrite_next_write(&self, rewrite: impl Fn(&mut Parameter) + Send + 'static) {
        self.state.lock().rewrite_next_write = Some(Box::new(rewrite));
    }

    pub fn iteration(&self) -> Iteration {
        self.state.lock().iteration.clone().unwrap_or_default()
    }

    /// Committed transactions, oldest first
    pub fn transactions(&self) -> Vec<Transaction> {
        self.state.lock().transactions.clone()
    }

    pub fn refresh_count(&self) -> usize {
        self.state.lock().refreshes
    }

    /// Edit the iteration behind the session's back
    pub fn modify(&self, f: impl FnOnce(&mut Iteration)) {
        if let Some(iteration) = self.state.lock().iteration.as_mut() {
            f(iteration);
        }
    }
}

fn apply(iteration: &mut Iteration, thing: Thing) -> Result<(), RepositoryError> {
    match thing {
        Thing::ElementDefinition(element) => {
            match iteration.element_definitions.iter_mut().find(|e| e.id == element.id) {
                Some(existing) => *existing = element,
                None => iteration.element_definitions.push(element),
            }
        }
        Thing::Parameter(parameter) => {
            let owner = iteration
                .element_definitions
                .iter_mut()
                .find(|e| e.parameter(parameter.id).is_some())
                .ok_or(RepositoryError::ThingNotFound(parameter.id))?;
            owner.upsert_parameter(parameter);
        }
        Thing::ElementUsage(usage) => {
            let container = iteration
                .element_definitions
                .iter_mut()
                .flat_map(|e| e.contained_usages.iter_mut())
                .find(|u| u.id == usage.id)
                .ok_or(RepositoryError::ThingNotFound(usage.id))?;
            *container = usage;
        }
        Thing::ParameterOverride(parameter_override) => {
            let existing = iteration
                .element_definitions
                .iter_mut()
                .flat_map(|e| e.contained_usages.iter_mut())
                .flat_map(|u| u.overrides.iter_mut())
                .find(|o| o.id == parameter_override.id)
                .ok_or(RepositoryError::ThingNotFound(parameter_override.id))?;
            *existing = parameter_override;
        }
        Thing::ExternalIdentifierMap(map) => {
            match iteration.external_identifier_maps.iter_mut().find(|m| m.id == map.id) {
                Some(existing) => *existing = map,
                None => iteration.external_identifier_maps.push(map),
            }
        }
        Thing::ParameterType(parameter_type) => {
            iteration.parameter_types.retain(|t| t.id != parameter_type.id);
            iteration.parameter_types.push(parameter_type);
        }
        Thing::MeasurementScale(scale) => {
            iteration.scales.retain(|s| s.id != scale.id);
            iteration.scales.push(scale);
        }
        Thing::Option(option) => {
            iteration.options.retain(|o| o.id != option.id);
            iteration.options.push(option);
        }
        Thing::ActualFiniteState(state) => {
            iteration.actual_finite_states.retain(|s| s.id != state.id);
            iteration.actual_finite_states.push(state);
        }
    }
    Ok(())
}

#[async_trait]
impl Repository for InMemoryRepository {
    fn open_iteration(&self) -> Option<Iteration> {
        self.state.lock().iteration.clone()
    }

    fn get_thing_by_id(&self, id: ThingId) -> Option<Thing> {
        self.state.lock().iteration.as_ref()?.find_thing(id)
    }

    async fn write(&self, transaction: Transaction) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_write) {
            return Err(RepositoryError::WriteRejected("scripted failure".into()));
        }
        let rewrite = state.rewrite_next_write.take();
        let Some(iteration) = state.iteration.as_ref() else {
            return Err(RepositoryError::NoOpenIteration);
        };

        // All-or-nothing: apply to a copy first
        let mut updated = iteration.clone();
        for operation in transaction.operations() {
            let mut thing = operation.thing().clone();
            if let (Some(rewrite), Thing::Parameter(parameter)) = (&rewrite, &mut thing) {
                rewrite(parameter);
            }
            apply(&mut updated, thing)?;
        }
        state.iteration = Some(updated);
        state.transactions.push(transaction);
        Ok(())
    }

    async fn refresh(&self) -> Result<(), RepositoryError> {
        self.state.lock().refreshes += 1;
        Ok(())
    }
}

// -------------------------------------------------------------------
// Engine
// -------------------------------------------------------------------

#[derive(Debug, Default)]
struct EngineState {
    connected: bool,
    variables: IndexMap<String, Value>,
    commands: Vec<String>,
    run_effects: Vec<(String, Value)>,
}

/// Numeric engine with a scripted workspace
#[derive(Debug)]
pub struct ScriptedEngine {
    available: bool,
    state: Mutex<EngineState>,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            available: true,
            state: Mutex::new(EngineState::default()),
        }
    }

    /// Engine that refuses every connection
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Define a variable in the workspace
    #[must_use]
    pub fn with_variable(self, name: &str, value: Value) -> Self {
        self.set_variable(name, value);
        self
    }

    /// Variable the next `run(...)` assigns
    #[must_use]
    pub fn with_run_effect(self, name: &str, value: Value) -> Self {
        self.state.lock().run_effects.push((name.to_string(), value));
        self
    }

    pub fn set_variable(&self, name: &str, value: Value) {
        self.state.lock().variables.insert(name.to_string(), value);
    }

    pub fn remove_variable(&self, name: &str) {
        self.state.lock().variables.shift_remove(name);
    }

    pub fn variable(&self, name: &str) -> Option<Value> {
        self.state.lock().variables.get(name).cloned()
    }

    /// Commands executed so far
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }
}

#[async_trait]
impl NumericEngine for ScriptedEngine {
    async fn connect(&self, _version: &EngineVersion) -> bool {
        let mut state = self.state.lock();
        state.connected = self.available;
        state.connected
    }

    async fn disconnect(&self) {
        self.state.lock().connected = false;
    }

    async fn execute_function(&self, command: &str) -> Result<String, EngineError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(EngineError::NotConnected);
        }
        state.commands.push(command.to_string());

        if command == "who" {
            let names: Vec<&str> = state.variables.keys().map(String::as_str).collect();
            return Ok(format!("Your variables are:\n\n{}\n", names.join("  ")));
        }
        if command.starts_with("run(") {
            let effects = state.run_effects.clone();
            for (name, value) in effects {
                state.variables.insert(name, value);
            }
        }
        Ok(String::new())
    }

    async fn get_variable(&self, name: &str) -> Option<WorkspaceVariable> {
        let state = self.state.lock();
        state
            .variables
            .get(name)
            .map(|value| WorkspaceVariable::new(name, value.clone()))
    }

    async fn put_variable(&self, variable: &WorkspaceVariable) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(EngineError::NotConnected);
        }
        state
            .variables
            .insert(variable.name.clone(), variable.engine_value());
        Ok(())
    }
}

// -------------------------------------------------------------------
// Log entries
// -------------------------------------------------------------------

/// Accepts every transfer with a fixed entry
#[derive(Debug, Clone)]
pub struct AcceptingLogEntryProvider(pub String);

impl Default for AcceptingLogEntryProvider {
    fn default() -> Self {
        Self("test transfer".to_string())
    }
}

#[async_trait]
impl LogEntryProvider for AcceptingLogEntryProvider {
    async fn request_log_entry(&self, _summary: &str) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Declines every transfer
#[derive(Debug, Clone, Copy, Default)]
pub struct CancellingLogEntryProvider;

#[async_trait]
impl LogEntryProvider for CancellingLogEntryProvider {
    async fn request_log_entry(&self, _summary: &str) -> Option<String> {
        None
    }
}

// -------------------------------------------------------------------
// Fixtures
// -------------------------------------------------------------------

pub fn kilogram() -> MeasurementScale {
    MeasurementScale::real("kilogram", "kg")
}

pub fn second() -> MeasurementScale {
    MeasurementScale::real("second", "s")
}

pub fn quantity_kind(name: &str, short_name: &str) -> ParameterType {
    ParameterType::quantity(name, short_name, kilogram())
}

pub fn mass_type() -> ParameterType {
    quantity_kind("mass", "m")
}

fn real_component(short_name: &str, scale: MeasurementScale) -> ParameterTypeAssignment {
    ParameterTypeAssignment::new(
        short_name,
        ParameterTypeKind::Quantity {
            possible_scales: vec![scale.clone()],
            default_scale: Some(scale.clone()),
        },
    )
    .with_scale(scale)
}

/// Sampled function with the given component short names
pub fn sampled_function_type(name: &str, independent: &[&str], dependent: &[&str]) -> ParameterType {
    ParameterType::new(
        name,
        name,
        ParameterTypeKind::SampledFunction {
            independent: independent.iter().map(|c| real_component(c, second())).collect(),
            dependent: dependent.iter().map(|c| real_component(c, kilogram())).collect(),
        },
    )
}

/// Element with one parameter of `parameter_type`
pub fn element_with_parameter(name: &str, short_name: &str, parameter_type: ParameterType) -> (ElementDefinition, Parameter) {
    let parameter = Parameter::new(parameter_type, None);
    let element = ElementDefinition::new(name, short_name).with_parameter(parameter.clone());
    (element, parameter)
}

/// Element `container` holding a usage of `used`
pub fn element_with_usage(container: &str, used: &ElementDefinition) -> (ElementDefinition, ElementUsage) {
    let usage = ElementUsage::new(used.name.clone(), used.short_name.clone(), used.id);
    let mut element = ElementDefinition::new(container, container.to_lowercase());
    element.contained_usages.push(usage.clone());
    (element, usage)
}

/// Iteration with the given elements; their parameter types are registered
pub fn iteration_with(elements: Vec<ElementDefinition>) -> Iteration {
    let mut iteration = Iteration::new();
    for element in &elements {
        for parameter in &element.parameters {
            if !iteration.parameter_types.iter().any(|t| t.id == parameter.parameter_type.id) {
                iteration.parameter_types.push(parameter.parameter_type.clone());
            }
        }
    }
    iteration.element_definitions = elements;
    iteration
}

/// Numeric matrix value
pub fn matrix(rows: &[Vec<f64>]) -> Value {
    Value::Array(dst_workspace::ArrayValue::from_numbers(rows).unwrap())
}
