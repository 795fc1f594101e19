//! End-to-end synchronization against in-memory collaborators

use dst_core::prelude::*;
use dst_repository::{ClassKind, ElementDefinition, MeasurementScale, Parameter, ParameterType, RepositoryError};
use dst_test_utils::{
    element_with_parameter, element_with_usage, iteration_with, mass_type, matrix, sampled_function_type,
    AcceptingLogEntryProvider, CancellingLogEntryProvider, InMemoryRepository, ScriptedEngine,
};
use dst_workspace::{IndexAssignment, MappingValidity, RowColumnSelection};
use pretty_assertions::assert_eq;
use std::sync::Arc;

struct Fixture {
    engine: Arc<ScriptedEngine>,
    repository: Arc<InMemoryRepository>,
    controller: SynchronizationController,
}

fn fixture(engine: ScriptedEngine, elements: Vec<ElementDefinition>) -> Fixture {
    fixture_with(engine, elements, Arc::new(AcceptingLogEntryProvider::default()))
}

fn fixture_with(
    engine: ScriptedEngine,
    elements: Vec<ElementDefinition>,
    log_entries: Arc<dyn LogEntryProvider>,
) -> Fixture {
    let engine = Arc::new(engine);
    let repository = Arc::new(InMemoryRepository::new(iteration_with(elements)));
    let controller = SynchronizationController::new(
        DstConfig::default(),
        engine.clone(),
        repository.clone(),
        log_entries,
    );
    Fixture {
        engine,
        repository,
        controller,
    }
}

/// Workspace variable `name` pointed at `parameter` of `element`
fn selected(controller: &SynchronizationController, name: &str, element: &ElementDefinition, parameter: &Parameter) -> WorkspaceVariable {
    let mut variable = controller.workspace_variable(name).cloned().unwrap();
    variable.select_element_definition(Some(element.clone()));
    variable.select_parameter(Some(parameter.clone()));
    variable
}

#[tokio::test]
async fn failed_connect_leaves_session_closed() {
    let mut f = fixture(ScriptedEngine::unavailable(), vec![]);
    let state = f.controller.connect(&EngineVersion::default()).await;

    assert_eq!(state, SessionState::Disconnected);
    assert!(!f.controller.is_session_open());
    assert!(f.controller.workspace_variables().is_empty());
}

#[tokio::test]
async fn connect_loads_and_reconciles_the_workspace() {
    let engine = ScriptedEngine::new()
        .with_variable("x", Value::Number(2.0))
        .with_variable("m", matrix(&[vec![1.0, 2.0], vec![3.0, 4.0]]));
    let mut f = fixture(engine, vec![]);

    assert_eq!(f.controller.connect(&EngineVersion::default()).await, SessionState::Connected);
    assert_eq!(f.controller.workspace_variables().len(), 6);
    assert!(f.controller.workspace_variable("m[1,0]").is_some());

    f.engine.remove_variable("m");
    f.engine.set_variable("x", Value::Number(3.0));
    assert_eq!(f.controller.load_workspace().await.unwrap(), 1);
    assert_eq!(
        f.controller.workspace_variable("x").map(|v| v.actual_value.clone()),
        Some(Value::Number(3.0))
    );
}

#[tokio::test]
async fn operations_need_an_open_session() {
    let mut f = fixture(ScriptedEngine::new(), vec![]);
    let err = f.controller.load_workspace().await.unwrap_err();
    assert!(matches!(err, DstError::Session(_)));
}

#[tokio::test]
async fn two_elements_go_out_in_one_transaction() {
    let (battery, mass) = element_with_parameter("Battery", "bat", mass_type());
    let harness = ElementDefinition::new("Harness", "harness");
    let engine = ScriptedEngine::new().with_variable("mass", Value::Number(12.5));
    let mut f = fixture(engine, vec![battery.clone()]);
    f.controller.connect(&EngineVersion::default()).await;

    let variable = selected(&f.controller, "mass", &battery, &mass);
    assert_eq!(f.controller.map_variables(vec![variable]).unwrap(), 1);
    f.controller.stage_mapped_element(MappedElement::new(harness.clone()));
    assert_eq!(f.controller.select_all_for_transfer_to_repository(), 2);

    let outcome = f.controller.transfer_to_repository().await.unwrap();
    assert!(outcome.is_completed());

    let transactions = f.repository.transactions();
    assert_eq!(transactions.len(), 1);
    let transaction = &transactions[0];
    assert_eq!(transaction.count_of(ClassKind::Parameter), 1);
    assert_eq!(transaction.count_of(ClassKind::ExternalIdentifierMap), 1);
    assert!(transaction.contains(battery.id));
    assert!(transaction.contains(harness.id));
    assert!(transaction.log_entry().is_some());

    let iteration = f.repository.iteration();
    let stored = iteration
        .element_definition(battery.id)
        .and_then(|e| e.parameter(mass.id))
        .unwrap();
    assert_eq!(stored.value_sets[0].actual_value(), ["12.5".to_string()]);
    assert!(iteration.element_definition(harness.id).is_some());

    assert!(f.controller.selected_for_transfer_to_repository().is_empty());
    assert!(!f.controller.is_busy());
    assert!(f.controller.audit().verify_integrity().is_ok());
    assert!(f.controller.audit().pending().is_empty());
    assert!(!f.controller.audit().history().is_empty());
}

#[tokio::test]
async fn declined_log_entry_cancels_without_writing() {
    let (battery, mass) = element_with_parameter("Battery", "bat", mass_type());
    let engine = ScriptedEngine::new().with_variable("mass", Value::Number(1.0));
    let mut f = fixture_with(engine, vec![battery.clone()], Arc::new(CancellingLogEntryProvider));
    f.controller.connect(&EngineVersion::default()).await;

    let variable = selected(&f.controller, "mass", &battery, &mass);
    f.controller.map_variables(vec![variable]).unwrap();
    f.controller.select_all_for_transfer_to_repository();

    let outcome = f.controller.transfer_to_repository().await.unwrap();
    assert_eq!(outcome, TransferOutcome::Cancelled);
    assert!(f.repository.transactions().is_empty());
    assert_eq!(f.controller.selected_for_transfer_to_repository().len(), 1);
}

#[tokio::test]
async fn rejected_write_clears_selection_and_busy_flag() {
    let (battery, mass) = element_with_parameter("Battery", "bat", mass_type());
    let engine = ScriptedEngine::new().with_variable("mass", Value::Number(1.0));
    let mut f = fixture(engine, vec![battery.clone()]);
    f.controller.connect(&EngineVersion::default()).await;

    let variable = selected(&f.controller, "mass", &battery, &mass);
    f.controller.map_variables(vec![variable]).unwrap();
    f.controller.select_all_for_transfer_to_repository();
    f.repository.fail_next_write();

    let err = f.controller.transfer_to_repository().await.unwrap_err();
    assert!(matches!(err, DstError::Repository(_)));
    assert!(!f.controller.is_busy());
    assert!(f.controller.selected_for_transfer_to_repository().is_empty());
    assert!(f.controller.audit().pending().is_empty());
    assert!(f.repository.transactions().is_empty());
}

#[tokio::test]
async fn nothing_selected_is_not_an_error() {
    let mut f = fixture(ScriptedEngine::new(), vec![]);
    f.controller.connect(&EngineVersion::default()).await;
    assert_eq!(
        f.controller.transfer_to_repository().await.unwrap(),
        TransferOutcome::NothingSelected
    );
    assert_eq!(
        f.controller.transfer_to_engine().await.unwrap(),
        TransferOutcome::NothingSelected
    );
}

#[tokio::test]
async fn reloading_the_mapping_is_idempotent() {
    let (battery, mass) = element_with_parameter("Battery", "bat", mass_type());
    let engine = ScriptedEngine::new().with_variable("mass", Value::Number(7.0));
    let mut f = fixture(engine, vec![battery.clone()]);
    f.controller.connect(&EngineVersion::default()).await;

    let variable = selected(&f.controller, "mass", &battery, &mass);
    f.controller.map_variables(vec![variable]).unwrap();
    f.controller.select_all_for_transfer_to_repository();
    f.controller.transfer_to_repository().await.unwrap();

    assert_eq!(f.controller.load_mapping().unwrap(), 1);
    let variables = f.controller.workspace_variables();
    let results = f.controller.dst_map_results();

    assert_eq!(f.controller.load_mapping().unwrap(), 1);
    assert_eq!(f.controller.workspace_variables(), variables);
    assert_eq!(f.controller.dst_map_results(), results);

    let reloaded = f.controller.workspace_variable("mass").unwrap();
    assert_eq!(reloaded.selected_parameter.as_ref().map(|p| p.id), Some(mass.id));
    assert_eq!(reloaded.mapping_validity(), MappingValidity::Valid);
}

#[tokio::test]
async fn validity_follows_the_variable() {
    let engine = ScriptedEngine::new().with_variable("mass", Value::Number(4.0));
    let mut f = fixture(engine, vec![]);
    f.controller.connect(&EngineVersion::default()).await;

    assert!(f.controller.update_variable("mass", |v| v.select_parameter_type(Some(mass_type()))));
    assert_eq!(
        f.controller.workspace_variable("mass").unwrap().mapping_validity(),
        MappingValidity::Valid
    );

    f.controller.update_variable("mass", |v| v.set_value(Value::Text("heavy".into())));
    assert_eq!(
        f.controller.workspace_variable("mass").unwrap().mapping_validity(),
        MappingValidity::Invalid
    );

    f.controller.update_variable("mass", WorkspaceVariable::clear_selection);
    assert_eq!(
        f.controller.workspace_variable("mass").unwrap().mapping_validity(),
        MappingValidity::Invalid
    );
    assert!(!f.controller.update_variable("missing", |_| {}));
}

#[tokio::test]
async fn sampled_function_lands_as_one_row_per_sample() {
    let trajectory = sampled_function_type("trajectory", &["t", "u"], &["x"]);
    let (vehicle, mut parameter) = element_with_parameter("Vehicle", "veh", trajectory);
    parameter.value_sets[0].set_manual(
        ["0", "1", "10", "1", "2", "20", "2", "3", "30"]
            .into_iter()
            .map(String::from)
            .collect(),
    );
    let vehicle = ElementDefinition {
        parameters: vec![parameter.clone()],
        ..vehicle
    };

    let mut f = fixture(ScriptedEngine::new(), vec![vehicle]);
    f.controller.connect(&EngineVersion::default()).await;

    let mut row = ParameterToVariableMapping::between(parameter.clone(), WorkspaceVariable::new("traj", Value::Number(0.0)));
    row.set_assignments(
        RowColumnSelection::Column,
        vec![
            IndexAssignment::new("t", "0").time_axis(),
            IndexAssignment::new("u", "1"),
            IndexAssignment::new("x", "2"),
        ],
    );
    assert!(row.is_valid());
    assert_eq!(f.controller.map_parameters(vec![row]).unwrap(), 1);

    let mut by_time = f.controller.time_tagged_values(parameter.id).unwrap().unwrap();
    assert_eq!(by_time.time_component(), "t");
    assert_eq!(by_time.columns(), ["u".to_string(), "x".to_string()]);
    assert_eq!(by_time.rows().iter().map(|r| r.time).collect::<Vec<_>>(), vec![0.0, 1.0, 2.0]);
    by_time.set_averaged(true);
    assert_eq!(by_time.rows().len(), 3);

    assert_eq!(f.controller.select_all_for_transfer_to_engine(), 1);

    let outcome = f.controller.transfer_to_engine().await.unwrap();
    assert_eq!(
        outcome,
        TransferOutcome::Completed {
            direction: MappingDirection::HubToDst,
            things_written: 1,
            values_transferred: 1,
        }
    );

    let written = f.engine.variable("traj").unwrap();
    assert_eq!(
        written,
        matrix(&[vec![0.0, 1.0, 10.0], vec![1.0, 2.0, 20.0], vec![2.0, 3.0, 30.0]])
    );
    assert!(f.controller.workspace_variable("traj[2,2]").is_some());
    assert!(f.controller.selected_for_transfer_to_engine().is_empty());
}

#[tokio::test]
async fn scalar_parameter_is_written_to_the_engine() {
    let scale = MeasurementScale::real("kilogram", "kg");
    let (battery, mut mass) = element_with_parameter(
        "Battery",
        "bat",
        ParameterType::quantity("mass", "m", scale),
    );
    mass.value_sets[0].set_manual(vec!["42".into()]);
    let battery = ElementDefinition {
        parameters: vec![mass.clone()],
        ..battery
    };

    let engine = ScriptedEngine::new().with_variable("x", Value::Number(0.0));
    let mut f = fixture(engine, vec![battery]);
    f.controller.connect(&EngineVersion::default()).await;

    let variable = f.controller.workspace_variable("x").cloned().unwrap();
    f.controller
        .map_parameters(vec![ParameterToVariableMapping::between(mass.clone(), variable)])
        .unwrap();
    f.controller.select_for_transfer_to_engine(mass.id);

    assert!(f.controller.transfer_to_engine().await.unwrap().is_completed());
    assert_eq!(f.engine.variable("x"), Some(Value::Number(42.0)));
    assert_eq!(
        f.controller.workspace_variable("x").map(|v| v.actual_value.clone()),
        Some(Value::Number(42.0))
    );

    // the correspondence survives a fresh controller
    let store = dst_core::MappingCorrespondenceStore::from_repository(f.repository.as_ref(), "DEHMatlab", "default");
    assert_eq!(store.entries_for(MappingDirection::HubToDst).count(), 1);
}

#[tokio::test]
async fn disconnect_forgets_the_workspace() {
    let engine = ScriptedEngine::new().with_variable("x", Value::Number(1.0));
    let mut f = fixture(engine, vec![]);
    f.controller.connect(&EngineVersion::default()).await;
    assert!(f.engine.is_connected());

    f.controller.disconnect().await;
    assert_eq!(f.controller.session_state(), SessionState::Disconnected);
    assert!(!f.engine.is_connected());
    assert!(f.controller.workspace_variables().is_empty());
}

#[tokio::test]
async fn scalar_parameter_replaces_a_decomposed_array() {
    let (battery, mut mass) = element_with_parameter("Battery", "bat", mass_type());
    mass.value_sets[0].set_manual(vec!["42".into()]);
    let battery = ElementDefinition {
        parameters: vec![mass.clone()],
        ..battery
    };
    let engine = ScriptedEngine::new().with_variable("m", Value::Number(0.0));
    let mut f = fixture(engine, vec![battery]);
    f.controller.connect(&EngineVersion::default()).await;

    let variable = f.controller.workspace_variable("m").cloned().unwrap();
    f.controller
        .map_parameters(vec![ParameterToVariableMapping::between(mass.clone(), variable)])
        .unwrap();
    assert!(f.controller.select_for_transfer_to_engine(mass.id));

    // the engine grows an array under the pending row
    f.engine.set_variable("m", matrix(&[vec![1.0, 2.0], vec![3.0, 4.0]]));
    f.controller.load_workspace().await.unwrap();
    assert!(f.controller.workspace_variable("m[0,0]").is_some());

    assert!(f.controller.transfer_to_engine().await.unwrap().is_completed());
    assert_eq!(f.engine.variable("m"), Some(Value::Number(42.0)));
    assert_eq!(
        f.controller.workspace_variable("m").map(|v| v.actual_value.clone()),
        Some(Value::Number(42.0))
    );
    assert!(f.controller.workspace_variable("m[0,0]").is_none());
    assert_eq!(f.controller.workspace_variables().len(), 1);

    // a scalar no longer maps onto the array itself
    f.engine.set_variable("m", matrix(&[vec![1.0, 2.0]]));
    f.controller.load_workspace().await.unwrap();
    let array_root = f.controller.workspace_variable("m").cloned().unwrap();
    assert_eq!(
        f.controller
            .map_parameters(vec![ParameterToVariableMapping::between(mass, array_root)])
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn refreshed_values_are_rederived_in_a_second_transaction() {
    let (battery, mass) = element_with_parameter("Battery", "bat", mass_type());
    let harness = ElementDefinition::new("Harness", "harness");
    let engine = ScriptedEngine::new().with_variable("mass", Value::Number(12.5));
    let mut f = fixture(engine, vec![battery.clone()]);
    f.controller.connect(&EngineVersion::default()).await;

    let variable = selected(&f.controller, "mass", &battery, &mass);
    f.controller.map_variables(vec![variable]).unwrap();
    f.controller.stage_mapped_element(MappedElement::new(harness.clone()));
    f.controller.select_all_for_transfer_to_repository();

    // the server rounds what it stores
    f.repository.rewrite_next_write(|parameter: &mut Parameter| {
        for value_set in &mut parameter.value_sets {
            value_set.set_manual(vec!["12".into()]);
        }
    });
    assert!(f.controller.transfer_to_repository().await.unwrap().is_completed());

    let transactions = f.repository.transactions();
    assert_eq!(transactions.len(), 2);
    let rederived = &transactions[1];
    assert_eq!(rederived.len(), 1);
    assert_eq!(rederived.count_of(ClassKind::Parameter), 1);
    assert!(rederived.contains(mass.id));
    assert!(!rederived.contains(battery.id));
    assert!(!rederived.contains(harness.id));
    assert_eq!(f.repository.refresh_count(), 2);

    let stored = f
        .repository
        .iteration()
        .element_definition(battery.id)
        .and_then(|e| e.parameter(mass.id))
        .cloned()
        .unwrap();
    assert_eq!(stored.value_sets[0].actual_value(), ["12.5".to_string()]);
}

#[tokio::test]
async fn unchanged_refresh_sends_a_single_transaction() {
    let (battery, mass) = element_with_parameter("Battery", "bat", mass_type());
    let engine = ScriptedEngine::new().with_variable("mass", Value::Number(2.0));
    let mut f = fixture(engine, vec![battery.clone()]);
    f.controller.connect(&EngineVersion::default()).await;

    let variable = selected(&f.controller, "mass", &battery, &mass);
    f.controller.map_variables(vec![variable]).unwrap();
    f.controller.select_all_for_transfer_to_repository();
    f.controller.transfer_to_repository().await.unwrap();

    assert_eq!(f.repository.transactions().len(), 1);
    assert_eq!(f.repository.refresh_count(), 1);
}

#[tokio::test]
async fn usage_override_goes_out_with_its_definition() {
    let (battery, mass) = element_with_parameter("Battery", "bat", mass_type());
    let (bus, usage) = element_with_usage("Bus", &battery);
    let engine = ScriptedEngine::new().with_variable("mass", Value::Number(3.0));
    let mut f = fixture(engine, vec![battery.clone(), bus]);
    f.controller.connect(&EngineVersion::default()).await;

    let mut variable = selected(&f.controller, "mass", &battery, &mass);
    variable.add_element_usage(usage.clone());
    assert_eq!(f.controller.map_variables(vec![variable]).unwrap(), 1);
    f.controller.select_all_for_transfer_to_repository();
    assert!(f.controller.transfer_to_repository().await.unwrap().is_completed());

    let transaction = &f.repository.transactions()[0];
    assert!(transaction.contains(usage.id));
    assert_eq!(transaction.count_of(ClassKind::ParameterOverride), 1);

    let iteration = f.repository.iteration();
    let stored = iteration
        .element_usage(usage.id)
        .and_then(|u| u.override_of(mass.id))
        .unwrap();
    assert_eq!(stored.value_sets[0].actual_value(), ["3".to_string()]);
}

#[tokio::test]
async fn removed_element_drops_out_of_the_reloaded_mapping() {
    let (battery, mass) = element_with_parameter("Battery", "bat", mass_type());
    let engine = ScriptedEngine::new().with_variable("mass", Value::Number(5.0));
    let mut f = fixture(engine, vec![battery.clone()]);
    f.controller.connect(&EngineVersion::default()).await;

    let variable = selected(&f.controller, "mass", &battery, &mass);
    f.controller.map_variables(vec![variable]).unwrap();
    f.controller.select_all_for_transfer_to_repository();
    f.controller.transfer_to_repository().await.unwrap();

    f.repository
        .modify(|iteration| iteration.element_definitions.retain(|e| e.id != battery.id));

    let mut controller = SynchronizationController::new(
        DstConfig::default(),
        f.engine.clone(),
        f.repository.clone(),
        Arc::new(AcceptingLogEntryProvider::default()),
    );
    controller.connect(&EngineVersion::default()).await;
    assert_eq!(controller.load_mapping().unwrap(), 0);

    let reloaded = controller.workspace_variable("mass").unwrap();
    assert!(reloaded.selected_parameter.is_none());
    assert!(reloaded.selected_element_definition.is_none());
    assert!(controller.dst_map_results().is_empty());
}

#[tokio::test]
async fn transfer_without_an_open_iteration_fails_cleanly() {
    let mut controller = SynchronizationController::new(
        DstConfig::default(),
        Arc::new(ScriptedEngine::new()),
        Arc::new(InMemoryRepository::closed()),
        Arc::new(AcceptingLogEntryProvider::default()),
    );
    controller.stage_mapped_element(MappedElement::new(ElementDefinition::new("Harness", "harness")));
    assert_eq!(controller.select_all_for_transfer_to_repository(), 1);

    let err = controller.transfer_to_repository().await.unwrap_err();
    assert!(matches!(err, DstError::Repository(RepositoryError::NoOpenIteration)));
    assert!(controller.selected_for_transfer_to_repository().is_empty());
    assert!(!controller.is_busy());
}
