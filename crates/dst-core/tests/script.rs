//! Script loading, running and input mapping

use dst_core::prelude::*;
use dst_test_utils::{iteration_with, mass_type, AcceptingLogEntryProvider, InMemoryRepository, ScriptedEngine};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const SCRIPT: &str = "\
% vehicle sizing
mass = 12.5;
gains = [1 2; 3 4];
total = mass * 2;
";

struct Setup {
    _source_dir: tempfile::TempDir,
    _script_dir: tempfile::TempDir,
    script: std::path::PathBuf,
    engine: Arc<ScriptedEngine>,
    controller: SynchronizationController,
}

fn setup(engine: ScriptedEngine) -> Setup {
    let source_dir = tempfile::tempdir().unwrap();
    let script_dir = tempfile::tempdir().unwrap();
    let script = source_dir.path().join("sizing.m");
    std::fs::write(&script, SCRIPT).unwrap();

    let engine = Arc::new(engine);
    let config = DstConfig::default().with_temp_directory(script_dir.path());
    let controller = SynchronizationController::new(
        config,
        engine.clone(),
        Arc::new(InMemoryRepository::new(iteration_with(vec![]))),
        Arc::new(AcceptingLogEntryProvider::default()),
    );
    Setup {
        _source_dir: source_dir,
        _script_dir: script_dir,
        script,
        engine,
        controller,
    }
}

#[tokio::test]
async fn loading_a_script_discovers_and_decomposes_inputs() {
    let mut s = setup(ScriptedEngine::new());
    let count = s.controller.load_script(&s.script).await.unwrap();

    // mass, gains and its four cells; `total` is not a literal
    assert_eq!(count, 6);
    let loaded = s.controller.loaded_script().cloned().unwrap();
    assert_eq!(loaded.name, "sizing");
    assert!(loaded.working_copy.exists());
    assert_ne!(loaded.working_copy, loaded.source);

    let mass = s.controller.input_variable("mass").unwrap();
    assert_eq!(mass.identifier(), "sizing-mass");
    assert_eq!(
        s.controller.input_variable("gains[1,1]").map(|v| v.actual_value.clone()),
        Some(Value::Number(4.0))
    );

    s.controller.unload_script().await;
    assert!(!loaded.working_copy.exists());
    assert!(loaded.source.exists());
    assert!(s.controller.input_variables().is_empty());
}

#[tokio::test]
async fn missing_script_is_an_error() {
    let mut s = setup(ScriptedEngine::new());
    let missing = s.script.with_file_name("absent.m");
    assert!(s.controller.load_script(&missing).await.is_err());
    assert!(s.controller.loaded_script().is_none());
}

#[tokio::test]
async fn running_needs_a_session_and_a_script() {
    let mut s = setup(ScriptedEngine::new().with_run_effect("total", Value::Number(25.0)));
    assert!(matches!(s.controller.run_script().await, Err(DstError::Session(_))));

    s.controller.connect(&EngineVersion::default()).await;
    assert!(matches!(s.controller.run_script().await, Err(DstError::Session(_))));

    s.controller.load_script(&s.script).await.unwrap();
    s.controller.run_script().await.unwrap();

    let commands = s.engine.commands();
    assert!(commands.iter().any(|c| c.starts_with("cd(")));
    assert!(commands.iter().any(|c| c.starts_with("run(") && c.contains("sizing.m")));
    assert_eq!(
        s.controller.workspace_variable("total").map(|v| v.identifier()),
        Some("sizing-total".to_string())
    );
    assert!(!s.controller.is_busy());
}

#[tokio::test]
async fn mapped_script_input_is_staged_as_a_new_element() {
    let mut s = setup(ScriptedEngine::new());
    s.controller.load_script(&s.script).await.unwrap();

    assert!(s
        .controller
        .update_variable("mass", |v| v.select_parameter_type(Some(mass_type()))));
    let input = s.controller.input_variable("mass").cloned().unwrap();
    assert_eq!(s.controller.map_variables(vec![input]).unwrap(), 1);

    let results = s.controller.dst_map_results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].element.name, "mass");
    let parameter = results[0].mapped_parameters().next().unwrap();
    assert_eq!(parameter.value_sets[0].actual_value(), ["12.5".to_string()]);
    assert_eq!(
        s.controller
            .input_variable("mass")
            .and_then(|v| v.selected_element_definition.as_ref())
            .map(|e| e.id),
        Some(results[0].id())
    );
}
