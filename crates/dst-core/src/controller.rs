//! Synchronization controller
//!
//! Drives the connect → load → map → transfer cycle:
//! - opens and closes the engine session
//! - keeps the workspace and script-input collections in step with the engine
//! - re-applies saved correspondences after every workspace mutation
//! - stages map results and transfers the selected ones in either direction
//!
//! Operations take `&mut self`; overlapping calls are ruled out by the
//! borrow checker. The busy flag is published for the presentation layer.

use crate::array::{ArrayReconstructor, TimeTaggedValues};
use crate::audit::{AuditAction, AuditTrail};
use crate::config::DstConfig;
use crate::difference::{DifferenceComputer, ValueDifference};
use crate::error::{DstError, SessionError};
use crate::log_entry::LogEntryProvider;
use crate::mapping_store::MappingCorrespondenceStore;
use crate::observable::{CollectionChange, ObservableMap};
use crate::rules::{MappingRule, ParameterToVariableRule, VariableToElementRule};
use crate::session::{SessionState, SessionTracker};
use crate::types::{MappedElement, MappingDirection, ParameterToVariableMapping, TransferOutcome};
use crate::validity::ValidityChecker;
use dst_repository::{Iteration, Parameter, Repository, RepositoryError, Thing, ThingId, Transaction};
use dst_workspace::{
    plan_reconciliation, recompose, AssignmentScriptParser, EngineVersion, NumericEngine, ReconciliationPlan,
    ScriptParser, Value, WorkspaceVariable,
};
use futures::future::join_all;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

type VariableMap = ObservableMap<String, WorkspaceVariable>;
type DstRule = Box<dyn MappingRule<Vec<WorkspaceVariable>, Vec<MappedElement>>>;
type HubRule = Box<dyn MappingRule<Vec<ParameterToVariableMapping>, Vec<ParameterToVariableMapping>>>;

/// Script currently loaded as the input source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedScript {
    /// File stem, prefix of every input identifier
    pub name: String,
    /// File the user picked
    pub source: PathBuf,
    /// Copy the engine runs
    pub working_copy: PathBuf,
}

impl LoadedScript {
    fn owns_copy(&self) -> bool {
        self.working_copy != self.source
    }
}

/// Orchestrates the synchronization between engine and repository
pub struct SynchronizationController {
    config: DstConfig,
    engine: Arc<dyn NumericEngine>,
    repository: Arc<dyn Repository>,
    log_entries: Arc<dyn LogEntryProvider>,
    script_parser: Box<dyn ScriptParser>,
    dst_rule: DstRule,
    hub_rule: HubRule,
    checker: ValidityChecker,
    reconstructor: ArrayReconstructor,
    session: SessionTracker,
    audit: AuditTrail,
    store: MappingCorrespondenceStore,
    script: Option<LoadedScript>,
    input_variables: VariableMap,
    workspace_variables: VariableMap,
    dst_map_results: ObservableMap<ThingId, MappedElement>,
    hub_map_results: ObservableMap<ThingId, ParameterToVariableMapping>,
    selected_dst: ObservableMap<ThingId, MappedElement>,
    selected_hub: ObservableMap<ThingId, ParameterToVariableMapping>,
}

impl std::fmt::Debug for SynchronizationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynchronizationController")
            .field("state", &self.session.state())
            .field("script", &self.script)
            .field("input_variables", &self.input_variables.len())
            .field("workspace_variables", &self.workspace_variables.len())
            .field("dst_map_results", &self.dst_map_results.len())
            .field("hub_map_results", &self.hub_map_results.len())
            .finish_non_exhaustive()
    }
}

impl SynchronizationController {
    /// Create controller; loads the saved mapping configuration
    #[must_use]
    pub fn new(
        config: DstConfig,
        engine: Arc<dyn NumericEngine>,
        repository: Arc<dyn Repository>,
        log_entries: Arc<dyn LogEntryProvider>,
    ) -> Self {
        let capacity = config.change_channel_capacity;
        let store = MappingCorrespondenceStore::from_repository(
            repository.as_ref(),
            &config.tool_name,
            &config.mapping_configuration_name,
        );
        Self {
            config,
            engine,
            repository,
            log_entries,
            script_parser: Box::new(AssignmentScriptParser::new()),
            dst_rule: Box::new(VariableToElementRule::new()),
            hub_rule: Box::new(ParameterToVariableRule::new()),
            checker: ValidityChecker::new(),
            reconstructor: ArrayReconstructor::new(),
            session: SessionTracker::new(),
            audit: AuditTrail::new(),
            store,
            script: None,
            input_variables: ObservableMap::new(capacity),
            workspace_variables: ObservableMap::new(capacity),
            dst_map_results: ObservableMap::new(capacity),
            hub_map_results: ObservableMap::new(capacity),
            selected_dst: ObservableMap::new(capacity),
            selected_hub: ObservableMap::new(capacity),
        }
    }

    #[must_use]
    pub fn with_script_parser(mut self, parser: impl ScriptParser + 'static) -> Self {
        self.script_parser = Box::new(parser);
        self
    }

    #[must_use]
    pub fn with_dst_rule(
        mut self,
        rule: impl MappingRule<Vec<WorkspaceVariable>, Vec<MappedElement>> + 'static,
    ) -> Self {
        self.dst_rule = Box::new(rule);
        self
    }

    #[must_use]
    pub fn with_hub_rule(
        mut self,
        rule: impl MappingRule<Vec<ParameterToVariableMapping>, Vec<ParameterToVariableMapping>> + 'static,
    ) -> Self {
        self.hub_rule = Box::new(rule);
        self
    }

    // ---------------------------------------------------------------
    // Session
    // ---------------------------------------------------------------

    /// Open an engine session
    ///
    /// On success the workspace is reloaded and mappings re-applied. Failures
    /// never propagate; the returned (and observable) state tells the caller
    /// whether the session is open.
    #[tracing::instrument(skip(self, version), fields(version = %version))]
    pub async fn connect(&mut self, version: &EngineVersion) -> SessionState {
        if let Err(e) = self.session.transition(SessionState::Connecting) {
            tracing::warn!("Cannot connect: {}", e);
            return self.session.state();
        }

        if !self.engine.connect(version).await {
            let error = DstError::EngineUnavailable {
                version: version.to_string(),
            };
            tracing::warn!("{}", error);
            let _ = self.session.transition(SessionState::Disconnected);
            return self.session.state();
        }

        if let Err(e) = self.session.transition(SessionState::Connected) {
            tracing::warn!("Session did not open: {}", e);
            return self.session.state();
        }
        tracing::info!("Connected to engine {}", version);

        if let Err(e) = self.load_workspace().await {
            tracing::warn!("Workspace reload after connect failed: {}", e);
        }
        if let Err(e) = self.load_mapping() {
            tracing::warn!("Mapping reload after connect failed: {}", e);
        }
        self.session.state()
    }

    /// Close the engine session and forget the live workspace
    #[tracing::instrument(skip(self))]
    pub async fn disconnect(&mut self) {
        if self.session.is_session_open() {
            self.engine.disconnect().await;
        }
        let _ = self.session.transition(SessionState::Disconnected);
        self.workspace_variables.clear();
        tracing::info!("Disconnected from engine");
    }

    fn require_open(&self) -> Result<(), DstError> {
        if self.session.is_session_open() {
            Ok(())
        } else {
            Err(SessionError::NotConnected(self.session.state()).into())
        }
    }

    // ---------------------------------------------------------------
    // Workspace and script
    // ---------------------------------------------------------------

    /// Re-read every engine variable and merge it into the workspace
    ///
    /// Unseen variables are added, known ones get their value updated, and
    /// variables (or decomposed cells) gone from the engine are pruned.
    ///
    /// # Errors
    /// Returns error if no session is open or the listing command fails
    #[tracing::instrument(skip(self))]
    pub async fn load_workspace(&mut self) -> Result<usize, DstError> {
        self.require_open()?;
        let listing = self
            .engine
            .execute_function(&self.config.workspace_listing_command)
            .await?;
        let names = parse_variable_names(&listing);
        tracing::debug!("Engine reports {} variables", names.len());

        let fetched = join_all(names.iter().map(|name| self.engine.get_variable(name))).await;
        let script_name = self.script.as_ref().map(|s| s.name.clone());
        let roots: Vec<WorkspaceVariable> = fetched
            .into_iter()
            .flatten()
            .map(|mut variable| {
                variable.script_name.clone_from(&script_name);
                variable
            })
            .collect();

        let root_names: HashSet<String> = roots.iter().map(|v| v.name.clone()).collect();
        let vanished = self
            .workspace_variables
            .retain(|name, _| root_names.contains(root_name(name)));
        if !vanished.is_empty() {
            tracing::debug!("Pruned {} vanished variables", vanished.len());
        }

        for mut root in roots {
            let fresh = root.decompose();
            let plan = merge_tree(&mut self.workspace_variables, &fresh);
            if !plan.is_empty() {
                tracing::debug!(
                    "Reconciled {}: {} added, {} updated, {} removed",
                    root.name,
                    plan.added.len(),
                    plan.updated.len(),
                    plan.removed.len()
                );
            }
        }

        tracing::info!("Workspace holds {} variables", self.workspace_variables.len());
        Ok(self.workspace_variables.len())
    }

    /// Load a script as the input source
    ///
    /// Unloads the previous script, copies the file to the script directory,
    /// discovers its declared inputs and decomposes them. Mappings are
    /// re-applied afterwards.
    ///
    /// # Errors
    /// Returns error if the file cannot be copied or parsed
    #[tracing::instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn load_script(&mut self, path: impl AsRef<Path>) -> Result<usize, DstError> {
        let source = path.as_ref().to_path_buf();
        self.unload_script().await;

        let (Some(name), Some(file_name)) = (
            source.file_stem().and_then(|s| s.to_str()).map(str::to_string),
            source.file_name().map(ToOwned::to_owned),
        ) else {
            return Err(DstError::Configuration(format!(
                "{} is not a script file",
                source.display()
            )));
        };

        let directory = self.config.script_directory();
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|e| DstError::io(&directory, e))?;
        let working_copy = directory.join(file_name);
        if working_copy != source {
            tokio::fs::copy(&source, &working_copy)
                .await
                .map_err(|e| DstError::io(&source, e))?;
        }
        let script = LoadedScript {
            name,
            source,
            working_copy,
        };

        let inputs = match self.script_parser.parse_file(&script.working_copy) {
            Ok(inputs) => inputs,
            Err(e) => {
                remove_copy(&script).await;
                return Err(e.into());
            }
        };

        if self.session.is_session_open() {
            self.engine
                .execute_function(&format!("cd('{}')", directory.display()))
                .await?;
        }

        let mut flattened = Vec::new();
        for input in inputs {
            let mut variable = input.with_script(script.name.clone());
            flattened.extend(variable.decompose());
        }
        self.input_variables
            .reset(flattened.into_iter().map(|v| (v.name.clone(), v)));
        tracing::info!(
            "Loaded script {} with {} input variables",
            script.name,
            self.input_variables.len()
        );
        self.script = Some(script);

        self.load_mapping()?;
        Ok(self.input_variables.len())
    }

    /// Forget the loaded script and delete its working copy
    #[tracing::instrument(skip(self))]
    pub async fn unload_script(&mut self) {
        if let Some(script) = self.script.take() {
            remove_copy(&script).await;
            tracing::info!("Unloaded script {}", script.name);
        }
        self.input_variables.clear();
    }

    /// Run the loaded script, reload the workspace and re-apply mappings
    ///
    /// # Errors
    /// Returns error without an open session or loaded script, or if the
    /// engine fails to run it
    #[tracing::instrument(skip(self))]
    pub async fn run_script(&mut self) -> Result<usize, DstError> {
        self.require_open()?;
        let script = self.script.as_ref().ok_or(SessionError::NoScript)?;
        let command = format!("run('{}')", script.working_copy.display());

        self.session.begin_busy();
        let result = self.engine.execute_function(&command).await;
        self.session.end_busy();
        result?;

        let count = self.load_workspace().await?;
        self.load_mapping()?;
        Ok(count)
    }

    /// Apply a change to a known variable (inputs first, then workspace)
    ///
    /// Validity is re-evaluated afterwards. Returns whether the variable exists.
    pub fn update_variable(&mut self, name: &str, f: impl FnOnce(&mut WorkspaceVariable)) -> bool {
        let checker = self.checker;
        let apply = |variable: &mut WorkspaceVariable| {
            f(variable);
            let _ = variable.is_valid(&checker);
        };
        if self.input_variables.contains_key(&name.to_string()) {
            self.input_variables.update(&name.to_string(), apply)
        } else {
            self.workspace_variables.update(&name.to_string(), apply)
        }
    }

    // ---------------------------------------------------------------
    // Mapping
    // ---------------------------------------------------------------

    /// Map engine variables to repository elements
    ///
    /// Results are merged into the engine→repository map results with last
    /// write wins per parameter. Returns the number of elements produced.
    ///
    /// # Errors
    /// Returns error if the rule rejects a valid mapping
    #[tracing::instrument(skip(self, variables), fields(count = variables.len()))]
    pub fn map_variables(&mut self, variables: Vec<WorkspaceVariable>) -> Result<usize, DstError> {
        let mapped = self.dst_rule.transform(variables.clone())?;
        let produced = mapped.len();

        for element in mapped {
            for (parameter_id, identifier) in &element.sources {
                let Some(variable) = variables.iter().find(|v| &v.identifier() == identifier) else {
                    continue;
                };
                let mut selected = variable.clone();
                selected.select_element_definition(Some(element.element.clone()));
                selected.select_parameter(element.element.parameter(*parameter_id).cloned());
                self.store
                    .add_variable_correspondences(&selected, MappingDirection::DstToHub);
                self.replace_variable(selected);
            }
            self.stage_mapped_element(element);
        }

        tracing::info!("Mapped {} elements", produced);
        Ok(produced)
    }

    /// Stage a map result for transfer to the repository
    ///
    /// Older results for the same parameters (or produced from the same
    /// variables) are forgotten.
    pub fn stage_mapped_element(&mut self, element: MappedElement) {
        let id = element.id();
        let parameters: HashSet<ThingId> = element.sources.keys().copied().collect();
        let identifiers: HashSet<&String> = element.sources.values().collect();

        let mut stale = Vec::new();
        for (owner, existing) in self.dst_map_results.iter() {
            for (parameter, source) in &existing.sources {
                let same_parameter = *owner != id && parameters.contains(parameter);
                let same_source = identifiers.contains(source) && !parameters.contains(parameter);
                if same_parameter || same_source {
                    stale.push((*owner, *parameter));
                }
            }
        }
        let touched: HashSet<ThingId> = stale.iter().map(|(owner, _)| *owner).collect();
        for (owner, parameter) in stale {
            self.dst_map_results.update(&owner, |e| {
                e.forget(parameter);
            });
        }
        self.dst_map_results
            .retain(|owner, e| *owner == id || !touched.contains(owner) || !e.sources.is_empty());

        if self.dst_map_results.contains_key(&id) {
            self.dst_map_results.update(&id, |existing| existing.merge(element));
        } else {
            self.dst_map_results.upsert(id, element);
        }
    }

    /// Map repository parameters to engine variables
    ///
    /// Valid rows replace earlier rows for the same parameter or variable.
    /// Returns the number of rows kept.
    ///
    /// # Errors
    /// Returns error if the rule fails
    #[tracing::instrument(skip(self, rows), fields(count = rows.len()))]
    pub fn map_parameters(&mut self, rows: Vec<ParameterToVariableMapping>) -> Result<usize, DstError> {
        let valid = self.hub_rule.transform(rows)?;
        let kept = valid.len();

        for row in valid {
            let Some(parameter_id) = row.parameter().map(|p| p.id) else {
                continue;
            };
            let identifier = row.variable().map(WorkspaceVariable::identifier);
            self.store.add_parameter_mapping(&row);
            self.hub_map_results.retain(|key, existing| {
                *key == parameter_id || existing.variable().map(WorkspaceVariable::identifier) != identifier
            });
            self.hub_map_results.upsert(parameter_id, row);
        }

        tracing::info!("Mapped {} parameters", kept);
        Ok(kept)
    }

    /// Re-apply saved correspondences to the current variables
    ///
    /// Valid engine→repository mappings are re-mapped and
    /// repository→engine rows rebuilt. Running it twice without a workspace
    /// change yields the same selections. Returns the number of variables
    /// carrying a valid mapping.
    ///
    /// # Errors
    /// Returns error if a mapping rule fails
    #[tracing::instrument(skip(self))]
    pub fn load_mapping(&mut self) -> Result<usize, DstError> {
        let repository = Arc::clone(&self.repository);
        let mut valid: Vec<WorkspaceVariable> = Vec::new();

        for collection in [&mut self.input_variables, &mut self.workspace_variables] {
            let mut variables = collection.values();
            self.store
                .load_engine_to_repository(&mut variables, repository.as_ref());
            for mut variable in variables {
                if variable.target_parameter_type().is_some() && variable.is_valid(&self.checker) {
                    valid.push(variable.clone());
                }
                if collection.get(&variable.name) != Some(&variable) {
                    collection.upsert(variable.name.clone(), variable);
                }
            }
        }

        let mut seen = HashSet::new();
        valid.retain(|v| seen.insert(v.identifier()));
        let count = valid.len();
        if !valid.is_empty() {
            self.map_variables(valid)?;
        }

        let candidates: Vec<WorkspaceVariable> = self
            .workspace_variables
            .iter()
            .chain(self.input_variables.iter())
            .map(|(_, v)| v.clone())
            .collect();
        let rows = self
            .store
            .load_repository_to_engine(&candidates, repository.as_ref());
        if !rows.is_empty() {
            self.map_parameters(rows)?;
        }

        tracing::debug!("Mapping reloaded: {} engine variables mapped", count);
        Ok(count)
    }

    /// Replace a variable in whichever collection holds it
    fn replace_variable(&mut self, variable: WorkspaceVariable) {
        let name = variable.name.clone();
        if self.input_variables.contains_key(&name) {
            self.input_variables.upsert(name, variable);
        } else if self.workspace_variables.contains_key(&name) {
            self.workspace_variables.upsert(name, variable);
        }
    }

    // ---------------------------------------------------------------
    // Transfer selection
    // ---------------------------------------------------------------

    /// Select a staged element for transfer to the repository
    pub fn select_for_transfer_to_repository(&mut self, element: ThingId) -> bool {
        match self.dst_map_results.get(&element).cloned() {
            Some(mapped) => {
                self.selected_dst.upsert(element, mapped);
                true
            }
            None => false,
        }
    }

    pub fn deselect_for_transfer_to_repository(&mut self, element: ThingId) -> bool {
        self.selected_dst.remove(&element).is_some()
    }

    /// Select every staged element
    pub fn select_all_for_transfer_to_repository(&mut self) -> usize {
        self.selected_dst
            .reset(self.dst_map_results.iter().map(|(k, v)| (*k, v.clone())));
        self.selected_dst.len()
    }

    /// Select a staged row (by parameter) for transfer to the engine
    pub fn select_for_transfer_to_engine(&mut self, parameter: ThingId) -> bool {
        match self.hub_map_results.get(&parameter).cloned() {
            Some(row) => {
                self.selected_hub.upsert(parameter, row);
                true
            }
            None => false,
        }
    }

    pub fn deselect_for_transfer_to_engine(&mut self, parameter: ThingId) -> bool {
        self.selected_hub.remove(&parameter).is_some()
    }

    /// Select every staged row
    pub fn select_all_for_transfer_to_engine(&mut self) -> usize {
        self.selected_hub
            .reset(self.hub_map_results.iter().map(|(k, v)| (*k, v.clone())));
        self.selected_hub.len()
    }

    /// Clear not-yet-started transfer selections and pending audit entries
    ///
    /// Returns the number of discarded audit entries.
    pub fn cancel_pending_transfer(&mut self) -> usize {
        self.selected_dst.clear();
        self.selected_hub.clear();
        let discarded = self.audit.discard_pending();
        tracing::info!("Pending transfer cancelled");
        discarded
    }

    /// Value deltas the selected engine→repository transfer would write
    #[must_use]
    pub fn pending_differences(&self) -> Vec<ValueDifference> {
        let names = self.repository.open_iteration().unwrap_or_default();
        self.selected_dst
            .iter()
            .flat_map(|(_, mapped)| mapped.mapped_parameters())
            .flat_map(|new| {
                let old = match self.repository.get_thing_by_id(new.id) {
                    Some(Thing::Parameter(old)) => old,
                    _ => Parameter {
                        value_sets: Vec::new(),
                        ..new.clone()
                    },
                };
                DifferenceComputer::parameter_differences(&old, new, &names)
            })
            .collect()
    }

    // ---------------------------------------------------------------
    // Transfer to repository
    // ---------------------------------------------------------------

    /// Write the selected map results to the repository
    ///
    /// # Errors
    /// Any failure while building or committing aborts the transfer: the busy
    /// flag is cleared, selections and pending audit entries are dropped and
    /// the error is returned.
    #[tracing::instrument(skip(self))]
    pub async fn transfer_to_repository(&mut self) -> Result<TransferOutcome, DstError> {
        if self.selected_dst.is_empty() {
            return Ok(TransferOutcome::NothingSelected);
        }

        let summary = format!(
            "Transfer of {} element(s) from {}",
            self.selected_dst.len(),
            self.config.tool_name
        );
        let Some(log_entry) = self.log_entries.request_log_entry(&summary).await else {
            tracing::info!("Transfer to repository cancelled");
            self.audit.discard_pending();
            return Ok(TransferOutcome::Cancelled);
        };

        self.session.begin_busy();
        let result = self.write_to_repository(&log_entry).await;
        self.session.end_busy();

        match result {
            Ok(outcome) => {
                self.after_repository_transfer();
                tracing::info!("Transfer to repository completed: {:?}", outcome);
                Ok(outcome)
            }
            Err(e) => {
                self.selected_dst.clear();
                self.audit.discard_pending();
                tracing::error!("Transfer to repository failed: {}", e);
                Err(e)
            }
        }
    }

    async fn write_to_repository(&mut self, log_entry: &str) -> Result<TransferOutcome, DstError> {
        let iteration = self
            .repository
            .open_iteration()
            .ok_or(RepositoryError::NoOpenIteration)?;
        let mut transaction = Transaction::new(iteration.id);
        self.repository.register_log_entry(log_entry, &mut transaction);

        let selected = self.selected_dst.values();
        let mut transferred: Vec<Parameter> = Vec::new();
        for mapped in &selected {
            self.register_element(mapped, &iteration, &mut transaction);
            transferred.extend(mapped.mapped_parameters().cloned());
        }

        self.store.persist(&mut transaction, &iteration)?;
        self.audit.record(
            MappingDirection::DstToHub,
            &self.config.mapping_configuration_name,
            AuditAction::MappingSaved,
            format!("{} correspondences", self.store.len()),
        );

        let things_written = transaction.len();
        self.repository.write(transaction).await?;
        self.audit.commit();
        self.repository.refresh().await?;

        self.rederive_value_sets(&transferred).await?;

        Ok(TransferOutcome::Completed {
            direction: MappingDirection::DstToHub,
            things_written,
            values_transferred: transferred.len(),
        })
    }

    /// Register an element clone, its mapped parameters, usages and overrides
    fn register_element(&self, mapped: &MappedElement, iteration: &Iteration, transaction: &mut Transaction) {
        let action = |id: ThingId| {
            if iteration.contains(id) {
                AuditAction::Updated
            } else {
                AuditAction::Created
            }
        };

        transaction.create_or_update(Thing::ElementDefinition(mapped.element.clone()), iteration);
        self.audit.record(
            MappingDirection::DstToHub,
            &mapped.element.name,
            action(mapped.id()),
            "element definition",
        );

        for parameter in mapped.mapped_parameters() {
            transaction.create_or_update(Thing::Parameter(parameter.clone()), iteration);
            self.audit.record(
                MappingDirection::DstToHub,
                format!("{}.{}", mapped.element.short_name, parameter.parameter_type.short_name),
                action(parameter.id),
                values_detail(parameter),
            );
        }

        for usage in &mapped.usages {
            transaction.create_or_update(Thing::ElementUsage(usage.clone()), iteration);
            for parameter_override in usage
                .overrides
                .iter()
                .filter(|o| mapped.sources.contains_key(&o.parameter))
            {
                transaction.create_or_update(Thing::ParameterOverride(parameter_override.clone()), iteration);
                self.audit.record(
                    MappingDirection::DstToHub,
                    format!("{}.{}", usage.short_name, parameter_override.parameter_type.short_name),
                    action(parameter_override.id),
                    values_detail(&parameter_override.as_parameter()),
                );
            }
        }
    }

    /// Bring refreshed parameters' value sets in line with what was sent
    ///
    /// Writes a second, smaller transaction only when the refreshed state
    /// differs.
    async fn rederive_value_sets(&self, transferred: &[Parameter]) -> Result<(), DstError> {
        let iteration = self
            .repository
            .open_iteration()
            .ok_or(RepositoryError::NoOpenIteration)?;
        let mut transaction = Transaction::new(iteration.id);

        for sent in transferred {
            let Some(Thing::Parameter(mut current)) = self.repository.get_thing_by_id(sent.id) else {
                tracing::warn!("Transferred parameter {} not found after refresh", sent.id);
                continue;
            };
            let mut changed = false;
            for value_set in &sent.value_sets {
                if let Some(target) = current.value_set_mut(value_set.option, value_set.actual_state) {
                    if target.actual_value() != value_set.actual_value() {
                        target.set_manual(value_set.actual_value().to_vec());
                        changed = true;
                    }
                }
            }
            if changed {
                transaction.update(Thing::Parameter(current));
            }
        }

        if transaction.is_empty() {
            return Ok(());
        }
        tracing::debug!("Re-deriving {} value sets", transaction.len());
        self.repository.write(transaction).await?;
        self.repository.refresh().await?;
        Ok(())
    }

    fn after_repository_transfer(&mut self) {
        let transferred: Vec<ThingId> = self.selected_dst.keys().copied().collect();
        for id in &transferred {
            self.dst_map_results.remove(id);
        }
        self.selected_dst.clear();
        self.reload_store();
        if let Err(e) = self.load_mapping() {
            tracing::warn!("Mapping reload after transfer failed: {}", e);
        }
    }

    fn reload_store(&mut self) {
        self.store = MappingCorrespondenceStore::from_repository(
            self.repository.as_ref(),
            &self.config.tool_name,
            &self.config.mapping_configuration_name,
        );
    }

    // ---------------------------------------------------------------
    // Transfer to engine
    // ---------------------------------------------------------------

    /// Write the selected rows' values into the engine
    ///
    /// # Errors
    /// Without an open session, or when a value cannot be laid out or
    /// written. Selections and pending audit entries are dropped on failure.
    #[tracing::instrument(skip(self))]
    pub async fn transfer_to_engine(&mut self) -> Result<TransferOutcome, DstError> {
        if self.selected_hub.is_empty() {
            return Ok(TransferOutcome::NothingSelected);
        }
        self.require_open()?;

        self.session.begin_busy();
        let result = self.write_to_engine().await;
        self.session.end_busy();

        match result {
            Ok(outcome) => {
                if let Err(e) = self.load_mapping() {
                    tracing::warn!("Mapping reload after transfer failed: {}", e);
                }
                tracing::info!("Transfer to engine completed: {:?}", outcome);
                Ok(outcome)
            }
            Err(e) => {
                self.selected_hub.clear();
                self.audit.discard_pending();
                tracing::error!("Transfer to engine failed: {}", e);
                Err(e)
            }
        }
    }

    async fn write_to_engine(&mut self) -> Result<TransferOutcome, DstError> {
        let selected: Vec<(ThingId, ParameterToVariableMapping)> =
            self.selected_hub.iter().map(|(k, v)| (*k, v.clone())).collect();
        let mut transferred = 0;
        for (parameter_id, row) in selected {
            let (Some(parameter), Some(variable)) = (row.parameter(), row.variable()) else {
                continue;
            };

            let written = if parameter.parameter_type.is_structured() {
                self.assign_array(&row, variable).await?
            } else {
                self.assign_scalar(&row, variable).await?
            };

            self.audit.record(
                MappingDirection::HubToDst,
                &variable.name,
                AuditAction::ValueTransferred,
                format!("{} -> {}", parameter.name(), written),
            );
            self.store.add_parameter_mapping(&row);
            self.selected_hub.remove(&parameter_id);
            transferred += 1;
        }

        let iteration = self
            .repository
            .open_iteration()
            .ok_or(RepositoryError::NoOpenIteration)?;
        let mut transaction = Transaction::new(iteration.id);
        self.store.persist(&mut transaction, &iteration)?;
        let things_written = transaction.len();
        self.repository.write(transaction).await?;
        self.audit.commit();
        self.repository.refresh().await?;

        Ok(TransferOutcome::Completed {
            direction: MappingDirection::HubToDst,
            things_written,
            values_transferred: transferred,
        })
    }

    /// Collection currently holding `name`; new variables go to the workspace
    fn collection_for(&mut self, name: &str) -> &mut VariableMap {
        if !self.workspace_variables.contains_key(&name.to_string())
            && self.input_variables.contains_key(&name.to_string())
        {
            &mut self.input_variables
        } else {
            &mut self.workspace_variables
        }
    }

    async fn assign_array(
        &mut self,
        row: &ParameterToVariableMapping,
        variable: &WorkspaceVariable,
    ) -> Result<Value, DstError> {
        let Some(parameter) = row.parameter() else {
            return Err(DstError::Internal("row without parameter".into()));
        };
        let array = self.reconstructor.to_workspace_array(
            &parameter.parameter_type,
            row.values(),
            row.row_column(),
            row.assignments(),
        )?;

        let collection = self.collection_for(&variable.name);
        let mut root = collection
            .get(&variable.name)
            .cloned()
            .unwrap_or_else(|| variable.clone());
        root.set_value(Value::Array(array));
        let fresh = root.decompose();
        merge_tree(collection, &fresh);

        self.engine.put_variable(&root).await?;
        Ok(root.engine_value())
    }

    async fn assign_scalar(
        &mut self,
        row: &ParameterToVariableMapping,
        variable: &WorkspaceVariable,
    ) -> Result<Value, DstError> {
        let value = Value::parse_repository_value(row.value().unwrap_or(&self.config.placeholder_value));
        let collection = self.collection_for(&variable.name);
        let mut target = collection
            .get(&variable.name)
            .cloned()
            .unwrap_or_else(|| variable.clone());
        target.set_value(value.clone());
        if target.is_child() {
            collection.upsert(target.name.clone(), target.clone());
        } else {
            // a root that held an array loses its cells
            let fresh = target.decompose();
            merge_tree(collection, &fresh);
        }

        let top = propagate_to_root(collection, &target);
        self.engine.put_variable(&top).await?;
        Ok(value)
    }

    // ---------------------------------------------------------------
    // Observation
    // ---------------------------------------------------------------

    #[inline]
    #[must_use]
    pub fn config(&self) -> &DstConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.session.is_busy()
    }

    #[inline]
    #[must_use]
    pub fn is_session_open(&self) -> bool {
        self.session.is_session_open()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe_state()
    }

    pub fn subscribe_busy(&self) -> watch::Receiver<bool> {
        self.session.subscribe_busy()
    }

    pub fn subscribe_session_open(&self) -> watch::Receiver<bool> {
        self.session.subscribe_session_open()
    }

    #[inline]
    #[must_use]
    pub fn loaded_script(&self) -> Option<&LoadedScript> {
        self.script.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    #[inline]
    #[must_use]
    pub fn correspondences(&self) -> &MappingCorrespondenceStore {
        &self.store
    }

    /// Script input variable by name
    #[must_use]
    pub fn input_variable(&self, name: &str) -> Option<&WorkspaceVariable> {
        self.input_variables.get(&name.to_string())
    }

    /// Engine variable by name
    #[must_use]
    pub fn workspace_variable(&self, name: &str) -> Option<&WorkspaceVariable> {
        self.workspace_variables.get(&name.to_string())
    }

    #[must_use]
    pub fn input_variables(&self) -> Vec<WorkspaceVariable> {
        self.input_variables.values()
    }

    #[must_use]
    pub fn workspace_variables(&self) -> Vec<WorkspaceVariable> {
        self.workspace_variables.values()
    }

    #[must_use]
    pub fn dst_map_results(&self) -> Vec<MappedElement> {
        self.dst_map_results.values()
    }

    #[must_use]
    pub fn hub_map_results(&self) -> Vec<ParameterToVariableMapping> {
        self.hub_map_results.values()
    }

    /// Time-grouped view of a mapped sampled-function parameter
    ///
    /// # Errors
    /// Returns error if the row has no time axis assigned
    pub fn time_tagged_values(&self, parameter_id: ThingId) -> Result<Option<TimeTaggedValues>, DstError> {
        match self.hub_map_results.get(&parameter_id) {
            Some(row) => Ok(row.time_tagged()?),
            None => Ok(None),
        }
    }

    #[must_use]
    pub fn selected_for_transfer_to_repository(&self) -> Vec<MappedElement> {
        self.selected_dst.values()
    }

    #[must_use]
    pub fn selected_for_transfer_to_engine(&self) -> Vec<ParameterToVariableMapping> {
        self.selected_hub.values()
    }

    pub fn subscribe_input_variables(&self) -> broadcast::Receiver<CollectionChange<String>> {
        self.input_variables.subscribe()
    }

    pub fn subscribe_workspace_variables(&self) -> broadcast::Receiver<CollectionChange<String>> {
        self.workspace_variables.subscribe()
    }

    pub fn subscribe_dst_map_results(&self) -> broadcast::Receiver<CollectionChange<ThingId>> {
        self.dst_map_results.subscribe()
    }

    pub fn subscribe_hub_map_results(&self) -> broadcast::Receiver<CollectionChange<ThingId>> {
        self.hub_map_results.subscribe()
    }

    pub fn subscribe_selected_for_transfer_to_repository(&self) -> broadcast::Receiver<CollectionChange<ThingId>> {
        self.selected_dst.subscribe()
    }

    pub fn subscribe_selected_for_transfer_to_engine(&self) -> broadcast::Receiver<CollectionChange<ThingId>> {
        self.selected_hub.subscribe()
    }
}

/// Names from the engine's variable listing
///
/// Blank lines and header lines ending in `:` are skipped; a line may carry
/// several whitespace-separated names.
fn parse_variable_names(listing: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.ends_with(':'))
        .flat_map(str::split_whitespace)
        .filter(|name| name.chars().next().is_some_and(char::is_alphabetic))
        .filter(|name| seen.insert((*name).to_string()))
        .map(str::to_string)
        .collect()
}

/// Name of the top-level variable a (possibly decomposed) name belongs to
fn root_name(name: &str) -> &str {
    name.split('[').next().unwrap_or(name)
}

/// Apply a reconciliation of `fresh` (root first) to a collection
fn merge_tree(collection: &mut VariableMap, fresh: &[WorkspaceVariable]) -> ReconciliationPlan {
    let plan = plan_reconciliation(collection.iter().map(|(_, v)| v), fresh);
    for name in &plan.removed {
        collection.remove(name);
    }
    for variable in plan.updated.iter().chain(plan.added.iter()) {
        collection.upsert(variable.name.clone(), variable.clone());
    }
    plan
}

/// Recompose every ancestor of `changed` and return the top-level variable
fn propagate_to_root(collection: &mut VariableMap, changed: &WorkspaceVariable) -> WorkspaceVariable {
    let mut current = changed.clone();
    while let Some(parent_name) = current.parent_name.clone() {
        let Some(mut parent) = collection.get(&parent_name).cloned() else {
            break;
        };
        let descendants = collection.values();
        if let Some(Value::Array(array)) = recompose(&parent, &descendants) {
            parent.array_value = Some(array);
            collection.upsert(parent_name, parent.clone());
        }
        current = parent;
    }
    current
}

async fn remove_copy(script: &LoadedScript) {
    if !script.owns_copy() {
        return;
    }
    match tokio::fs::remove_file(&script.working_copy).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Could not delete {}: {}", script.working_copy.display(), e),
    }
}

fn values_detail(parameter: &Parameter) -> String {
    parameter
        .value_sets
        .iter()
        .map(|vs| vs.actual_value().join(", "))
        .collect::<Vec<_>>()
        .join(" | ")
}
