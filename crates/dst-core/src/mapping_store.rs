//! Mapping correspondence store
//!
//! Working copy of the tool's external identifier map. Each correspondence
//! links a repository thing to a variable identifier for one direction; the
//! external id is the JSON form of [`ExternalIdentifier`].
//!
//! Keys:
//! - parameter entries: `(thing, direction)`, last write wins
//! - context entries (element, usage, option, state, type, scale):
//!   `(thing, direction, identifier)`
//!
//! Entries whose thing no longer resolves are skipped when loading and pruned
//! when persisting.

use crate::error::DstError;
use crate::types::{MappingDirection, ParameterToVariableMapping};
use dst_repository::{
    ExternalIdentifierMap, IdCorrespondence, Iteration, Repository, Thing, ThingId, Transaction,
};
use dst_workspace::{IndexAssignment, RowColumnSelection, WorkspaceVariable};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// What the internal thing is to the variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorrespondenceKind {
    ElementDefinition,
    ElementUsage,
    Parameter,
    Option,
    State,
    ParameterType,
    Scale,
}

/// Tool-side half of a correspondence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentifier {
    /// Variable identifier (`{script}-{name}`)
    pub identifier: String,
    pub direction: MappingDirection,
    pub kind: CorrespondenceKind,
    /// Sampled function axis, for structured parameters and types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_column: Option<RowColumnSelection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assignments: Vec<IndexAssignment>,
}

impl ExternalIdentifier {
    #[must_use]
    pub fn new(identifier: impl Into<String>, direction: MappingDirection, kind: CorrespondenceKind) -> Self {
        Self {
            identifier: identifier.into(),
            direction,
            kind,
            row_column: None,
            assignments: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_assignments(mut self, row_column: RowColumnSelection, assignments: Vec<IndexAssignment>) -> Self {
        self.row_column = Some(row_column);
        self.assignments = assignments;
        self
    }

    fn is_parameter(&self) -> bool {
        self.kind == CorrespondenceKind::Parameter
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CorrespondenceKey {
    thing: ThingId,
    direction: MappingDirection,
    /// `None` for parameter entries
    identifier: Option<String>,
}

impl CorrespondenceKey {
    fn of(thing: ThingId, external: &ExternalIdentifier) -> Self {
        Self {
            thing,
            direction: external.direction,
            identifier: (!external.is_parameter()).then(|| external.identifier.clone()),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredCorrespondence {
    /// Id of the persisted correspondence, kept across saves
    id: ThingId,
    external: ExternalIdentifier,
}

/// In-memory correspondence table for one mapping configuration
#[derive(Debug, Clone)]
pub struct MappingCorrespondenceStore {
    map: ExternalIdentifierMap,
    entries: IndexMap<CorrespondenceKey, StoredCorrespondence>,
}

impl MappingCorrespondenceStore {
    /// Load the named configuration of a tool, or start an empty one
    #[must_use]
    pub fn from_repository(repository: &dyn Repository, tool_name: &str, configuration_name: &str) -> Self {
        let map = repository
            .available_external_identifier_maps(tool_name)
            .into_iter()
            .find(|m| m.name == configuration_name)
            .unwrap_or_else(|| {
                debug!(tool_name, configuration_name, "starting new mapping configuration");
                ExternalIdentifierMap::new(configuration_name, tool_name)
            });
        Self::from_map(map)
    }

    /// Parse the correspondences of an existing map
    #[must_use]
    pub fn from_map(map: ExternalIdentifierMap) -> Self {
        let mut entries = IndexMap::new();
        for correspondence in &map.correspondences {
            match serde_json::from_str::<ExternalIdentifier>(&correspondence.external_id) {
                Ok(external) => {
                    entries.insert(
                        CorrespondenceKey::of(correspondence.internal_thing, &external),
                        StoredCorrespondence {
                            id: correspondence.id,
                            external,
                        },
                    );
                }
                Err(e) => {
                    warn!(correspondence = %correspondence.id, error = %e, "dropping unreadable correspondence");
                }
            }
        }
        Self { map, entries }
    }

    /// Id of the backing external identifier map
    #[inline]
    #[must_use]
    pub fn map_id(&self) -> ThingId {
        self.map.id
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries as `(internal thing, external identifier)`
    pub fn entries(&self) -> impl Iterator<Item = (ThingId, &ExternalIdentifier)> {
        self.entries.iter().map(|(k, v)| (k.thing, &v.external))
    }

    /// Entries for one direction
    pub fn entries_for(&self, direction: MappingDirection) -> impl Iterator<Item = (ThingId, &ExternalIdentifier)> {
        self.entries().filter(move |(_, e)| e.direction == direction)
    }

    /// Add or overwrite one entry
    ///
    /// A parameter entry also replaces whatever parameter the same variable
    /// was mapped to in that direction.
    pub fn add_correspondence(&mut self, thing: ThingId, external: ExternalIdentifier) {
        if external.is_parameter() {
            self.entries.retain(|k, v| {
                k.thing == thing
                    || !(v.external.is_parameter()
                        && v.external.direction == external.direction
                        && v.external.identifier == external.identifier)
            });
        }
        let key = CorrespondenceKey::of(thing, &external);
        let id = self.entries.get(&key).map_or_else(ThingId::new, |stored| stored.id);
        self.entries.insert(key, StoredCorrespondence { id, external });
    }

    /// Drop every entry of a variable in one direction
    pub fn remove_variable(&mut self, identifier: &str, direction: MappingDirection) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, v| !(v.external.identifier == identifier && v.external.direction == direction));
        before - self.entries.len()
    }

    /// Record every selector of a mapped variable
    ///
    /// Previous entries of the variable for `direction` are replaced.
    pub fn add_variable_correspondences(&mut self, variable: &WorkspaceVariable, direction: MappingDirection) {
        let identifier = variable.identifier();
        self.remove_variable(&identifier, direction);
        let entry = |kind| ExternalIdentifier::new(identifier.clone(), direction, kind);

        if let Some(element) = &variable.selected_element_definition {
            self.add_correspondence(element.id, entry(CorrespondenceKind::ElementDefinition));
        }
        for usage in &variable.selected_element_usages {
            self.add_correspondence(usage.id, entry(CorrespondenceKind::ElementUsage));
        }

        let structured = variable
            .target_parameter_type()
            .is_some_and(dst_repository::ParameterType::is_structured);
        let with_axis = |external: ExternalIdentifier| {
            if structured {
                external.with_assignments(variable.row_column_selection, variable.index_assignments.clone())
            } else {
                external
            }
        };
        if let Some(parameter) = &variable.selected_parameter {
            self.add_correspondence(parameter.id, with_axis(entry(CorrespondenceKind::Parameter)));
        } else if let Some(parameter_type) = &variable.selected_parameter_type {
            self.add_correspondence(parameter_type.id, with_axis(entry(CorrespondenceKind::ParameterType)));
        }

        if let Some(scale) = &variable.selected_scale {
            self.add_correspondence(scale.id, entry(CorrespondenceKind::Scale));
        }
        if let Some(option) = &variable.selected_option {
            self.add_correspondence(option.id, entry(CorrespondenceKind::Option));
        }
        if let Some(state) = &variable.selected_state {
            self.add_correspondence(state.id, entry(CorrespondenceKind::State));
        }
    }

    /// Record a repository→engine row
    pub fn add_parameter_mapping(&mut self, row: &ParameterToVariableMapping) {
        let (Some(parameter), Some(variable)) = (row.parameter(), row.variable()) else {
            return;
        };
        let identifier = variable.identifier();
        let direction = MappingDirection::HubToDst;
        self.remove_variable(&identifier, direction);

        let mut external = ExternalIdentifier::new(identifier.clone(), direction, CorrespondenceKind::Parameter);
        if parameter.parameter_type.is_structured() {
            external = external.with_assignments(row.row_column(), row.assignments().to_vec());
        }
        self.add_correspondence(parameter.id, external);
        if let Some(option) = row.option() {
            self.add_correspondence(
                option.id,
                ExternalIdentifier::new(identifier.clone(), direction, CorrespondenceKind::Option),
            );
        }
        if let Some(state) = row.state() {
            self.add_correspondence(
                state.id,
                ExternalIdentifier::new(identifier, direction, CorrespondenceKind::State),
            );
        }
    }

    /// Re-apply engine→repository correspondences to candidate variables
    ///
    /// Returns how many selectors were applied.
    pub fn load_engine_to_repository(&self, variables: &mut [WorkspaceVariable], repository: &dyn Repository) -> usize {
        let mut applied = 0;
        for (thing_id, external) in self.entries_for(MappingDirection::DstToHub) {
            let Some(variable) = variables.iter_mut().find(|v| v.identifier() == external.identifier) else {
                debug!(identifier = %external.identifier, "no candidate variable for correspondence");
                continue;
            };
            let Some(thing) = repository.get_thing_by_id(thing_id) else {
                warn!(thing = %thing_id, identifier = %external.identifier, "skipping stale correspondence");
                continue;
            };

            match thing {
                Thing::ElementDefinition(element) => variable.select_element_definition(Some(element)),
                Thing::ElementUsage(usage) => variable.add_element_usage(usage),
                Thing::Parameter(parameter) => {
                    variable.select_parameter(Some(parameter));
                    apply_axis(variable, external);
                }
                Thing::ParameterType(parameter_type) => {
                    variable.select_parameter_type(Some(parameter_type));
                    apply_axis(variable, external);
                }
                Thing::MeasurementScale(scale) => variable.select_scale(Some(scale)),
                Thing::Option(option) => variable.select_option(Some(option)),
                Thing::ActualFiniteState(state) => variable.select_state(Some(state)),
                other => {
                    debug!(kind = ?other.class_kind(), "correspondence target is not a selector");
                    continue;
                }
            }
            applied += 1;
        }
        applied
    }

    /// Rebuild repository→engine rows against the current variables
    #[must_use]
    pub fn load_repository_to_engine(
        &self,
        variables: &[WorkspaceVariable],
        repository: &dyn Repository,
    ) -> Vec<ParameterToVariableMapping> {
        let iteration = repository.open_iteration();
        let mut rows = Vec::new();

        for (thing_id, external) in self.entries_for(MappingDirection::HubToDst) {
            if !external.is_parameter() {
                continue;
            }
            let Some(Thing::Parameter(parameter)) = repository.get_thing_by_id(thing_id) else {
                warn!(thing = %thing_id, identifier = %external.identifier, "skipping stale correspondence");
                continue;
            };
            let Some(variable) = variables.iter().find(|v| v.identifier() == external.identifier) else {
                debug!(identifier = %external.identifier, "no workspace variable for correspondence");
                continue;
            };

            let mut row = ParameterToVariableMapping::between(parameter, variable.clone());
            if let Some(owner) = iteration.as_ref().and_then(|i| i.parameter_owner(thing_id)) {
                row = row.with_element_name(owner.name.clone());
            }
            for (context_id, context) in self.entries_for(MappingDirection::HubToDst) {
                if context.identifier != external.identifier {
                    continue;
                }
                match (context.kind, repository.get_thing_by_id(context_id)) {
                    (CorrespondenceKind::Option, Some(Thing::Option(option))) => row.set_option(Some(option)),
                    (CorrespondenceKind::State, Some(Thing::ActualFiniteState(state))) => row.set_state(Some(state)),
                    (CorrespondenceKind::Option | CorrespondenceKind::State, None) => {
                        warn!(thing = %context_id, "skipping stale correspondence");
                    }
                    _ => {}
                }
            }
            if let Some(row_column) = external.row_column {
                row.set_assignments(row_column, external.assignments.clone());
            }
            rows.push(row);
        }
        rows
    }

    /// Write the table into a transaction
    ///
    /// Entries whose thing is neither in `iteration` nor registered in
    /// `transaction` are pruned first.
    ///
    /// # Errors
    /// Returns error if an entry cannot be encoded
    pub fn persist(&mut self, transaction: &mut Transaction, iteration: &Iteration) -> Result<(), DstError> {
        let before = self.entries.len();
        self.entries
            .retain(|k, _| iteration.contains(k.thing) || transaction.contains(k.thing));
        let pruned = before - self.entries.len();
        if pruned > 0 {
            warn!(pruned, "pruned stale correspondences");
        }

        let mut map = self.map.clone();
        map.correspondences = self
            .entries
            .iter()
            .map(|(key, stored)| -> Result<IdCorrespondence, DstError> {
                Ok(IdCorrespondence {
                    id: stored.id,
                    internal_thing: key.thing,
                    external_id: serde_json::to_string(&stored.external)?,
                })
            })
            .collect::<Result<_, _>>()?;

        debug!(map = %map.name, correspondences = map.correspondences.len(), "persisting mapping configuration");
        self.map = map.clone();
        transaction.create_or_update(Thing::ExternalIdentifierMap(map), iteration);
        Ok(())
    }
}

fn apply_axis(variable: &mut WorkspaceVariable, external: &ExternalIdentifier) {
    if let Some(row_column) = external.row_column {
        variable.set_assignments(row_column, external.assignments.clone());
    }
}
