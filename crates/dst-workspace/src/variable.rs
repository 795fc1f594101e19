//! Workspace variables and their decomposition
//!
//! An array-valued variable is decomposed into one child per cell, named
//! `"{name}[i,j]"` in row-major order. The parent keeps the unflattened array
//! in `array_value` and shows a shape placeholder as its `actual_value`.
//!
//! # Invariants
//! - decomposition is deterministic: same shape, same `(name, index)` pairs,
//!   same order
//! - decomposing a non-array (including a placeholder) yields `[self]`

use crate::selection::{IndexAssignment, MappingValidity, RowColumnSelection, TypeCompatibility};
use crate::value::{ArrayValue, Value};
use dst_repository::{
    ActualFiniteState, DomainOption, ElementDefinition, ElementUsage, MeasurementScale, Parameter,
    ParameterType,
};
use std::collections::HashSet;

/// Named value held by the numeric engine, plus its mapping selectors
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceVariable {
    /// Name, unique within a decomposition tree
    pub name: String,
    /// Current value (placeholder once decomposed)
    pub actual_value: Value,
    /// Snapshot taken at creation
    pub initial_value: Value,
    /// Unflattened array retained after decomposition
    pub array_value: Option<ArrayValue>,
    /// Set when this variable is a decomposed cell
    pub parent_name: Option<String>,
    /// Cell index within the parent
    pub index: Option<[usize; 2]>,
    /// Script the variable was discovered in
    pub script_name: Option<String>,

    pub selected_element_definition: Option<ElementDefinition>,
    pub selected_element_usages: Vec<ElementUsage>,
    pub selected_parameter: Option<Parameter>,
    pub selected_parameter_type: Option<ParameterType>,
    pub selected_scale: Option<MeasurementScale>,
    pub selected_option: Option<DomainOption>,
    pub selected_state: Option<ActualFiniteState>,
    pub row_column_selection: RowColumnSelection,
    pub index_assignments: Vec<IndexAssignment>,

    validity: MappingValidity,
}

impl WorkspaceVariable {
    /// Create fresh variable
    #[must_use]
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            initial_value: value.clone(),
            actual_value: value,
            array_value: None,
            parent_name: None,
            index: None,
            script_name: None,
            selected_element_definition: None,
            selected_element_usages: Vec::new(),
            selected_parameter: None,
            selected_parameter_type: None,
            selected_scale: None,
            selected_option: None,
            selected_state: None,
            row_column_selection: RowColumnSelection::default(),
            index_assignments: Vec::new(),
            validity: MappingValidity::NotEvaluated,
        }
    }

    /// With script name (drives the identifier)
    #[inline]
    #[must_use]
    pub fn with_script(mut self, script_name: impl Into<String>) -> Self {
        self.script_name = Some(script_name.into());
        self
    }

    /// Stable identifier: `{scriptName}-{name}`, or the name when no script
    /// is loaded
    #[must_use]
    pub fn identifier(&self) -> String {
        match &self.script_name {
            Some(script) => format!("{script}-{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Whether this variable is a decomposed cell
    #[inline]
    #[must_use]
    pub fn is_child(&self) -> bool {
        self.parent_name.is_some()
    }

    /// The array this variable holds, decomposed or not
    #[inline]
    #[must_use]
    pub fn unflattened_array(&self) -> Option<&ArrayValue> {
        self.array_value.as_ref().or_else(|| self.actual_value.as_array())
    }

    /// Value to hand to the engine: the array for decomposed parents
    #[must_use]
    pub fn engine_value(&self) -> Value {
        match (&self.actual_value, &self.array_value) {
            (Value::Placeholder { .. }, Some(array)) => Value::Array(array.clone()),
            (value, _) => value.clone(),
        }
    }

    /// Decompose into scalar leaves
    ///
    /// Returns the parent followed by every descendant in row-major order.
    /// Nested arrays are decomposed recursively. Non-array values return
    /// `[self]` unchanged.
    pub fn decompose(&mut self) -> Vec<WorkspaceVariable> {
        let array = match &self.actual_value {
            Value::Array(array) => array.clone(),
            _ => return vec![self.clone()],
        };

        let mut descendants = Vec::with_capacity(array.len());
        for (i, j, cell) in array.iter_cells() {
            let mut child = WorkspaceVariable::new(format!("{}[{i},{j}]", self.name), cell.clone());
            child.parent_name = Some(self.name.clone());
            child.index = Some([i, j]);
            child.script_name.clone_from(&self.script_name);
            descendants.extend(child.decompose());
        }

        self.actual_value = Value::placeholder_for(&array);
        self.array_value = Some(array);

        let mut flattened = Vec::with_capacity(descendants.len() + 1);
        flattened.push(self.clone());
        flattened.extend(descendants);
        flattened
    }

    /// Replace the value, invalidating the mapping
    pub fn set_value(&mut self, value: Value) {
        self.actual_value = value;
        self.array_value = None;
        self.validity = MappingValidity::NotEvaluated;
    }

    pub fn select_element_definition(&mut self, element: Option<ElementDefinition>) {
        self.selected_element_definition = element;
        self.validity = MappingValidity::NotEvaluated;
    }

    /// Add usage unless already selected
    pub fn add_element_usage(&mut self, usage: ElementUsage) {
        if !self.selected_element_usages.iter().any(|u| u.id == usage.id) {
            self.selected_element_usages.push(usage);
            self.validity = MappingValidity::NotEvaluated;
        }
    }

    pub fn select_parameter(&mut self, parameter: Option<Parameter>) {
        self.selected_parameter = parameter;
        self.validity = MappingValidity::NotEvaluated;
    }

    pub fn select_parameter_type(&mut self, parameter_type: Option<ParameterType>) {
        self.selected_parameter_type = parameter_type;
        self.validity = MappingValidity::NotEvaluated;
    }

    pub fn select_scale(&mut self, scale: Option<MeasurementScale>) {
        self.selected_scale = scale;
        self.validity = MappingValidity::NotEvaluated;
    }

    pub fn select_option(&mut self, option: Option<DomainOption>) {
        self.selected_option = option;
        self.validity = MappingValidity::NotEvaluated;
    }

    pub fn select_state(&mut self, state: Option<ActualFiniteState>) {
        self.selected_state = state;
        self.validity = MappingValidity::NotEvaluated;
    }

    /// Set sampled function axis and component assignments
    pub fn set_assignments(&mut self, selection: RowColumnSelection, assignments: Vec<IndexAssignment>) {
        self.row_column_selection = selection;
        self.index_assignments = assignments;
        self.validity = MappingValidity::NotEvaluated;
    }

    /// Drop every mapping selector
    pub fn clear_selection(&mut self) {
        self.selected_element_definition = None;
        self.selected_element_usages.clear();
        self.selected_parameter = None;
        self.selected_parameter_type = None;
        self.selected_scale = None;
        self.selected_option = None;
        self.selected_state = None;
        self.row_column_selection = RowColumnSelection::default();
        self.index_assignments.clear();
        self.validity = MappingValidity::NotEvaluated;
    }

    /// Last evaluated validity
    #[inline]
    #[must_use]
    pub fn mapping_validity(&self) -> MappingValidity {
        self.validity
    }

    /// Parameter type the mapping targets
    #[must_use]
    pub fn target_parameter_type(&self) -> Option<&ParameterType> {
        self.selected_parameter
            .as_ref()
            .map(|p| &p.parameter_type)
            .or(self.selected_parameter_type.as_ref())
    }

    /// Scale the mapping targets: explicit, the parameter's, then the type's
    #[must_use]
    pub fn effective_scale(&self) -> Option<&MeasurementScale> {
        self.selected_scale
            .as_ref()
            .or_else(|| self.selected_parameter.as_ref().and_then(|p| p.scale.as_ref()))
            .or_else(|| self.target_parameter_type().and_then(ParameterType::default_scale))
    }

    /// Element usages need both a definition and a parameter
    #[must_use]
    pub fn usage_prerequisites_met(&self) -> bool {
        self.selected_element_usages.is_empty()
            || (self.selected_element_definition.is_some() && self.selected_parameter.is_some())
    }

    /// Evaluate and record mapping validity
    ///
    /// True iff a parameter or parameter type is selected, element-usage
    /// prerequisites hold, and `checker` accepts the type pairing.
    pub fn is_valid<C: TypeCompatibility + ?Sized>(&mut self, checker: &C) -> bool {
        let valid = match self.target_parameter_type() {
            None => false,
            Some(parameter_type) => {
                self.usage_prerequisites_met()
                    && checker.is_compatible(self, parameter_type, self.effective_scale())
            }
        };
        self.validity = MappingValidity::from(valid);
        valid
    }
}

/// Rebuild a decomposed parent's value from its descendants
///
/// Returns `None` when a cell is missing or an index is absent.
#[must_use]
pub fn recompose(parent: &WorkspaceVariable, descendants: &[WorkspaceVariable]) -> Option<Value> {
    let children: Vec<&WorkspaceVariable> = descendants
        .iter()
        .filter(|v| v.parent_name.as_deref() == Some(parent.name.as_str()))
        .collect();

    if children.is_empty() {
        return match (&parent.actual_value, &parent.array_value) {
            (Value::Placeholder { .. }, Some(array)) => Some(Value::Array(array.clone())),
            (Value::Placeholder { .. }, None) => None,
            (value, _) => Some(value.clone()),
        };
    }

    let rows = children.iter().filter_map(|c| c.index).map(|[i, _]| i + 1).max()?;
    let cols = children.iter().filter_map(|c| c.index).map(|[_, j]| j + 1).max()?;

    let mut cells: Vec<Option<Value>> = vec![None; rows * cols];
    for child in children {
        let [i, j] = child.index?;
        cells[i * cols + j] = Some(recompose(child, descendants)?);
    }

    let cells: Vec<Value> = cells.into_iter().collect::<Option<_>>()?;
    ArrayValue::new(rows, cols, cells).ok().map(Value::Array)
}

/// What merging a re-read variable into an existing decomposition changes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciliationPlan {
    /// Variables not present before
    pub added: Vec<WorkspaceVariable>,
    /// Existing variables with their new value; selectors and identity kept
    pub updated: Vec<WorkspaceVariable>,
    /// Names of existing descendants absent from the new array
    pub removed: Vec<String>,
}

impl ReconciliationPlan {
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

fn belongs_to_tree(name: &str, root: &str) -> bool {
    name == root
        || name
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('['))
}

/// Plan how to merge `fresh` (a decomposition, root first) into `existing`
///
/// Unseen variables are added, known ones only get their value updated, and
/// descendants missing from the new snapshot are pruned.
#[must_use]
pub fn plan_reconciliation<'a>(
    existing: impl IntoIterator<Item = &'a WorkspaceVariable>,
    fresh: &[WorkspaceVariable],
) -> ReconciliationPlan {
    let Some(root) = fresh.first() else {
        return ReconciliationPlan::default();
    };

    let tree: Vec<&WorkspaceVariable> = existing
        .into_iter()
        .filter(|v| belongs_to_tree(&v.name, &root.name))
        .collect();
    let fresh_names: HashSet<&str> = fresh.iter().map(|v| v.name.as_str()).collect();

    let mut plan = ReconciliationPlan {
        removed: tree
            .iter()
            .filter(|v| !fresh_names.contains(v.name.as_str()))
            .map(|v| v.name.clone())
            .collect(),
        ..ReconciliationPlan::default()
    };

    for incoming in fresh {
        match tree.iter().find(|v| v.name == incoming.name) {
            Some(known) => {
                if known.engine_value() != incoming.engine_value() || known.actual_value != incoming.actual_value {
                    let mut merged = (*known).clone();
                    merged.actual_value = incoming.actual_value.clone();
                    merged.array_value.clone_from(&incoming.array_value);
                    merged.index = incoming.index;
                    plan.updated.push(merged);
                }
            }
            None => plan.added.push(incoming.clone()),
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn matrix(rows: &[Vec<f64>]) -> Value {
        Value::Array(ArrayValue::from_numbers(rows).unwrap())
    }

    #[test]
    fn scalar_decomposes_to_itself() {
        let mut v = WorkspaceVariable::new("x", Value::Number(1.0));
        let out = v.decompose();
        assert_eq!(out, vec![v.clone()]);
        assert!(out[0].parent_name.is_none());
    }

    #[test]
    fn array_decomposes_row_major_with_placeholder_parent() {
        let mut v = WorkspaceVariable::new("m", matrix(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]))
            .with_script("model");
        let out = v.decompose();

        let names: Vec<&str> = out.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["m", "m[0,0]", "m[0,1]", "m[0,2]", "m[1,0]", "m[1,1]", "m[1,2]"]
        );
        assert_eq!(out[0].actual_value.to_string(), "[2x3] matrix of double");
        assert_eq!(out[4].index, Some([1, 0]));
        assert_eq!(out[4].parent_name.as_deref(), Some("m"));
        assert_eq!(out[4].actual_value, Value::Number(4.0));
        assert_eq!(out[4].identifier(), "model-m[1,0]");
        assert!(v.actual_value.is_placeholder());
        assert!(v.array_value.is_some());
    }

    #[test]
    fn redecomposing_a_placeholder_is_a_no_op() {
        let mut v = WorkspaceVariable::new("m", matrix(&[vec![1.0, 2.0]]));
        let first = v.decompose();
        let second = v.decompose();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn nested_arrays_decompose_recursively_and_recompose() {
        let inner = matrix(&[vec![7.0, 8.0]]);
        let outer = Value::Array(
            ArrayValue::from_rows(vec![vec![Value::Number(1.0), inner]]).unwrap(),
        );
        let mut v = WorkspaceVariable::new("c", outer.clone());
        let out = v.decompose();

        let names: Vec<&str> = out.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["c", "c[0,0]", "c[0,1]", "c[0,1][0,0]", "c[0,1][0,1]"]);
        assert_eq!(recompose(&out[0], &out[1..]), Some(outer));
    }

    #[test]
    fn recompose_fails_on_missing_cell() {
        let mut v = WorkspaceVariable::new("m", matrix(&[vec![1.0, 2.0], vec![3.0, 4.0]]));
        let mut out = v.decompose();
        out.remove(2);
        let mut parent = out[0].clone();
        parent.array_value = None;
        assert_eq!(recompose(&parent, &out[1..]), None);
    }

    #[test]
    fn engine_value_unwraps_placeholder() {
        let value = matrix(&[vec![1.0, 2.0]]);
        let mut v = WorkspaceVariable::new("m", value.clone());
        v.decompose();
        assert_eq!(v.engine_value(), value);
    }

    #[test]
    fn reconciliation_prunes_adds_and_updates() {
        let mut old = WorkspaceVariable::new("m", matrix(&[vec![1.0, 2.0], vec![3.0, 4.0]]));
        let mut existing = old.decompose();
        existing[1].selected_scale = Some(MeasurementScale::real("metre", "m"));
        existing.push(WorkspaceVariable::new("other", Value::Number(0.0)));

        let mut new = WorkspaceVariable::new("m", matrix(&[vec![9.0, 2.0, 5.0]]));
        let fresh = new.decompose();

        let plan = plan_reconciliation(&existing, &fresh);

        let mut removed = plan.removed.clone();
        removed.sort();
        assert_eq!(removed, vec!["m[1,0]".to_string(), "m[1,1]".to_string()]);

        let added: Vec<&str> = plan.added.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(added, vec!["m[0,2]"]);

        let updated: Vec<&str> = plan.updated.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(updated, vec!["m", "m[0,0]"]);
        assert!(plan.updated[1].selected_scale.is_some());
        assert_eq!(plan.updated[1].actual_value, Value::Number(9.0));
    }

    #[test]
    fn reconciliation_of_unchanged_value_is_empty() {
        let mut a = WorkspaceVariable::new("m", matrix(&[vec![1.0]]));
        let existing = a.decompose();
        let mut b = WorkspaceVariable::new("m", matrix(&[vec![1.0]]));
        let fresh = b.decompose();
        assert!(plan_reconciliation(&existing, &fresh).is_empty());
    }

    #[test]
    fn tree_membership_does_not_match_prefix_names() {
        assert!(belongs_to_tree("m[0,1]", "m"));
        assert!(belongs_to_tree("m", "m"));
        assert!(!belongs_to_tree("mass", "m"));
    }

    struct AcceptAll;

    impl TypeCompatibility for AcceptAll {
        fn is_compatible(&self, _: &WorkspaceVariable, _: &ParameterType, _: Option<&MeasurementScale>) -> bool {
            true
        }
    }

    #[test]
    fn is_valid_requires_a_target_and_usage_prerequisites() {
        let mut v = WorkspaceVariable::new("x", Value::Number(1.0));
        assert_eq!(v.mapping_validity(), MappingValidity::NotEvaluated);
        assert!(!v.is_valid(&AcceptAll));
        assert_eq!(v.mapping_validity(), MappingValidity::Invalid);

        v.select_parameter_type(Some(ParameterType::new(
            "text",
            "t",
            dst_repository::ParameterTypeKind::Text,
        )));
        assert_eq!(v.mapping_validity(), MappingValidity::NotEvaluated);
        assert!(v.is_valid(&AcceptAll));

        let element = ElementDefinition::new("e", "e");
        v.add_element_usage(ElementUsage::new("u", "u", element.id));
        assert!(!v.is_valid(&AcceptAll));
    }
}
