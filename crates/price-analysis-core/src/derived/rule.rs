use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use super::order::{dependency_order, Node};
use crate::form::{coerce_number, read_number, FieldPath, FormReader, PathTemplate, SetValueOptions};
use crate::stats::Sample;

/// Whether an indexed rule runs once per row or once per column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    /// Row is the unit, columns are context.
    Horizontal,
    /// Column is the unit, rows are context.
    Vertical,
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alignment::Horizontal => f.write_str("horizontal"),
            Alignment::Vertical => f.write_str("vertical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    /// Evaluated once per live record of the tracked collection.
    Indexed(Alignment),
    /// Evaluated once per pass against top-level fields.
    Form,
}

/// The part of the form an evaluator owns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrackedField {
    Collection { array: String, alignment: Alignment },
    Form,
}

impl TrackedField {
    pub fn collection(array: &str, alignment: Alignment) -> Self {
        TrackedField::Collection {
            array: array.to_string(),
            alignment,
        }
    }

    pub fn array(&self) -> Option<&str> {
        match self {
            TrackedField::Collection { array, .. } => Some(array),
            TrackedField::Form => None,
        }
    }
}

impl fmt::Display for TrackedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackedField::Collection { array, alignment } => write!(f, "{array} ({alignment})"),
            TrackedField::Form => f.write_str("form"),
        }
    }
}

/// Read-only values fixed at the start of a pass: the caller's external data plus a
/// snapshot of the watched fields. Never mutated while rules run.
pub struct PassContext<'a, C> {
    external: &'a C,
    watched: HashMap<FieldPath, Value>,
}

impl<'a, C> PassContext<'a, C> {
    pub fn snapshot(external: &'a C, form: &dyn FormReader, watch: &[FieldPath]) -> Self {
        let watched = watch
            .iter()
            .filter_map(|path| form.get_value(path).map(|value| (path.clone(), value)))
            .collect();
        Self { external, watched }
    }

    pub fn external(&self) -> &'a C {
        self.external
    }

    pub fn watched(&self, path: &FieldPath) -> Option<&Value> {
        self.watched.get(path)
    }
}

/// Everything a rule may look at while computing one cell.
pub struct RuleInput<'a, C> {
    pub(crate) form: &'a dyn FormReader,
    pub(crate) context: &'a PassContext<'a, C>,
    pub(crate) array: Option<&'a str>,
    pub(crate) index: usize,
    pub(crate) target: &'a FieldPath,
    pub(crate) current: Option<Value>,
    pub(crate) target_dirty: bool,
}

impl<'a, C> RuleInput<'a, C> {
    /// Live row or column index; `0` for form-scoped rules.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn target(&self) -> &FieldPath {
        self.target
    }

    pub fn current(&self) -> Option<&Value> {
        self.current.as_ref()
    }

    pub fn current_number(&self) -> Option<f64> {
        self.current.as_ref().and_then(coerce_number)
    }

    pub fn target_is_dirty(&self) -> bool {
        self.target_dirty
    }

    pub fn context(&self) -> &'a C {
        self.context.external()
    }

    pub fn watched(&self, path: &FieldPath) -> Option<&Value> {
        self.context.watched(path)
    }

    pub fn value(&self, path: &FieldPath) -> Option<Value> {
        self.form.get_value(path)
    }

    pub fn number(&self, path: &FieldPath) -> f64 {
        self.form.number(path)
    }

    pub fn count(&self, array: &str) -> usize {
        self.form.record_count(array)
    }

    /// Field of the record being evaluated, or a top-level field for form-scoped rules.
    pub fn field(&self, field: &str) -> f64 {
        match self.array {
            Some(array) => self.number(&FieldPath::item(array, self.index, field)),
            None => self.number(&FieldPath::scalar(field)),
        }
    }

    /// Nested entry `position` of the record being evaluated.
    pub fn nested(&self, nested: &str, position: usize, field: &str) -> f64 {
        match self.array {
            Some(array) => self.number(&FieldPath::nested(array, self.index, nested, position, field)),
            None => 0.0,
        }
    }

    /// `Σ array[*].field` over the live records.
    pub fn sum(&self, array: &str, field: &str) -> f64 {
        (0..self.count(array))
            .map(|index| self.number(&FieldPath::item(array, index, field)))
            .sum()
    }

    /// `Σ array[*].nested[position].field` over the live records.
    pub fn sum_nested(&self, array: &str, nested: &str, position: usize, field: &str) -> f64 {
        (0..self.count(array))
            .map(|index| self.number(&FieldPath::nested(array, index, nested, position, field)))
            .sum()
    }

    /// One sample per live record, blanks preserved for the statistics functions.
    pub fn samples(&self, array: &str, field: &str) -> Vec<Sample> {
        (0..self.count(array))
            .map(|index| {
                self.value(&FieldPath::item(array, index, field))
                    .as_ref()
                    .map_or(Sample::Blank, Sample::from)
            })
            .collect()
    }

    /// Coerced top-level field, shorthand used by form-scoped rules.
    pub fn scalar(&self, field: &str) -> f64 {
        self.value(&FieldPath::scalar(field))
            .as_ref()
            .map_or(0.0, read_number)
    }
}

pub type ComputeFn<C> = Box<dyn Fn(&RuleInput<'_, C>) -> Option<f64>>;
pub type WhenFn<C> = Box<dyn Fn(&RuleInput<'_, C>) -> bool>;

/// A derived cell, parameterized by the live index it is bound to at evaluation time.
pub struct RuleTemplate<C> {
    name: String,
    scope: RuleScope,
    target: PathTemplate,
    deps: Vec<PathTemplate>,
    compute: ComputeFn<C>,
    when: Option<WhenFn<C>>,
    normalize: Option<fn(f64) -> f64>,
    options: SetValueOptions,
}

impl<C> RuleTemplate<C> {
    pub fn new<F>(name: impl Into<String>, scope: RuleScope, target: PathTemplate, compute: F) -> Self
    where
        F: Fn(&RuleInput<'_, C>) -> Option<f64> + 'static,
    {
        Self {
            name: name.into(),
            scope,
            target,
            deps: Vec::new(),
            compute: Box::new(compute),
            when: None,
            normalize: None,
            options: SetValueOptions::derived(),
        }
    }

    pub fn deps(mut self, deps: impl IntoIterator<Item = PathTemplate>) -> Self {
        self.deps.extend(deps);
        self
    }

    /// Guard evaluated before `compute`; when it returns false the cell is left untouched.
    pub fn when<F>(mut self, guard: F) -> Self
    where
        F: Fn(&RuleInput<'_, C>) -> bool + 'static,
    {
        self.when = Some(Box::new(guard));
        self
    }

    pub fn normalize(mut self, normalize: fn(f64) -> f64) -> Self {
        self.normalize = Some(normalize);
        self
    }

    pub fn options(mut self, options: SetValueOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> RuleScope {
        self.scope
    }

    pub fn target(&self) -> &PathTemplate {
        &self.target
    }

    pub fn dependencies(&self) -> &[PathTemplate] {
        &self.deps
    }

    pub fn write_options(&self) -> SetValueOptions {
        self.options
    }

    pub(crate) fn should_run(&self, input: &RuleInput<'_, C>) -> bool {
        self.when.as_ref().map_or(true, |guard| guard(input))
    }

    pub(crate) fn compute(&self, input: &RuleInput<'_, C>) -> Option<f64> {
        (self.compute)(input)
    }

    pub(crate) fn apply_normalize(&self, value: f64) -> f64 {
        self.normalize.map_or(value, |normalize| normalize(value))
    }
}

impl<C> fmt::Debug for RuleTemplate<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleTemplate")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("target", &self.target.shape())
            .field("deps", &self.deps.iter().map(PathTemplate::shape).collect::<Vec<_>>())
            .field("guarded", &self.when.is_some())
            .field("options", &self.options)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("rule '{rule}' lists its own target {target} as a dependency")]
    SelfDependency { rule: String, target: String },
    #[error("rule '{rule}' targets {target}, which is outside {tracked}")]
    ScopeMismatch {
        rule: String,
        target: String,
        tracked: String,
    },
    #[error("{target} is derived by more than one rule")]
    DuplicateTarget { target: String },
    #[error("rules form a dependency cycle: {}", .rules.join(" -> "))]
    Cycle { rules: Vec<String> },
}

/// Validated, dependency-ordered rules for one tracked field.
#[derive(Debug)]
pub struct RuleSet<C> {
    tracked: TrackedField,
    templates: Vec<RuleTemplate<C>>,
    watch: Vec<FieldPath>,
}

impl<C> RuleSet<C> {
    pub fn builder(tracked: TrackedField) -> RuleSetBuilder<C> {
        RuleSetBuilder {
            tracked,
            templates: Vec::new(),
            watch: Vec::new(),
        }
    }

    pub fn tracked(&self) -> &TrackedField {
        &self.tracked
    }

    /// Templates in evaluation order.
    pub fn templates(&self) -> &[RuleTemplate<C>] {
        &self.templates
    }

    pub fn watch(&self) -> &[FieldPath] {
        &self.watch
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn target_shapes(&self) -> impl Iterator<Item = String> + '_ {
        self.templates.iter().map(|template| template.target.shape())
    }
}

pub struct RuleSetBuilder<C> {
    tracked: TrackedField,
    templates: Vec<RuleTemplate<C>>,
    watch: Vec<FieldPath>,
}

impl<C> RuleSetBuilder<C> {
    pub fn rule(mut self, template: RuleTemplate<C>) -> Self {
        self.templates.push(template);
        self
    }

    pub fn rules(mut self, templates: impl IntoIterator<Item = RuleTemplate<C>>) -> Self {
        self.templates.extend(templates);
        self
    }

    /// Field snapshotted into the pass context before any rule runs.
    pub fn watch(mut self, path: FieldPath) -> Self {
        self.watch.push(path);
        self
    }

    pub fn build(self) -> Result<RuleSet<C>, RuleError> {
        let tracked = self.tracked;
        let mut kept = Vec::with_capacity(self.templates.len());
        for template in self.templates {
            if applies_to(&template, &tracked)? {
                kept.push(template);
            } else {
                trace!(rule = %template.name, tracked = %tracked, "rule alignment does not match tracked field");
            }
        }

        let mut seen = HashSet::new();
        for template in &kept {
            let shape = template.target.shape();
            if template.deps.iter().any(|dep| dep.shape() == shape) {
                return Err(RuleError::SelfDependency {
                    rule: template.name.clone(),
                    target: shape,
                });
            }
            if !seen.insert(shape.clone()) {
                return Err(RuleError::DuplicateTarget { target: shape });
            }
        }

        let targets: Vec<String> = kept.iter().map(|t| t.target.shape()).collect();
        let deps: Vec<Vec<String>> = kept
            .iter()
            .map(|t| t.deps.iter().map(PathTemplate::shape).collect())
            .collect();
        let nodes: Vec<Node<'_>> = targets
            .iter()
            .zip(&deps)
            .map(|(target, deps)| Node {
                target,
                deps: deps.iter().map(String::as_str).collect(),
            })
            .collect();

        let order = dependency_order(&nodes).map_err(|cycle| RuleError::Cycle {
            rules: cycle.iter().map(|&i| kept[i].name.clone()).collect(),
        })?;

        let mut slots: Vec<Option<RuleTemplate<C>>> = kept.into_iter().map(Some).collect();
        let templates = order
            .into_iter()
            .filter_map(|index| slots.get_mut(index).and_then(Option::take))
            .collect();

        Ok(RuleSet {
            tracked,
            templates,
            watch: self.watch,
        })
    }
}

/// `Ok(false)` filters a rule written for the other alignment; structural mismatches are errors.
fn applies_to<C>(template: &RuleTemplate<C>, tracked: &TrackedField) -> Result<bool, RuleError> {
    let mismatch = || RuleError::ScopeMismatch {
        rule: template.name.clone(),
        target: template.target.shape(),
        tracked: tracked.to_string(),
    };
    match (template.scope, tracked) {
        (RuleScope::Indexed(rule_alignment), TrackedField::Collection { array, alignment }) => {
            if template.target.array() != Some(array.as_str()) {
                return Err(mismatch());
            }
            Ok(rule_alignment == *alignment)
        }
        (RuleScope::Form, TrackedField::Form) => match template.target {
            PathTemplate::Scalar { .. } => Ok(true),
            _ => Err(mismatch()),
        },
        _ => Err(mismatch()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weighted_intensity() -> RuleTemplate<()> {
        RuleTemplate::new(
            "weighted_intensity",
            RuleScope::Indexed(Alignment::Horizontal),
            PathTemplate::item("scores", "weighted_intensity"),
            |input| Some(input.field("weight") * input.field("intensity")),
        )
        .deps([
            PathTemplate::item("scores", "weight"),
            PathTemplate::item("scores", "intensity"),
        ])
    }

    fn total(name: &str, target: &str, dep: &str) -> RuleTemplate<()> {
        RuleTemplate::new(name, RuleScope::Form, PathTemplate::scalar(target), |_| Some(0.0))
            .deps([PathTemplate::scalar(dep)])
    }

    #[test]
    fn orders_rules_after_their_dependencies() {
        let set = RuleSet::builder(TrackedField::Form)
            .rule(total("rounded", "rounded_final_value", "final_value"))
            .rule(total("final", "final_value", "total_weight"))
            .rule(total("appraisal", "appraisal_price", "rounded_final_value"))
            .build()
            .expect("acyclic");
        let names: Vec<&str> = set.templates().iter().map(RuleTemplate::name).collect();
        assert_eq!(names, ["final", "rounded", "appraisal"]);
    }

    #[test]
    fn rejects_cycles_and_self_references() {
        let err = RuleSet::builder(TrackedField::Form)
            .rule(total("a", "a", "b"))
            .rule(total("b", "b", "a"))
            .build()
            .expect_err("cycle");
        assert!(matches!(err, RuleError::Cycle { ref rules } if rules.len() == 2));

        let err = RuleSet::builder(TrackedField::Form)
            .rule(total("loop", "x", "x"))
            .build()
            .expect_err("self dependency");
        assert!(matches!(err, RuleError::SelfDependency { .. }));
    }

    #[test]
    fn rejects_two_owners_of_one_target() {
        let err = RuleSet::builder(TrackedField::collection("scores", Alignment::Horizontal))
            .rule(weighted_intensity())
            .rule(weighted_intensity())
            .build()
            .expect_err("duplicate");
        assert_eq!(
            err,
            RuleError::DuplicateTarget {
                target: "scores.*.weighted_intensity".to_string()
            }
        );
    }

    #[test]
    fn scope_must_match_tracked_field() {
        let err = RuleSet::builder(TrackedField::collection("calculations", Alignment::Vertical))
            .rule(weighted_intensity())
            .build()
            .expect_err("other array");
        assert!(matches!(err, RuleError::ScopeMismatch { .. }));

        let err = RuleSet::<()>::builder(TrackedField::Form)
            .rule(weighted_intensity())
            .build()
            .expect_err("indexed rule on the form");
        assert!(matches!(err, RuleError::ScopeMismatch { .. }));
    }

    #[test]
    fn other_alignment_is_filtered_out() {
        let set = RuleSet::builder(TrackedField::collection("scores", Alignment::Vertical))
            .rule(weighted_intensity())
            .build()
            .expect("filtered, not rejected");
        assert!(set.is_empty());
    }
}
