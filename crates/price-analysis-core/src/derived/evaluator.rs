use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::rule::{PassContext, RuleInput, RuleSet, TrackedField};
use crate::config::EngineConfig;
use crate::form::{coerce_number, FieldPath, FormReader, FormStore, RecordId};

/// What a single evaluator pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Cells whose normalized value changed and were written.
    pub writes: usize,
    /// Rules whose `when` guard declined to run.
    pub skipped: usize,
    /// Writes dropped because the target record disappeared mid-pass.
    pub stale: usize,
    /// Cells already holding the normalized candidate.
    pub unchanged: usize,
}

impl PassReport {
    pub fn absorb(&mut self, other: PassReport) {
        self.writes += other.writes;
        self.skipped += other.skipped;
        self.stale += other.stale;
        self.unchanged += other.unchanged;
    }
}

/// A derived cell across passes: the record it belongs to when the host tracks record ids,
/// otherwise its position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CellKey {
    Record { id: RecordId, cell: FieldPath },
    Position(FieldPath),
}

impl CellKey {
    fn new(records: &[Option<RecordId>], path: &FieldPath) -> Self {
        let id = path
            .index()
            .and_then(|index| records.get(index).copied().flatten());
        match id {
            Some(id) => CellKey::Record {
                id,
                cell: first_record(path),
            },
            None => CellKey::Position(path.clone()),
        }
    }
}

/// `path` with its record index erased, so one record's cells share a key after it moves.
fn first_record(path: &FieldPath) -> FieldPath {
    match path {
        FieldPath::Scalar { .. } => path.clone(),
        FieldPath::Item { array, field, .. } => FieldPath::item(array, 0, field),
        FieldPath::Nested {
            array,
            nested,
            position,
            field,
            ..
        } => FieldPath::nested(array, 0, nested, *position, field),
    }
}

/// Keeps the derived cells of one tracked field consistent with the rest of the form.
#[derive(Debug)]
pub struct DerivedFieldEvaluator<C> {
    rules: RuleSet<C>,
    dirty_derived_writes: bool,
    registered_len: Option<usize>,
    registered: BTreeSet<FieldPath>,
    records: Vec<Option<RecordId>>,
    last_written: HashMap<CellKey, f64>,
}

impl<C> DerivedFieldEvaluator<C> {
    pub fn new(rules: RuleSet<C>) -> Self {
        Self {
            rules,
            dirty_derived_writes: false,
            registered_len: None,
            registered: BTreeSet::new(),
            records: Vec::new(),
            last_written: HashMap::new(),
        }
    }

    pub fn with_engine_config(mut self, config: &EngineConfig) -> Self {
        self.dirty_derived_writes = config.dirty_derived_writes;
        self
    }

    pub fn tracked(&self) -> &TrackedField {
        self.rules.tracked()
    }

    pub fn rules(&self) -> &RuleSet<C> {
        &self.rules
    }

    /// Target cells registered for the live shape seen by the last pass.
    pub fn registered(&self) -> impl Iterator<Item = &FieldPath> {
        self.registered.iter()
    }

    /// Value this evaluator last wrote to the record now at `path`'s position.
    pub fn last_written(&self, path: &FieldPath) -> Option<f64> {
        self.last_written
            .get(&CellKey::new(&self.records, path))
            .copied()
    }

    /// Ids of the live records, one entry per index the rules will be bound to.
    fn live_records(&self, form: &dyn FormReader) -> Vec<Option<RecordId>> {
        match self.rules.tracked() {
            TrackedField::Collection { array, .. } => (0..form.record_count(array))
                .map(|index| form.record_id(array, index))
                .collect(),
            TrackedField::Form => vec![None],
        }
    }

    /// Re-registers target cells when the live length changes and forgets values written
    /// for records that are gone.
    fn sync_registration(&mut self, records: Vec<Option<RecordId>>) {
        let live = records.len();
        if self.registered_len != Some(live) {
            if let Some(previous) = self.registered_len {
                debug!(
                    tracked = %self.rules.tracked(),
                    previous,
                    live,
                    "collection length changed, re-registering derived cells"
                );
            }
            self.registered = (0..live)
                .flat_map(|index| {
                    self.rules
                        .templates()
                        .iter()
                        .map(move |template| template.target().bind(index))
                })
                .collect();
            self.registered_len = Some(live);
        }

        if self.records != records {
            let live_ids: HashSet<RecordId> = records.iter().flatten().copied().collect();
            let registered = &self.registered;
            self.last_written.retain(|key, _| match key {
                CellKey::Record { id, .. } => live_ids.contains(id),
                CellKey::Position(path) => registered.contains(path),
            });
            self.records = records;
        }
    }

    /// Runs every rule once per live index, writing only cells whose normalized value changed.
    pub fn run_pass<S: FormStore>(&mut self, store: &mut S, context: &C) -> PassReport {
        let records = self.live_records(&*store);
        let live = records.len();
        self.sync_registration(records);

        let pass = PassContext::snapshot(context, &*store, self.rules.watch());
        let array = self.rules.tracked().array().map(str::to_string);
        let mut report = PassReport::default();

        for index in 0..live {
            for template in self.rules.templates() {
                let target = template.target().bind(index);
                if !within_bounds(&*store, &target) {
                    report.stale += 1;
                    trace!(rule = template.name(), path = %target, "record gone before evaluation");
                    continue;
                }

                let (candidate, current) = {
                    let input = RuleInput {
                        form: &*store,
                        context: &pass,
                        array: array.as_deref(),
                        index,
                        target: &target,
                        current: store.get_value(&target),
                        target_dirty: store.is_dirty(&target),
                    };
                    if !template.should_run(&input) {
                        report.skipped += 1;
                        trace!(rule = template.name(), path = %target, "guard declined");
                        continue;
                    }
                    let raw = template
                        .compute(&input)
                        .filter(|value| value.is_finite())
                        .unwrap_or(0.0);
                    let current = input
                        .current
                        .as_ref()
                        .and_then(coerce_number)
                        .map(|value| template.apply_normalize(value));
                    (template.apply_normalize(raw), current)
                };

                if current == Some(candidate) {
                    report.unchanged += 1;
                    continue;
                }

                // A rule may have shrunk the collection through the host while computing.
                if !within_bounds(&*store, &target) {
                    report.stale += 1;
                    debug!(rule = template.name(), path = %target, "dropping write to removed record");
                    continue;
                }

                let mut options = template.write_options();
                options.should_dirty |= self.dirty_derived_writes;
                match store.set_value(&target, Value::from(candidate), options) {
                    Ok(()) => {
                        report.writes += 1;
                        debug!(rule = template.name(), path = %target, value = candidate, "derived write");
                        let key = CellKey::new(&self.records, &target);
                        self.last_written.insert(key, candidate);
                    }
                    Err(err) => {
                        report.stale += 1;
                        warn!(rule = template.name(), path = %target, error = %err, "derived write rejected");
                    }
                }
            }
        }

        report
    }
}

fn within_bounds(form: &dyn FormReader, target: &FieldPath) -> bool {
    match (target.array(), target.index()) {
        (Some(array), Some(index)) => index < form.record_count(array),
        _ => true,
    }
}
