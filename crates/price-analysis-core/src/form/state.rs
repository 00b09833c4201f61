use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::path::{FieldPath, Segment};

/// Field name holding the synthetic record identifier in every array record.
pub const RECORD_ID: &str = "id";

/// Stable identifier of an array record, independent of its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub u64);

/// Side effects requested alongside a write, mirroring what a form library tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SetValueOptions {
    pub should_dirty: bool,
    pub should_touch: bool,
    pub should_validate: bool,
}

impl SetValueOptions {
    /// Presentation-only write: not dirty, not touched, no validation.
    pub const fn derived() -> Self {
        Self {
            should_dirty: false,
            should_touch: false,
            should_validate: false,
        }
    }

    /// What a keystroke in the UI does.
    pub const fn user_edit() -> Self {
        Self {
            should_dirty: true,
            should_touch: true,
            should_validate: true,
        }
    }
}

/// Read side of the host form, the only view rules get.
pub trait FormReader {
    fn get_value(&self, path: &FieldPath) -> Option<Value>;

    /// Number of records currently in `array`; zero when it does not exist.
    fn record_count(&self, array: &str) -> usize;

    fn is_dirty(&self, path: &FieldPath) -> bool;

    /// Stable id of the record at `index`; hosts that do not track ids return `None`.
    fn record_id(&self, _array: &str, _index: usize) -> Option<RecordId> {
        None
    }

    /// Coerced numeric read: malformed or missing values are zero.
    fn number(&self, path: &FieldPath) -> f64 {
        self.get_value(path).as_ref().map_or(0.0, read_number)
    }
}

/// Write side of the host form.
pub trait FormStore: FormReader {
    fn set_value(
        &mut self,
        path: &FieldPath,
        value: Value,
        options: SetValueOptions,
    ) -> Result<(), FormError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("form root must be a JSON object")]
    RootNotObject,
    #[error("index out of range at {path}")]
    IndexOutOfRange { path: String },
    #[error("{path} does not address a container")]
    NotAContainer { path: String },
    #[error("array '{0}' does not exist")]
    MissingArray(String),
    #[error("records appended to '{0}' must be JSON objects")]
    RecordNotObject(String),
}

/// Notification emitted for every mutation of the form.
#[derive(Debug, Clone, PartialEq)]
pub enum FormChange {
    Value(FieldPath),
    RecordAdded { array: String, id: RecordId },
    RecordRemoved { array: String, index: usize, id: Option<RecordId> },
    NestedAdded { array: String, nested: String },
    NestedRemoved { array: String, nested: String, position: usize },
}

/// In-memory form tree with the dirty/touched bookkeeping a form library keeps.
#[derive(Debug, Clone)]
pub struct FormState {
    values: Value,
    dirty: BTreeSet<FieldPath>,
    touched: BTreeSet<FieldPath>,
    pending_validation: BTreeSet<FieldPath>,
    next_record_id: u64,
    revision: u64,
    changes: Vec<FormChange>,
}

impl Default for FormState {
    fn default() -> Self {
        Self::new()
    }
}

impl FormState {
    pub fn new() -> Self {
        Self {
            values: Value::Object(Map::new()),
            dirty: BTreeSet::new(),
            touched: BTreeSet::new(),
            pending_validation: BTreeSet::new(),
            next_record_id: 1,
            revision: 0,
            changes: Vec::new(),
        }
    }

    /// Adopts an existing tree; array records without an identifier receive one.
    pub fn from_values(values: Value) -> Result<Self, FormError> {
        if !values.is_object() {
            return Err(FormError::RootNotObject);
        }
        let mut state = Self::new();
        state.values = values;
        state.next_record_id = highest_record_id(&state.values) + 1;
        if let Value::Object(root) = &mut state.values {
            for value in root.values_mut() {
                if let Value::Array(records) = value {
                    for record in records.iter_mut() {
                        if let Value::Object(fields) = record {
                            if !fields.contains_key(RECORD_ID) {
                                fields.insert(RECORD_ID.to_string(), Value::from(state.next_record_id));
                                state.next_record_id += 1;
                            }
                        }
                    }
                }
            }
        }
        Ok(state)
    }

    pub fn values(&self) -> &Value {
        &self.values
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn value(&self, path: &FieldPath) -> Option<&Value> {
        let mut current = &self.values;
        for segment in path.segments() {
            current = match segment {
                Segment::Key(key) => current.as_object()?.get(key)?,
                Segment::Index(index) => current.as_array()?.get(index)?,
            };
        }
        Some(current)
    }

    pub fn is_touched(&self, path: &FieldPath) -> bool {
        self.touched.contains(path)
    }

    pub fn dirty_fields(&self) -> impl Iterator<Item = &FieldPath> {
        self.dirty.iter()
    }

    /// Fields written with `should_validate` since the last [`take_pending_validation`](Self::take_pending_validation).
    pub fn take_pending_validation(&mut self) -> BTreeSet<FieldPath> {
        std::mem::take(&mut self.pending_validation)
    }

    /// Drains the change log accumulated since the last call. The log is never trimmed
    /// here; whoever owns the form drains it.
    pub fn take_changes(&mut self) -> Vec<FormChange> {
        std::mem::take(&mut self.changes)
    }

    pub fn clear_dirty(&mut self, path: &FieldPath) {
        self.dirty.remove(path);
    }

    pub fn append_record(&mut self, array: &str, record: Value) -> Result<RecordId, FormError> {
        let Value::Object(mut fields) = record else {
            return Err(FormError::RecordNotObject(array.to_string()));
        };
        let id = RecordId(self.next_record_id);
        self.next_record_id += 1;
        fields.insert(RECORD_ID.to_string(), Value::from(id.0));

        let root = self.root_mut()?;
        let records = root
            .entry(array.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        let Value::Array(records) = records else {
            return Err(FormError::NotAContainer {
                path: array.to_string(),
            });
        };
        records.push(Value::Object(fields));

        self.record_change(FormChange::RecordAdded {
            array: array.to_string(),
            id,
        });
        Ok(id)
    }

    /// Removes the record at `index`, carrying dirty/touched state of later records along.
    pub fn remove_record(&mut self, array: &str, index: usize) -> Result<Value, FormError> {
        let records = self.array_mut(array)?;
        if index >= records.len() {
            return Err(FormError::IndexOutOfRange {
                path: format!("{array}.{index}"),
            });
        }
        let removed = records.remove(index);
        let id = removed.get(RECORD_ID).and_then(Value::as_u64).map(RecordId);

        let shift = |set: &BTreeSet<FieldPath>| -> BTreeSet<FieldPath> {
            set.iter()
                .filter_map(|path| path.after_removal(array, index))
                .collect()
        };
        self.dirty = shift(&self.dirty);
        self.touched = shift(&self.touched);
        self.pending_validation = shift(&self.pending_validation);

        self.record_change(FormChange::RecordRemoved {
            array: array.to_string(),
            index,
            id,
        });
        Ok(removed)
    }

    pub fn index_of(&self, array: &str, id: RecordId) -> Option<usize> {
        self.values
            .get(array)?
            .as_array()?
            .iter()
            .position(|record| record.get(RECORD_ID).and_then(Value::as_u64) == Some(id.0))
    }

    /// Appends `entry` to the `nested` list of every record of `array`.
    pub fn push_nested(&mut self, array: &str, nested: &str, entry: Value) -> Result<(), FormError> {
        for record in self.array_mut(array)?.iter_mut() {
            let Value::Object(fields) = record else {
                continue;
            };
            let list = fields
                .entry(nested.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(list) = list {
                list.push(entry.clone());
            }
        }
        self.record_change(FormChange::NestedAdded {
            array: array.to_string(),
            nested: nested.to_string(),
        });
        Ok(())
    }

    /// Drops position `position` from the `nested` list of every record of `array`.
    pub fn remove_nested(&mut self, array: &str, nested: &str, position: usize) -> Result<(), FormError> {
        for record in self.array_mut(array)?.iter_mut() {
            if let Some(Value::Array(list)) = record.get_mut(nested) {
                if position < list.len() {
                    list.remove(position);
                }
            }
        }

        let shift = |set: &BTreeSet<FieldPath>| -> BTreeSet<FieldPath> {
            set.iter()
                .filter_map(|path| path.after_nested_removal(array, nested, position))
                .collect()
        };
        self.dirty = shift(&self.dirty);
        self.touched = shift(&self.touched);
        self.pending_validation = shift(&self.pending_validation);

        self.record_change(FormChange::NestedRemoved {
            array: array.to_string(),
            nested: nested.to_string(),
            position,
        });
        Ok(())
    }

    fn root_mut(&mut self) -> Result<&mut Map<String, Value>, FormError> {
        self.values.as_object_mut().ok_or(FormError::RootNotObject)
    }

    fn array_mut(&mut self, array: &str) -> Result<&mut Vec<Value>, FormError> {
        self.root_mut()?
            .get_mut(array)
            .and_then(Value::as_array_mut)
            .ok_or_else(|| FormError::MissingArray(array.to_string()))
    }

    fn record_change(&mut self, change: FormChange) {
        self.revision += 1;
        self.changes.push(change);
    }

    fn slot_mut(&mut self, path: &FieldPath) -> Result<&mut Value, FormError> {
        let rendered = path.to_string();
        let mut current = &mut self.values;
        for segment in path.segments() {
            current = match segment {
                Segment::Key(key) => {
                    if current.is_null() {
                        *current = Value::Object(Map::new());
                    }
                    current
                        .as_object_mut()
                        .ok_or_else(|| FormError::NotAContainer {
                            path: rendered.clone(),
                        })?
                        .entry(key.to_string())
                        .or_insert(Value::Null)
                }
                Segment::Index(index) => current
                    .as_array_mut()
                    .and_then(|items| items.get_mut(index))
                    .ok_or_else(|| FormError::IndexOutOfRange {
                        path: rendered.clone(),
                    })?,
            };
        }
        Ok(current)
    }
}

impl FormReader for FormState {
    fn get_value(&self, path: &FieldPath) -> Option<Value> {
        self.value(path).cloned()
    }

    fn record_count(&self, array: &str) -> usize {
        self.values
            .get(array)
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    fn is_dirty(&self, path: &FieldPath) -> bool {
        self.dirty.contains(path)
    }

    fn record_id(&self, array: &str, index: usize) -> Option<RecordId> {
        self.values
            .get(array)?
            .get(index)?
            .get(RECORD_ID)?
            .as_u64()
            .map(RecordId)
    }
}

impl FormStore for FormState {
    fn set_value(
        &mut self,
        path: &FieldPath,
        value: Value,
        options: SetValueOptions,
    ) -> Result<(), FormError> {
        *self.slot_mut(path)? = value;

        if options.should_dirty {
            self.dirty.insert(path.clone());
        }
        if options.should_touch {
            self.touched.insert(path.clone());
        }
        if options.should_validate {
            self.pending_validation.insert(path.clone());
        }
        self.record_change(FormChange::Value(path.clone()));
        Ok(())
    }
}

fn highest_record_id(values: &Value) -> u64 {
    values
        .as_object()
        .into_iter()
        .flat_map(|root| root.values())
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(|record| record.get(RECORD_ID).and_then(Value::as_u64))
        .max()
        .unwrap_or(0)
}

/// Lenient numeric read: numbers pass, numeric text (thousands separators allowed) parses,
/// anything else is `None`.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

/// [`coerce_number`] with the zero fallback the worksheets use for malformed input.
pub fn read_number(value: &Value) -> f64 {
    coerce_number(value).unwrap_or(0.0)
}

/// Blank in the form-library sense: missing, null or empty text.
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        _ => false,
    }
}
