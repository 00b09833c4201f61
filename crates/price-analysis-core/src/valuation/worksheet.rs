use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::{ComparableSurvey, PricingMethod, PropertyProfile, ValuationContext, CALCULATIONS, SURVEYS};
use crate::config::EngineConfig;
use crate::derived::{Recalculator, RuleError, SettleReport};
use crate::form::{
    FieldPath, FormChange, FormError, FormReader, FormState, FormStore, PathError, RecordId,
    SetValueOptions,
};

#[derive(Debug, thiserror::Error)]
pub enum WorksheetError {
    #[error(transparent)]
    Form(#[from] FormError),
    #[error(transparent)]
    Rules(#[from] RuleError),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("no survey '{0}' on this worksheet")]
    UnknownSurvey(String),
    #[error("survey '{0}' is already on this worksheet")]
    DuplicateSurvey(String),
    #[error("row {index} does not exist ({len} rows)")]
    MissingRow { index: usize, len: usize },
}

/// A user edit applied after the worksheet is loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecEdit {
    pub path: String,
    pub value: Value,
}

/// Serialized description of a worksheet: method, subject property, surveys and inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorksheetSpec {
    pub method: PricingMethod,
    #[serde(default)]
    pub appraisal_date: Option<NaiveDate>,
    #[serde(default)]
    pub property: PropertyProfile,
    #[serde(default)]
    pub surveys: Vec<ComparableSurvey>,
    /// Scoring or adjustment rows, merged over the method's empty row.
    #[serde(default)]
    pub rows: Vec<Value>,
    /// Per-survey column inputs, merged by position over the seeded columns.
    #[serde(default)]
    pub columns: Vec<Value>,
    #[serde(default)]
    pub edits: Vec<SpecEdit>,
}

/// Settled values read back for display or submission.
#[derive(Debug, Clone, Serialize)]
pub struct WorksheetSummary {
    pub method: PricingMethod,
    pub surveys: Vec<String>,
    pub results: BTreeMap<String, f64>,
    pub dirty: Vec<String>,
    pub settle: Option<SettleReport>,
    pub form: Value,
}

/// One pricing worksheet: the form tree, its external context and the rules that keep the
/// derived cells current. Every mutation settles the derived fields before returning.
#[derive(Debug)]
pub struct Worksheet {
    method: PricingMethod,
    form: FormState,
    context: ValuationContext,
    recalc: Recalculator<ValuationContext>,
    built_for: Option<usize>,
    last_settle: Option<SettleReport>,
}

impl Worksheet {
    pub fn new(
        method: PricingMethod,
        property: PropertyProfile,
        appraisal_date: Option<NaiveDate>,
        engine: &EngineConfig,
    ) -> Self {
        Self {
            method,
            form: FormState::new(),
            context: ValuationContext {
                property,
                appraisal_date,
                surveys: Vec::new(),
            },
            recalc: Recalculator::new(engine),
            built_for: None,
            last_settle: None,
        }
    }

    pub fn from_spec(spec: WorksheetSpec, engine: &EngineConfig) -> Result<Self, WorksheetError> {
        let mut worksheet = Self::new(spec.method, spec.property, spec.appraisal_date, engine);
        for survey in spec.surveys {
            worksheet.insert_survey(survey)?;
        }
        for (column, patch) in spec.columns.iter().enumerate() {
            if column >= worksheet.survey_count() {
                break;
            }
            for (field, value) in object_fields(patch) {
                let path = FieldPath::item(CALCULATIONS, column, field);
                worksheet.form.set_value(&path, value.clone(), SetValueOptions::derived())?;
            }
        }
        for row in &spec.rows {
            worksheet.insert_row(row)?;
        }
        worksheet.recalculate()?;

        for edit in spec.edits {
            let path = edit.path.parse::<FieldPath>()?;
            worksheet.edit(&path, edit.value)?;
        }
        Ok(worksheet)
    }

    pub fn method(&self) -> PricingMethod {
        self.method
    }

    pub fn form(&self) -> &FormState {
        &self.form
    }

    pub fn context(&self) -> &ValuationContext {
        &self.context
    }

    pub fn last_settle(&self) -> Option<SettleReport> {
        self.last_settle
    }

    /// Drains the form's change log. The log only holds the changes of the latest
    /// operation; each mutating call starts it afresh.
    pub fn take_changes(&mut self) -> Vec<FormChange> {
        self.form.take_changes()
    }

    pub fn survey_count(&self) -> usize {
        self.form.record_count(CALCULATIONS)
    }

    pub fn row_count(&self) -> usize {
        self.form.record_count(self.method.row_array())
    }

    pub fn number(&self, path: &FieldPath) -> f64 {
        self.form.number(path)
    }

    /// Appends a scoring/adjustment row; `fields` is merged over the method's empty row.
    pub fn add_scoring_row(&mut self, fields: &Value) -> Result<RecordId, WorksheetError> {
        self.form.take_changes();
        let id = self.insert_row(fields)?;
        self.settle()?;
        Ok(id)
    }

    pub fn remove_scoring_row(&mut self, index: usize) -> Result<(), WorksheetError> {
        let len = self.row_count();
        if index >= len {
            return Err(WorksheetError::MissingRow { index, len });
        }
        self.form.take_changes();
        self.form.remove_record(self.method.row_array(), index)?;
        self.settle()?;
        Ok(())
    }

    /// Adds a survey column seeded from the survey's factors; returns its column index.
    pub fn add_survey(&mut self, survey: ComparableSurvey) -> Result<usize, WorksheetError> {
        self.form.take_changes();
        let column = self.insert_survey(survey)?;
        self.settle()?;
        Ok(column)
    }

    pub fn remove_survey(&mut self, survey_id: &str) -> Result<(), WorksheetError> {
        let column = self
            .column_of(survey_id)
            .ok_or_else(|| WorksheetError::UnknownSurvey(survey_id.to_string()))?;
        self.form.take_changes();
        self.form.remove_record(CALCULATIONS, column)?;
        if self.row_count() > 0 {
            self.form
                .remove_nested(self.method.row_array(), SURVEYS, column)?;
        }
        self.context.surveys.retain(|survey| survey.id != survey_id);
        self.settle()?;
        Ok(())
    }

    /// A user edit: marks the field dirty, touched and pending validation, then settles.
    pub fn edit(&mut self, path: &FieldPath, value: Value) -> Result<SettleReport, WorksheetError> {
        self.form.take_changes();
        self.form.set_value(path, value, SetValueOptions::user_edit())?;
        self.settle()
    }

    /// Rebuilds the rule sets when the survey count differs from the one they were built
    /// for, then settles every derived field.
    pub fn recalculate(&mut self) -> Result<SettleReport, WorksheetError> {
        self.form.take_changes();
        self.settle()
    }

    fn settle(&mut self) -> Result<SettleReport, WorksheetError> {
        let surveys = self.survey_count();
        if self.built_for != Some(surveys) {
            debug!(
                method = ?self.method,
                previous = ?self.built_for,
                surveys,
                "building rule sets for survey shape"
            );
            self.recalc.clear();
            for rules in self.method.rule_sets(surveys)? {
                self.recalc.install(rules)?;
            }
            self.built_for = Some(surveys);
        }

        let report = self.recalc.settle(&mut self.form, &self.context);
        self.last_settle = Some(report);
        Ok(report)
    }

    pub fn summary(&self) -> WorksheetSummary {
        let results = self
            .form
            .values()
            .as_object()
            .into_iter()
            .flatten()
            .filter_map(|(field, value)| value.as_f64().map(|number| (field.clone(), number)))
            .collect();
        WorksheetSummary {
            method: self.method,
            surveys: self.context.surveys.iter().map(|s| s.id.clone()).collect(),
            results,
            dirty: self.form.dirty_fields().map(ToString::to_string).collect(),
            settle: self.last_settle,
            form: self.form.values().clone(),
        }
    }

    fn insert_row(&mut self, fields: &Value) -> Result<RecordId, WorksheetError> {
        let mut record = self.method.row_record(self.survey_count());
        overlay(&mut record, fields);
        Ok(self.form.append_record(self.method.row_array(), record)?)
    }

    fn insert_survey(&mut self, survey: ComparableSurvey) -> Result<usize, WorksheetError> {
        if self.column_of(&survey.id).is_some() {
            return Err(WorksheetError::DuplicateSurvey(survey.id));
        }
        let record = self
            .method
            .column_record(&survey, self.context.appraisal_date);
        self.form.append_record(CALCULATIONS, record)?;
        if self.row_count() > 0 {
            self.form
                .push_nested(self.method.row_array(), SURVEYS, self.method.nested_entry())?;
        }
        self.context.surveys.push(survey);
        Ok(self.survey_count() - 1)
    }

    fn column_of(&self, survey_id: &str) -> Option<usize> {
        (0..self.survey_count()).find(|&column| {
            self.form
                .value(&FieldPath::item(CALCULATIONS, column, "survey_id"))
                .and_then(Value::as_str)
                == Some(survey_id)
        })
    }
}

fn object_fields(value: &Value) -> impl Iterator<Item = (&String, &Value)> {
    value.as_object().into_iter().flat_map(Map::iter)
}

/// Merges `patch` into `base`: objects key by key, arrays position by position within the
/// existing length, anything else replaced.
fn overlay(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(key) {
                    Some(existing) => overlay(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (Value::Array(base), Value::Array(patch)) => {
            for (existing, value) in base.iter_mut().zip(patch) {
                overlay(existing, value);
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}
