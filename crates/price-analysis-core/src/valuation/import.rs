use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

use super::survey::{ComparableSurvey, FactorDataType, SurveyFactor};

#[derive(Debug)]
pub enum SurveyImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidDate { survey_id: String, value: String },
    UnknownDataType { factor_code: String, value: String },
}

impl std::fmt::Display for SurveyImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurveyImportError::Io(err) => write!(f, "failed to read survey export: {}", err),
            SurveyImportError::Csv(err) => write!(f, "invalid survey CSV data: {}", err),
            SurveyImportError::InvalidDate { survey_id, value } => write!(
                f,
                "survey '{}' has an unreadable survey_date '{}'",
                survey_id, value
            ),
            SurveyImportError::UnknownDataType { factor_code, value } => write!(
                f,
                "factor '{}' has unknown data_type '{}'",
                factor_code, value
            ),
        }
    }
}

impl std::error::Error for SurveyImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SurveyImportError::Io(err) => Some(err),
            SurveyImportError::Csv(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SurveyImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for SurveyImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// Reads comparable surveys from a long-format export, one factor per row:
/// `survey_id,survey_date,factor_code,data_type,value,field_decimal`.
pub struct SurveyImporter;

impl SurveyImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Vec<ComparableSurvey>, SurveyImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Groups rows by survey in first-seen order. A later row for the same factor replaces
    /// the earlier one.
    pub fn from_reader<R: Read>(reader: R) -> Result<Vec<ComparableSurvey>, SurveyImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut surveys: Vec<ComparableSurvey> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for row in csv_reader.deserialize::<SurveyRow>() {
            let row = row?;
            let position = match positions.get(&row.survey_id) {
                Some(position) => *position,
                None => {
                    positions.insert(row.survey_id.clone(), surveys.len());
                    surveys.push(ComparableSurvey::new(row.survey_id.clone()));
                    surveys.len() - 1
                }
            };
            let survey = &mut surveys[position];

            if let Some(raw) = row.survey_date.as_deref() {
                let date = parse_date(raw).ok_or_else(|| SurveyImportError::InvalidDate {
                    survey_id: row.survey_id.clone(),
                    value: raw.to_string(),
                })?;
                survey.survey_date.get_or_insert(date);
            }

            let data_type = row.data_type.parse::<FactorDataType>().map_err(|value| {
                SurveyImportError::UnknownDataType {
                    factor_code: row.factor_code.clone(),
                    value,
                }
            })?;
            let factor = SurveyFactor {
                factor_code: row.factor_code,
                data_type,
                value: row.value,
                field_decimal: row.field_decimal,
            };
            match survey
                .factors
                .iter_mut()
                .find(|existing| existing.factor_code == factor.factor_code)
            {
                Some(existing) => *existing = factor,
                None => survey.factors.push(factor),
            }
        }

        Ok(surveys)
    }
}

#[derive(Debug, Deserialize)]
struct SurveyRow {
    survey_id: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    survey_date: Option<String>,
    factor_code: String,
    data_type: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    value: Option<String>,
    #[serde(default)]
    field_decimal: Option<u32>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }))
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::valuation::survey::{codes, FactorValue};
    use std::io::Cursor;

    const EXPORT: &str = "survey_id,survey_date,factor_code,data_type,value,field_decimal\n\
S-2,2023-03-01,offering_price,currency,\"1,200,000\",2\n\
S-1,2022-01-15,selling_price,currency,900000,\n\
S-2,,road_access,dropdown,Paved,\n\
S-1,,yearly_adjustment_pct,percent,3.5,1\n";

    #[test]
    fn groups_rows_by_survey_in_first_seen_order() {
        let surveys = SurveyImporter::from_reader(Cursor::new(EXPORT)).expect("import");
        let ids: Vec<&str> = surveys.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["S-2", "S-1"]);
        assert_eq!(surveys[0].number(codes::OFFERING_PRICE), Some(1_200_000.0));
        assert_eq!(
            surveys[0].read_factor_value("road_access"),
            Some(FactorValue::Text("Paved".to_string()))
        );
        assert_eq!(
            surveys[1].survey_date,
            NaiveDate::from_ymd_opt(2022, 1, 15)
        );
        assert_eq!(surveys[1].number(codes::YEARLY_ADJUSTMENT_PCT), Some(3.5));
    }

    #[test]
    fn rejects_unknown_data_types_and_dates() {
        let bad_type = "survey_id,survey_date,factor_code,data_type,value,field_decimal\n\
S-1,,colour,rgb,red,\n";
        assert!(matches!(
            SurveyImporter::from_reader(Cursor::new(bad_type)),
            Err(SurveyImportError::UnknownDataType { .. })
        ));

        let bad_date = "survey_id,survey_date,factor_code,data_type,value,field_decimal\n\
S-1,yesterday,selling_price,currency,1,\n";
        assert!(matches!(
            SurveyImporter::from_reader(Cursor::new(bad_date)),
            Err(SurveyImportError::InvalidDate { .. })
        ));
    }
}
