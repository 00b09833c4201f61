use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::policy::round_to;

/// Factor codes the worksheets read from a comparable survey.
pub mod codes {
    pub const OFFERING_PRICE: &str = "offering_price";
    pub const OFFERING_PRICE_ADJUSTMENT_PCT: &str = "offering_price_adjustment_pct";
    pub const OFFERING_PRICE_ADJUSTMENT_AMOUNT: &str = "offering_price_adjustment_amount";
    pub const SELLING_PRICE: &str = "selling_price";
    pub const YEARLY_ADJUSTMENT_PCT: &str = "yearly_adjustment_pct";
    pub const LAND_AREA: &str = "land_area";
    pub const USABLE_AREA: &str = "usable_area";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorDataType {
    Number,
    Currency,
    Percent,
    Area,
    Text,
    Dropdown,
}

impl FactorDataType {
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            FactorDataType::Number
                | FactorDataType::Currency
                | FactorDataType::Percent
                | FactorDataType::Area
        )
    }
}

impl FromStr for FactorDataType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "number" | "numeric" | "integer" | "decimal" => Ok(Self::Number),
            "currency" | "price" => Ok(Self::Currency),
            "percent" | "percentage" => Ok(Self::Percent),
            "area" => Ok(Self::Area),
            "text" | "string" => Ok(Self::Text),
            "dropdown" | "select" => Ok(Self::Dropdown),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for FactorDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FactorDataType::Number => "number",
            FactorDataType::Currency => "currency",
            FactorDataType::Percent => "percent",
            FactorDataType::Area => "area",
            FactorDataType::Text => "text",
            FactorDataType::Dropdown => "dropdown",
        };
        f.write_str(label)
    }
}

/// One recorded attribute of a comparable, stored as entered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyFactor {
    pub factor_code: String,
    pub data_type: FactorDataType,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub field_decimal: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactorValue {
    Number(f64),
    Text(String),
}

impl FactorValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FactorValue::Number(value) => Some(*value),
            FactorValue::Text(_) => None,
        }
    }
}

/// A market comparable used as a reference point in valuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparableSurvey {
    pub id: String,
    #[serde(default)]
    pub survey_date: Option<NaiveDate>,
    #[serde(default)]
    pub factors: Vec<SurveyFactor>,
}

impl ComparableSurvey {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            survey_date: None,
            factors: Vec::new(),
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.survey_date = Some(date);
        self
    }

    pub fn with_number(mut self, code: &str, value: f64) -> Self {
        self.factors.push(SurveyFactor {
            factor_code: code.to_string(),
            data_type: FactorDataType::Number,
            value: Some(value.to_string()),
            field_decimal: None,
        });
        self
    }

    pub fn factor(&self, code: &str) -> Option<&SurveyFactor> {
        self.factors.iter().find(|factor| factor.factor_code == code)
    }

    /// Typed value of factor `code`.
    ///
    /// Numeric factors are parsed (thousands separators allowed) and rounded to their
    /// `field_decimal`; text and dropdown values come back verbatim. Blank or unparsable
    /// numeric values are `None`.
    pub fn read_factor_value(&self, code: &str) -> Option<FactorValue> {
        let factor = self.factor(code)?;
        let raw = factor.value.as_deref().map(str::trim).filter(|raw| !raw.is_empty())?;
        if factor.data_type.is_numeric() {
            let number = raw.replace(',', "").parse::<f64>().ok().filter(|n| n.is_finite())?;
            Some(FactorValue::Number(match factor.field_decimal {
                Some(decimals) => round_to(number, decimals),
                None => number,
            }))
        } else {
            Some(FactorValue::Text(raw.to_string()))
        }
    }

    pub fn number(&self, code: &str) -> Option<f64> {
        self.read_factor_value(code).as_ref().and_then(FactorValue::as_number)
    }
}
