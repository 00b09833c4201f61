use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::form::{is_blank, read_number};

const MAX_DECIMALS: u32 = 15;

/// Precision beyond what an `f64` carries is clamped; values too large to scale come back as is.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals.min(MAX_DECIMALS) as i32);
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / factor
}

pub fn round2(value: f64) -> f64 {
    round_to(value, 2)
}

/// Rounds down to the nearest multiple of 10,000, the granularity appraisals are quoted in.
pub fn floor_to_ten_thousands(value: f64) -> f64 {
    (value / 10_000.0).floor() * 10_000.0
}

/// Whether an auto-populated field may take the derived value.
///
/// A field the user never dirtied always follows its source. A dirtied field only does so
/// again once the user has cleared it back to blank or zero.
pub fn should_auto_default(value: Option<&Value>, is_dirty: bool) -> bool {
    !is_dirty || is_blank(value) || value.map_or(true, |v| read_number(v) == 0.0)
}

/// Price inputs of one comparable survey column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceInputs {
    pub offering_price: f64,
    pub offering_price_adjustment_pct: f64,
    pub offering_price_adjustment_amount: f64,
    pub selling_price: f64,
    pub number_of_years: f64,
    pub yearly_adjustment_pct: f64,
}

/// Comparable price brought to the appraisal's terms.
///
/// An offering price is discounted by a positive percentage, else by a positive amount,
/// else taken as is. Without an offering price the selling price grows by
/// `number_of_years × yearly_adjustment_pct` percent.
pub fn adjusted_value(inputs: &PriceInputs) -> f64 {
    if inputs.offering_price > 0.0 {
        if inputs.offering_price_adjustment_pct > 0.0 {
            inputs.offering_price * (1.0 - inputs.offering_price_adjustment_pct / 100.0)
        } else if inputs.offering_price_adjustment_amount > 0.0 {
            inputs.offering_price - inputs.offering_price_adjustment_amount
        } else {
            inputs.offering_price
        }
    } else {
        inputs.selling_price * (1.0 + inputs.number_of_years * inputs.yearly_adjustment_pct / 100.0)
    }
}

/// Area the per-unit value is multiplied by: land area, else usable area, else none.
pub fn appraisal_base(land_area: Option<f64>, usable_area: Option<f64>) -> f64 {
    [land_area, usable_area]
        .into_iter()
        .flatten()
        .find(|area| *area > 0.0)
        .unwrap_or(1.0)
}

/// Whole years elapsed between a survey and the appraisal; never negative.
pub fn years_between(survey_date: NaiveDate, appraisal_date: NaiveDate) -> u32 {
    let mut years = appraisal_date.year() - survey_date.year();
    if (appraisal_date.month(), appraisal_date.day()) < (survey_date.month(), survey_date.day()) {
        years -= 1;
    }
    years.max(0) as u32
}
