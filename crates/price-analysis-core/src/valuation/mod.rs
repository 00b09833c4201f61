//! Pricing methods built on the derived-field engine.
//!
//! Each method lays out its worksheet as a scoring/adjustment row collection whose records
//! carry one nested entry per comparable survey, a `calculations` column collection with one
//! record per survey, and top-level result fields. Rule-set builders turn the current survey
//! count into evaluator rule sets; [`Worksheet`] owns the form and rebuilds those sets when
//! the shape changes.

pub mod direct_comparison;
pub mod import;
pub mod policy;
pub mod sale_grid;
pub mod survey;
pub mod worksheet;
pub mod wqs;

pub use import::{SurveyImportError, SurveyImporter};
pub use survey::{ComparableSurvey, FactorDataType, FactorValue, SurveyFactor};
pub use worksheet::{Worksheet, WorksheetError, WorksheetSpec, WorksheetSummary};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::derived::{RuleError, RuleInput, RuleScope, RuleSet, RuleTemplate};
use crate::form::PathTemplate;
use policy::{appraisal_base, floor_to_ten_thousands, round2, should_auto_default, years_between};
use survey::codes;

/// Column collection: one record per comparable survey.
pub const CALCULATIONS: &str = "calculations";
/// Nested per-survey entries inside every row record.
pub const SURVEYS: &str = "surveys";

/// Subject property attributes the final rules read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyProfile {
    #[serde(default)]
    pub land_area: Option<f64>,
    #[serde(default)]
    pub usable_area: Option<f64>,
}

/// External, read-only data handed to every rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValuationContext {
    pub property: PropertyProfile,
    pub appraisal_date: Option<NaiveDate>,
    pub surveys: Vec<ComparableSurvey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingMethod {
    /// Weighted Quality Score.
    Wqs,
    SaleAdjustmentGrid,
    DirectComparison,
}

impl PricingMethod {
    /// Row collection whose records hold the per-survey nested entries.
    pub fn row_array(self) -> &'static str {
        match self {
            PricingMethod::Wqs => wqs::SCORES,
            PricingMethod::SaleAdjustmentGrid | PricingMethod::DirectComparison => {
                sale_grid::ADJUSTMENTS
            }
        }
    }

    /// Rule sets in evaluation order for `survey_count` survey columns.
    pub fn rule_sets(self, survey_count: usize) -> Result<Vec<RuleSet<ValuationContext>>, RuleError> {
        match self {
            PricingMethod::Wqs => wqs::rule_sets(survey_count),
            PricingMethod::SaleAdjustmentGrid => sale_grid::rule_sets(survey_count),
            PricingMethod::DirectComparison => direct_comparison::rule_sets(survey_count),
        }
    }

    /// Empty row record with one nested entry per survey.
    pub fn row_record(self, survey_count: usize) -> Value {
        match self {
            PricingMethod::Wqs => wqs::row_record(survey_count),
            PricingMethod::SaleAdjustmentGrid => sale_grid::row_record(survey_count),
            PricingMethod::DirectComparison => direct_comparison::row_record(survey_count),
        }
    }

    /// Nested entry appended to every row when a survey column is added.
    pub fn nested_entry(self) -> Value {
        match self {
            PricingMethod::Wqs => wqs::nested_entry(),
            PricingMethod::SaleAdjustmentGrid => sale_grid::nested_entry(),
            PricingMethod::DirectComparison => direct_comparison::nested_entry(),
        }
    }

    /// Column record seeded from a survey's factors.
    pub fn column_record(self, survey: &ComparableSurvey, appraisal_date: Option<NaiveDate>) -> Value {
        let mut record = price_columns(survey, appraisal_date);
        if self == PricingMethod::SaleAdjustmentGrid {
            if let Value::Object(fields) = &mut record {
                fields.insert("weight_pct".to_string(), json!(0));
            }
        }
        record
    }
}

/// Price inputs every method's columns start from.
fn price_columns(survey: &ComparableSurvey, appraisal_date: Option<NaiveDate>) -> Value {
    let years = match (survey.survey_date, appraisal_date) {
        (Some(surveyed), Some(appraised)) => years_between(surveyed, appraised),
        _ => 0,
    };
    let number = |code: &str| survey.number(code).unwrap_or(0.0);
    json!({
        "survey_id": survey.id,
        "offering_price": number(codes::OFFERING_PRICE),
        "offering_price_adjustment_pct": number(codes::OFFERING_PRICE_ADJUSTMENT_PCT),
        "offering_price_adjustment_amount": number(codes::OFFERING_PRICE_ADJUSTMENT_AMOUNT),
        "selling_price": number(codes::SELLING_PRICE),
        "number_of_years": years,
        "yearly_adjustment_pct": number(codes::YEARLY_ADJUSTMENT_PCT),
    })
}

/// `adjusted_value` of the survey column being evaluated.
pub(crate) fn adjusted_value_rule() -> RuleTemplate<ValuationContext> {
    let inputs = [
        "offering_price",
        "offering_price_adjustment_pct",
        "offering_price_adjustment_amount",
        "selling_price",
        "number_of_years",
        "yearly_adjustment_pct",
    ];
    RuleTemplate::new(
        "adjusted_value",
        RuleScope::Indexed(crate::derived::Alignment::Vertical),
        PathTemplate::item(CALCULATIONS, "adjusted_value"),
        |input: &RuleInput<'_, ValuationContext>| {
            Some(policy::adjusted_value(&policy::PriceInputs {
                offering_price: input.field("offering_price"),
                offering_price_adjustment_pct: input.field("offering_price_adjustment_pct"),
                offering_price_adjustment_amount: input.field("offering_price_adjustment_amount"),
                selling_price: input.field("selling_price"),
                number_of_years: input.field("number_of_years"),
                yearly_adjustment_pct: input.field("yearly_adjustment_pct"),
            }))
        },
    )
    .deps(inputs.map(|field| PathTemplate::item(CALCULATIONS, field)))
    .normalize(round2)
}

fn auto_default(input: &RuleInput<'_, ValuationContext>) -> bool {
    should_auto_default(input.current(), input.target_is_dirty())
}

/// Rounded final value and appraisal price, shared by every method.
pub(crate) fn appraisal_rules() -> Vec<RuleTemplate<ValuationContext>> {
    vec![
        RuleTemplate::new(
            "rounded_final_value",
            RuleScope::Form,
            PathTemplate::scalar("rounded_final_value"),
            |input: &RuleInput<'_, ValuationContext>| {
                Some(floor_to_ten_thousands(input.scalar("final_value")))
            },
        )
        .deps([PathTemplate::scalar("final_value")])
        .when(auto_default),
        RuleTemplate::new(
            "appraisal_price",
            RuleScope::Form,
            PathTemplate::scalar("appraisal_price"),
            |input: &RuleInput<'_, ValuationContext>| {
                let property = input.context().property;
                Some(
                    input.scalar("rounded_final_value")
                        * appraisal_base(property.land_area, property.usable_area),
                )
            },
        )
        .deps([PathTemplate::scalar("rounded_final_value")])
        .normalize(round2),
        RuleTemplate::new(
            "rounded_appraisal_price",
            RuleScope::Form,
            PathTemplate::scalar("rounded_appraisal_price"),
            |input: &RuleInput<'_, ValuationContext>| {
                Some(floor_to_ten_thousands(input.scalar("appraisal_price")))
            },
        )
        .deps([PathTemplate::scalar("appraisal_price")])
        .when(auto_default),
    ]
}
