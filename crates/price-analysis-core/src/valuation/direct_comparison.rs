//! Direct Comparison: every survey's adjusted price is corrected by absolute amounts entered
//! per adjustment row, and the final value is the plain mean of the corrected prices.

use serde_json::{json, Value};

use super::policy::round2;
use super::sale_grid::ADJUSTMENTS;
use super::{adjusted_value_rule, appraisal_rules, ValuationContext, CALCULATIONS, SURVEYS};
use crate::derived::{Alignment, RuleError, RuleInput, RuleScope, RuleSet, RuleTemplate, TrackedField};
use crate::form::PathTemplate;

type Input<'a> = RuleInput<'a, ValuationContext>;

pub fn row_record(survey_count: usize) -> Value {
    let surveys: Vec<Value> = (0..survey_count).map(|_| nested_entry()).collect();
    json!({ "factor": "", "surveys": surveys })
}

pub fn nested_entry() -> Value {
    json!({ "adjustment_amount": 0 })
}

/// Adjustment rows are pure input here, so only columns and the form carry rules.
pub fn rule_sets(_survey_count: usize) -> Result<Vec<RuleSet<ValuationContext>>, RuleError> {
    let columns = RuleSet::builder(TrackedField::collection(CALCULATIONS, Alignment::Vertical))
        .rule(adjusted_value_rule())
        .rule(RuleTemplate::new(
            "total_adjustment_amount",
            RuleScope::Indexed(Alignment::Vertical),
            PathTemplate::item(CALCULATIONS, "total_adjustment_amount"),
            |input: &Input<'_>| {
                Some(input.sum_nested(ADJUSTMENTS, SURVEYS, input.index(), "adjustment_amount"))
            },
        ))
        .rule(
            RuleTemplate::new(
                "net_adjusted_value",
                RuleScope::Indexed(Alignment::Vertical),
                PathTemplate::item(CALCULATIONS, "net_adjusted_value"),
                |input: &Input<'_>| {
                    Some(input.field("adjusted_value") + input.field("total_adjustment_amount"))
                },
            )
            .deps([
                PathTemplate::item(CALCULATIONS, "adjusted_value"),
                PathTemplate::item(CALCULATIONS, "total_adjustment_amount"),
            ])
            .normalize(round2),
        )
        .build()?;

    let form = RuleSet::builder(TrackedField::Form)
        .rule(
            RuleTemplate::new(
                "final_value",
                RuleScope::Form,
                PathTemplate::scalar("final_value"),
                |input: &Input<'_>| {
                    let surveys = input.count(CALCULATIONS);
                    if surveys == 0 {
                        return Some(0.0);
                    }
                    Some(input.sum(CALCULATIONS, "net_adjusted_value") / surveys as f64)
                },
            )
            .deps([PathTemplate::item(CALCULATIONS, "net_adjusted_value")])
            .normalize(round2),
        )
        .rules(appraisal_rules())
        .build()?;

    Ok(vec![columns, form])
}
