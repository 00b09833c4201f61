//! Sale Adjustment Grid.
//!
//! Each adjustment row carries a percentage per survey; the amount it moves that survey's
//! adjusted price follows from the percentage. Surveys are then blended by their weight.

use serde_json::{json, Value};

use super::policy::round2;
use super::{adjusted_value_rule, appraisal_rules, ValuationContext, CALCULATIONS, SURVEYS};
use crate::derived::{Alignment, RuleError, RuleInput, RuleScope, RuleSet, RuleTemplate, TrackedField};
use crate::form::{FieldPath, PathTemplate};

pub const ADJUSTMENTS: &str = "adjustments";

type Rule = RuleTemplate<ValuationContext>;
type Input<'a> = RuleInput<'a, ValuationContext>;

pub fn row_record(survey_count: usize) -> Value {
    let surveys: Vec<Value> = (0..survey_count).map(|_| nested_entry()).collect();
    json!({ "factor": "", "surveys": surveys })
}

pub fn nested_entry() -> Value {
    json!({ "adjustment_pct": 0 })
}

pub fn rule_sets(survey_count: usize) -> Result<Vec<RuleSet<ValuationContext>>, RuleError> {
    Ok(vec![
        RuleSet::builder(TrackedField::collection(ADJUSTMENTS, Alignment::Horizontal))
            .rules(adjustment_rules(survey_count))
            .build()?,
        RuleSet::builder(TrackedField::collection(CALCULATIONS, Alignment::Vertical))
            .rules(calculation_rules())
            .build()?,
        RuleSet::builder(TrackedField::Form)
            .rules(final_rules())
            .rules(appraisal_rules())
            .build()?,
    ])
}

fn adjustment_rules(survey_count: usize) -> Vec<Rule> {
    (0..survey_count)
        .map(|column| {
            RuleTemplate::new(
                format!("adjustment_amount[{column}]"),
                RuleScope::Indexed(Alignment::Horizontal),
                PathTemplate::nested(ADJUSTMENTS, SURVEYS, column, "adjustment_amount"),
                move |input: &Input<'_>| {
                    let adjusted = input.number(&FieldPath::item(CALCULATIONS, column, "adjusted_value"));
                    Some(adjusted * input.nested(SURVEYS, column, "adjustment_pct") / 100.0)
                },
            )
            .deps([PathTemplate::nested(ADJUSTMENTS, SURVEYS, column, "adjustment_pct")])
            .normalize(round2)
        })
        .collect()
}

fn column_total(target: &'static str, nested_field: &'static str) -> Rule {
    RuleTemplate::new(
        target,
        RuleScope::Indexed(Alignment::Vertical),
        PathTemplate::item(CALCULATIONS, target),
        move |input: &Input<'_>| {
            Some(input.sum_nested(ADJUSTMENTS, SURVEYS, input.index(), nested_field))
        },
    )
}

fn calculation_rules() -> Vec<Rule> {
    vec![
        adjusted_value_rule(),
        column_total("total_adjustment_pct", "adjustment_pct"),
        column_total("total_adjustment_amount", "adjustment_amount"),
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
        RuleTemplate::new(
            "weighted_value",
            RuleScope::Indexed(Alignment::Vertical),
            PathTemplate::item(CALCULATIONS, "weighted_value"),
            |input: &Input<'_>| {
                Some(input.field("net_adjusted_value") * input.field("weight_pct") / 100.0)
            },
        )
        .deps([
            PathTemplate::item(CALCULATIONS, "net_adjusted_value"),
            PathTemplate::item(CALCULATIONS, "weight_pct"),
        ])
        .normalize(round2),
    ]
}

fn final_rules() -> Vec<Rule> {
    vec![
        RuleTemplate::new(
            "total_weight_pct",
            RuleScope::Form,
            PathTemplate::scalar("total_weight_pct"),
            |input: &Input<'_>| Some(input.sum(CALCULATIONS, "weight_pct")),
        )
        .deps([PathTemplate::item(CALCULATIONS, "weight_pct")]),
        RuleTemplate::new(
            "final_value",
            RuleScope::Form,
            PathTemplate::scalar("final_value"),
            |input: &Input<'_>| {
                let total_weight = input.scalar("total_weight_pct");
                if total_weight == 0.0 {
                    return Some(0.0);
                }
                Some(input.sum(CALCULATIONS, "weighted_value") * 100.0 / total_weight)
            },
        )
        .deps([
            PathTemplate::scalar("total_weight_pct"),
            PathTemplate::item(CALCULATIONS, "weighted_value"),
        ])
        .normalize(round2),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::derived::Recalculator;
    use crate::form::{FormReader, FormState};

    #[test]
    fn blends_adjusted_surveys_by_weight() {
        let mut form = FormState::new();
        let mut row = row_record(2);
        row["surveys"][0]["adjustment_pct"] = json!(10);
        row["surveys"][1]["adjustment_pct"] = json!(-5);
        form.append_record(ADJUSTMENTS, row).expect("row");
        form.append_record(
            CALCULATIONS,
            json!({ "offering_price": 1_000_000, "weight_pct": 60 }),
        )
        .expect("column");
        form.append_record(
            CALCULATIONS,
            json!({ "offering_price": 2_000_000, "weight_pct": 40 }),
        )
        .expect("column");

        let mut recalc = Recalculator::new(&EngineConfig::default());
        for set in rule_sets(2).expect("valid") {
            recalc.install(set).expect("disjoint");
        }
        let report = recalc.settle(&mut form, &ValuationContext::default());
        assert!(report.converged);

        let net0 = FieldPath::item(CALCULATIONS, 0, "net_adjusted_value");
        let net1 = FieldPath::item(CALCULATIONS, 1, "net_adjusted_value");
        assert_eq!(form.number(&net0), 1_100_000.0);
        assert_eq!(form.number(&net1), 1_900_000.0);
        assert_eq!(form.number(&FieldPath::scalar("total_weight_pct")), 100.0);
        assert_eq!(form.number(&FieldPath::scalar("final_value")), 1_420_000.0);
        assert_eq!(form.number(&FieldPath::scalar("rounded_final_value")), 1_420_000.0);
    }

    #[test]
    fn no_weight_means_no_final_value() {
        let mut form = FormState::new();
        form.append_record(CALCULATIONS, json!({ "selling_price": 500_000 }))
            .expect("column");
        let mut recalc = Recalculator::new(&EngineConfig::default());
        for set in rule_sets(1).expect("valid") {
            recalc.install(set).expect("disjoint");
        }
        recalc.settle(&mut form, &ValuationContext::default());
        assert_eq!(form.number(&FieldPath::scalar("final_value")), 0.0);
    }
}
