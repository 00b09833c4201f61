//! Weighted Quality Score.
//!
//! Scoring rows weight qualitative factors; every comparable survey gets a score per row and
//! the subject property a collateral score. The final value regresses each survey's adjusted
//! price on its total weighted score and reads the line off at the subject's total weighted
//! collateral score.

use serde_json::{json, Value};

use super::policy::round2;
use super::{adjusted_value_rule, appraisal_rules, ValuationContext, CALCULATIONS, SURVEYS};
use crate::derived::{Alignment, RuleError, RuleInput, RuleScope, RuleSet, RuleTemplate, TrackedField};
use crate::form::PathTemplate;
use crate::stats::{self, safe, Coercion, Sample};

pub const SCORES: &str = "scores";

type Rule = RuleTemplate<ValuationContext>;
type Input<'a> = RuleInput<'a, ValuationContext>;

pub fn row_record(survey_count: usize) -> Value {
    let surveys: Vec<Value> = (0..survey_count).map(|_| nested_entry()).collect();
    json!({
        "factor": "",
        "weight": 0,
        "intensity": 0,
        "collateral_score": 0,
        "surveys": surveys,
    })
}

pub fn nested_entry() -> Value {
    json!({ "survey_score": 0 })
}

/// Scoring rows, survey columns, then form totals and final values.
pub fn rule_sets(survey_count: usize) -> Result<Vec<RuleSet<ValuationContext>>, RuleError> {
    Ok(vec![
        RuleSet::builder(TrackedField::collection(SCORES, Alignment::Horizontal))
            .rules(scoring_rules(survey_count))
            .build()?,
        RuleSet::builder(TrackedField::collection(CALCULATIONS, Alignment::Vertical))
            .rules(calculation_rules())
            .build()?,
        RuleSet::builder(TrackedField::Form)
            .rules(total_rules())
            .rules(final_rules())
            .rules(appraisal_rules())
            .build()?,
    ])
}

fn row_product(name: &str, target: &str, factor: &'static str) -> Rule {
    RuleTemplate::new(
        name,
        RuleScope::Indexed(Alignment::Horizontal),
        PathTemplate::item(SCORES, target),
        move |input: &Input<'_>| Some(input.field("weight") * input.field(factor)),
    )
    .deps([
        PathTemplate::item(SCORES, "weight"),
        PathTemplate::item(SCORES, factor),
    ])
}

pub(crate) fn scoring_rules(survey_count: usize) -> Vec<Rule> {
    let mut rules = vec![
        row_product("weighted_intensity", "weighted_intensity", "intensity"),
        row_product(
            "weighted_collateral_score",
            "weighted_collateral_score",
            "collateral_score",
        ),
    ];
    rules.extend((0..survey_count).map(|column| {
        RuleTemplate::new(
            format!("weighted_survey_score[{column}]"),
            RuleScope::Indexed(Alignment::Horizontal),
            PathTemplate::nested(SCORES, SURVEYS, column, "weighted_survey_score"),
            move |input: &Input<'_>| {
                Some(input.field("weight") * input.nested(SURVEYS, column, "survey_score"))
            },
        )
        .deps([
            PathTemplate::item(SCORES, "weight"),
            PathTemplate::nested(SCORES, SURVEYS, column, "survey_score"),
        ])
    }));
    rules
}

pub(crate) fn calculation_rules() -> Vec<Rule> {
    vec![
        adjusted_value_rule(),
        RuleTemplate::new(
            "total_survey_score",
            RuleScope::Indexed(Alignment::Vertical),
            PathTemplate::item(CALCULATIONS, "total_survey_score"),
            |input: &Input<'_>| Some(input.sum_nested(SCORES, SURVEYS, input.index(), "survey_score")),
        ),
        RuleTemplate::new(
            "total_weighted_survey_score",
            RuleScope::Indexed(Alignment::Vertical),
            PathTemplate::item(CALCULATIONS, "total_weighted_survey_score"),
            |input: &Input<'_>| {
                Some(input.sum_nested(SCORES, SURVEYS, input.index(), "weighted_survey_score"))
            },
        ),
    ]
}

fn sum_rule(target: &'static str, array: &'static str, field: &'static str) -> Rule {
    RuleTemplate::new(
        target,
        RuleScope::Form,
        PathTemplate::scalar(target),
        move |input: &Input<'_>| Some(input.sum(array, field)),
    )
    .deps([PathTemplate::item(array, field)])
}

pub(crate) fn total_rules() -> Vec<Rule> {
    vec![
        sum_rule("total_weight", SCORES, "weight"),
        sum_rule("total_intensity", SCORES, "intensity"),
        sum_rule("total_weighted_intensity", SCORES, "weighted_intensity"),
        sum_rule("total_collateral_score", SCORES, "collateral_score"),
        sum_rule("total_weighted_collateral_score", SCORES, "weighted_collateral_score"),
        sum_rule("total_survey_score", CALCULATIONS, "total_survey_score"),
        sum_rule(
            "total_weighted_survey_score",
            CALCULATIONS,
            "total_weighted_survey_score",
        ),
    ]
}

/// `known_y` and `known_x` of the final-value regression.
fn regression_samples(input: &Input<'_>) -> (Vec<Sample>, Vec<Sample>) {
    (
        input.samples(CALCULATIONS, "adjusted_value"),
        input.samples(CALCULATIONS, "total_weighted_survey_score"),
    )
}

/// A regression statistic over the survey columns; insufficient data reads as zero.
fn regression_rule(
    target: &'static str,
    statistic: fn(&[Sample], &[Sample], Coercion) -> Result<f64, stats::StatsError>,
) -> Rule {
    RuleTemplate::new(
        target,
        RuleScope::Form,
        PathTemplate::scalar(target),
        move |input: &Input<'_>| {
            let (known_y, known_x) = regression_samples(input);
            Some(safe(|| statistic(&known_y, &known_x, Coercion::Lenient)).or_zero())
        },
    )
    .deps(regression_deps())
}

fn regression_deps() -> [PathTemplate; 2] {
    [
        PathTemplate::item(CALCULATIONS, "adjusted_value"),
        PathTemplate::item(CALCULATIONS, "total_weighted_survey_score"),
    ]
}

pub(crate) fn final_rules() -> Vec<Rule> {
    let estimate = |target: &'static str, sign: f64| -> Rule {
        RuleTemplate::new(
            target,
            RuleScope::Form,
            PathTemplate::scalar(target),
            move |input: &Input<'_>| {
                Some(input.scalar("rounded_final_value") + sign * input.scalar("standard_error"))
            },
        )
        .deps([
            PathTemplate::scalar("rounded_final_value"),
            PathTemplate::scalar("standard_error"),
        ])
        .normalize(round2)
    };

    vec![
        RuleTemplate::new(
            "final_value",
            RuleScope::Form,
            PathTemplate::scalar("final_value"),
            |input: &Input<'_>| {
                let (known_y, known_x) = regression_samples(input);
                let at = input.scalar("total_weighted_collateral_score");
                Some(safe(|| stats::forecast(at, &known_y, &known_x, Coercion::Lenient)).or_zero())
            },
        )
        .deps(regression_deps())
        .deps([PathTemplate::scalar("total_weighted_collateral_score")])
        .normalize(round2),
        regression_rule("coefficient_of_determination", stats::rsq),
        regression_rule("standard_error", stats::steyx),
        regression_rule("slope", stats::slope),
        regression_rule("intercept", stats::intercept),
        estimate("lowest_estimate", -1.0),
        estimate("highest_estimate", 1.0),
    ]
}
