//! End-to-end behaviour of a Weighted Quality Score worksheet: rows and survey columns are
//! edited through the public worksheet API and the settled form is read back.

mod common {
    use price_analysis::config::EngineConfig;
    use price_analysis::valuation::survey::codes;
    use price_analysis::valuation::{ComparableSurvey, PricingMethod, PropertyProfile, Worksheet};
    use serde_json::json;

    pub(super) fn survey(id: &str, selling_price: f64) -> ComparableSurvey {
        ComparableSurvey::new(id).with_number(codes::SELLING_PRICE, selling_price)
    }

    /// Two surveys priced 100k and 200k scored 10 and 20 on one row; the subject scores 10.
    pub(super) fn worksheet(property: PropertyProfile) -> Worksheet {
        let mut worksheet = Worksheet::new(PricingMethod::Wqs, property, None, &EngineConfig::default());
        worksheet.add_survey(survey("A", 100_000.0)).expect("survey A");
        worksheet.add_survey(survey("B", 200_000.0)).expect("survey B");
        worksheet
            .add_scoring_row(&json!({
                "factor": "location",
                "weight": 1,
                "collateral_score": 10,
                "surveys": [{ "survey_score": 10 }, { "survey_score": 20 }]
            }))
            .expect("scoring row");
        worksheet
    }
}

use price_analysis::config::EngineConfig;
use price_analysis::form::{FieldPath, FormChange, FormReader};
use price_analysis::valuation::{PricingMethod, PropertyProfile, Worksheet};
use serde_json::json;

fn scalar(field: &str) -> FieldPath {
    FieldPath::scalar(field)
}

#[test]
fn settles_the_regression_final_value() {
    let worksheet = common::worksheet(PropertyProfile::default());

    assert_eq!(worksheet.number(&scalar("final_value")), 100_000.0);
    assert_eq!(worksheet.number(&scalar("rounded_final_value")), 100_000.0);
    assert_eq!(worksheet.number(&scalar("slope")), 10_000.0);
    assert_eq!(worksheet.number(&scalar("total_weighted_survey_score")), 30.0);
    assert_eq!(
        worksheet.number(&FieldPath::item("calculations", 1, "adjusted_value")),
        200_000.0
    );
    assert!(worksheet.last_settle().is_some_and(|report| report.converged));
}

#[test]
fn recalculating_a_settled_worksheet_writes_nothing() {
    let mut worksheet = common::worksheet(PropertyProfile::default());
    let before = worksheet.form().values().clone();
    worksheet.take_changes();

    let report = worksheet.recalculate().expect("recalculates");

    assert_eq!(report.passes, 1);
    assert_eq!(report.writes, 0);
    assert!(report.converged);
    assert!(worksheet.take_changes().is_empty());
    assert_eq!(worksheet.form().values(), &before);
}

#[test]
fn an_edit_only_rewrites_the_cells_that_depend_on_it() {
    let mut worksheet = common::worksheet(PropertyProfile::default());
    worksheet
        .add_scoring_row(&json!({ "factor": "view", "weight": 3, "intensity": 4 }))
        .expect("second row");
    let weighted = FieldPath::item("scores", 1, "weighted_intensity");
    assert_eq!(worksheet.number(&weighted), 12.0);
    worksheet.take_changes();

    worksheet
        .edit(&FieldPath::item("scores", 1, "intensity"), json!(5))
        .expect("edit");

    assert_eq!(worksheet.number(&weighted), 15.0);
    assert_eq!(worksheet.number(&scalar("total_weighted_intensity")), 15.0);
    let written: Vec<FieldPath> = worksheet
        .take_changes()
        .into_iter()
        .filter_map(|change| match change {
            FormChange::Value(path) => Some(path),
            _ => None,
        })
        .collect();
    assert!(written.contains(&weighted));
    assert!(!written.contains(&FieldPath::item("scores", 0, "weighted_intensity")));
    assert!(!written.contains(&scalar("final_value")));
    assert!(worksheet.form().is_dirty(&FieldPath::item("scores", 1, "intensity")));
    assert!(!worksheet.form().is_dirty(&weighted));
}

#[test]
fn a_user_rounded_value_survives_later_recalculation() {
    let mut worksheet = common::worksheet(PropertyProfile {
        land_area: Some(2.0),
        usable_area: Some(50.0),
    });
    assert_eq!(worksheet.number(&scalar("appraisal_price")), 200_000.0);

    worksheet
        .edit(&scalar("rounded_final_value"), json!(95_000))
        .expect("user override");
    worksheet
        .edit(&FieldPath::item("scores", 0, "collateral_score"), json!(15))
        .expect("source change");

    assert_eq!(worksheet.number(&scalar("final_value")), 150_000.0);
    assert_eq!(worksheet.number(&scalar("rounded_final_value")), 95_000.0);
    assert_eq!(worksheet.number(&scalar("appraisal_price")), 190_000.0);
    assert_eq!(worksheet.number(&scalar("rounded_appraisal_price")), 190_000.0);
}

#[test]
fn clearing_a_user_rounded_value_lets_it_follow_again() {
    let mut worksheet = common::worksheet(PropertyProfile::default());
    worksheet
        .edit(&scalar("rounded_final_value"), json!(95_000))
        .expect("user override");
    worksheet
        .edit(&scalar("rounded_final_value"), json!(0))
        .expect("cleared");

    assert_eq!(worksheet.number(&scalar("rounded_final_value")), 100_000.0);
}

#[test]
fn a_lone_survey_shows_zero_instead_of_failing() {
    let mut worksheet = common::worksheet(PropertyProfile::default());
    worksheet.remove_survey("A").expect("removes A");

    assert_eq!(worksheet.survey_count(), 1);
    assert_eq!(worksheet.number(&scalar("final_value")), 0.0);
    assert_eq!(worksheet.number(&scalar("coefficient_of_determination")), 0.0);
    assert_eq!(worksheet.number(&scalar("standard_error")), 0.0);
    assert_eq!(
        worksheet.number(&FieldPath::nested("scores", 0, "surveys", 0, "survey_score")),
        20.0
    );
    assert_eq!(worksheet.summary().surveys, vec!["B".to_string()]);
}

#[test]
fn removing_a_scoring_row_recomputes_the_totals() {
    let mut worksheet = common::worksheet(PropertyProfile::default());
    worksheet
        .add_scoring_row(&json!({ "factor": "view", "weight": 3, "intensity": 4 }))
        .expect("second row");
    assert_eq!(worksheet.number(&scalar("total_weight")), 4.0);

    worksheet.remove_scoring_row(0).expect("removes first row");

    assert_eq!(worksheet.row_count(), 1);
    assert_eq!(worksheet.number(&scalar("total_weight")), 3.0);
    assert_eq!(worksheet.number(&scalar("total_weighted_collateral_score")), 0.0);
    assert_eq!(
        worksheet.number(&FieldPath::item("scores", 0, "weighted_intensity")),
        12.0
    );
    // Every survey now scores zero, so the line is flat at the mean price.
    assert_eq!(worksheet.number(&scalar("slope")), 0.0);
    assert_eq!(worksheet.number(&scalar("final_value")), 150_000.0);
    assert!(worksheet.last_settle().is_some_and(|report| report.converged));
}

#[test]
fn a_new_survey_column_gets_its_own_rules() {
    let mut worksheet = common::worksheet(PropertyProfile::default());
    let column = worksheet
        .add_survey(common::survey("C", 300_000.0))
        .expect("survey C");
    assert_eq!(column, 2);

    let score = FieldPath::nested("scores", 0, "surveys", 2, "survey_score");
    assert_eq!(worksheet.form().value(&score), Some(&json!(0)));

    worksheet.edit(&score, json!(30)).expect("scores C");

    assert_eq!(
        worksheet.number(&FieldPath::nested("scores", 0, "surveys", 2, "weighted_survey_score")),
        30.0
    );
    assert_eq!(
        worksheet.number(&FieldPath::item("calculations", 2, "total_weighted_survey_score")),
        30.0
    );
    assert_eq!(worksheet.number(&scalar("coefficient_of_determination")), 1.0);
    assert_eq!(worksheet.number(&scalar("final_value")), 100_000.0);
}

#[test]
fn surveys_with_equal_scores_read_off_the_mean_price() {
    let mut worksheet = Worksheet::new(
        PricingMethod::Wqs,
        PropertyProfile::default(),
        None,
        &EngineConfig::default(),
    );
    for (id, price) in [("A", 100_000.0), ("B", 200_000.0), ("C", 300_000.0)] {
        worksheet.add_survey(common::survey(id, price)).expect("survey");
    }
    worksheet
        .add_scoring_row(&json!({
            "factor": "location",
            "weight": 1,
            "collateral_score": 20,
            "surveys": [
                { "survey_score": 12.7 },
                { "survey_score": 12.7 },
                { "survey_score": 12.7 }
            ]
        }))
        .expect("scoring row");

    assert_eq!(worksheet.number(&scalar("slope")), 0.0);
    assert_eq!(worksheet.number(&scalar("final_value")), 200_000.0);
    assert_eq!(worksheet.number(&scalar("coefficient_of_determination")), 0.0);
    assert_eq!(worksheet.number(&scalar("rounded_final_value")), 200_000.0);
}
