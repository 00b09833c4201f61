//! Sale Adjustment Grid and Direct Comparison worksheets, loaded from a JSON worksheet
//! description and from a long-format survey export respectively.

mod common {
    use std::io::Cursor;

    use price_analysis::valuation::{ComparableSurvey, SurveyImporter};

    const EXPORT: &str = "survey_id,survey_date,factor_code,data_type,value,field_decimal\n\
S-1,2022-01-15,selling_price,currency,500000,\n\
S-1,,yearly_adjustment_pct,percent,2,1\n\
S-2,2024-01-10,offering_price,currency,620000,\n\
S-2,,offering_price_adjustment_pct,percent,5,\n";

    pub(super) fn imported_surveys() -> Vec<ComparableSurvey> {
        SurveyImporter::from_reader(Cursor::new(EXPORT)).expect("valid export")
    }
}

use chrono::NaiveDate;
use price_analysis::config::EngineConfig;
use price_analysis::form::FieldPath;
use price_analysis::valuation::{
    PricingMethod, PropertyProfile, SurveyImportError, SurveyImporter, Worksheet, WorksheetSpec,
};
use serde_json::json;

#[test]
fn sale_grid_blends_surveys_by_weight() {
    let spec: WorksheetSpec = serde_json::from_value(json!({
        "method": "sale_adjustment_grid",
        "surveys": [
            { "id": "A", "factors": [
                { "factor_code": "offering_price", "data_type": "currency", "value": "1000000" }
            ]},
            { "id": "B", "factors": [
                { "factor_code": "offering_price", "data_type": "currency", "value": "2000000" }
            ]}
        ],
        "columns": [{ "weight_pct": 60 }, { "weight_pct": 40 }],
        "rows": [{
            "factor": "location",
            "surveys": [{ "adjustment_pct": 10 }, { "adjustment_pct": -5 }]
        }]
    }))
    .expect("valid spec");
    let mut worksheet = Worksheet::from_spec(spec, &EngineConfig::default()).expect("loads");

    assert_eq!(
        worksheet.number(&FieldPath::nested("adjustments", 0, "surveys", 1, "adjustment_amount")),
        -100_000.0
    );
    assert_eq!(
        worksheet.number(&FieldPath::item("calculations", 0, "net_adjusted_value")),
        1_100_000.0
    );
    assert_eq!(worksheet.number(&FieldPath::scalar("final_value")), 1_420_000.0);

    worksheet
        .edit(&FieldPath::item("calculations", 1, "weight_pct"), json!(0))
        .expect("drops B");

    assert_eq!(worksheet.number(&FieldPath::scalar("total_weight_pct")), 60.0);
    assert_eq!(worksheet.number(&FieldPath::scalar("final_value")), 1_100_000.0);
    assert_eq!(worksheet.number(&FieldPath::scalar("rounded_final_value")), 1_100_000.0);
}

#[test]
fn direct_comparison_from_an_imported_export() {
    let appraisal_date = NaiveDate::from_ymd_opt(2024, 3, 1);
    let property = PropertyProfile {
        land_area: None,
        usable_area: Some(100.0),
    };
    let mut worksheet = Worksheet::new(
        PricingMethod::DirectComparison,
        property,
        appraisal_date,
        &EngineConfig::default(),
    );
    for survey in common::imported_surveys() {
        worksheet.add_survey(survey).expect("survey column");
    }
    worksheet
        .add_scoring_row(&json!({
            "factor": "condition",
            "surveys": [{ "adjustment_amount": -20_000 }, { "adjustment_amount": 11_000 }]
        }))
        .expect("adjustment row");

    assert_eq!(
        worksheet.number(&FieldPath::item("calculations", 0, "number_of_years")),
        2.0
    );
    assert_eq!(
        worksheet.number(&FieldPath::item("calculations", 0, "adjusted_value")),
        520_000.0
    );
    assert_eq!(
        worksheet.number(&FieldPath::item("calculations", 1, "adjusted_value")),
        589_000.0
    );
    assert_eq!(worksheet.number(&FieldPath::scalar("final_value")), 550_000.0);
    assert_eq!(worksheet.number(&FieldPath::scalar("appraisal_price")), 55_000_000.0);
    assert_eq!(
        worksheet.number(&FieldPath::scalar("rounded_appraisal_price")),
        55_000_000.0
    );

    let summary = worksheet.summary();
    assert_eq!(summary.surveys, vec!["S-1".to_string(), "S-2".to_string()]);
    assert_eq!(summary.results.get("final_value"), Some(&550_000.0));
}

#[test]
fn unknown_factor_types_fail_the_import() {
    let export = "survey_id,survey_date,factor_code,data_type,value,field_decimal\n\
S-1,,road_access,hologram,Paved,\n";
    let err = SurveyImporter::from_reader(export.as_bytes()).expect_err("rejects hologram");
    assert!(matches!(
        err,
        SurveyImportError::UnknownDataType { ref factor_code, .. } if factor_code == "road_access"
    ));
}
