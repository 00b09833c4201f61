//! Regression statistics over form-shaped JSON input.

use price_analysis::stats::{
    forecast, intercept, rsq, safe, samples, slope, steyx, Coercion, StatValue, StatsError,
};
use serde_json::json;

#[test]
fn blanks_drop_the_whole_pair() {
    let known_y = samples(&json!([100, null, 200, 999]));
    let known_x = samples(&json!([10, 5, 20, ""]));

    assert_eq!(forecast(15.0, &known_y, &known_x, Coercion::Lenient), Ok(150.0));
    assert_eq!(slope(&known_y, &known_x, Coercion::Lenient), Ok(10.0));
    assert_eq!(intercept(&known_y, &known_x, Coercion::Lenient), Ok(0.0));
}

#[test]
fn two_dimensional_ranges_flatten_row_major() {
    let known_y = samples(&json!([[100, 200], [300, null]]));
    let known_x = samples(&json!([[10, 20], [30, 40]]));

    assert_eq!(slope(&known_y, &known_x, Coercion::Lenient), Ok(10.0));
    assert_eq!(rsq(&known_y, &known_x, Coercion::Lenient), Ok(1.0));
    assert_eq!(steyx(&known_y, &known_x, Coercion::Lenient), Ok(0.0));
}

#[test]
fn under_determined_inputs_follow_the_spreadsheet_defaults() {
    let known_y = samples(&json!([100]));
    let known_x = samples(&json!([10]));

    assert_eq!(slope(&known_y, &known_x, Coercion::Lenient), Ok(0.0));
    assert_eq!(intercept(&known_y, &known_x, Coercion::Lenient), Ok(0.0));
    assert_eq!(rsq(&known_y, &known_x, Coercion::Lenient), Err(StatsError::DivZero));
    assert_eq!(
        safe(|| steyx(&known_y, &known_x, Coercion::Lenient)),
        StatValue::Error(StatsError::DivZero)
    );
    assert_eq!(safe(|| rsq(&known_y, &known_x, Coercion::Lenient)).or_zero(), 0.0);
}

#[test]
fn text_and_length_mismatches_are_typed_errors() {
    let known_y = samples(&json!(["1,000", 2000]));
    let known_x = samples(&json!([1, 2]));
    assert_eq!(slope(&known_y, &known_x, Coercion::Lenient), Ok(1000.0));
    assert_eq!(
        slope(&known_y, &known_x, Coercion::Strict),
        Err(StatsError::Value)
    );
    assert_eq!(
        forecast(1.0, &known_y, &samples(&json!([1])), Coercion::Lenient),
        Err(StatsError::NotAvailable)
    );
    assert_eq!(
        slope(&samples(&json!([true, 2])), &known_x, Coercion::Lenient),
        Err(StatsError::Value)
    );
}
