//! Spreadsheet-compatible regression statistics.
//!
//! Every function takes `known_y` and `known_x` as flattened sample sequences of equal length.
//! A pair is dropped entirely when either side is blank; it is never read as zero. Text is
//! coerced in [`Coercion::Lenient`] mode and rejected with `#VALUE!` in [`Coercion::Strict`]
//! mode; booleans are always `#VALUE!`.

mod regression;

pub use regression::{forecast, intercept, rsq, slope, steyx};

use serde::{Serialize, Serializer};
use serde_json::Value;

/// One entry of a `known_y`/`known_x` sequence as the host form stores it.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    Blank,
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Sample {
    pub fn is_blank(&self) -> bool {
        match self {
            Sample::Blank => true,
            Sample::Text(text) => text.is_empty(),
            _ => false,
        }
    }
}

impl From<f64> for Sample {
    fn from(value: f64) -> Self {
        Sample::Number(value)
    }
}

impl From<Option<f64>> for Sample {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Sample::Blank, Sample::Number)
    }
}

impl From<&str> for Sample {
    fn from(value: &str) -> Self {
        Sample::Text(value.to_string())
    }
}

impl From<bool> for Sample {
    fn from(value: bool) -> Self {
        Sample::Bool(value)
    }
}

impl From<&Value> for Sample {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Sample::Blank,
            Value::Bool(flag) => Sample::Bool(*flag),
            Value::Number(number) => number.as_f64().map_or(Sample::Blank, Sample::Number),
            Value::String(text) => Sample::Text(text.clone()),
            // Nested containers reach this point only through `samples`, which flattens them.
            Value::Array(_) | Value::Object(_) => Sample::Text(value.to_string()),
        }
    }
}

/// Flattens a 1-D or 2-D JSON array row-major into samples. A scalar becomes one sample.
pub fn samples(value: &Value) -> Vec<Sample> {
    let mut out = Vec::new();
    push_flattened(value, &mut out);
    out
}

fn push_flattened(value: &Value, out: &mut Vec<Sample>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| push_flattened(item, out)),
        other => out.push(Sample::from(other)),
    }
}

/// Row-major flattening for 2-D inputs built in code.
pub fn flatten<T>(rows: &[Vec<T>]) -> Vec<Sample>
where
    T: Clone + Into<Sample>,
{
    rows.iter()
        .flat_map(|row| row.iter().cloned().map(Into::into))
        .collect()
}

/// Spreadsheet error values raised by the statistics functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StatsError {
    #[error("#DIV/0!")]
    DivZero,
    #[error("#N/A")]
    NotAvailable,
    #[error("#VALUE!")]
    Value,
}

impl StatsError {
    pub const fn code(self) -> &'static str {
        match self {
            StatsError::DivZero => "#DIV/0!",
            StatsError::NotAvailable => "#N/A",
            StatsError::Value => "#VALUE!",
        }
    }
}

impl Serialize for StatsError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

/// How non-blank text entries are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coercion {
    /// Numeric text parses; other text reads as zero.
    #[default]
    Lenient,
    /// Any text is `#VALUE!`.
    Strict,
}

impl Coercion {
    pub(crate) fn number(self, sample: &Sample) -> Result<f64, StatsError> {
        match sample {
            Sample::Number(value) if value.is_finite() => Ok(*value),
            Sample::Number(_) => Err(StatsError::Value),
            Sample::Bool(_) => Err(StatsError::Value),
            Sample::Text(_) if self == Coercion::Strict => Err(StatsError::Value),
            Sample::Text(text) => Ok(text
                .trim()
                .replace(',', "")
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .unwrap_or(0.0)),
            Sample::Blank => Ok(0.0),
        }
    }
}

/// Result of a statistics call that has been made non-throwing with [`safe`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatValue {
    Number(f64),
    Error(StatsError),
}

impl StatValue {
    pub fn is_error(&self) -> bool {
        matches!(self, StatValue::Error(_))
    }

    /// Insufficient data reads as zero in the worksheets.
    pub fn or_zero(self) -> f64 {
        match self {
            StatValue::Number(value) => value,
            StatValue::Error(_) => 0.0,
        }
    }
}

impl From<Result<f64, StatsError>> for StatValue {
    fn from(result: Result<f64, StatsError>) -> Self {
        match result {
            Ok(value) => StatValue::Number(value),
            Err(err) => StatValue::Error(err),
        }
    }
}

/// Runs a statistics call and hands any spreadsheet error back as a value.
pub fn safe<F>(call: F) -> StatValue
where
    F: FnOnce() -> Result<f64, StatsError>,
{
    StatValue::from(call())
}
