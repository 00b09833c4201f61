use super::{Coercion, Sample, StatsError};

/// Centred moments of the pairs that survived blank filtering.
///
/// Deviations are taken from the means in a second pass, so a side whose values are all
/// identical has a spread of exactly zero.
#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    n: usize,
    mean_x: f64,
    mean_y: f64,
    sxx: f64,
    syy: f64,
    sxy: f64,
}

impl Moments {
    fn from_points(points: &[(f64, f64)]) -> Self {
        let n = points.len();
        if n == 0 {
            return Self::default();
        }
        let count = n as f64;
        let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / count;
        let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / count;
        let constant_x = points.iter().all(|(x, _)| *x == points[0].0);
        let constant_y = points.iter().all(|(_, y)| *y == points[0].1);

        let mut moments = Self {
            n,
            mean_x,
            mean_y,
            ..Self::default()
        };
        for (x, y) in points {
            let dx = if constant_x { 0.0 } else { x - mean_x };
            let dy = if constant_y { 0.0 } else { y - mean_y };
            moments.sxx += dx * dx;
            moments.syy += dy * dy;
            moments.sxy += dx * dy;
        }
        moments
    }

    /// Zero when fewer than two pairs or every x is identical.
    fn slope(&self) -> f64 {
        if self.n < 2 || self.sxx == 0.0 {
            return 0.0;
        }
        self.sxy / self.sxx
    }

    fn intercept(&self) -> f64 {
        if self.n < 2 {
            return 0.0;
        }
        self.mean_y - self.slope() * self.mean_x
    }
}

struct Pairs {
    points: Vec<(f64, f64)>,
    moments: Moments,
}

fn collect_pairs(
    known_y: &[Sample],
    known_x: &[Sample],
    coercion: Coercion,
) -> Result<Pairs, StatsError> {
    if known_y.len() != known_x.len() {
        return Err(StatsError::NotAvailable);
    }

    let mut points = Vec::with_capacity(known_y.len());
    for (y, x) in known_y.iter().zip(known_x) {
        if y.is_blank() || x.is_blank() {
            continue;
        }
        points.push((coercion.number(x)?, coercion.number(y)?));
    }

    let moments = Moments::from_points(&points);
    Ok(Pairs { points, moments })
}

/// Slope of the least-squares line through the paired samples.
///
/// # Remarks
/// - Returns `0` with fewer than two usable pairs or when all `x` are identical.
/// - Returns `#N/A` when the sequences differ in length.
pub fn slope(known_y: &[Sample], known_x: &[Sample], coercion: Coercion) -> Result<f64, StatsError> {
    Ok(collect_pairs(known_y, known_x, coercion)?.moments.slope())
}

/// `ȳ − slope·x̄`; `0` with fewer than two usable pairs.
pub fn intercept(
    known_y: &[Sample],
    known_x: &[Sample],
    coercion: Coercion,
) -> Result<f64, StatsError> {
    Ok(collect_pairs(known_y, known_x, coercion)?.moments.intercept())
}

/// Square of the Pearson correlation of the paired samples.
///
/// # Remarks
/// - Returns `#DIV/0!` with fewer than two usable pairs or when either side has no spread.
pub fn rsq(known_y: &[Sample], known_x: &[Sample], coercion: Coercion) -> Result<f64, StatsError> {
    let moments = collect_pairs(known_y, known_x, coercion)?.moments;
    if moments.n < 2 {
        return Err(StatsError::DivZero);
    }
    let denom = moments.sxx * moments.syy;
    if denom == 0.0 {
        return Err(StatsError::DivZero);
    }
    Ok(moments.sxy * moments.sxy / denom)
}

/// Standard error of the predicted `y` for each `x`, using the SLOPE/INTERCEPT fit.
///
/// # Remarks
/// - Returns `#DIV/0!` with fewer than three usable pairs.
pub fn steyx(known_y: &[Sample], known_x: &[Sample], coercion: Coercion) -> Result<f64, StatsError> {
    let pairs = collect_pairs(known_y, known_x, coercion)?;
    if pairs.moments.n < 3 {
        return Err(StatsError::DivZero);
    }
    let m = pairs.moments.slope();
    let b = pairs.moments.intercept();
    let residual: f64 = pairs
        .points
        .iter()
        .map(|(x, y)| {
            let diff = y - (b + m * x);
            diff * diff
        })
        .sum();
    Ok((residual / (pairs.moments.n as f64 - 2.0)).sqrt())
}

/// Predicts `y` at `x` from the linear fit of the paired samples.
pub fn forecast(
    x: f64,
    known_y: &[Sample],
    known_x: &[Sample],
    coercion: Coercion,
) -> Result<f64, StatsError> {
    if !x.is_finite() {
        return Err(StatsError::Value);
    }
    let moments = collect_pairs(known_y, known_x, coercion)?.moments;
    Ok(moments.intercept() + moments.slope() * x)
}
