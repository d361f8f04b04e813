//! Tukey fence outlier removal.
//!
//! Quartiles are interpolated linearly between order statistics, so small
//! series still get a fence. When every value is equal the fence collapses to
//! that value and nothing is removed.

use tracing::debug;

use super::view::LabeledPoint;

/// Quantile `q` (0..=1) of `values` using linear interpolation at `(n - 1) * q`.
///
/// Returns `None` for an empty slice.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let pos = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// The closed interval `[Q1 - k*IQR, Q3 + k*IQR]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TukeyFence {
    pub lower: f64,
    pub upper: f64,
}

impl TukeyFence {
    pub fn from_values(values: &[f64], multiplier: f64) -> Option<Self> {
        let q1 = quantile(values, 0.25)?;
        let q3 = quantile(values, 0.75)?;
        let iqr = q3 - q1;

        Some(Self {
            lower: q1 - multiplier * iqr,
            upper: q3 + multiplier * iqr,
        })
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    pub fn is_degenerate(&self) -> bool {
        self.lower == self.upper
    }
}

/// Removes outliers from one metric's series using Tukey's rule.
///
/// A fence is computed separately for the `x` values and for the `y` values;
/// a point survives only when both coordinates sit inside their fence. Bounds
/// are inclusive, so a degenerate fence (all values equal) keeps every point.
///
/// # Arguments
/// * `points`: The metric's series after the liquidity gate
/// * `multiplier`: IQR multiplier `k` of the fence, 1.5 for the classic rule
///
/// # Returns
/// The surviving points in their original order; an empty input is returned as is
pub fn filter_outliers(points: Vec<LabeledPoint>, multiplier: f64) -> Vec<LabeledPoint> {
    let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.y).collect();

    let (Some(x_fence), Some(y_fence)) = (
        TukeyFence::from_values(&xs, multiplier),
        TukeyFence::from_values(&ys, multiplier),
    ) else {
        return points;
    };

    if x_fence.is_degenerate() || y_fence.is_degenerate() {
        debug!(points = points.len(), "Outlier fence collapsed to a single value");
    }

    points
        .into_iter()
        .filter(|p| x_fence.contains(p.x) && y_fence.contains(p.y))
        .collect()
}
