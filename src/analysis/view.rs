use serde::{Deserialize, Serialize};
use tracing::info;

use super::outliers::filter_outliers;
use crate::data::{DerivedRow, Metric};

/// One scatter point, labelled with the ticker shown on hover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledPoint {
    pub label: String,
    pub x: f64,
    pub y: f64,
}

/// Closed numeric interval, used both for a series' extrema and for a
/// range selection over it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min: f64,
    pub max: f64,
}

impl Extent {
    pub fn of(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values.into_iter().fold(None, |acc, v| match acc {
            None => Some(Self { min: v, max: v }),
            Some(e) => Some(Self {
                min: e.min.min(v),
                max: e.max.max(v),
            }),
        })
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// The filtered series for one metric, ready to be drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricView {
    pub metric: Metric,
    pub points: Vec<LabeledPoint>,
}

impl MetricView {
    /// Projects the gated rows onto `metric` and trims outliers on both axes.
    ///
    /// # Arguments
    /// * `metric`: Which of the three derived points to take from each row
    /// * `rows`: Rows that passed the completeness filter and the liquidity gate
    /// * `iqr_multiplier`: Multiplier handed to `filter_outliers`
    ///
    /// # Returns
    /// A view whose points are labelled with the metric's hover ticker
    pub fn build(metric: Metric, rows: &[DerivedRow], iqr_multiplier: f64) -> Self {
        let points: Vec<LabeledPoint> = rows
            .iter()
            .map(|row| {
                let p = row.point(metric);
                LabeledPoint {
                    label: metric.label(&row.mapping).to_string(),
                    x: p.x,
                    y: p.y,
                }
            })
            .collect();

        let before = points.len();
        let points = filter_outliers(points, iqr_multiplier);
        info!(%metric, before, after = points.len(), "Removed outliers");

        Self { metric, points }
    }

    pub fn x_extent(&self) -> Option<Extent> {
        Extent::of(self.points.iter().map(|p| p.x))
    }

    pub fn y_extent(&self) -> Option<Extent> {
        Extent::of(self.points.iter().map(|p| p.y))
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
