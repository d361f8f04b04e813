pub mod outliers;
pub mod view;

pub use view::{Extent, LabeledPoint, MetricView};
