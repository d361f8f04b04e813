use crate::analysis::Extent;
use crate::data::Metric;
use crate::error::{CedearError, Result};

/// Number of steps needed to sweep a bound across the whole domain.
pub const STEPS_PER_DOMAIN: f64 = 50.0;

/// A two-handle range control over one axis of a metric's series.
///
/// Invariant: `domain.min <= lo <= hi <= domain.max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeSelector {
    domain: Extent,
    lo: f64,
    hi: f64,
}

impl RangeSelector {
    /// Selector spanning the full domain.
    pub fn new(domain: Extent) -> Self {
        Self {
            domain,
            lo: domain.min,
            hi: domain.max,
        }
    }

    /// Builds a selector for a series extent, refusing series with no rows.
    pub fn for_series(metric: Metric, extent: Option<Extent>) -> Result<Self> {
        extent
            .map(Self::new)
            .ok_or(CedearError::EmptySeries { metric })
    }

    pub fn domain(&self) -> Extent {
        self.domain
    }

    pub fn selection(&self) -> (f64, f64) {
        (self.lo, self.hi)
    }

    /// Distance moved by one step; zero for a single-valued domain.
    pub fn step(&self) -> f64 {
        self.domain.width() / STEPS_PER_DOMAIN
    }

    /// Moves the lower bound by `steps` steps, never past the domain or the upper bound.
    pub fn move_lower(&mut self, steps: i32) {
        let target = self.lo + self.step() * steps as f64;
        self.lo = target.clamp(self.domain.min, self.hi);
    }

    /// Moves the upper bound by `steps` steps, never past the domain or the lower bound.
    pub fn move_upper(&mut self, steps: i32) {
        let target = self.hi + self.step() * steps as f64;
        self.hi = target.clamp(self.lo, self.domain.max);
    }

    pub fn reset(&mut self) {
        self.lo = self.domain.min;
        self.hi = self.domain.max;
    }

    pub fn is_full(&self) -> bool {
        self.lo == self.domain.min && self.hi == self.domain.max
    }

    pub fn selected(&self) -> Extent {
        Extent {
            min: self.lo,
            max: self.hi,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.selected().contains(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(min: f64, max: f64) -> RangeSelector {
        RangeSelector::new(Extent { min, max })
    }

    #[test]
    fn test_default_selection_is_full_domain() {
        let range = selector(10.0, 60.0);
        assert_eq!(range.selection(), (10.0, 60.0));
        assert!(range.is_full());
    }

    #[test]
    fn test_empty_series_is_rejected() {
        let err = RangeSelector::for_series(Metric::Mep, None).unwrap_err();
        assert!(matches!(err, CedearError::EmptySeries { metric: Metric::Mep }));
    }

    #[test]
    fn test_bounds_never_cross_or_leave_domain() {
        let mut range = selector(0.0, 100.0);

        range.move_lower(-5);
        assert_eq!(range.selection().0, 0.0);

        range.move_lower(80);
        range.move_upper(-80);
        let (lo, hi) = range.selection();
        assert!(lo <= hi);
        assert!(lo >= 0.0 && hi <= 100.0);

        range.move_upper(500);
        assert_eq!(range.selection().1, 100.0);
    }

    #[test]
    fn test_single_valued_domain_stays_fixed() {
        let mut range = selector(7.0, 7.0);
        range.move_lower(3);
        range.move_upper(-3);
        assert_eq!(range.selection(), (7.0, 7.0));
        assert!(range.contains(7.0));
    }

    #[test]
    fn test_reset_restores_full_domain() {
        let mut range = selector(1.0, 2.0);
        range.move_lower(10);
        range.move_upper(-10);
        assert!(!range.is_full());
        let selected = range.selected();
        assert!((selected.min - 1.2).abs() < 1e-9);
        assert!((selected.max - 1.8).abs() < 1e-9);

        range.reset();
        assert!(range.is_full());
    }

    #[test]
    fn test_narrowing_never_increases_matches() {
        let values: Vec<f64> = (0..40).map(|i| (i as f64 * 7.3) % 25.0).collect();
        let mut range = selector(0.0, 25.0);
        let count = |r: &RangeSelector| values.iter().filter(|v| r.contains(**v)).count();

        let mut previous = count(&range);
        for i in 0..60 {
            if i % 2 == 0 {
                range.move_lower(1);
            } else {
                range.move_upper(-1);
            }
            let current = count(&range);
            assert!(current <= previous);
            previous = current;
        }
    }
}
