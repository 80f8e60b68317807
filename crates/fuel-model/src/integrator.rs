//! Incremental trapezoidal integration over irregular sample times

use serde::Serialize;

/// What a single `step` did
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Step {
    /// First sample (or first after a break): nothing to integrate yet
    Baseline,
    /// Area added by this step, in value·seconds
    Integrated(f64),
    /// No usable value: baseline dropped, nothing added
    Missing,
    /// Timestamp did not move forward: skipped and re-baselined
    Discontinuity,
    /// Interval longer than the allowed gap: skipped and re-baselined
    Gap,
}

/// Running trapezoidal integral of a sampled rate.
///
/// The accumulated total is in `value × seconds`. It only ever grows by
/// `0.5 * (prev + now) * dt` with `dt > 0` and both samples finite and
/// non-negative.
#[derive(Debug, Clone, Default)]
pub struct TrapezoidIntegrator {
    prev: Option<(u64, f64)>,
    total: f64,
}

impl TrapezoidIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulated area in value·seconds
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Forget the previous sample; the next step only sets a baseline
    pub fn reset_baseline(&mut self) {
        self.prev = None;
    }

    /// Feed the sample taken at `t_ms`.
    ///
    /// `max_gap_ms` of `None` disables the gap guard.
    pub fn step(&mut self, t_ms: u64, value: Option<f64>, max_gap_ms: Option<u64>) -> Step {
        let Some(value) = value.filter(|v| v.is_finite() && *v >= 0.0) else {
            self.prev = None;
            return Step::Missing;
        };

        let Some((prev_t, prev_value)) = self.prev.replace((t_ms, value)) else {
            return Step::Baseline;
        };

        if t_ms <= prev_t {
            return Step::Discontinuity;
        }

        let dt_ms = t_ms - prev_t;
        if max_gap_ms.is_some_and(|gap| dt_ms > gap) {
            return Step::Gap;
        }

        let increment = 0.5 * (prev_value + value) * (dt_ms as f64 / 1000.0);
        self.total += increment;
        Step::Integrated(increment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_samples_make_one_trapezoid() {
        // 5 at t=0 s, 7 at t=2 s: 0.5 * (5 + 7) * 2 = 12
        let mut integ = TrapezoidIntegrator::new();
        assert_eq!(integ.step(0, Some(5.0), None), Step::Baseline);
        assert_eq!(integ.step(2_000, Some(7.0), None), Step::Integrated(12.0));
        assert_eq!(integ.total(), 12.0);
    }

    #[test]
    fn test_constant_rate_is_exact() {
        let mut integ = TrapezoidIntegrator::new();
        integ.step(1_000, Some(3.5), None);
        integ.step(9_000, Some(3.5), None);
        assert_eq!(integ.total(), 3.5 * 8.0);
    }

    #[test]
    fn test_backward_time_is_skipped_and_rebaselined() {
        let mut integ = TrapezoidIntegrator::new();
        integ.step(5_000, Some(10.0), None);
        integ.step(6_000, Some(10.0), None);
        let before = integ.total();

        assert_eq!(integ.step(4_000, Some(10.0), None), Step::Discontinuity);
        assert_eq!(integ.step(4_000, Some(10.0), None), Step::Discontinuity);
        assert_eq!(integ.total(), before);

        // Integrates again from the new baseline at 4 s
        assert_eq!(integ.step(5_000, Some(10.0), None), Step::Integrated(10.0));
    }

    #[test]
    fn test_missing_value_breaks_the_baseline() {
        let mut integ = TrapezoidIntegrator::new();
        integ.step(0, Some(4.0), None);
        assert_eq!(integ.step(1_000, None, None), Step::Missing);
        assert_eq!(integ.step(2_000, Some(4.0), None), Step::Baseline);
        assert_eq!(integ.total(), 0.0);
    }

    #[test]
    fn test_nan_and_negative_are_missing() {
        let mut integ = TrapezoidIntegrator::new();
        integ.step(0, Some(4.0), None);
        assert_eq!(integ.step(1_000, Some(f64::NAN), None), Step::Missing);
        assert_eq!(integ.step(2_000, Some(-1.0), None), Step::Missing);
        assert_eq!(integ.total(), 0.0);
    }

    #[test]
    fn test_gap_guard() {
        let mut integ = TrapezoidIntegrator::new();
        integ.step(0, Some(4.0), Some(5_000));
        assert_eq!(integ.step(6_000, Some(4.0), Some(5_000)), Step::Gap);
        assert_eq!(
            integ.step(7_000, Some(4.0), Some(5_000)),
            Step::Integrated(4.0)
        );
    }
}
