//! Rate computation for counter metrics.
//!
//! The calculator only sees the current value and the previous one, if any.
//! Where the previous value comes from is the caller's concern.

/// Longest gap between samples (seconds) for which a rate is still reported.
pub const MAX_RATE_DT_SECS: f64 = 600.0;

/// Turns consecutive readings of a counter into a rate.
pub trait RateCalculator {
    /// Returns `None` when no rate can be reported for this round.
    fn rate(&self, current: f64, previous: Option<f64>) -> Option<f64>;
}

/// Compute f64 delta, returning `None` on counter regression (stats reset).
pub fn df64(curr: f64, prev: f64) -> Option<f64> {
    (curr >= prev).then_some(curr - prev)
}

/// Change per minute over a known interval.
#[derive(Debug, Clone, Copy)]
pub struct PerMinuteRate {
    elapsed_secs: f64,
}

impl PerMinuteRate {
    pub fn new(elapsed_secs: f64) -> Self {
        Self { elapsed_secs }
    }

    /// Rate between two sample timestamps (unix seconds).
    ///
    /// `prev_ts` is read back from disk and may be garbage; the difference
    /// saturates instead of overflowing.
    pub fn between(prev_ts: i64, now_ts: i64) -> Self {
        Self::new(now_ts.saturating_sub(prev_ts) as f64)
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs
    }

    /// Whether the interval is positive and no longer than [`MAX_RATE_DT_SECS`].
    pub fn in_range(&self) -> bool {
        self.elapsed_secs > 0.0 && self.elapsed_secs <= MAX_RATE_DT_SECS
    }
}

impl RateCalculator for PerMinuteRate {
    fn rate(&self, current: f64, previous: Option<f64>) -> Option<f64> {
        if !self.in_range() {
            return None;
        }
        let delta = df64(current, previous?)?;
        Some(delta * 60.0 / self.elapsed_secs)
    }
}

/// Plain difference between samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterDelta;

impl RateCalculator for CounterDelta {
    fn rate(&self, current: f64, previous: Option<f64>) -> Option<f64> {
        df64(current, previous?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_is_baseline() {
        assert_eq!(PerMinuteRate::new(60.0).rate(10.0, None), None);
        assert_eq!(CounterDelta.rate(10.0, None), None);
    }

    #[test]
    fn per_minute_rate_scales_by_interval() {
        assert_eq!(PerMinuteRate::new(60.0).rate(130.0, Some(100.0)), Some(30.0));
        assert_eq!(PerMinuteRate::new(30.0).rate(130.0, Some(100.0)), Some(60.0));
        assert_eq!(PerMinuteRate::between(1_000, 1_120).rate(20.0, Some(10.0)), Some(5.0));
    }

    #[test]
    fn counter_regression_yields_none() {
        assert_eq!(PerMinuteRate::new(60.0).rate(5.0, Some(100.0)), None);
        assert_eq!(CounterDelta.rate(5.0, Some(100.0)), None);
    }

    #[test]
    fn unchanged_counter_is_zero_rate() {
        assert_eq!(PerMinuteRate::new(60.0).rate(7.0, Some(7.0)), Some(0.0));
    }

    #[test]
    fn bad_interval_yields_none() {
        assert_eq!(PerMinuteRate::new(0.0).rate(2.0, Some(1.0)), None);
        assert_eq!(PerMinuteRate::new(-5.0).rate(2.0, Some(1.0)), None);
        assert_eq!(PerMinuteRate::new(601.0).rate(2.0, Some(1.0)), None);
        assert!(PerMinuteRate::new(600.0).rate(2.0, Some(1.0)).is_some());
    }

    #[test]
    fn extreme_timestamps_saturate() {
        let rate = PerMinuteRate::between(i64::MIN, 1_000);
        assert_eq!(rate.elapsed_secs(), i64::MAX as f64);
        assert!(!rate.in_range());
        assert_eq!(rate.rate(2.0, Some(1.0)), None);

        let rate = PerMinuteRate::between(i64::MAX, i64::MIN);
        assert_eq!(rate.elapsed_secs(), i64::MIN as f64);
        assert!(!rate.in_range());
    }

    #[test]
    fn counter_delta_is_plain_difference() {
        assert_eq!(CounterDelta.rate(42.0, Some(40.0)), Some(2.0));
    }
}
