//! Physical units with type safety.
//!
//! These newtypes keep timing quantities from being mixed up with raw
//! sample counts when talking to native models.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Div;

/// Time duration in seconds.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Seconds(pub f64);

impl Seconds {
    pub const ZERO: Self = Self(0.0);

    #[inline]
    pub fn from_ps(ps: f64) -> Self {
        Self(ps * 1e-12)
    }

    #[inline]
    pub fn as_ps(&self) -> f64 {
        self.0 * 1e12
    }

    /// True for finite, strictly positive durations.
    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_finite() && self.0 > 0.0
    }

    /// Whole number of `interval`s that fit in this duration, rounded to
    /// the nearest integer.
    ///
    /// Used to derive samples-per-bit from a bit time and a sample
    /// interval. Returns `None` if `interval` is not positive.
    pub fn whole_multiple_of(&self, interval: Seconds) -> Option<usize> {
        if !interval.is_positive() || !self.0.is_finite() || self.0 < 0.0 {
            return None;
        }
        Some((*self / interval).round() as usize)
    }
}

impl fmt::Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 != 0.0 && self.0.abs() < 1e-6 {
            write!(f, "{} ps", self.as_ps())
        } else {
            write!(f, "{} s", self.0)
        }
    }
}

impl Div<Seconds> for Seconds {
    type Output = f64;
    fn div(self, rhs: Seconds) -> f64 {
        self.0 / rhs.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_conversions() {
        let t = Seconds::from_ps(100.0);
        assert!((t.as_ps() - 100.0).abs() < 1e-9);
        assert_eq!(format!("{t}"), format!("{} ps", t.as_ps()));
        assert!((t / Seconds::from_ps(25.0) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_whole_multiple() {
        let ui = Seconds::from_ps(100.0);
        let ts = Seconds::from_ps(3.125);
        assert_eq!(ui.whole_multiple_of(ts), Some(32));
        assert_eq!(ui.whole_multiple_of(Seconds::ZERO), None);
    }

    #[test]
    fn test_is_positive() {
        assert!(Seconds(1e-12).is_positive());
        assert!(!Seconds(0.0).is_positive());
        assert!(!Seconds(f64::NAN).is_positive());
    }
}
