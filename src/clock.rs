//! Two-field virtual clock arithmetic.
//!
//! The simulation never reads a real timer: every component works against a
//! `(seconds, nanoseconds)` pair that the engine advances explicitly. The
//! nanosecond field always stays in `[0, 1e9)`; every increment carries into
//! the seconds field. A clock value is never decremented in place —
//! [`VirtualClock::duration_since`] produces a new value and fails on a
//! would-be-negative result.

use std::fmt;

use anyhow::{bail, Result};
use rand::Rng;

use crate::types::TimeNs;

/// Nanoseconds in one second.
pub const NANOS_PER_SEC: u32 = 1_000_000_000;

/// A point on (or span of) the simulated timeline.
///
/// Ordering is lexicographic: seconds first, then nanoseconds. The derive
/// relies on the field order below.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualClock {
    seconds: u32,
    nanoseconds: u32,
}

impl VirtualClock {
    /// The zero clock: zero seconds, zero nanoseconds.
    pub fn zero() -> Self {
        VirtualClock::default()
    }

    /// Build a clock from explicit parts, carrying excess nanoseconds into
    /// the seconds field.
    pub fn from_parts(seconds: u32, nanoseconds: u32) -> Self {
        VirtualClock {
            seconds: seconds + nanoseconds / NANOS_PER_SEC,
            nanoseconds: nanoseconds % NANOS_PER_SEC,
        }
    }

    /// Build a clock from a flat nanosecond count.
    pub fn from_nanos(ns: TimeNs) -> Self {
        VirtualClock {
            seconds: (ns / TimeNs::from(NANOS_PER_SEC)) as u32,
            nanoseconds: (ns % TimeNs::from(NANOS_PER_SEC)) as u32,
        }
    }

    pub fn seconds(self) -> u32 {
        self.seconds
    }

    pub fn nanoseconds(self) -> u32 {
        self.nanoseconds
    }

    pub fn is_zero(self) -> bool {
        self == VirtualClock::zero()
    }

    /// Add an increment in place, carrying nanoseconds into seconds.
    pub fn advance(&mut self, increment: VirtualClock) {
        self.seconds += increment.seconds;
        let ns = self.nanoseconds + increment.nanoseconds;
        self.seconds += ns / NANOS_PER_SEC;
        self.nanoseconds = ns % NANOS_PER_SEC;
    }

    /// The sum of two clock values.
    pub fn sum(a: VirtualClock, b: VirtualClock) -> VirtualClock {
        let mut c = a;
        c.advance(b);
        c
    }

    /// Elapsed time from `earlier` to `self`.
    ///
    /// Fails when `self < earlier`: the timeline only moves forward, so a
    /// negative difference means a caller invariant was broken.
    pub fn duration_since(self, earlier: VirtualClock) -> Result<VirtualClock> {
        if self < earlier {
            bail!("clock difference would be negative: {self} < {earlier}");
        }
        let mut seconds = self.seconds - earlier.seconds;
        let nanoseconds = if self.nanoseconds >= earlier.nanoseconds {
            self.nanoseconds - earlier.nanoseconds
        } else {
            seconds -= 1;
            NANOS_PER_SEC - (earlier.nanoseconds - self.nanoseconds)
        };
        Ok(VirtualClock {
            seconds,
            nanoseconds,
        })
    }

    /// This clock expressed as fractional seconds.
    pub fn as_secs_f64(self) -> f64 {
        f64::from(self.seconds) + f64::from(self.nanoseconds) / f64::from(NANOS_PER_SEC)
    }

    /// `self / denominator` as fractional seconds. A zero denominator is a
    /// caller error.
    pub fn ratio(self, denominator: VirtualClock) -> Result<f64> {
        if denominator.is_zero() {
            bail!("clock ratio with zero denominator");
        }
        Ok(self.as_secs_f64() / denominator.as_secs_f64())
    }

    /// Draw a uniform clock value in `[min, max]`.
    ///
    /// The two-field representation forces an asymmetric draw: when the
    /// seconds bounds coincide, only the nanosecond sub-range is sampled;
    /// otherwise the seconds field is drawn first, and the nanosecond field
    /// gets the sub-range belonging to whichever boundary second came up,
    /// with a full `[0, 1e9)` draw for interior seconds.
    pub fn random_in_range<R: Rng>(rng: &mut R, min: VirtualClock, max: VirtualClock) -> Self {
        debug_assert!(min <= max, "random_in_range with inverted bounds");
        if min.seconds == max.seconds {
            return VirtualClock {
                seconds: min.seconds,
                nanoseconds: rng.gen_range(min.nanoseconds..=max.nanoseconds),
            };
        }
        let seconds = rng.gen_range(min.seconds..=max.seconds);
        let nanoseconds = if seconds == min.seconds {
            rng.gen_range(min.nanoseconds..NANOS_PER_SEC)
        } else if seconds == max.seconds {
            rng.gen_range(0..=max.nanoseconds)
        } else {
            rng.gen_range(0..NANOS_PER_SEC)
        };
        VirtualClock {
            seconds,
            nanoseconds,
        }
    }
}

impl fmt::Display for VirtualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03} : {:09}", self.seconds, self.nanoseconds)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_add_carries_nanoseconds() {
        let mut clock = VirtualClock::from_parts(1, 999_999_999);
        clock.advance(VirtualClock::from_parts(0, 2));
        assert_eq!(clock, VirtualClock::from_parts(2, 1));
        assert!(clock.nanoseconds() < NANOS_PER_SEC);
    }

    #[test]
    fn test_from_parts_normalizes() {
        let clock = VirtualClock::from_parts(0, 2_500_000_000);
        assert_eq!(clock.seconds(), 2);
        assert_eq!(clock.nanoseconds(), 500_000_000);
    }

    #[test]
    fn test_add_sub_round_trip() {
        let a = VirtualClock::from_parts(3, 700_000_000);
        let b = VirtualClock::from_parts(1, 600_000_000);
        let sum = VirtualClock::sum(a, b);
        assert!(sum >= a);
        assert_eq!(sum.duration_since(a).unwrap(), b);
        assert_eq!(sum.duration_since(b).unwrap(), a);
    }

    #[test]
    fn test_duration_since_borrows() {
        let a = VirtualClock::from_parts(2, 100);
        let b = VirtualClock::from_parts(1, 200);
        assert_eq!(
            a.duration_since(b).unwrap(),
            VirtualClock::from_parts(0, 999_999_900)
        );
    }

    #[test]
    fn test_duration_since_negative_is_error() {
        let a = VirtualClock::from_parts(1, 0);
        let b = VirtualClock::from_parts(1, 1);
        assert!(a.duration_since(b).is_err());
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let a = VirtualClock::from_parts(1, 999_999_999);
        let b = VirtualClock::from_parts(2, 0);
        assert!(a < b);
        assert_eq!(a, VirtualClock::from_parts(1, 999_999_999));
        assert!(VirtualClock::from_parts(2, 1) > b);
    }

    #[test]
    fn test_ratio() {
        let num = VirtualClock::from_parts(1, 0);
        let den = VirtualClock::from_parts(4, 0);
        assert_eq!(num.ratio(den).unwrap(), 0.25);
        assert!(num.ratio(VirtualClock::zero()).is_err());
    }

    #[test]
    fn test_random_in_range_equal_seconds() {
        let mut rng = SmallRng::seed_from_u64(7);
        let min = VirtualClock::from_parts(5, 100);
        let max = VirtualClock::from_parts(5, 200);
        for _ in 0..100 {
            let v = VirtualClock::random_in_range(&mut rng, min, max);
            assert_eq!(v.seconds(), 5);
            assert!(v >= min && v <= max);
        }
    }

    #[test]
    fn test_random_in_range_spanning_seconds() {
        let mut rng = SmallRng::seed_from_u64(7);
        let min = VirtualClock::from_parts(1, 900_000_000);
        let max = VirtualClock::from_parts(3, 100_000_000);
        for _ in 0..500 {
            let v = VirtualClock::random_in_range(&mut rng, min, max);
            assert!(v >= min && v <= max, "draw {v} outside [{min}, {max}]");
            assert!(v.nanoseconds() < NANOS_PER_SEC);
        }
    }

    #[test]
    fn test_random_in_range_degenerate() {
        let mut rng = SmallRng::seed_from_u64(7);
        let only = VirtualClock::from_parts(2, 42);
        assert_eq!(VirtualClock::random_in_range(&mut rng, only, only), only);
    }

    #[test]
    fn test_display_format() {
        assert_eq!(VirtualClock::zero().to_string(), "000 : 000000000");
        assert_eq!(
            VirtualClock::from_parts(7, 1_234).to_string(),
            "007 : 000001234"
        );
    }
}
