//! Millisecond time types.
//!
//! All protocol timing is driven by a monotonic millisecond clock supplied
//! by the host. Wrapping the raw counter in newtypes keeps instants and
//! spans from being mixed, and lets tests and the simulator run on a
//! virtual clock.

use core::ops::{Add, AddAssign, Sub};

/// A point on the host's monotonic millisecond clock.
///
/// The epoch is arbitrary (usually boot time); only differences matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Timestamp(ms)
    }

    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Span since `earlier`, zero if `earlier` is in the future.
    #[inline]
    pub const fn saturating_since(self, earlier: Timestamp) -> Duration {
        Duration(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign<Duration> for Timestamp {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Timestamp) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

/// A span of milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(u64);

impl Duration {
    pub const ZERO: Duration = Duration(0);

    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Duration(ms)
    }

    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Duration(secs.saturating_mul(1000))
    }

    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn saturating_mul(self, n: u64) -> Self {
        Duration(self.0.saturating_mul(n))
    }

    #[inline]
    pub const fn max(self, other: Duration) -> Self {
        if self.0 >= other.0 {
            self
        } else {
            other
        }
    }
}

impl Add for Duration {
    type Output = Duration;

    #[inline]
    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0.saturating_add(rhs.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_arithmetic() {
        let t = Timestamp::from_millis(1000);
        assert_eq!((t + Duration::from_secs(2)).as_millis(), 3000);
        assert_eq!(Timestamp::from_millis(5000) - t, Duration::from_secs(4));
    }

    #[test]
    fn saturating_since_clamps_to_zero() {
        let early = Timestamp::from_millis(100);
        let late = Timestamp::from_millis(400);
        assert_eq!(late.saturating_since(early), Duration::from_millis(300));
        assert_eq!(early.saturating_since(late), Duration::ZERO);
    }

    #[test]
    fn duration_scaling() {
        let d = Duration::from_millis(1500);
        assert_eq!(d.saturating_mul(4).as_millis(), 6000);
        assert_eq!(d.max(Duration::from_secs(1)), d);
        assert_eq!(Duration::from_secs(1).max(d), d);
    }
}
