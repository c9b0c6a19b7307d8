use std::fmt;

use chrono::Utc;

/// Wall-clock instant in nanoseconds since the Unix epoch, as carried in the
/// sequence header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp(pub u64);

/// Signed difference between two timestamps, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Delay(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        // Outside chrono's representable range (~year 2262) the clock reads as zero.
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        Timestamp(u64::try_from(nanos).unwrap_or(0))
    }

    pub fn as_nanos(self) -> u64 {
        self.0
    }

    /// How long after `earlier` this instant is. Negative when the clocks disagree.
    pub fn delay_since(self, earlier: Timestamp) -> Delay {
        let diff = i128::from(self.0) - i128::from(earlier.0);
        Delay(diff.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64)
    }
}

impl Delay {
    pub fn as_micros(self) -> i64 {
        self.0 / 1_000
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

impl fmt::Display for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.as_micros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_is_signed() {
        let a = Timestamp(5_000);
        let b = Timestamp(2_000);
        assert_eq!(a.delay_since(b), Delay(3_000));
        assert_eq!(b.delay_since(a), Delay(-3_000));
        assert_eq!(a.delay_since(b).as_micros(), 3);
    }

    #[test]
    fn now_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(Timestamp::now().as_nanos() > 1_577_836_800_000_000_000);
    }
}
