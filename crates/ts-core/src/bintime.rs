//! 64.64 fixed-point time representation and conversions.
//!
//! A [`Bintime`] is a pair `(sec, frac)` representing `sec + frac / 2^64`
//! seconds. `frac` is always held in `[0, 2^64)`; negative durations use the
//! borrow form (`sec = -1, frac = 0.75 * 2^64` is `-0.25` seconds), mirroring
//! FreeBSD's `struct bintime` that the original timesync core was built on.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Shl, Shr, Sub};
use std::time::Duration;

const NS_PER_SEC: i64 = 1_000_000_000;
const US_PER_SEC: i64 = 1_000_000;
/// `2^64 / ns_per_sec`, used to convert a nanosecond count into `frac`.
const NS_TO_FRAC_SCALAR: u64 = 18_446_744_073;
/// `2^64 / us_per_sec`, used to convert a microsecond count into `frac`.
const US_TO_FRAC_SCALAR: u64 = 18_446_744_073_709;

/// A plain POSIX `timespec`-shaped pair, independent of any platform crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpec {
    pub sec: i64,
    pub nsec: i64,
}

/// A plain POSIX `timeval`-shaped pair, independent of any platform crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeVal {
    pub sec: i64,
    pub usec: i64,
}

/// A 64.64 fixed-point time value: `sec + frac / 2^64` seconds.
///
/// `Ord`/`PartialOrd` are derived field-by-field (`sec` first, `frac`
/// second), which is exactly the lexicographic comparison the original
/// defines explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Bintime {
    pub sec: i64,
    pub frac: u64,
}

impl Bintime {
    pub const fn zero() -> Self {
        Bintime { sec: 0, frac: 0 }
    }

    pub fn new(sec: i64, frac: u64) -> Self {
        Bintime { sec, frac }
    }

    /// View this value as a signed 128-bit count of `2^-64` second units.
    /// `sec` occupies the high 64 bits (sign-extended), `frac` the low 64.
    fn as_i128(self) -> i128 {
        ((self.sec as i128) << 64) | (self.frac as i128)
    }

    /// Reconstruct a `Bintime` from a signed 128-bit unit count, flooring so
    /// `frac` always lands in `[0, 2^64)`.
    fn from_i128(total: i128) -> Self {
        let sec = total.div_euclid(1i128 << 64) as i64;
        let frac = total.rem_euclid(1i128 << 64) as u64;
        Bintime { sec, frac }
    }
}

impl Default for Bintime {
    fn default() -> Self {
        Bintime::zero()
    }
}

impl Add for Bintime {
    type Output = Bintime;
    fn add(self, rhs: Bintime) -> Bintime {
        let frac = self.frac.wrapping_add(rhs.frac);
        let carry = if frac < self.frac { 1 } else { 0 };
        Bintime {
            sec: self.sec.wrapping_add(rhs.sec).wrapping_add(carry),
            frac,
        }
    }
}

impl Sub for Bintime {
    type Output = Bintime;
    fn sub(self, rhs: Bintime) -> Bintime {
        let frac = self.frac.wrapping_sub(rhs.frac);
        let borrow = if frac > self.frac { 1 } else { 0 };
        Bintime {
            sec: self.sec.wrapping_sub(rhs.sec).wrapping_sub(borrow),
            frac,
        }
    }
}

impl Neg for Bintime {
    type Output = Bintime;
    fn neg(self) -> Bintime {
        Bintime::zero() - self
    }
}

impl Mul<u64> for Bintime {
    type Output = Bintime;
    fn mul(self, rhs: u64) -> Bintime {
        Bintime::from_i128(self.as_i128() * rhs as i128)
    }
}

impl Div<u64> for Bintime {
    type Output = Bintime;
    fn div(self, rhs: u64) -> Bintime {
        assert!(rhs != 0, "division by zero");
        Bintime::from_i128(self.as_i128().div_euclid(rhs as i128))
    }
}

impl Div<i32> for Bintime {
    type Output = Bintime;
    fn div(self, rhs: i32) -> Bintime {
        assert!(rhs != 0, "division by zero");
        Bintime::from_i128(self.as_i128().div_euclid(rhs as i128))
    }
}

impl Shl<u32> for Bintime {
    type Output = Bintime;
    fn shl(self, rhs: u32) -> Bintime {
        debug_assert!(rhs <= 64);
        Bintime::from_i128(self.as_i128() << rhs)
    }
}

impl Shr<u32> for Bintime {
    type Output = Bintime;
    fn shr(self, rhs: u32) -> Bintime {
        debug_assert!(rhs <= 64);
        Bintime::from_i128(self.as_i128() >> rhs)
    }
}

/// Convert a `Bintime` to a `timespec`-shaped pair.
pub fn to_timespec(src: Bintime) -> TimeSpec {
    TimeSpec {
        sec: src.sec,
        nsec: ((NS_PER_SEC as u128 * (src.frac >> 32) as u128) >> 32) as i64,
    }
}

/// Convert a `timespec`-shaped pair to a `Bintime`. Exact at nanosecond granularity.
pub fn to_bintime_timespec(src: TimeSpec) -> Bintime {
    Bintime {
        sec: src.sec,
        frac: (src.nsec as u64).wrapping_mul(NS_TO_FRAC_SCALAR),
    }
}

/// Convert a `Bintime` to a `timeval`-shaped pair.
pub fn to_timeval(src: Bintime) -> TimeVal {
    TimeVal {
        sec: src.sec,
        usec: ((US_PER_SEC as u128 * (src.frac >> 32) as u128) >> 32) as i64,
    }
}

/// Convert a `timeval`-shaped pair to a `Bintime`. Exact at microsecond granularity.
pub fn to_bintime_timeval(src: TimeVal) -> Bintime {
    Bintime {
        sec: src.sec,
        frac: (src.usec as u64).wrapping_mul(US_TO_FRAC_SCALAR),
    }
}

/// Convert a non-negative `std::time::Duration` to a `Bintime`.
pub fn to_bintime_duration(src: Duration) -> Bintime {
    to_bintime_timespec(TimeSpec {
        sec: src.as_secs() as i64,
        nsec: src.subsec_nanos() as i64,
    })
}

/// Convert a `Bintime` to the nanosecond count since its zero point.
/// Negative results are represented as a negative `i64`.
pub fn to_duration_nanos(src: Bintime) -> i64 {
    src.sec
        .wrapping_mul(NS_PER_SEC)
        .wrapping_add(((NS_PER_SEC as u128 * (src.frac >> 32) as u128) >> 32) as i64)
}

/// Convert a floating-point second count to a `Bintime`.
pub fn to_bintime_f64(src: f64) -> Bintime {
    let sec = src.floor();
    let frac = src - sec;
    Bintime {
        sec: sec as i64,
        frac: (frac * (u64::MAX as f64 + 1.0)) as u64,
    }
}

/// Convert a `Bintime` to a floating-point second count.
pub fn to_f64(src: Bintime) -> f64 {
    src.sec as f64 + (src.frac as f64 / (u64::MAX as f64 + 1.0))
}
