//! A synthetic time source that disciplines the clock against the host's
//! own system clock, instead of a remote NTP peer.
//!
//! Useful as a bootstrap source (there is always a system clock to compare
//! against) and in tests, where spinning up a real NTP exchange is more
//! trouble than it's worth. [`SystemSource`] produces the same four-point
//! `(Ta, Tb, Te, Tf)` tuple a real exchange would, just with `Tb`/`Te` read
//! a tick apart from `std::time::SystemTime` rather than from the wire.

use crate::bintime::{to_bintime_duration, Bintime};
use crate::clock::Clock;
use crate::counter::{self, Ticks};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use ts_common::error::Result;

const SYSTEM_STARTUP_POLLS: u32 = 8;
const DEFAULT_POLL_PERIOD_S: f64 = 32.0;

fn system_now_bintime() -> Bintime {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    to_bintime_duration(since_epoch)
}

/// Exponential poll back-off identical in shape to [`crate::server::ntp_poll_delay`],
/// just parameterized by a (usually longer) maximum period.
pub fn system_poll_delay(i: u32, max_period_s: f64) -> Duration {
    let period_s = if i < SYSTEM_STARTUP_POLLS {
        (max_period_s.ln() / SYSTEM_STARTUP_POLLS as f64 * i as f64).exp()
    } else {
        max_period_s
    };
    Duration::from_secs_f64(period_s)
}

/// Poll state for a system-clock time source.
pub struct SystemSource {
    poll_count: u32,
    max_period_s: f64,
}

impl SystemSource {
    pub fn new() -> Self {
        SystemSource {
            poll_count: 0,
            max_period_s: DEFAULT_POLL_PERIOD_S,
        }
    }

    pub fn poll_count(&self) -> u32 {
        self.poll_count
    }

    /// Delay until the next poll should fire, given polls sent so far.
    pub fn next_delay(&self) -> Duration {
        system_poll_delay(self.poll_count, self.max_period_s)
    }

    /// Perform one poll: sample the counter and the system wall clock twice,
    /// a tick apart, and feed the resulting tuple to `clock`. Returns the
    /// delay to wait before the next poll.
    pub fn poll(&mut self, clock: &mut Clock) -> Result<Duration> {
        let ta: Ticks = counter::now();
        let tb = system_now_bintime();

        // tb and te must differ, so make sure at least one counter tick
        // elapses between the two system-clock reads.
        let tick_ns = (1_000_000_000.0 / counter::frequency() as f64).max(1.0) as u64;
        std::thread::sleep(Duration::from_nanos(tick_ns));

        let te = system_now_bintime();
        let tf: Ticks = counter::now();

        self.poll_count += 1;
        clock.update(ta, tb, te, tf)?;

        Ok(self.next_delay())
    }
}

impl Default for SystemSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_delay_shrinks_toward_startup_then_holds_at_max() {
        let d0 = system_poll_delay(0, 64.0);
        let d7 = system_poll_delay(7, 64.0);
        let d8 = system_poll_delay(8, 64.0);
        let d20 = system_poll_delay(20, 64.0);
        assert!(d0 < d7);
        assert!(d7 < d8);
        assert_eq!(d8, d20);
        assert_eq!(d8, Duration::from_secs_f64(64.0));
    }

    #[test]
    fn poll_delay_first_sample_is_one_second() {
        // i=0 => max_period^(0/8) == 1s regardless of max_period.
        let d = system_poll_delay(0, 32.0);
        assert!((d.as_secs_f64() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn new_source_starts_with_zero_polls() {
        let s = SystemSource::new();
        assert_eq!(s.poll_count(), 0);
    }
}
