//! Property-based tests for the 64.64 fixed-point time representation and
//! the RADclock-style frequency estimator built on top of it.

use proptest::prelude::*;
use std::time::Duration;
use ts_core::bintime::{to_bintime_duration, to_bintime_timespec, to_f64, to_timespec, Bintime, TimeSpec};
use ts_core::clock::Clock;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// `(a + b) - b == a` across the full range of signed seconds and
    /// fractional ticks, including values that carry/borrow across the
    /// `sec`/`frac` boundary.
    #[test]
    fn add_sub_round_trips(
        a_sec in -1_000_000_000i64..1_000_000_000,
        a_frac in 0u64..=u64::MAX,
        b_sec in -1_000_000_000i64..1_000_000_000,
        b_frac in 0u64..=u64::MAX,
    ) {
        let a = Bintime::new(a_sec, a_frac);
        let b = Bintime::new(b_sec, b_frac);
        prop_assert_eq!((a + b) - b, a);
    }

    /// `(a * k) / k == a` for any non-zero scalar `k`.
    #[test]
    fn mul_div_round_trips(sec in -1_000_000i64..1_000_000, frac in 0u64..=u64::MAX, k in 1u64..1000) {
        let a = Bintime::new(sec, frac);
        prop_assert_eq!((a * k) / k, a);
    }

    /// A `timespec` round-trips through `to_bintime_timespec`/`to_timespec`
    /// to within a nanosecond.
    #[test]
    fn timespec_round_trips_to_nanosecond(sec in 0i64..2_000_000_000, nsec in 0i64..1_000_000_000) {
        let ts = TimeSpec { sec, nsec };
        let bt = to_bintime_timespec(ts);
        let back = to_timespec(bt);
        prop_assert_eq!(back.sec, ts.sec);
        prop_assert!((back.nsec - ts.nsec).abs() <= 1);
    }

    /// A non-negative `Duration` round-trips through `to_bintime_duration`
    /// to within a nanosecond.
    #[test]
    fn duration_round_trips_to_nanosecond(secs in 0u64..2_000_000_000, nanos in 0u32..1_000_000_000) {
        let d = Duration::new(secs, nanos);
        let bt = to_bintime_duration(d);
        let back = to_timespec(bt);
        prop_assert_eq!(back.sec, secs as i64);
        prop_assert!((back.nsec - nanos as i64).abs() <= 1);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    /// The global frequency estimate converges to within 10 ppm of a
    /// perfectly-matched oscillator after 512 exchanges, regardless of RTT
    /// jitter in [100us, 100ms] — the accuracy oracle an NTP-disciplined
    /// clock has to satisfy no matter how noisy the network path is.
    #[test]
    fn frequency_estimate_within_ten_ppm_despite_rtt_jitter(
        rtts in prop::collection::vec(100_000u64..100_000_000u64, 512),
    ) {
        const F_NOMINAL: u64 = 1_000_000_000;
        let mut clock = Clock::new(F_NOMINAL);
        let k = clock.offset();

        for (i, &rtt) in rtts.iter().enumerate() {
            let tb = k + Bintime::new(i as i64, 0);
            let te = tb + Bintime::new(0, 1 << 40);
            let ta = ((to_f64(tb) - to_f64(k)) * F_NOMINAL as f64) as u64;
            let tf = ta + rtt;
            let _ = clock.update(ta, tb, te, tf);
        }

        let f_hat = clock.frequency().expect("frequency should be estimated after 512 samples");
        let relative_error_ppm = (f_hat - F_NOMINAL as f64).abs() / F_NOMINAL as f64 * 1e6;
        prop_assert!(relative_error_ppm < 10.0, "f_hat={} error={}ppm", f_hat, relative_error_ppm);
    }
}
