//! Property-based tests for the timesync numerical primitives.

use proptest::prelude::*;
use ts_math::{threshold_ppm, TDigest};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// `threshold_ppm` never drops below the caller's floor.
    #[test]
    fn threshold_never_below_limit(n in 0u64..100_000, limit in 0.0..1.0f64) {
        let t = threshold_ppm(n, limit);
        prop_assert!(t >= limit - 1e-12);
    }

    /// `threshold_ppm` is non-increasing for n > 4.
    #[test]
    fn threshold_non_increasing_past_four(n in 5u64..99_999) {
        let a = threshold_ppm(n, 0.0);
        let b = threshold_ppm(n + 1, 0.0);
        prop_assert!(b <= a + 1e-12);
    }

    /// Inserting values into a t-digest always reports the true min/max, regardless of merging.
    #[test]
    fn tdigest_min_max_exact(values in prop::collection::vec(-1e6..1e6f64, 1..500)) {
        let mut d = TDigest::new(16);
        let mut expected_min = f64::INFINITY;
        let mut expected_max = f64::NEG_INFINITY;
        for &v in &values {
            d.insert(v);
            expected_min = expected_min.min(v);
            expected_max = expected_max.max(v);
        }
        prop_assert_eq!(d.min(), Some(expected_min));
        prop_assert_eq!(d.max(), Some(expected_max));
        prop_assert_eq!(d.size(), values.len() as u64);
    }

    /// A t-digest's centroid count never exceeds the configured capacity.
    #[test]
    fn tdigest_respects_capacity(values in prop::collection::vec(-1e3..1e3f64, 0..2000), capacity in 4usize..64) {
        let mut d = TDigest::new(capacity);
        for &v in &values {
            d.insert(v);
        }
        prop_assert!(d.get().len() <= capacity);
    }
}
