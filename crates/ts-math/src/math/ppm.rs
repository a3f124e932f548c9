//! Acceptance-threshold function shared by the frequency and offset estimators.

/// `threshold_ppm(n) = max(limit, 10 / (1 + (n-4)^2))` for `n > 4`, else a constant `10`.
///
/// The `n <= 4` branch returning a flat `10` ppm (rather than extrapolating the
/// same formula) matches the original implementation's observed behavior.
pub fn threshold_ppm(n_accept: u64, limit: f64) -> f64 {
    if n_accept <= 4 {
        return 10.0;
    }
    let d = (n_accept as f64) - 4.0;
    (10.0 / (1.0 + d * d)).max(limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_n_is_flat_ten() {
        assert_eq!(threshold_ppm(0, 0.03), 10.0);
        assert_eq!(threshold_ppm(4, 0.03), 10.0);
    }

    #[test]
    fn decays_then_floors_at_limit() {
        let at5 = threshold_ppm(5, 0.03);
        assert!((at5 - 5.0).abs() < 1e-9, "n=5 should be 10/(1+1)=5.0, got {}", at5);
        assert!(threshold_ppm(100, 0.03) >= 0.03);
        assert!(threshold_ppm(1_000_000, 0.03) == 0.03);
    }

    #[test]
    fn monotonically_non_increasing_past_four() {
        let mut prev = threshold_ppm(5, 0.0);
        for n in 6..200u64 {
            let cur = threshold_ppm(n, 0.0);
            assert!(cur <= prev + 1e-12, "threshold should not increase with n");
            prev = cur;
        }
    }
}
