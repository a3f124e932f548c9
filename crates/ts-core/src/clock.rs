//! The disciplined clock: estimates `f_hat` (global tick frequency),
//! `f_local` (short-horizon tick frequency) and `theta_hat` (wall-clock
//! offset) from a stream of NTP four-timestamp exchanges.
//!
//! Follows Veitch's RADclock design: a long window (`TAU_STAR`) for offset
//! averaging, a much longer window (`TAU_LOCAL`) for a locally-stable
//! frequency estimate, and RTT-quality weighting throughout, since a sample
//! with a fat round trip tells you much less about the true offset than one
//! that got there and back quickly.

use crate::bintime::{to_bintime_duration, to_f64, Bintime};
use crate::counter::{Hz, Ticks};
use crate::history::{Entry, History, Timestamp};
use std::time::{SystemTime, UNIX_EPOCH};
use ts_common::error::{Error, Result};
use ts_math::{threshold_ppm, TDigest};

/// Offset-estimation window.
pub const TAU_STAR_S: f64 = 1200.0;
/// Local-rate window.
pub const TAU_LOCAL_S: f64 = 3600.0;
/// Allowed variance around `TAU_LOCAL_S / 2` when picking local-rate anchors.
pub const TAU_LOCAL_WINDOW_MAX_S: f64 = 300.0;
/// Retention window: history older than this is pruned.
pub const MAX_HISTORY_S: f64 = 2.0 * TAU_LOCAL_S;
/// Assumed clock noise floor, in parts per million.
pub const NOISE_PPM: f64 = 15.0;
pub const F_LOCAL_LIMIT_PPM: f64 = 0.05;
pub const F_HAT_LIMIT_PPM: f64 = 0.03;
pub const THETA_LIMIT_PPM: f64 = 0.01;

/// Outcome of a single [`Clock::update`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub f_hat_accepted: bool,
    pub f_local_accepted: bool,
    pub theta_accepted: bool,
    pub level_shift_detected: bool,
}

/// Accept/reject counters for each disciplined parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockStats {
    pub n_duplicate: u64,
    pub n_accept_f_hat: u64,
    pub n_reject_f_hat: u64,
    pub n_accept_f_local: u64,
    pub n_reject_f_local: u64,
    pub n_accept_theta: u64,
    pub n_reject_theta: u64,
    pub n_level_shifts: u64,
}

/// Read the host wall clock and the active counter twice, retrying while
/// the counter advanced more than an escalating tick-delta budget, so the
/// interpolation error in the resulting `(ticks, wall)` pair is bounded.
///
/// Matches §4.4.2: start the budget at 1 µs of counter time and relax it by
/// 1% per retry. Bounded at a generous attempt count so a loaded host can't
/// spin here forever.
fn sample_host_offset(f_nominal: Hz) -> (Ticks, Bintime) {
    let mut budget_ticks = (f_nominal as f64 * 1e-6).max(1.0);
    for _ in 0..10_000 {
        let t1 = crate::counter::now();
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let t2 = crate::counter::now();
        let delta = t2.saturating_sub(t1);
        if (delta as f64) <= budget_ticks {
            let mid = t1 + delta / 2;
            return (mid, to_bintime_duration(wall));
        }
        budget_ticks *= 1.01;
    }
    let t = crate::counter::now();
    let wall = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (t, to_bintime_duration(wall))
}

/// `K = wall - ticks / f_nominal`, the host-clock offset at a reference
/// instant, used before any NTP sample has been accepted.
fn host_offset(ticks: Ticks, wall: Bintime, f_nominal: Hz) -> Bintime {
    wall - crate::counter::to_bintime(ticks, f_nominal)
}

/// `true` if a candidate parameter change exceeds the allowed drift *rate*:
/// `|delta| > threshold_ppm(n, limit) * 1e-6 * elapsed_s`. Used for
/// `f_hat`/`f_local`, whose acceptable absolute error grows with the
/// baseline between the two samples that produced the candidate.
fn rate_delta_exceeded(delta: f64, n_accept: u64, limit: f64, elapsed_s: f64) -> bool {
    if elapsed_s <= 0.0 {
        return true;
    }
    let allowed = threshold_ppm(n_accept, limit) * 1e-6 * elapsed_s;
    delta.abs() > allowed
}

/// `true` if a candidate offset change exceeds the allowed drift *rate*, in
/// ppm of the elapsed time since the last accepted offset: used for
/// `theta_hat`, where the rule has no extra `elapsed_s` multiplier because
/// the ratio already is a rate.
fn offset_delta_exceeded(delta_s: f64, n_accept: u64, limit: f64, elapsed_s: f64) -> bool {
    if elapsed_s <= 0.0 {
        return true;
    }
    let rate_ppm = (delta_s / elapsed_s).abs() * 1e6;
    rate_ppm > threshold_ppm(n_accept, limit)
}

/// The disciplined clock.
pub struct Clock {
    f_nominal: Hz,
    history: History,
    rtt_digest: TDigest,
    k: Bintime,
    f_hat: Option<f64>,
    f_hat_error_ppm: f64,
    f_local: Option<f64>,
    f_local_error_ppm: f64,
    theta_hat: Option<Bintime>,
    last_theta_update: Option<Bintime>,
    effective_rtt_min_ticks: f64,
    stats: ClockStats,
}

impl Clock {
    /// Construct a clock bound to a counter running at `f_nominal` Hz,
    /// sampling a fresh host offset.
    pub fn new(f_nominal: Hz) -> Self {
        let (ticks, wall) = sample_host_offset(f_nominal);
        Self::with_offset(f_nominal, host_offset(ticks, wall, f_nominal))
    }

    /// Construct a clock with an explicit starting offset, bypassing the
    /// real-time host sampling in [`Clock::new`]. Used by tests and by
    /// [`Clock::reset`].
    pub(crate) fn with_offset(f_nominal: Hz, k: Bintime) -> Self {
        Clock {
            f_nominal,
            history: History::new(),
            rtt_digest: TDigest::new(32),
            k,
            f_hat: None,
            f_hat_error_ppm: 0.0,
            f_local: None,
            f_local_error_ppm: 0.0,
            theta_hat: None,
            last_theta_update: None,
            effective_rtt_min_ticks: f64::INFINITY,
            stats: ClockStats::default(),
        }
    }

    /// Re-sample the host offset and clear all history, parameters and
    /// stats. Called at construction and whenever the source is replaced.
    pub fn reset(&mut self) {
        let (ticks, wall) = sample_host_offset(self.f_nominal);
        *self = Clock::with_offset(self.f_nominal, host_offset(ticks, wall, self.f_nominal));
    }

    pub fn stats(&self) -> ClockStats {
        self.stats
    }

    pub fn frequency(&self) -> Option<f64> {
        self.f_hat
    }

    pub fn frequency_error_ppm(&self) -> f64 {
        self.f_hat_error_ppm
    }

    pub fn local_frequency(&self) -> Option<f64> {
        self.f_local
    }

    pub fn local_frequency_error_ppm(&self) -> f64 {
        self.f_local_error_ppm
    }

    /// The frequency a reader of `realtime::now()` should scale ticks by:
    /// the local estimate if one exists, else the global one, else the
    /// counter's nominal frequency.
    pub fn frequency_for_readers(&self) -> f64 {
        self.f_local
            .or(self.f_hat)
            .unwrap_or(self.f_nominal as f64)
    }

    /// `K`: the host-clock offset captured at construction/reset.
    pub fn offset(&self) -> Bintime {
        self.k
    }

    pub fn theta(&self) -> Option<Bintime> {
        self.theta_hat
    }

    pub fn rtt_minimum(&self) -> Option<f64> {
        self.rtt_digest.min().map(|t| t / self.f_nominal as f64)
    }

    pub fn rtt_maximum(&self) -> Option<f64> {
        self.rtt_digest.max().map(|t| t / self.f_nominal as f64)
    }

    pub fn rtt_median(&self) -> Option<f64> {
        self.rtt_digest
            .quantile(0.5)
            .map(|t| t / self.f_nominal as f64)
    }

    pub fn rtt_size(&self) -> u64 {
        self.rtt_digest.size()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Resolve `ticks` (a client-side counter reading) to a wall-time
    /// estimate using the current offset and best available frequency.
    pub fn to_wall(&self, ticks: Ticks) -> Bintime {
        let tau_hz = self.f_hat.unwrap_or(self.f_nominal as f64);
        self.k + crate::counter::to_bintime(ticks, tau_hz.round().max(1.0) as Hz)
    }

    /// `true` iff an offset has been accepted recently: `(now - last_theta)
    /// <= 2*TAU_STAR` seconds, measured on the full bintime (not just whole
    /// seconds).
    pub fn synced(&self, now: Bintime) -> bool {
        if self.stats.n_accept_theta < 2 {
            return false;
        }
        match (self.theta_hat, self.last_theta_update) {
            (Some(_), Some(last)) => {
                let delta = now - last;
                to_f64(delta) <= 2.0 * TAU_STAR_S
            }
            _ => false,
        }
    }

    /// Feed one NTP exchange into the clock.
    pub fn update(&mut self, ta: Ticks, tb: Bintime, te: Bintime, tf: Ticks) -> Result<UpdateOutcome> {
        let ts = Timestamp::new(ta, tb, te, tf);
        let rtt_ticks = ts.rtt_ticks();
        self.history.insert(ts, self.f_local.unwrap_or(0.0)).map_err(|e| {
            if matches!(e, Error::Duplicate) {
                self.stats.n_duplicate += 1;
            }
            e
        })?;
        self.rtt_digest.insert(rtt_ticks as f64);
        self.history.prune(tb - Bintime::new(MAX_HISTORY_S as i64, 0));

        let mut outcome = UpdateOutcome::default();
        outcome.f_hat_accepted = self.do_rate_estimation(tb);
        outcome.f_local_accepted = self.do_local_rate_estimation(tb);
        outcome.level_shift_detected = self.do_level_shift_detection(tb);
        outcome.theta_accepted = self.do_offset_sync(tb);
        Ok(outcome)
    }

    /// Pick the sample pair with lowest-and-highest `Tb` among those whose
    /// RTT is at or below the digest median, maximizing the baseline
    /// between them for a more stable ratio estimate.
    fn low_rtt_pair(&self, median_ticks: f64) -> Option<(Entry, Entry)> {
        let mut candidates: Vec<Entry> = self
            .history
            .iter()
            .filter(|e| (e.ts.rtt_ticks() as f64) <= median_ticks)
            .collect();
        if candidates.len() < 2 {
            return None;
        }
        candidates.sort_by(|a, b| a.ts.tb.cmp(&b.ts.tb));
        let j = *candidates.first().unwrap();
        let i = *candidates.last().unwrap();
        if i.ts.tb == j.ts.tb {
            return None;
        }
        Some((i, j))
    }

    /// §4.4.3 step 2-3: absolute-frequency estimate from the globally best
    /// sample pair.
    fn do_rate_estimation(&mut self, _now: Bintime) -> bool {
        let median = self.rtt_digest.quantile(0.5).unwrap_or(f64::INFINITY);
        let Some((i, j)) = self.low_rtt_pair(median) else {
            return false;
        };
        let elapsed_tb = to_f64(i.ts.tb - j.ts.tb);
        let elapsed_te = to_f64(i.ts.te - j.ts.te);
        if elapsed_tb <= 0.0 || elapsed_te <= 0.0 {
            return false;
        }
        let f_up = (i.ts.ta - j.ts.ta) as f64 / elapsed_tb;
        let f_down = (i.ts.tf - j.ts.tf) as f64 / elapsed_te;
        let candidate = (f_up + f_down) / 2.0;

        let n = self.stats.n_accept_f_hat;
        let delta = match self.f_hat {
            Some(prev) if prev != 0.0 => (candidate - prev) / prev,
            _ => 0.0,
        };
        if self.f_hat.is_some() && rate_delta_exceeded(delta, n, F_HAT_LIMIT_PPM, elapsed_tb) {
            self.stats.n_reject_f_hat += 1;
            return false;
        }
        self.f_hat = Some(candidate);
        self.f_hat_error_ppm = threshold_ppm(n, F_HAT_LIMIT_PPM);
        self.stats.n_accept_f_hat += 1;
        true
    }

    fn lowest_rtt_in(&self, lo: Bintime, hi: Bintime) -> Option<Entry> {
        self.history
            .range(lo, hi)
            .min_by_key(|e| e.ts.rtt_ticks())
    }

    /// §4.4.3 step 4: local-rate estimate, computed only once the total
    /// history span reaches `TAU_LOCAL_S`.
    fn do_local_rate_estimation(&mut self, now: Bintime) -> bool {
        let span_s = to_f64(self.history.duration());
        if span_s < TAU_LOCAL_S {
            return false;
        }
        let far_s = (span_s - TAU_LOCAL_S).max(0.0);
        let range_s = TAU_LOCAL_WINDOW_MAX_S.min(far_s / 2.0);
        let range = Bintime::new(range_s as i64, 0);
        let half_local = Bintime::new((TAU_LOCAL_S / 2.0) as i64, 0);
        let full_local = Bintime::new(TAU_LOCAL_S as i64, 0);

        let recent_lo = now - half_local - range;
        let Some(i) = self.lowest_rtt_in(recent_lo, now) else {
            return false;
        };
        let older_hi = now - half_local + range;
        let older_lo = now - full_local - range;
        let Some(j) = self.lowest_rtt_in(older_lo, older_hi) else {
            return false;
        };
        if i.ts.tb == j.ts.tb {
            return false;
        }

        let elapsed_tb = to_f64(i.ts.tb - j.ts.tb);
        let elapsed_te = to_f64(i.ts.te - j.ts.te);
        if elapsed_tb <= 0.0 || elapsed_te <= 0.0 {
            return false;
        }
        let f_up = (i.ts.ta - j.ts.ta) as f64 / elapsed_tb;
        let f_down = (i.ts.tf - j.ts.tf) as f64 / elapsed_te;
        let candidate = (f_up + f_down) / 2.0;

        let n = self.stats.n_accept_f_local;
        let delta = match self.f_local {
            Some(prev) if prev != 0.0 => (candidate - prev) / prev,
            _ => 0.0,
        };
        if self.f_local.is_some() && rate_delta_exceeded(delta, n, F_LOCAL_LIMIT_PPM, elapsed_tb) {
            self.stats.n_reject_f_local += 1;
            return false;
        }
        self.f_local = Some(candidate);
        self.f_local_error_ppm = threshold_ppm(n, F_LOCAL_LIMIT_PPM);
        self.stats.n_accept_f_local += 1;
        true
    }

    /// §4.4.3 step 6: detect an RTT level shift by comparing the windowed
    /// minimum against the all-time digest minimum.
    fn do_level_shift_detection(&mut self, now: Bintime) -> bool {
        let half_local = Bintime::new((TAU_LOCAL_S / 2.0) as i64, 0);
        let Some(windowed) = self.lowest_rtt_in(now - half_local, now) else {
            self.effective_rtt_min_ticks = self.rtt_digest.min().unwrap_or(f64::INFINITY);
            return false;
        };
        let r_hat_s = windowed.ts.rtt_ticks() as f64;
        let r_hat = self.rtt_digest.min().unwrap_or(f64::INFINITY);
        let f_hat = self.f_hat.unwrap_or(self.f_nominal as f64);
        let shift_threshold = 16.0 * (NOISE_PPM * 1e-6) * f_hat;

        if r_hat < r_hat_s && (r_hat_s - r_hat) > shift_threshold {
            self.rtt_digest.filter_above(r_hat_s);
            self.history.retain(|e| e.ts.rtt_ticks() as f64 > r_hat_s);
            self.stats.n_level_shifts += 1;
            self.effective_rtt_min_ticks = r_hat_s;
            true
        } else {
            self.effective_rtt_min_ticks = r_hat;
            false
        }
    }

    /// §4.4.3 step 7: RTT-quality-weighted offset average over the last
    /// `TAU_STAR_S` seconds, only once `f_hat` has been accepted at least
    /// once.
    fn do_offset_sync(&mut self, now: Bintime) -> bool {
        let Some(f_hat) = self.f_hat else {
            return false;
        };
        if f_hat <= 0.0 {
            return false;
        }
        let tau = 1.0 / f_hat;
        let gamma_hat = self.f_local.map(|fl| if fl != 0.0 { 1.0 - f_hat / fl } else { 0.0 }).unwrap_or(0.0);
        let r_min = self.effective_rtt_min_ticks;
        let e = 4.0 * f_hat * (NOISE_PPM * 1e-6);

        let window_start = now - Bintime::new(TAU_STAR_S as i64, 0);
        let mut num = 0.0f64;
        let mut den = 0.0f64;
        for entry in self.history.range(window_start, now) {
            let ts = entry.ts;
            let r_i = ts.rtt_ticks() as f64;
            let dt_i = to_f64(now - ts.tb);
            let e_i = (r_i - r_min).max(0.0);
            let weight = if e > 0.0 {
                (-((e_i + 1e-7 * dt_i) / e).powi(2)).exp()
            } else {
                1.0
            };

            let client_side = (ts.ta as f64 * tau + to_f64(self.k) + ts.tf as f64 * tau + to_f64(self.k)) / 2.0;
            let server_side = (to_f64(ts.tb) + to_f64(ts.te)) / 2.0;
            let theta_i = client_side - server_side;

            num += weight * (theta_i + gamma_hat * dt_i);
            den += weight;
        }
        if den <= 0.0 {
            return false;
        }
        let theta_new_s = num / den;
        let theta_new = crate::bintime::to_bintime_f64(theta_new_s);

        let n = self.stats.n_accept_theta;
        match (self.theta_hat, self.last_theta_update) {
            (Some(old), Some(last)) => {
                let elapsed_s = to_f64(now - last);
                let delta_s = theta_new_s - to_f64(old);
                if offset_delta_exceeded(delta_s, n, THETA_LIMIT_PPM, elapsed_s) {
                    self.stats.n_reject_theta += 1;
                    return false;
                }
            }
            _ => {}
        }
        self.theta_hat = Some(theta_new);
        self.last_theta_update = Some(now);
        self.stats.n_accept_theta += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const F_NOMINAL: Hz = 1_000_000_000;

    fn fixed_clock() -> Clock {
        Clock::with_offset(F_NOMINAL, Bintime::new(1_700_000_000, 0))
    }

    /// Build a synthetic four-timestamp exchange `poll_index` seconds after
    /// a start instant, with a constant 1 ms round trip and a perfectly
    /// matched oscillator (no synthetic offset/drift).
    fn synthetic_sample(k: Bintime, f_nominal: Hz, poll_index: i64, rtt_ticks: u64) -> (Ticks, Bintime, Bintime, Ticks) {
        let tb = k + Bintime::new(poll_index, 0);
        let te = tb + Bintime::new(0, 1 << 40);
        let ta = ((to_f64(tb) - to_f64(k)) * f_nominal as f64) as Ticks;
        let tf = ta + rtt_ticks;
        (ta, tb, te, tf)
    }

    #[test]
    fn empty_clock_is_not_synced_and_has_no_frequency() {
        let clock = fixed_clock();
        assert!(!clock.synced(Bintime::new(1_700_000_100, 0)));
        assert!(clock.frequency().is_none());
        assert_ne!(clock.offset(), Bintime::zero());
    }

    #[test]
    fn first_sample_is_accepted_but_not_synced() {
        let mut clock = fixed_clock();
        let (ta, tb, te, tf) = synthetic_sample(clock.offset(), F_NOMINAL, 0, 50_000);
        clock.update(ta, tb, te, tf).unwrap();
        assert!(!clock.synced(tb));
        assert_eq!(clock.history_len(), 1);
    }

    #[test]
    fn duplicate_sample_is_rejected() {
        let mut clock = fixed_clock();
        let (ta, tb, te, tf) = synthetic_sample(clock.offset(), F_NOMINAL, 0, 50_000);
        clock.update(ta, tb, te, tf).unwrap();
        let err = clock.update(ta, tb, te, tf).unwrap_err();
        assert!(matches!(err, Error::Duplicate));
        assert_eq!(clock.history_len(), 1);
        assert_eq!(clock.stats().n_duplicate, 1);
    }

    #[test]
    fn two_samples_one_second_apart_have_matching_duration() {
        let mut clock = fixed_clock();
        let k = clock.offset();
        let (ta1, tb1, te1, tf1) = synthetic_sample(k, F_NOMINAL, 0, 50_000);
        let (ta2, tb2, te2, tf2) = synthetic_sample(k, F_NOMINAL, 1, 50_000);
        clock.update(ta1, tb1, te1, tf1).unwrap();
        clock.update(ta2, tb2, te2, tf2).unwrap();
        assert_eq!(clock.history_len(), 2);
    }

    #[test]
    fn frequency_estimate_converges_toward_nominal() {
        let mut clock = fixed_clock();
        let k = clock.offset();
        let mut last_f_hat = None;
        for i in 0..20 {
            let (ta, tb, te, tf) = synthetic_sample(k, F_NOMINAL, i, 50_000);
            let _ = clock.update(ta, tb, te, tf);
            last_f_hat = clock.frequency();
        }
        let f_hat = last_f_hat.expect("f_hat should be estimated after enough samples");
        let relative_error = (f_hat - F_NOMINAL as f64).abs() / F_NOMINAL as f64;
        assert!(relative_error < 0.01, "f_hat={} too far from nominal", f_hat);
    }

    #[test]
    fn reset_clears_history_and_parameters() {
        let mut clock = fixed_clock();
        let k = clock.offset();
        for i in 0..5 {
            let (ta, tb, te, tf) = synthetic_sample(k, F_NOMINAL, i, 50_000);
            let _ = clock.update(ta, tb, te, tf);
        }
        assert!(clock.history_len() > 0);
        clock.reset();
        assert_eq!(clock.history_len(), 0);
        assert!(clock.frequency().is_none());
        assert!(clock.theta().is_none());
    }

    #[test]
    fn rate_delta_exceeded_grows_allowance_with_elapsed_time() {
        // A 1 ppm change should be rejected over a short baseline...
        assert!(rate_delta_exceeded(1e-6, 10, F_HAT_LIMIT_PPM, 1.0));
        // ...but accepted over a long enough one.
        assert!(!rate_delta_exceeded(1e-6, 10, F_HAT_LIMIT_PPM, 10_000.0));
    }

    #[test]
    fn offset_delta_exceeded_is_a_rate_not_scaled_by_elapsed() {
        // 1 microsecond of drift over 1 second is a huge rate (1e6 ppm).
        assert!(offset_delta_exceeded(1e-6, 10, THETA_LIMIT_PPM, 1.0));
        // The same microsecond spread over a day is a tiny rate.
        assert!(!offset_delta_exceeded(1e-6, 10, THETA_LIMIT_PPM, 86_400.0));
    }
}
