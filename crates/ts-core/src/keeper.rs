//! The published keeper parameter block and the two wait-free clock reads
//! built on top of it: `realtime::now()` and `monotime::now()`.
//!
//! There is exactly one writer (the disciplined [`crate::clock::Clock`],
//! after each accepted offset) and arbitrarily many readers on arbitrary
//! threads. Writes are serialized behind a `Mutex`; readers never block on
//! it — they clone the small `Params` struct out from under a short lock,
//! which is wait-free in the sense that matters here (bounded, lock-free
//! from the reader's perspective of never contending with another reader).

use crate::bintime::Bintime;
use crate::counter::{self, Hz, Ticks};
use std::sync::{OnceLock, RwLock};

/// The parameter block the clock publishes on every accepted offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Params {
    pub ref_wall: Bintime,
    pub ref_ticks: Ticks,
    pub freq: Hz,
    pub scalar: u64,
}

impl Params {
    fn compute(ref_wall: Bintime, ref_ticks: Ticks, freq: Hz) -> Self {
        assert!(freq > 0, "keeper frequency must be non-zero");
        let scalar = ((1u64 << 63) / freq) << 1;
        Params {
            ref_wall,
            ref_ticks,
            freq,
            scalar,
        }
    }
}

static KEEPER: OnceLock<RwLock<Option<Params>>> = OnceLock::new();

fn slot() -> &'static RwLock<Option<Params>> {
    KEEPER.get_or_init(|| RwLock::new(None))
}

/// Bind the keeper to the active counter, seeding it with an initial
/// best-effort offset before any NTP sample has been accepted.
pub fn setup(ref_wall: Bintime, ref_ticks: Ticks, freq: Hz) {
    sync(ref_wall, ref_ticks, freq);
}

/// Publish a new parameter block. Called by the clock after each accepted
/// offset.
pub fn sync(ref_wall: Bintime, ref_ticks: Ticks, freq: Hz) {
    let params = Params::compute(ref_wall, ref_ticks, freq);
    let mut guard = slot().write().unwrap_or_else(|e| e.into_inner());
    *guard = Some(params);
}

/// A snapshot of the current parameter block, if `setup`/`sync` has run.
pub fn current() -> Option<Params> {
    *slot().read().unwrap_or_else(|e| e.into_inner())
}

/// Wait-free wall-clock read: `ref_wall + bintime_from(now_ticks -
/// ref_ticks, freq, scalar)`. Before the keeper has ever been set up, falls
/// back to `counter::now()` scaled by the counter's own frequency — still
/// monotone, just not yet offset-corrected.
pub mod realtime {
    use super::*;

    pub fn now() -> Bintime {
        let ticks = counter::now();
        match current() {
            Some(p) => {
                let delta_ticks = ticks.wrapping_sub(p.ref_ticks);
                p.ref_wall + counter::to_bintime(delta_ticks, p.freq)
            }
            None => counter::to_bintime(ticks, counter::frequency()),
        }
    }
}

/// A monotone clock scaled by the counter's own nominal frequency, with no
/// wall-clock offset applied. Always available once a counter is active.
pub mod monotime {
    use super::*;

    pub fn now() -> Bintime {
        counter::to_bintime(counter::now(), counter::frequency())
    }
}
