//! The timecounter abstraction: a monotone tick source with a frequency
//! estimate, selected once at process start from a priority-ordered registry.
//!
//! The original implementation used CRTP-based static registration and a
//! statically-initialized atomic pointer, which is vulnerable to init-order
//! fiasco. Here the registry is explicit data (a `Vec` built by the caller),
//! and the active counter is published into a `OnceLock` — written exactly
//! once, then read-only for the rest of the process lifetime.

use crate::bintime::Bintime;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use uuid::Uuid;

/// Tick-counter frequency, in Hz.
pub type Hz = u64;
/// A raw tick count from a [`Timecounter`].
pub type Ticks = u64;

/// A monotone tick source with a known (constant) frequency.
///
/// Implementors must guarantee `now()` is monotonically non-decreasing and
/// wait-free, and that `frequency()` never changes for the life of the
/// process. A counter that cannot guarantee this must not be registered.
pub trait Timecounter: Send + Sync {
    /// Stable identifier for this counter instance.
    fn id(&self) -> Uuid;
    /// Human-readable name, e.g. `"tsc"` or `"system"`.
    fn name(&self) -> &str;
    /// Read the current tick value.
    fn now(&self) -> Ticks;
    /// Best known frequency of this counter, in Hz.
    fn frequency(&self) -> Hz;
    /// Relative counter quality; lower wins.
    fn static_priority(&self) -> i32;
}

/// A portable fallback timecounter backed by `std::time::Instant`.
///
/// Always available, it gives the registry something to select when no
/// platform-specific high-resolution counter registers — which is also why
/// it's the counter exercised in tests that don't need real hardware.
pub struct SourceSystem {
    id: Uuid,
    epoch: Instant,
}

impl SourceSystem {
    pub fn new() -> Self {
        SourceSystem {
            id: Uuid::new_v4(),
            epoch: Instant::now(),
        }
    }
}

impl Default for SourceSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Timecounter for SourceSystem {
    fn id(&self) -> Uuid {
        self.id
    }
    fn name(&self) -> &str {
        "system"
    }
    fn now(&self) -> Ticks {
        self.epoch.elapsed().as_nanos() as u64
    }
    fn frequency(&self) -> Hz {
        1_000_000_000
    }
    fn static_priority(&self) -> i32 {
        // Deliberately low priority: any hardware-backed counter that
        // registers should win over this portable fallback.
        100
    }
}

/// Descriptor of a registered timecounter, for the control API.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TimecounterInfo {
    pub id: Uuid,
    pub name: String,
    pub frequency: Hz,
    pub static_priority: i32,
    pub active: bool,
}

static ACTIVE: OnceLock<Arc<dyn Timecounter>> = OnceLock::new();

/// Pick the winning counter from a set of candidates: lowest
/// `static_priority` wins, ties broken by registration order (the earlier
/// candidate in the slice wins).
fn select(candidates: &[Arc<dyn Timecounter>]) -> Option<Arc<dyn Timecounter>> {
    candidates
        .iter()
        .enumerate()
        .min_by_key(|(idx, c)| (c.static_priority(), *idx))
        .map(|(_, c)| Arc::clone(c))
}

/// Select and publish the active timecounter from a set of candidates.
///
/// Must be called exactly once, before any other thread calls [`now()`] or
/// [`frequency()`]. Returns `false` if `candidates` is empty or the slot was
/// already published by an earlier call.
pub fn init(candidates: &[Arc<dyn Timecounter>]) -> bool {
    match select(candidates) {
        Some(winner) => ACTIVE.set(winner).is_ok(),
        None => false,
    }
}

/// Whether a timecounter has been selected and published yet.
pub fn is_initialized() -> bool {
    ACTIVE.get().is_some()
}

/// Descriptor of the currently active counter, if initialized.
pub fn active_info() -> Option<TimecounterInfo> {
    ACTIVE.get().map(|c| TimecounterInfo {
        id: c.id(),
        name: c.name().to_string(),
        frequency: c.frequency(),
        static_priority: c.static_priority(),
        active: true,
    })
}

/// Read the active counter's current tick value.
///
/// # Panics
/// Panics if [`init()`] has not yet published a counter.
pub fn now() -> Ticks {
    ACTIVE
        .get()
        .expect("timecounter not initialized")
        .now()
}

/// Read the active counter's frequency, in Hz.
///
/// # Panics
/// Panics if [`init()`] has not yet published a counter.
pub fn frequency() -> Hz {
    ACTIVE
        .get()
        .expect("timecounter not initialized")
        .frequency()
}

/// Convert a tick delta at a given frequency into a [`Bintime`].
///
/// `scalar = ((2^63) / freq) << 1` makes `(ticks % freq) * scalar` land
/// exactly in `[0, 2^64)`, matching the original's wraparound-free identity.
pub fn to_bintime(ticks: Ticks, freq: Hz) -> Bintime {
    assert!(freq > 0, "timecounter frequency must be non-zero");
    let scalar: u64 = ((1u64 << 63) / freq) << 1;
    Bintime::new((ticks / freq) as i64, (ticks % freq).wrapping_mul(scalar))
}
