//! A compact history of NTP four-timestamp exchanges, ordered by the
//! server's receive time `Tb`.
//!
//! Each accepted poll produces four timestamps: `Ta` (client transmit,
//! counter ticks), `Tb` (server receive, wall time), `Te` (server transmit,
//! wall time), `Tf` (client receive, counter ticks). Only `Tb` and `Te` ever
//! travel the wire at full NTP precision; `Ta`/`Tf` are this host's own
//! counter readings. An entry is therefore stored compactly as `{f_local,
//! Ta, Tb_ntp, dTe, dTf}` rather than four full bintimes: `Tb_ntp` truncates
//! `Tb` to NTP's native 32.32 resolution (the ordering key), `dTe` is the
//! sub-second `(Te-Tb)` delta (their invariant same-second constraint means
//! it never needs more than 32 bits), and `dTf = Tf-Ta` is the round trip in
//! raw ticks. A 1 Hz, 1-hour history is under 20 bytes/entry — comfortably
//! inside a 120 KiB budget.

use crate::bintime::Bintime;
use crate::counter::Ticks;
use std::collections::BTreeMap;
use ts_common::error::{Error, Result};

/// An NTP-native 32.32 fixed-point timestamp: whole seconds (since the same
/// epoch `Bintime` uses) plus a 32-bit sub-second fraction. This is the
/// precision a timestamp actually carries on the wire, which is why the
/// compact history keys and orders by it rather than a full 64-bit frac.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NtpTimestamp {
    pub sec: i32,
    pub frac: u32,
}

impl NtpTimestamp {
    pub fn from_bintime(bt: Bintime) -> Self {
        NtpTimestamp {
            sec: bt.sec as i32,
            frac: (bt.frac >> 32) as u32,
        }
    }

    pub fn to_bintime(self) -> Bintime {
        Bintime::new(self.sec as i64, (self.frac as u64) << 32)
    }
}

/// A reconstructed view of one NTP four-timestamp exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    /// Client transmit time, in this host's own counter ticks.
    pub ta: Ticks,
    /// Server receive time (wall time, from the reply packet).
    pub tb: Bintime,
    /// Server transmit time (wall time, from the reply packet).
    pub te: Bintime,
    /// Client receive time, in this host's own counter ticks.
    pub tf: Ticks,
}

impl Timestamp {
    pub fn new(ta: Ticks, tb: Bintime, te: Bintime, tf: Ticks) -> Self {
        Timestamp { ta, tb, te, tf }
    }

    /// Round trip, in raw counter ticks: `Tf - Ta`.
    pub fn rtt_ticks(&self) -> u64 {
        self.tf - self.ta
    }

    /// Server processing delay: `Te - Tb`.
    pub fn server_delay(&self) -> Bintime {
        self.te - self.tb
    }
}

/// A `Timestamp` plus the local-frequency estimate in effect when it was
/// recorded (0.0 before the clock has run long enough to have one).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry {
    pub ts: Timestamp,
    pub f_local: f64,
}

/// The on-disk/in-memory compact representation: `{f_local, Ta, Tb_ntp,
/// dTe, dTf}`. `Te` and `Tf` are reconstructed from the deltas on read.
#[derive(Debug, Clone, Copy)]
struct CompactEntry {
    f_local: f64,
    ta: Ticks,
    tb_ntp: NtpTimestamp,
    d_te: u32,
    d_tf: u32,
}

impl CompactEntry {
    fn pack(entry: &Entry) -> Self {
        let tb_ntp = NtpTimestamp::from_bintime(entry.ts.tb);
        let server_delay = entry.ts.server_delay();
        CompactEntry {
            f_local: entry.f_local,
            ta: entry.ts.ta,
            tb_ntp,
            d_te: (server_delay.frac >> 32) as u32,
            d_tf: entry.ts.rtt_ticks() as u32,
        }
    }

    fn unpack(&self) -> Entry {
        let tb = self.tb_ntp.to_bintime();
        let te = tb + Bintime::new(0, (self.d_te as u64) << 32);
        let tf = self.ta + self.d_tf as u64;
        Entry {
            ts: Timestamp::new(self.ta, tb, te, tf),
            f_local: self.f_local,
        }
    }
}

/// Validate the invariants an exchange must satisfy to enter history.
///
/// - `Tf` must strictly follow `Ta` (the reply can't arrive before the
///   request left).
/// - The round trip must fit in 32 bits of ticks, matching the compact
///   `dTf` field width.
/// - `Te` and `Tb` must fall within the same whole second — the server is
///   assumed to process a request well under a second.
fn validate(ts: &Timestamp) -> Result<()> {
    if ts.tf <= ts.ta {
        return Err(Error::OutOfDomain(
            "Tf must be strictly greater than Ta".into(),
        ));
    }
    if ts.rtt_ticks() > u32::MAX as u64 {
        return Err(Error::OutOfDomain(
            "round trip exceeds the representable tick range".into(),
        ));
    }
    if ts.server_delay().sec != 0 {
        return Err(Error::OutOfDomain(
            "Te and Tb must fall within the same second".into(),
        ));
    }
    Ok(())
}

/// An ordered, bounded-retention store of NTP exchanges.
///
/// Backed by a `BTreeMap` keyed on `Tb_ntp`, which gives `lower_bound`/
/// `upper_bound` range queries for free and keeps `insert`/`prune` at
/// O(log n).
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: BTreeMap<NtpTimestamp, CompactEntry>,
}

impl History {
    pub fn new() -> Self {
        History {
            entries: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an exchange keyed at this `Tb` is already present.
    pub fn contains(&self, tb: Bintime) -> bool {
        self.entries.contains_key(&NtpTimestamp::from_bintime(tb))
    }

    /// Insert a new exchange with the local-frequency estimate in effect.
    ///
    /// Fails with [`Error::OutOfDomain`] if the exchange violates the
    /// timestamp invariants, or [`Error::Duplicate`] if an exchange with
    /// the same `Tb` (at NTP resolution) is already stored.
    pub fn insert(&mut self, ts: Timestamp, f_local: f64) -> Result<()> {
        validate(&ts)?;
        let key = NtpTimestamp::from_bintime(ts.tb);
        if self.entries.contains_key(&key) {
            return Err(Error::Duplicate);
        }
        self.entries
            .insert(key, CompactEntry::pack(&Entry { ts, f_local }));
        Ok(())
    }

    /// Drop every entry whose `Tb` is strictly older than `cutoff`.
    ///
    /// Used to enforce the clock's retention window (`max_history`).
    pub fn prune(&mut self, cutoff: Bintime) {
        let key = NtpTimestamp::from_bintime(cutoff);
        self.entries = self.entries.split_off(&key);
    }

    /// Drop every entry for which `keep` returns `false`.
    ///
    /// Used by RTT level-shift detection to discard a stale RTT class.
    pub fn retain<F: FnMut(&Entry) -> bool>(&mut self, mut keep: F) {
        self.entries.retain(|_, v| keep(&v.unpack()));
    }

    /// Span covered by this history: `Tb` of the newest entry minus `Tb`
    /// of the oldest. Returns `Bintime::zero()` if fewer than two entries
    /// are stored.
    pub fn duration(&self) -> Bintime {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) if first.ts.tb != last.ts.tb => last.ts.tb - first.ts.tb,
            _ => Bintime::zero(),
        }
    }

    /// First entry with `Tb >= key`.
    pub fn lower_bound(&self, key: Bintime) -> Option<Entry> {
        let key = NtpTimestamp::from_bintime(key);
        self.entries.range(key..).next().map(|(_, v)| v.unpack())
    }

    /// First entry with `Tb > key`.
    pub fn upper_bound(&self, key: Bintime) -> Option<Entry> {
        let key = NtpTimestamp::from_bintime(key);
        self.entries
            .range((std::ops::Bound::Excluded(key), std::ops::Bound::Unbounded))
            .next()
            .map(|(_, v)| v.unpack())
    }

    pub fn first(&self) -> Option<Entry> {
        self.entries.values().next().map(|v| v.unpack())
    }

    pub fn last(&self) -> Option<Entry> {
        self.entries.values().next_back().map(|v| v.unpack())
    }

    /// Iterate entries in `Tb` order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = Entry> + '_ {
        self.entries.values().map(|v| v.unpack())
    }

    /// Iterate entries with `Tb` in `[lo, hi]`, inclusive.
    pub fn range(&self, lo: Bintime, hi: Bintime) -> impl Iterator<Item = Entry> + '_ {
        let lo = NtpTimestamp::from_bintime(lo);
        let hi = NtpTimestamp::from_bintime(hi);
        self.entries.range(lo..=hi).map(|(_, v)| v.unpack())
    }

    /// Apply `f` to every stored entry, e.g. to rebase `Ta`/`Tf` after a
    /// local-clock step correction. Re-keys the map since `f` may alter
    /// `Tb`.
    pub fn apply<F: FnMut(&mut Entry)>(&mut self, mut f: F) {
        let mut rebuilt = BTreeMap::new();
        for (_, packed) in std::mem::take(&mut self.entries) {
            let mut entry = packed.unpack();
            f(&mut entry);
            rebuilt.insert(
                NtpTimestamp::from_bintime(entry.ts.tb),
                CompactEntry::pack(&entry),
            );
        }
        self.entries = rebuilt;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
