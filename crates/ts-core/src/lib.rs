//! Time-synchronization core: a local clock disciplined against a remote
//! NTPv4 reference, plus the time-counter and monotone-time abstractions
//! other subsystems read to timestamp their measurements.
//!
//! Module map:
//! - [`bintime`] — 64.64 fixed-point time representation and conversions.
//! - [`counter`] — the timecounter registry (`now()`/`frequency()`).
//! - [`history`] — the compact NTP exchange history.
//! - [`clock`] — the RADclock-style disciplining algorithm.
//! - [`keeper`] — the published keeper parameters and wait-free clock reads.
//! - [`ntp`] — the NTPv4 wire codec and UDP exchange.
//! - [`source_system`] — a system-clock-backed bootstrap time source.
//! - [`api`] — the control protocol's message shapes.
//! - [`server`] — control-API handlers and the NTP poll scheduler.
//! - [`config`] — process configuration.
//! - [`logging`] — structured logging.
//!
//! The binary entry point is in `main.rs`.

pub mod api;
pub mod bintime;
pub mod clock;
pub mod config;
pub mod counter;
pub mod history;
pub mod keeper;
pub mod logging;
pub mod ntp;
pub mod server;
pub mod source_system;
