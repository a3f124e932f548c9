//! Numerical primitives for the timesync clock discipline algorithm.

pub mod math;

pub use math::ppm::threshold_ppm;
pub use math::tdigest::{Centroid, TDigest};
