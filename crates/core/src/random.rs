//! Pseudo-random source for slot placement
//!
//! SplitMix64 over an atomic counter: every call advances the state by the
//! golden-ratio increment and mixes the result. Not suitable for anything
//! security related.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

const GOLDEN_GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

/// Fast deterministic 64-bit generator, shareable across threads
#[derive(Debug)]
pub struct PseudoRandomSource {
    state: AtomicU64,
}

impl PseudoRandomSource {
    /// Create a generator from an explicit seed
    pub fn new(seed: u64) -> Self {
        Self {
            state: AtomicU64::new(seed),
        }
    }

    /// Create a generator seeded from the current wall-clock time
    pub fn from_time() -> Self {
        let now = Utc::now();
        let seed = now
            .timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp_micros()) as u64;
        Self::new(mix(seed))
    }

    /// Next value of the sequence
    #[inline]
    pub fn next_u64(&self) -> u64 {
        let z = self
            .state
            .fetch_add(GOLDEN_GAMMA, Ordering::Relaxed)
            .wrapping_add(GOLDEN_GAMMA);
        mix(z)
    }
}

#[inline]
fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
