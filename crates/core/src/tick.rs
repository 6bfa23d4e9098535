//! Coarse time for expiry bookkeeping

use std::time::Instant;

/// Monotonically increasing coarse time unit
pub type Tick = u64;

/// Tick source counting whole seconds since creation
///
/// Starts at `base` so a restarted service can continue a tick sequence.
#[derive(Debug, Clone)]
pub struct TickClock {
    started: Instant,
    base: Tick,
}

impl TickClock {
    /// Clock starting at tick 0
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Clock starting at `base`
    pub fn starting_at(base: Tick) -> Self {
        Self {
            started: Instant::now(),
            base,
        }
    }

    /// Current tick
    pub fn now(&self) -> Tick {
        self.base + self.started.elapsed().as_secs()
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new()
    }
}
