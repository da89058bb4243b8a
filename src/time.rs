//! Simulation time
//!
//! The simulation clock ticks in integer nanoseconds so that time stamps can be compared exactly.

use serde::{Deserialize, Serialize};

/// Simulation time in nanoseconds
pub type Tick = u64;

/// Number of ticks in one second
pub const TICKS_PER_SECOND: f64 = 1e9;

/// Converts seconds into ticks
pub fn seconds_to_tick(seconds: f64) -> Tick {
    (seconds * TICKS_PER_SECOND).round() as Tick
}
/// Converts ticks into seconds
pub fn tick_to_seconds(tick: Tick) -> f64 {
    tick as f64 / TICKS_PER_SECOND
}

/// A value stamped with the time it was produced at
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timestamped<T> {
    pub value: T,
    pub generation_time: Tick,
}
impl<T> Timestamped<T> {
    pub fn new(value: T, generation_time: Tick) -> Self {
        Self {
            value,
            generation_time,
        }
    }
    /// Updates the value and its time stamp
    pub fn set(&mut self, value: T, t: Tick) {
        self.value = value;
        self.generation_time = t;
    }
    /// Checks if the value has been produced at time `t`
    #[inline]
    pub fn is_fresh(&self, t: Tick) -> bool {
        self.generation_time == t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(seconds_to_tick(1e-3), 1_000_000);
        assert_eq!(seconds_to_tick(2.5), 2_500_000_000);
        assert!((tick_to_seconds(1_500_000) - 1.5e-3).abs() < 1e-15);
    }

    #[test]
    fn freshness() {
        let mut seeing = Timestamped::new(0.65, 0);
        assert!(seeing.is_fresh(0));
        seeing.set(0.7, 10);
        assert!(!seeing.is_fresh(0));
        assert!(seeing.is_fresh(10));
    }
}
