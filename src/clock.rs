//! Monotonic tick source used for every timeout in the link.
//!
//! Ticks are milliseconds on the host. The counter is 32 bits wide and wraps;
//! timeouts are always evaluated with [`elapsed`], so a wrap in the middle of
//! a measurement is tolerated as long as the measured span itself fits.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

pub type Tick = u32;

/// Source of the current tick count.
pub trait Clock: Send + Sync {
    fn now(&self) -> Tick;
}

/// Ticks between `start` and `now`, with unsigned wraparound.
pub fn elapsed(start: Tick, now: Tick) -> Tick {
    now.wrapping_sub(start)
}

/// Milliseconds since the clock was created.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}
impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}
impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}
impl Clock for SystemClock {
    fn now(&self) -> Tick {
        // Truncation is the wraparound of the tick counter.
        self.origin.elapsed().as_millis() as Tick
    }
}

/// A clock that only moves when told to. Handy for simulations and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    ticks: AtomicU32,
}
impl ManualClock {
    pub fn new(start: Tick) -> Self {
        ManualClock {
            ticks: AtomicU32::new(start),
        }
    }

    pub fn set(&self, ticks: Tick) {
        self.ticks.store(ticks, Ordering::SeqCst);
    }

    pub fn advance(&self, ticks: Tick) {
        // fetch_add wraps on overflow, which is what the counter does.
        self.ticks.fetch_add(ticks, Ordering::SeqCst);
    }
}
impl Clock for ManualClock {
    fn now(&self) -> Tick {
        self.ticks.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn elapsed_survives_wraparound() {
    assert_eq!(elapsed(10, 25), 15);
    assert_eq!(elapsed(u32::MAX - 4, 5), 10);
}

#[test]
fn manual_clock_moves_on_demand() {
    let clock = ManualClock::new(u32::MAX);
    assert_eq!(clock.now(), u32::MAX);
    clock.advance(2);
    assert_eq!(clock.now(), 1);
    clock.set(500);
    assert_eq!(clock.now(), 500);
}

#[test]
fn system_clock_is_monotonic() {
    let clock = SystemClock::new();
    let first = clock.now();
    let second = clock.now();
    assert!(elapsed(first, second) < 1_000);
}
