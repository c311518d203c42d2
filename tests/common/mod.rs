//! Shared test doubles: the crate's scripted co-processor emulator, a
//! deterministic clock, and a no-op delay provider.

use std::cell::Cell;

use atlink::time::Clock;

pub use atlink::link::mock::MockLink;

/// Deterministic clock that advances a fixed step on every query.
pub struct FakeClock {
    now: Cell<u64>,
    step: u64,
}

impl FakeClock {
    pub fn new(step: u64) -> Self {
        Self {
            now: Cell::new(0),
            step,
        }
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        let t = self.now.get();
        self.now.set(t + self.step);
        t
    }
}

/// Delay provider that returns immediately.
pub struct NoopDelay;

impl embedded_hal::delay::DelayNs for NoopDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}
