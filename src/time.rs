//! Monotonic time source.
//!
//! The engine measures every response and handshake window against a
//! [`Clock`]. Hosts use [`StdClock`]; embedded targets wrap their
//! platform timer (e.g. `esp_timer_get_time`) in their own impl.

/// Monotonic millisecond clock.
pub trait Clock {
    /// Milliseconds since some fixed origin (monotonic, never decreasing).
    fn now_ms(&self) -> u64;
}

impl<C: Clock> Clock for &C {
    fn now_ms(&self) -> u64 {
        (*self).now_ms()
    }
}

/// Host clock backed by `std::time::Instant`.
pub struct StdClock {
    start: std::time::Instant,
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
}

impl Clock for StdClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Clock;
    use core::cell::Cell;

    /// Deterministic clock that advances a fixed step on every query, so
    /// timeout loops terminate without wall-clock sleeps.
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

        pub fn advance(&self, ms: u64) {
            self.now.set(self.now.get() + ms);
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
}

#[cfg(test)]
mod tests {
    use super::testing::FakeClock;
    use super::*;

    #[test]
    fn std_clock_is_monotonic() {
        let c = StdClock::new();
        let a = c.now_ms();
        let b = c.now_ms();
        assert!(b >= a);
    }

    #[test]
    fn fake_clock_steps() {
        let c = FakeClock::new(10);
        assert_eq!(c.now_ms(), 0);
        assert_eq!(c.now_ms(), 10);
        c.advance(100);
        assert_eq!(c.now_ms(), 120);
    }
}
