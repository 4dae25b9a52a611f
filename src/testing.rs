//! Deterministic fakes shared by the unit tests.

use crate::time_utils::Clock;
use embedded_hal::delay::DelayNs;
use std::cell::Cell;
use std::rc::Rc;

/// Clock whose time only moves when something delays on it.
///
/// Clones share the same timeline, so a sensor's delay is visible to every
/// other component holding a clone.
#[derive(Clone, Debug, Default)]
pub(crate) struct MockClock {
    ns: Rc<Cell<u64>>,
}

impl MockClock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn at_ms(ms: u64) -> Self {
        let clock = Self::default();
        clock.set_ms(ms);
        clock
    }

    pub(crate) fn set_ms(&self, ms: u64) {
        self.ns.set(ms * 1_000_000);
    }

    pub(crate) fn advance_ms(&self, ms: u64) {
        self.ns.set(self.ns.get() + ms * 1_000_000);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.ns.get() / 1_000_000
    }
}

impl DelayNs for MockClock {
    fn delay_ns(&mut self, ns: u32) {
        self.ns.set(self.ns.get() + u64::from(ns));
    }

    fn delay_us(&mut self, us: u32) {
        self.ns.set(self.ns.get() + u64::from(us) * 1_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance_ms(u64::from(ms));
    }
}

/// Error type for scripted buses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct BusFault(pub &'static str);
