//! Capabilities the core borrows from the test station
//!
//! Laboratory instruments are owned by the sequencer. Calibration routines
//! only see them through these small traits, so a DMM channel can be a
//! closure and tests can hand in canned readings.

use crate::error::InstrumentError;
use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Something that produces a measurement on demand (DMM channel, scope
/// cursor, a register read on the unit itself)
pub trait Meter {
    /// Take one reading
    fn measure(&mut self) -> Result<f64, InstrumentError>;
}

impl<F> Meter for F
where
    F: FnMut() -> Result<f64, InstrumentError>,
{
    fn measure(&mut self) -> Result<f64, InstrumentError> {
        self()
    }
}

/// Monotonic time source with the ability to wait
pub trait Clock {
    /// Time elapsed since an arbitrary fixed origin
    fn now(&self) -> Duration;

    /// Block for `duration`
    fn sleep(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Wall clock backed by `Instant` and `thread::sleep`
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is now
    pub fn new() -> Self {
        Self {
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
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only moves when slept on or advanced
///
/// Used by fixtures that simulate time-dependent hardware.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Duration>,
    slept: Cell<Duration>,
}

impl ManualClock {
    /// Create a clock at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward without counting it as a sleep
    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }

    /// Total time spent in `sleep`
    pub fn slept(&self) -> Duration {
        self.slept.get()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
        self.slept.set(self.slept.get() + duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_meter() {
        let mut readings = vec![1.5, 2.5].into_iter();
        let mut meter = move || {
            readings
                .next()
                .ok_or_else(|| InstrumentError::new("no more readings"))
        };
        assert_eq!(meter.measure().unwrap(), 1.5);
        assert_eq!(meter.measure().unwrap(), 2.5);
        assert!(meter.measure().is_err());
    }

    #[test]
    fn test_manual_clock() {
        let clock = Rc::new(ManualClock::new());
        let shared = Rc::clone(&clock);
        shared.sleep(Duration::from_millis(900));
        clock.advance(Duration::from_millis(100));
        assert_eq!(clock.now(), Duration::from_secs(1));
        assert_eq!(clock.slept(), Duration::from_millis(900));
    }
}
