//! Settling detector

use crate::error::{CalError, Result};
use eolt_core::{Clock, Meter};
use std::time::Duration;

/// Readings taken before giving up on a settle
pub const DEFAULT_MAX_READS: usize = 20;

/// When a measurement counts as settled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settle {
    /// Largest difference between two consecutive readings that counts
    /// as stable
    pub stability: f64,
    /// Readings taken before failing with `NotSettled`
    pub max_reads: usize,
    /// Wait between readings
    pub interval: Duration,
}

impl Settle {
    /// Settle on `stability` with default limits
    pub fn new(stability: f64) -> Self {
        Self {
            stability,
            max_reads: DEFAULT_MAX_READS,
            interval: Duration::from_millis(200),
        }
    }

    /// Set the wait between readings
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the reading limit
    pub fn max_reads(mut self, max_reads: usize) -> Self {
        self.max_reads = max_reads;
        self
    }

    /// Read until two consecutive readings differ by less than the
    /// stability threshold; returns the later one
    pub fn read(&self, meter: &mut dyn Meter, clock: &dyn Clock) -> Result<f64> {
        let mut last = meter.measure()?;
        for reads in 2..=self.max_reads {
            clock.sleep(self.interval);
            let next = meter.measure()?;
            log::trace!("cal: reading {} ({} of {})", next, reads, self.max_reads);
            if (next - last).abs() < self.stability {
                return Ok(next);
            }
            last = next;
        }
        Err(CalError::NotSettled {
            reads: self.max_reads,
            last,
        })
    }
}
