//! Settle-then-step voltage calibration
//!
//! The unit's own reading is trimmed by writing the settled external
//! measurement into a calibration entry, then re-measuring. Nothing is
//! written when the unit is already within tolerance, so a repeat run after
//! a successful calibration only measures.

use crate::error::{CalError, Result};
use crate::settle::Settle;
use eolt_console::ProductConsole;
use eolt_core::{Clock, Meter, Transport};

/// Something a measured value can be written into
pub trait CalibrationTarget {
    /// Name for log messages
    fn name(&self) -> &str;

    /// Hand the settled measurement to the unit
    fn write_measured(&mut self, measured: f64) -> Result<()>;

    /// Commit to non-volatile memory
    fn commit(&mut self) -> Result<()>;
}

/// PFC bus voltage calibration entry of a product console
pub struct PfcTarget<'a, T: Transport>(pub &'a mut ProductConsole<T>);

impl<T: Transport> CalibrationTarget for PfcTarget<'_, T> {
    fn name(&self) -> &str {
        "PFC"
    }

    fn write_measured(&mut self, measured: f64) -> Result<()> {
        Ok(self.0.write_pfc(measured)?)
    }

    fn commit(&mut self) -> Result<()> {
        Ok(self.0.nv_write()?)
    }
}

/// Output voltage PWM numerator of a product console
///
/// Each step already commits, see [`ProductConsole::cal_vout`].
pub struct VoutTarget<'a, T: Transport>(pub &'a mut ProductConsole<T>);

impl<T: Transport> CalibrationTarget for VoutTarget<'_, T> {
    fn name(&self) -> &str {
        "Vout"
    }

    fn write_measured(&mut self, measured: f64) -> Result<()> {
        self.0.cal_vout(measured)?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Limits of one settle-then-step calibration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoltageCal {
    /// Expected reading after calibration
    pub target: f64,
    /// Allowed deviation from `target`
    pub tolerance: f64,
    /// Settling rule for every measurement
    pub settle: Settle,
    /// Writes attempted before giving up
    pub max_retries: usize,
}

/// What a calibration run did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalOutcome {
    /// Settled reading before any write
    pub before: f64,
    /// Settled reading at the end
    pub after: f64,
    /// Number of writes made
    pub writes: usize,
}

impl VoltageCal {
    /// PFC bus: settle to 0.05 V, accept within 2 V, three retries
    pub fn pfc(target: f64) -> Self {
        Self {
            target,
            tolerance: 2.0,
            settle: Settle::new(0.05),
            max_retries: 3,
        }
    }

    /// 12 V output: settle to 5 mV, accept within 20 mV, three retries
    pub fn vout(target: f64) -> Self {
        Self {
            target,
            tolerance: 0.02,
            settle: Settle::new(0.005),
            max_retries: 3,
        }
    }

    fn within(&self, v: f64) -> bool {
        (v - self.target).abs() <= self.tolerance
    }

    /// Measure, write, re-measure until within tolerance, then commit
    pub fn run(
        &self,
        meter: &mut dyn Meter,
        unit: &mut dyn CalibrationTarget,
        clock: &dyn Clock,
    ) -> Result<CalOutcome> {
        let before = self.settle.read(meter, clock)?;
        if self.within(before) {
            log::info!(
                "cal: {} already at {} (target {}), nothing written",
                unit.name(),
                before,
                self.target
            );
            return Ok(CalOutcome {
                before,
                after: before,
                writes: 0,
            });
        }

        let mut measured = before;
        for attempt in 1..=self.max_retries {
            unit.write_measured(measured)?;
            measured = self.settle.read(meter, clock)?;
            if self.within(measured) {
                unit.commit()?;
                log::info!(
                    "cal: {} calibrated, {} -> {} after {} write(s)",
                    unit.name(),
                    before,
                    measured,
                    attempt
                );
                return Ok(CalOutcome {
                    before,
                    after: measured,
                    writes: attempt,
                });
            }
            log::warn!(
                "cal: {} reads {} after attempt {}, target {} +/- {}",
                unit.name(),
                measured,
                attempt,
                self.target,
                self.tolerance
            );
        }

        Err(CalError::NotConverged {
            attempts: self.max_retries,
            last: measured,
            target: self.target,
            tolerance: self.tolerance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settle::tests::canned;
    use eolt_console::products;
    use eolt_core::{InstrumentError, ManualClock, SimTransport};
    use std::cell::Cell;
    use std::rc::Rc;

    struct FakeUnit {
        level: Rc<Cell<f64>>,
        shift_to: Option<f64>,
        writes: Vec<f64>,
        commits: usize,
    }

    impl CalibrationTarget for FakeUnit {
        fn name(&self) -> &str {
            "fake"
        }

        fn write_measured(&mut self, measured: f64) -> Result<()> {
            self.writes.push(measured);
            if let Some(v) = self.shift_to {
                self.level.set(v);
            }
            Ok(())
        }

        fn commit(&mut self) -> Result<()> {
            self.commits += 1;
            Ok(())
        }
    }

    fn noisy_meter(level: Rc<Cell<f64>>, noise: f64) -> impl FnMut() -> std::result::Result<f64, InstrumentError> {
        let mut sign = 1.0;
        move || {
            sign = -sign;
            Ok(level.get() + sign * noise)
        }
    }

    #[test]
    fn test_pfc_scenario() {
        let clock = Rc::new(ManualClock::new());
        let mut unit = ProductConsole::new(SimTransport::new("sim"), products::acdc_supply())
            .with_clock(Box::new(clock.clone()));
        unit.console_mut()
            .transport_mut()
            .push(b"CAL_PFC 430.02 -> 0\r> NV-WRITE\r> ");

        let mut meter = canned(&[430.0, 430.02, 430.04, 435.0, 435.0]);
        let outcome = VoltageCal::pfc(435.0)
            .run(&mut meter, &mut PfcTarget(&mut unit), clock.as_ref())
            .unwrap();

        assert_eq!(
            outcome,
            CalOutcome {
                before: 430.02,
                after: 435.0,
                writes: 1
            }
        );
        assert_eq!(
            unit.console().transport().written(),
            b"CAL_PFC 430.02\rNV-WRITE\r"
        );
    }

    #[test]
    fn test_converges_with_noise() {
        let clock = ManualClock::new();
        let level = Rc::new(Cell::new(11.9));
        let cal = VoltageCal::vout(12.0);
        let mut meter = noisy_meter(level.clone(), cal.settle.stability / 2.0 * 0.9);
        let mut unit = FakeUnit {
            level,
            shift_to: Some(12.0),
            writes: Vec::new(),
            commits: 0,
        };

        let outcome = cal.run(&mut meter, &mut unit, &clock).unwrap();
        assert!(outcome.writes <= cal.max_retries);
        assert!((outcome.after - 12.0).abs() <= cal.tolerance);
        assert_eq!(unit.commits, 1);
    }

    #[test]
    fn test_already_in_tolerance_skips_write() {
        let clock = ManualClock::new();
        let level = Rc::new(Cell::new(435.5));
        let mut meter = noisy_meter(level.clone(), 0.01);
        let mut unit = FakeUnit {
            level,
            shift_to: None,
            writes: Vec::new(),
            commits: 0,
        };

        let outcome = VoltageCal::pfc(435.0).run(&mut meter, &mut unit, &clock).unwrap();
        assert_eq!(outcome.writes, 0);
        assert!(unit.writes.is_empty());
        assert_eq!(unit.commits, 0);
    }

    #[test]
    fn test_stuck_fails_after_max_retries() {
        let clock = ManualClock::new();
        let level = Rc::new(Cell::new(400.0));
        let mut meter = noisy_meter(level.clone(), 0.01);
        let mut unit = FakeUnit {
            level,
            shift_to: None,
            writes: Vec::new(),
            commits: 0,
        };

        let err = VoltageCal::pfc(435.0)
            .run(&mut meter, &mut unit, &clock)
            .unwrap_err();
        assert!(matches!(err, CalError::NotConverged { attempts: 3, .. }));
        assert_eq!(unit.writes.len(), 3);
        assert_eq!(unit.commits, 0);
    }
}
