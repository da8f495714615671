//! eolt-cal - Closed-loop calibration routines
//!
//! Routines run on the host during a test step. They read external
//! instruments through [`eolt_core::Meter`], wait through
//! [`eolt_core::Clock`] and push corrections into the unit:
//!
//! - [`settle`]: wait for a measurement to stop moving
//! - [`voltage`]: settle, write the measured value, re-measure, commit
//! - [`slope`]: time VFC monitor edges to derive current gains

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod settle;
pub mod slope;
pub mod voltage;

pub use error::{check_window, CalError, Result};
pub use settle::Settle;
pub use slope::{calibrate_current, measure_slope, CurrentGains, Monitor, Slope, SlopeConfig};
pub use voltage::{CalOutcome, CalibrationTarget, PfcTarget, VoltageCal, VoutTarget};
