//! Error types for calibration routines

use eolt_console::ConsoleError;
use eolt_core::InstrumentError;
use thiserror::Error;

/// Calibration errors
#[derive(Debug, Error)]
pub enum CalError {
    /// Readings never settled
    #[error("Measurement did not settle after {reads} readings (last {last})")]
    NotSettled {
        /// Readings taken
        reads: usize,
        /// Last reading
        last: f64,
    },

    /// Post-calibration reading stayed outside tolerance
    #[error("Calibration did not converge after {attempts} attempts: {last} is not within {tolerance} of {target}")]
    NotConverged {
        /// Attempts made
        attempts: usize,
        /// Last settled reading
        last: f64,
        /// Target value
        target: f64,
        /// Allowed deviation
        tolerance: f64,
    },

    /// The monitor register stopped changing
    #[error("Monitor read timeout: no edge after {polls} polls")]
    MonitorTimeout {
        /// Polls made while waiting for the edge
        polls: u32,
    },

    /// A computed constant failed its sanity window
    #[error("{name} out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        /// Constant name
        name: String,
        /// Computed value
        value: f64,
        /// Lower limit
        min: f64,
        /// Upper limit
        max: f64,
    },

    /// Measurement capability failure
    #[error(transparent)]
    Instrument(#[from] InstrumentError),

    /// Unit console failure
    #[error(transparent)]
    Console(#[from] ConsoleError),
}

/// Result type for calibration routines
pub type Result<T> = std::result::Result<T, CalError>;

/// Fail with `OutOfRange` unless `value` is within `[min, max]`
pub fn check_window(name: &str, value: f64, min: f64, max: f64) -> Result<f64> {
    if value.is_finite() && value >= min && value <= max {
        Ok(value)
    } else {
        Err(CalError::OutOfRange {
            name: name.to_string(),
            value,
            min,
            max,
        })
    }
}
