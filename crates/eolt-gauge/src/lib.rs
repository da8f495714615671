//! eolt-gauge - Smart-battery gauges behind a serial-to-SMBus bridge
//!
//! - [`protocol`]: bridge frames, opcodes and status decoding
//! - [`bridge`]: word reads and writes, slave selection
//! - [`gauge`]: measurements, voltage and current calibration, date and
//!   serial stamping with EEPROM persistence
//!
//! # Example
//!
//! ```no_run
//! use eolt_core::SerialTransport;
//! use eolt_gauge::BatteryGauge;
//! use std::time::Duration;
//!
//! let port = SerialTransport::open("/dev/ttyUSB3", 9600, Duration::from_secs(1))?;
//! let mut gauge = BatteryGauge::new(port);
//! gauge.open()?;
//! let vit = gauge.read_vit()?;
//! println!("{:.3} V {:.3} A", vit.volts, vit.amps);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bridge;
pub mod error;
pub mod gauge;
pub mod protocol;

#[cfg(test)]
mod fake;

pub use bridge::Bridge;
pub use error::{GaugeError, Result};
pub use gauge::{encode_date, BatteryGauge, CurrentConstants, GaugeMap, VoltageConstants, Vit};
pub use protocol::{BridgeStatus, ErrorClass};
