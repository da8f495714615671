//! eolt-core - Shared plumbing for end-of-line test tooling
//!
//! This crate provides the pieces every other eolt crate builds on:
//!
//! - [`transport`]: the duplex byte stream used to talk to units, bridges and
//!   bootloaders, with a serial-port implementation and a simulated port for
//!   tests and fixtures
//! - [`instrument`]: capability traits for the outside world the core does not
//!   own (meters, clocks)
//! - [`config`]: station configuration loaded from TOML
//!
//! # Example
//!
//! ```no_run
//! use eolt_core::transport::{SerialTransport, Transport};
//! use std::time::Duration;
//!
//! let mut port = SerialTransport::open("/dev/ttyUSB0", 115200, Duration::from_secs(2))?;
//! port.write(b"SW-VERSION?\r")?;
//! let reply = port.read(64)?;
//! println!("{} bytes", reply.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod instrument;
pub mod transport;

pub use error::{InstrumentError, Result, TransportError};
pub use instrument::{Clock, ManualClock, Meter, SystemClock};
pub use transport::{SerialTransport, SimTransport, Transport};
