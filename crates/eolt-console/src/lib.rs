//! eolt-console - Firmware consoles of units under test
//!
//! Units expose a line-oriented console on a UART. This crate layers:
//!
//! - [`framing`]: echo checking, prompt detection and reply splitting
//! - [`parameter`]: typed firmware variables with read/write formats
//! - [`table`]: per-product command tables and `STAT`/`CAL?` caches
//! - [`product`]: product verbs (brand, test modes, calibrations)
//! - [`products`]: built-in product profiles
//!
//! # Example
//!
//! ```no_run
//! use eolt_console::{products, ProductConsole};
//! use eolt_core::SerialTransport;
//! use std::time::Duration;
//!
//! let port = SerialTransport::open("/dev/ttyUSB1", 115200, Duration::from_secs(2))?;
//! let mut unit = ProductConsole::new(port, products::charger());
//! unit.open()?;
//! println!("Battery: {}", unit.read("BATTERY_VOLTS")?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod framing;
pub mod parameter;
pub mod product;
pub mod products;
pub mod table;

pub use error::{ConsoleError, Reclaim, Result};
pub use framing::{Console, Executor, FramingConfig, Response, UartMode};
pub use parameter::{Kind, OverrideState, Parameter, RawFn, Value};
pub use product::{BulkCommand, CalKeys, CurrentCal, ProductConsole, ProductProfile, StreamingConsole};
pub use table::{CommandTable, LineFormat, ReadingCache};
