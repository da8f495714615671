//! eolt-ble - Bluetooth peers of units under test
//!
//! - [`mac`]: MAC address parsing and formatting
//! - [`pin`]: pairing PINs derived from the serial number
//! - [`at`]: classic radio module driven by AT commands, with JSON-RPC over
//!   the streaming link
//! - [`advert`]: BLE advert lookup through an external scanner
//!
//! # Example
//!
//! ```no_run
//! use eolt_ble::AtRadio;
//! use eolt_core::SerialTransport;
//! use std::time::Duration;
//!
//! let port = SerialTransport::open("/dev/ttyUSB2", 115200, Duration::from_secs(10))?;
//! let mut radio = AtRadio::new(port);
//! radio.setup()?;
//! if let Some(peer) = radio.scan("A1509020010")? {
//!     radio.pair(&peer)?;
//!     radio.connect_streaming()?;
//!     println!("{:?}", radio.get_system_info()?);
//!     radio.unpair()?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod advert;
pub mod at;
pub mod error;
pub mod mac;
pub mod pin;
pub mod rpc;

#[cfg(test)]
mod fake;

pub use advert::{scan_advert_blemac, Reading, ScanService};
pub use at::{Advert, AtRadio, Peer};
pub use error::{BleError, Result};
pub use mac::MacAddr;
pub use pin::{pin4, pin6};
pub use rpc::SystemInfo;
