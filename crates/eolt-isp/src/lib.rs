//! eolt-isp - NXP LPC In-System Programming
//!
//! This crate drives the ROM bootloader of LPC-family ARM microcontrollers
//! over a raw serial line to identify, erase, program and verify the part.
//!
//! # Protocol Overview
//!
//! The bootloader speaks an ASCII line protocol. Each command is a letter
//! followed by decimal arguments and `\r\n`; the device answers with a
//! numeric status line (`0` on success) and, for some commands, further
//! data lines. Older parts transfer binary data uuencoded in blocks of 20
//! lines, each block followed by a decimal checksum; newer parts stream raw
//! bytes and can report a CRC32 of a flash range.
//!
//! # Example
//!
//! ```no_run
//! use eolt_core::SerialTransport;
//! use eolt_isp::{builtin_parts, program_device, LpcIsp, ProgramOptions};
//! use std::time::Duration;
//!
//! let port = SerialTransport::open("/dev/ttyUSB0", 115200, Duration::from_secs(2))?;
//! let mut isp = LpcIsp::new(port, 12000);
//! let image = std::fs::read("firmware.bin")?;
//! let summary = program_device(
//!     &mut isp,
//!     builtin_parts(),
//!     &image,
//!     &ProgramOptions::default(),
//!     &mut |done, total| println!("sector {}/{}", done, total),
//! )?;
//! println!("Programmed {}", summary.part);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod image;
pub mod isp;
pub mod panel;
pub mod part;
pub mod programmer;
pub mod protocol;
pub mod uuencode;

#[cfg(test)]
mod fake;

pub use error::{IspError, Result};
pub use image::{CrpPolicy, FlashImage};
pub use isp::LpcIsp;
pub use panel::{program_panel, PanelReport};
pub use part::{builtin_parts, LpcPart, PartDatabase, PartDbError};
pub use programmer::{program_device, ProgramOptions, ProgramSummary};
