//! Error types for the gauge driver

use crate::protocol::BridgeStatus;
use eolt_cal::CalError;
use eolt_core::TransportError;
use thiserror::Error;

/// Bridge and gauge errors
#[derive(Debug, Error)]
pub enum GaugeError {
    /// The bridge reported a bus error
    #[error("{command} failed: {status}")]
    Status {
        /// Opcode name
        command: &'static str,
        /// Decoded status
        status: BridgeStatus,
    },

    /// Reply frame with the wrong header or echo
    #[error("Bad bridge reply {reply:02X?} to {sent:02X?}")]
    Frame {
        /// Frame sent
        sent: [u8; 5],
        /// Frame received
        reply: Vec<u8>,
    },

    /// Read-back after a write differs
    #[error("Verify failed at {location}: wrote 0x{expected:04X}, read 0x{actual:04X}")]
    Verify {
        /// Register or EEPROM address
        location: String,
        /// Value written
        expected: u16,
        /// Value read back
        actual: u16,
    },

    /// Manufacture date unusable
    #[error("Invalid date {0:?}")]
    InvalidDate(String),

    /// Serial number not in 0..=65535
    #[error("Invalid serial number {0:?}")]
    InvalidSerial(String),

    /// Calibration arithmetic or measurement failure
    #[error(transparent)]
    Cal(#[from] CalError),

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result type for gauge operations
pub type Result<T> = std::result::Result<T, GaugeError>;
