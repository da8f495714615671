//! Error types for ISP operations

use crate::protocol::status_name;
use eolt_core::TransportError;
use thiserror::Error;

/// ISP-specific errors
#[derive(Debug, Error)]
pub enum IspError {
    /// The bootloader never completed the synchronisation handshake
    #[error("Not synchronised: {0}")]
    NotSynchronised(String),

    /// Part identification returned an ID missing from the part table
    #[error("Unknown device: part ID 0x{0:08X}")]
    UnknownDevice(u32),

    /// The bootloader returned a non-zero status
    #[error("Command {command:?} failed with status {status} ({})", status_name(*status))]
    Command {
        /// Command line sent
        command: String,
        /// Returned status code
        status: u32,
    },

    /// A reply line could not be parsed
    #[error("Unexpected response {response:?} to {command:?}")]
    BadResponse {
        /// Command line sent
        command: String,
        /// Line received
        response: String,
    },

    /// Uuencoded data failed framing, length or checksum checks
    #[error("Uuencode error: {0}")]
    Uuencode(String),

    /// Device CRC32 of a sector differs from the host CRC32
    #[error("Verify failed for sector {sector}: expected CRC 0x{expected:08X}, device reported 0x{actual:08X}")]
    Verify {
        /// Sector number
        sector: usize,
        /// Host CRC32
        expected: u32,
        /// Device CRC32
        actual: u32,
    },

    /// Read-back verify found a differing byte
    #[error("Read-back mismatch at 0x{offset:08X}: expected 0x{expected:02X}, read 0x{actual:02X}")]
    ReadBack {
        /// Flash offset of the first mismatch
        offset: usize,
        /// Image byte
        expected: u8,
        /// Byte read from the device
        actual: u8,
    },

    /// The image does not fit or is otherwise unusable
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl IspError {
    /// Whether this is a verify failure (CRC or read-back)
    pub fn is_verify(&self) -> bool {
        matches!(self, IspError::Verify { .. } | IspError::ReadBack { .. })
    }
}

/// Result type for ISP operations
pub type Result<T> = std::result::Result<T, IspError>;
