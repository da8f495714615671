//! Error types for transports and instrument capabilities

use thiserror::Error;

/// Errors raised by a byte transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to open the underlying device
    #[error("Failed to open {port}: {reason}")]
    OpenFailed {
        /// Port name or path
        port: String,
        /// Driver message
        reason: String,
    },

    /// No data arrived before the transport deadline
    #[error("Timeout waiting for data ({received} bytes received: {partial:?})")]
    Timeout {
        /// Number of bytes received before the deadline
        received: usize,
        /// What was received, lossily decoded for diagnostics
        partial: String,
    },

    /// I/O error during communication
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl TransportError {
    /// Build a timeout error that carries the bytes read so far
    pub fn timeout(partial: &[u8]) -> Self {
        TransportError::Timeout {
            received: partial.len(),
            partial: String::from_utf8_lossy(partial).into_owned(),
        }
    }

    /// Whether this error is a read deadline expiring
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Error reported by an external instrument capability
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Instrument error: {0}")]
pub struct InstrumentError(pub String);

impl InstrumentError {
    /// Create an instrument error from any message
    pub fn new(msg: impl Into<String>) -> Self {
        InstrumentError(msg.into())
    }
}
