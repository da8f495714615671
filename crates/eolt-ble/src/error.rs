//! Error types for Bluetooth operations

use eolt_core::{InstrumentError, TransportError};
use thiserror::Error;

/// Bluetooth errors
#[derive(Debug, Error)]
pub enum BleError {
    /// A MAC address string in none of the accepted forms
    #[error("Invalid MAC address {0:?}")]
    InvalidMac(String),

    /// The radio answered with something other than the expected reply
    #[error("Unexpected reply {reply:?} to {command:?}")]
    Reply {
        /// Command sent
        command: String,
        /// Line received
        reply: String,
    },

    /// Retries exhausted without an acceptable reply
    #[error("No acceptable reply to {command:?} after {attempts} attempts")]
    NoReply {
        /// Command sent
        command: String,
        /// Attempts made
        attempts: usize,
    },

    /// Pairing confirmed with a non-zero status
    #[error("Pairing failed with status {0}")]
    PairFailed(String),

    /// Operation needs a streaming link
    #[error("Not in streaming mode")]
    NotStreaming,

    /// JSON-RPC call answered with an error
    #[error("RPC {method} failed: {message}")]
    Rpc {
        /// Method called
        method: String,
        /// Error message from the peer
        message: String,
    },

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// External scanner failure
    #[error(transparent)]
    Scanner(#[from] InstrumentError),

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result type for Bluetooth operations
pub type Result<T> = std::result::Result<T, BleError>;
