//! Error types for console operations

use eolt_core::TransportError;
use std::fmt;
use thiserror::Error;

/// Console, parameter and product errors
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// The echoed command differs from what was sent
    #[error("Echo mismatch: sent {sent:?}, echoed {echoed:?}")]
    Command {
        /// Command sent
        sent: String,
        /// Bytes echoed back
        echoed: String,
    },

    /// Missing prompt or too few response lines
    #[error("Bad response to {command:?}: {reason}")]
    Response {
        /// Command sent
        command: String,
        /// What went wrong
        reason: String,
    },

    /// A response could not be coerced to the parameter's type
    #[error("Parameter {name}: {reason}")]
    Parameter {
        /// Parameter name or verb
        name: String,
        /// What went wrong
        reason: String,
    },

    /// No parameter of that name in the command table
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    /// Write to a read-only parameter
    #[error("Parameter {0} is read-only")]
    ReadOnly(String),

    /// Read of a write-only parameter
    #[error("Parameter {0} is write-only")]
    WriteOnly(String),

    /// Value outside the declared limits, or a computed constant outside
    /// its sanity window
    #[error("{name}: value {value} outside [{min}, {max}]")]
    OutOfRange {
        /// Parameter or constant name
        name: String,
        /// Offending value
        value: f64,
        /// Lower limit
        min: f64,
        /// Upper limit
        max: f64,
    },

    /// The product does not support this verb
    #[error("Not supported by {product}: {what}")]
    Unsupported {
        /// Product name
        product: String,
        /// Verb or feature
        what: String,
    },

    /// Command table file could not be parsed
    #[error("Command table parse error: {0}")]
    Table(#[from] ron::error::SpannedError),

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ConsoleError {
    pub(crate) fn parameter(name: &str, reason: impl Into<String>) -> Self {
        ConsoleError::Parameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// A failed mode switch, handing back the console it was given
///
/// The port stays open, so the caller can retry or reset the unit.
pub struct Reclaim<C> {
    /// The console, in the state it had before the switch
    pub console: C,
    /// Why the switch failed
    pub error: ConsoleError,
}

impl<C> Reclaim<C> {
    /// Split into the console and the error
    pub fn into_parts(self) -> (C, ConsoleError) {
        (self.console, self.error)
    }
}

impl<C> fmt::Debug for Reclaim<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reclaim").field("error", &self.error).finish()
    }
}

impl<C> fmt::Display for Reclaim<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<C> std::error::Error for Reclaim<C> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<C> From<Reclaim<C>> for ConsoleError {
    fn from(r: Reclaim<C>) -> Self {
        r.error
    }
}

/// Result type for console operations
pub type Result<T> = std::result::Result<T, ConsoleError>;
