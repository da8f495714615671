//! Command implementations

pub mod console;
pub mod gauge;
pub mod isp;

use crate::cli::PortArgs;
use eolt_core::config::PortConfig;
use eolt_core::SerialTransport;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the front-end itself
#[derive(Debug, Error)]
pub enum CliError {
    /// No port on the command line or in the station configuration
    #[error("No {0} port given (use --port or the station configuration)")]
    NoPort(&'static str),

    /// Unknown product profile
    #[error("Unknown product '{0}'")]
    UnknownProduct(String),

    /// Some panel positions failed
    #[error("{0} panel position(s) failed")]
    PanelFailed(usize),
}

/// Open the serial port named on the command line or, failing that, in the
/// station configuration
pub fn open_port(
    what: &'static str,
    args: &PortArgs,
    config: &PortConfig,
) -> Result<SerialTransport, Box<dyn std::error::Error>> {
    let device = args
        .port
        .clone()
        .or_else(|| config.port.clone())
        .ok_or(CliError::NoPort(what))?;
    let baud = args.baud.unwrap_or(config.baud);
    open_serial(&device, baud, config.timeout())
}

fn open_serial(
    device: &str,
    baud: u32,
    timeout: Duration,
) -> Result<SerialTransport, Box<dyn std::error::Error>> {
    let port = SerialTransport::open(device, baud, timeout)?;
    log::info!("Opened {} at {} baud", device, baud);
    Ok(port)
}
