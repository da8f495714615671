//! Battery-gauge commands

use super::open_port;
use crate::cli::{GaugeCommands, PortArgs};
use eolt_core::config::PortConfig;
use eolt_gauge::BatteryGauge;

/// Run one gauge action
pub fn cmd_gauge(
    args: &PortArgs,
    config: &PortConfig,
    action: &GaugeCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    let port = open_port("gauge", args, config)?;
    let mut gauge = BatteryGauge::new(port);

    match action {
        GaugeCommands::Status { echo } => {
            gauge.bridge_mut().echo(0x5A, *echo)?;
            let (status, version) = gauge.bridge_mut().board_status()?;
            println!("Bridge firmware {}, status {}", version, status);
        }
        GaugeCommands::Vit => {
            gauge.open()?;
            let vit = gauge.read_vit()?;
            println!(
                "{:.3} V  {:.3} A  {:.1}",
                vit.volts, vit.amps, vit.temperature
            );
        }
        GaugeCommands::SnDate { date, serial } => {
            gauge.open()?;
            let (word, serial) = gauge.sn_date(date, serial)?;
            println!("Date word 0x{:04X}, serial {}", word, serial);
        }
    }
    Ok(())
}
