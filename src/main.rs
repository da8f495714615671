//! eolt - End-of-line test tooling
//!
//! Front-end for the eolt crates: LPC ISP programming (single part or a
//! parallel panel), product firmware consoles, BLE pairing PINs and
//! battery-gauge helpers. Station wiring comes from an optional TOML file;
//! command-line flags override it.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use eolt_core::config::StationConfig;
use eolt_isp::{builtin_parts, PartDatabase, ProgramOptions};
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let config = match &cli.config {
        Some(path) => StationConfig::from_file(path)?,
        None => StationConfig::default(),
    };

    match cli.command {
        Commands::ListParts => {
            let db = load_part_database(cli.part_db.as_deref())?;
            commands::isp::list_parts(&db);
            Ok(())
        }
        Commands::Program {
            port,
            image,
            crp,
            verify_read,
        } => {
            let db = load_part_database(cli.part_db.as_deref())?;
            let options = ProgramOptions { crp, verify_read };
            commands::isp::cmd_program(&port, &config.isp, &db, &image, &options)
        }
        Commands::SerialId { port } => commands::isp::cmd_serial_id(&port, &config.isp),
        Commands::Panel {
            ports,
            image,
            crp,
            verify_read,
        } => {
            let db = load_part_database(cli.part_db.as_deref())?;
            let options = ProgramOptions { crp, verify_read };
            let ports = if ports.is_empty() { config.panel.clone() } else { ports };
            commands::isp::cmd_panel(&ports, &config.isp, &db, &image, &options)
        }
        Commands::Console {
            port,
            product,
            table,
            action,
        } => {
            let profile = commands::console::load_profile(&product, table.as_deref())?;
            commands::console::cmd_console(&port, &config.console, profile, &action)
        }
        Commands::Pin { serial, six } => {
            let pin = if six {
                eolt_ble::pin6(&serial)
            } else {
                eolt_ble::pin4(&serial)
            };
            println!("{}", pin);
            Ok(())
        }
        Commands::Gauge { port, action } => {
            commands::gauge::cmd_gauge(&port, &config.gauge, &action)
        }
    }
}

/// Built-in part table, extended from a RON file if one is given
fn load_part_database(extra: Option<&Path>) -> Result<PartDatabase, Box<dyn std::error::Error>> {
    let mut db = builtin_parts().clone();
    if let Some(path) = extra {
        let added = db.load_file(path)?;
        log::info!("Loaded {} part definitions from {}", added, path.display());
    }
    log::debug!("{} LPC parts known", db.len());
    Ok(db)
}
