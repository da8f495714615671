//! Firmware console commands

use super::{open_port, CliError};
use crate::cli::{ConsoleCommands, PortArgs};
use eolt_console::{products, CommandTable, Executor, ProductConsole, ProductProfile, Value};
use eolt_core::config::PortConfig;
use std::fs;
use std::path::Path;

/// Resolve a preset, optionally swapping in a table loaded from RON
pub fn load_profile(
    product: &str,
    table: Option<&Path>,
) -> Result<ProductProfile, Box<dyn std::error::Error>> {
    let mut profile =
        products::preset(product).ok_or_else(|| CliError::UnknownProduct(product.to_string()))?;
    if let Some(path) = table {
        profile.table = CommandTable::from_ron(&fs::read_to_string(path)?)?;
        log::info!(
            "Loaded {} parameters from {}",
            profile.table.len(),
            path.display()
        );
    }
    Ok(profile)
}

/// Print a profile's parameters
fn list(profile: &ProductProfile) {
    println!("{:<20} {:<20} {}", "Name", "Verb", "Access");
    println!("{}", "-".repeat(48));
    for (name, p) in profile.table.iter() {
        let access = match (p.readable, p.writeable) {
            (true, true) => "rw",
            (true, false) => "r",
            (false, true) => "w",
            (false, false) => "-",
        };
        println!("{:<20} {:<20} {}", name, p.verb, access);
    }
}

/// Run one console action
pub fn cmd_console(
    args: &PortArgs,
    config: &PortConfig,
    profile: ProductProfile,
    action: &ConsoleCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    if let ConsoleCommands::List = action {
        list(&profile);
        return Ok(());
    }

    let port = open_port("console", args, config)?;
    let mut unit = ProductConsole::new(port, profile);
    unit.open()?;

    match action {
        ConsoleCommands::Raw { command } => {
            let reply = unit.action(&command.join(" "), 0, None)?;
            for line in reply.into_lines() {
                println!("{}", line);
            }
        }
        ConsoleCommands::Read { name } => {
            println!("{}", unit.read(name)?);
        }
        ConsoleCommands::Write { name, value } => {
            let reply = unit.write(name, Value::from(value.as_str()))?;
            for line in reply.into_lines() {
                println!("{}", line);
            }
        }
        ConsoleCommands::List => {}
    }
    Ok(())
}
