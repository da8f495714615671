//! CLI argument parsing

use clap::{Parser, Subcommand};
use eolt_console::products::PRESETS;
use eolt_isp::CrpPolicy;
use std::path::PathBuf;

/// Parse a string as a hex or decimal u16
fn parse_hex_u16(s: &str) -> Result<u16, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u16>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Generate dynamic help text for the product argument
fn product_help() -> String {
    format!("Product console profile [available: {}]", PRESETS.join(", "))
}

#[derive(Parser)]
#[command(name = "eolt")]
#[command(author, version, about = "End-of-line test tooling", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Station configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Extra LPC part definitions (RON), added to the built-in table
    #[arg(long, global = true)]
    pub part_db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Serial link options shared across commands
#[derive(clap::Args, Debug, Clone, Default)]
pub struct PortArgs {
    /// Serial port (overrides the station configuration)
    #[arg(short, long)]
    pub port: Option<String>,

    /// Baud rate (overrides the station configuration)
    #[arg(long)]
    pub baud: Option<u32>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the LPC parts the programmer knows
    ListParts,

    /// Program one LPC part through its ISP bootloader
    Program {
        #[command(flatten)]
        port: PortArgs,

        /// Raw firmware image
        #[arg(short, long)]
        image: PathBuf,

        /// Code Read Protection handling
        #[arg(long, default_value_t = CrpPolicy::Keep)]
        crp: CrpPolicy,

        /// Read the whole image back after programming
        #[arg(long)]
        verify_read: bool,
    },

    /// Print the four serial-number words of an LPC part
    SerialId {
        #[command(flatten)]
        port: PortArgs,
    },

    /// Program every position of a panel in parallel
    Panel {
        /// Serial port of each position, in order (defaults to the station's panel list)
        #[arg(short, long = "port")]
        ports: Vec<String>,

        /// Raw firmware image
        #[arg(short, long)]
        image: PathBuf,

        /// Code Read Protection handling
        #[arg(long, default_value_t = CrpPolicy::Keep)]
        crp: CrpPolicy,

        /// Read the whole image back after programming
        #[arg(long)]
        verify_read: bool,
    },

    /// Talk to a unit's firmware console
    Console {
        #[command(flatten)]
        port: PortArgs,

        #[arg(long, help = product_help())]
        product: String,

        /// Command table (RON) replacing the profile's built-in one
        #[arg(long)]
        table: Option<PathBuf>,

        #[command(subcommand)]
        action: ConsoleCommands,
    },

    /// Print the pairing PIN derived from a serial number
    Pin {
        /// Printable serial number
        serial: String,

        /// Six digits instead of four
        #[arg(long)]
        six: bool,
    },

    /// Battery-gauge helpers
    Gauge {
        #[command(flatten)]
        port: PortArgs,

        #[command(subcommand)]
        action: GaugeCommands,
    },
}

/// Console subcommands
#[derive(Subcommand)]
pub enum ConsoleCommands {
    /// Send a raw command and print the reply lines
    Raw {
        /// Command words, joined with spaces
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },

    /// Read a named parameter
    Read {
        /// Logical parameter name
        name: String,
    },

    /// Write a named parameter
    Write {
        /// Logical parameter name
        name: String,

        /// Value to write
        value: String,
    },

    /// List the profile's parameter names
    List,
}

/// Gauge subcommands
#[derive(Subcommand)]
pub enum GaugeCommands {
    /// Read voltage, current and temperature
    Vit,

    /// Stamp manufacture date and serial number into RAM and EEPROM
    SnDate {
        /// Manufacture date, YYYY-MM-DD
        #[arg(long)]
        date: String,

        /// Serial number, 0..=65535
        #[arg(long)]
        serial: String,
    },

    /// Check the bridge link and print its status
    Status {
        /// Word to echo (hex or decimal)
        #[arg(long, default_value = "0x55AA", value_parser = parse_hex_u16)]
        echo: u16,
    },
}
