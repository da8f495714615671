//! LPC programming commands

use super::{open_port, CliError};
use crate::cli::PortArgs;
use eolt_core::config::{IspConfig, PortConfig};
use eolt_isp::{program_device, program_panel, LpcIsp, PartDatabase, ProgramOptions};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::Path;

fn port_config(config: &IspConfig) -> PortConfig {
    PortConfig {
        port: config.port.clone(),
        baud: config.baud,
        timeout_ms: config.timeout_ms,
    }
}

/// Print the part table
pub fn list_parts(db: &PartDatabase) {
    println!("Supported LPC parts:");
    println!();
    println!("{:<16} {:>10} {:>8} {:>9}  {}", "Name", "Flash", "Sectors", "Transfer", "Part IDs");
    println!("{}", "-".repeat(72));

    for part in db.iter() {
        let ids: Vec<String> = part.ids.iter().map(|id| format!("0x{:08X}", id)).collect();
        println!(
            "{:<16} {:>10} {:>8} {:>9}  {}",
            part.name,
            format_size(part.flash_size()),
            part.sector_count(),
            if part.uuencode { "uuencode" } else { "binary" },
            ids.join(" ")
        );
    }
}

fn format_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{} MiB", bytes / (1024 * 1024))
    } else if bytes >= 1024 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}

/// Program one part with a sector progress bar
pub fn cmd_program(
    args: &PortArgs,
    config: &IspConfig,
    db: &PartDatabase,
    image: &Path,
    options: &ProgramOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let raw = fs::read(image)?;
    log::info!("Read {} bytes from {}", raw.len(), image.display());

    let port = open_port("ISP", args, &port_config(config))?;
    let mut isp = LpcIsp::new(port, config.crystal_khz);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} sectors ({eta})")?
            .progress_chars("#>-"),
    );
    let result = program_device(&mut isp, db, &raw, options, &mut |done, total| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    });
    pb.finish_and_clear();

    let summary = result?;
    println!(
        "Programmed {} (ID 0x{:08X}): {} sectors, {} bytes, CRP word 0x{:08X}",
        summary.part, summary.part_id, summary.sectors, summary.bytes, summary.crp_word
    );
    Ok(())
}

/// Print the part's serial number
pub fn cmd_serial_id(
    args: &PortArgs,
    config: &IspConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let port = open_port("ISP", args, &port_config(config))?;
    let mut isp = LpcIsp::new(port, config.crystal_khz);
    isp.synchronize()?;
    let words = isp.read_serial_id()?;
    let text: Vec<String> = words.iter().map(|w| format!("{:08X}", w)).collect();
    println!("{}", text.join(" "));
    Ok(())
}

/// Program a panel, one thread per position
pub fn cmd_panel(
    ports: &[String],
    config: &IspConfig,
    db: &PartDatabase,
    image: &Path,
    options: &ProgramOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    if ports.is_empty() {
        return Err(CliError::NoPort("panel").into());
    }
    let raw = fs::read(image)?;
    let (baud, timeout) = (config.baud, config.timeout());

    let openers: Vec<_> = ports
        .iter()
        .map(|device| {
            move || -> eolt_isp::Result<eolt_core::SerialTransport> {
                Ok(eolt_core::SerialTransport::open(device, baud, timeout)?)
            }
        })
        .collect();

    let report = program_panel(openers, db, &raw, options, config.crystal_khz);
    for (position, result) in report.results() {
        match result {
            Ok(summary) => println!("{} {:<16} PASS {}", position, ports[*position], summary.part),
            Err(e) => println!("{} {:<16} FAIL {}", position, ports[*position], e),
        }
    }

    if report.is_pass() {
        Ok(())
    } else {
        Err(CliError::PanelFailed(report.failure_count()).into())
    }
}
