//! LPC ISP engine
//!
//! This module provides the `LpcIsp` struct that drives the bootloader
//! command set over any [`Transport`].

use crate::error::{IspError, Result};
use crate::image::FlashImage;
use crate::part::{LpcPart, PartDatabase};
use crate::protocol::status::*;
use crate::protocol::*;
use crate::uuencode::{checksum, decode_line, encode_blocks};
use eolt_core::Transport;

/// Connection to an LPC bootloader
pub struct LpcIsp<T: Transport> {
    transport: T,
    crystal_khz: u32,
    echo: bool,
    synchronised: bool,
}

impl<T: Transport> LpcIsp<T> {
    /// Wrap a transport; `crystal_khz` is reported during synchronisation
    pub fn new(transport: T, crystal_khz: u32) -> Self {
        Self {
            transport,
            crystal_khz,
            echo: true,
            synchronised: false,
        }
    }

    /// Get a reference to the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the engine and return the transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Whether the bootloader is believed to echo commands
    pub fn echo(&self) -> bool {
        self.echo
    }

    /// Whether [`LpcIsp::synchronize`] has completed
    pub fn is_synchronised(&self) -> bool {
        self.synchronised
    }

    fn send_line(&mut self, line: &str) -> Result<()> {
        log::debug!("isp: -> {}", line);
        self.transport.write(format!("{}{}", line, EOL).as_bytes())?;
        Ok(())
    }

    fn recv_line(&mut self) -> Result<String> {
        let line = self.transport.read_line()?;
        log::debug!("isp: <- {}", line);
        Ok(line)
    }

    /// Read the reply to `sent`, skipping its echo if echo is on
    fn reply(&mut self, sent: &str) -> Result<String> {
        let line = self.recv_line()?;
        if self.echo && line == sent {
            return self.recv_line();
        }
        Ok(line)
    }

    fn parse_u32(command: &str, line: &str) -> Result<u32> {
        line.trim().parse().map_err(|_| IspError::BadResponse {
            command: command.to_string(),
            response: line.to_string(),
        })
    }

    /// Send a command line and return its status code
    pub fn command(&mut self, cmd: &str) -> Result<u32> {
        self.send_line(cmd)?;
        let line = self.reply(cmd)?;
        Self::parse_u32(cmd, &line)
    }

    fn command_ok(&mut self, cmd: &str) -> Result<()> {
        match self.command(cmd)? {
            CMD_SUCCESS => Ok(()),
            status => Err(IspError::Command {
                command: cmd.to_string(),
                status,
            }),
        }
    }

    fn sync_step(&mut self, sent: &str) -> Result<()> {
        self.send_line(sent)?;
        match self.reply(sent) {
            Ok(line) if line == OK => Ok(()),
            Ok(line) => Err(IspError::NotSynchronised(format!(
                "expected {} after {:?}, got {:?}",
                OK, sent, line
            ))),
            Err(IspError::Transport(e)) if e.is_timeout() => Err(IspError::NotSynchronised(
                format!("no answer after {:?}", sent),
            )),
            Err(e) => Err(e),
        }
    }

    /// Synchronise with the bootloader and turn echo off
    ///
    /// A part that is already synchronised ignores the autobaud character,
    /// in which case the link is recovered by probing with `A 1`.
    pub fn synchronize(&mut self) -> Result<()> {
        self.transport.flush_input()?;
        self.transport.write(SYNC_CHAR.as_bytes())?;

        let answer = match self.transport.read_line() {
            Ok(line) => Some(line),
            Err(e) if e.is_timeout() => None,
            Err(e) => return Err(e.into()),
        };

        if answer.as_deref() == Some(SYNC_WORD) {
            log::debug!("isp: <- {}", SYNC_WORD);
            self.echo = true;
            self.sync_step(SYNC_WORD)?;
            let crystal = self.crystal_khz.to_string();
            self.sync_step(&crystal)?;
        } else {
            log::debug!(
                "isp: no handshake after '?' (got {:?}), probing an already synchronised part",
                answer
            );
            self.sync_echo()?;
        }

        self.set_echo(false)?;
        self.synchronised = true;
        log::info!("isp: Synchronised on {}", self.transport.name());
        Ok(())
    }

    fn sync_echo(&mut self) -> Result<()> {
        self.transport.flush_input()?;
        for attempt in 1..=ECHO_SYNC_ATTEMPTS {
            self.send_line("A 1")?;
            // Echo, a stale status, or the stray '?' glued to the command
            for _ in 0..3 {
                match self.transport.read_line() {
                    Ok(line) if line == "0" => {
                        self.echo = true;
                        return Ok(());
                    }
                    Ok(line) => log::debug!("isp: echo attempt {} <- {:?}", attempt, line),
                    Err(e) if e.is_timeout() => break,
                    Err(e) => return Err(e.into()),
                }
            }
            log::warn!(
                "isp: echo attempt {} of {} got no answer",
                attempt,
                ECHO_SYNC_ATTEMPTS
            );
        }
        Err(IspError::NotSynchronised(format!(
            "no answer to '?' or to {} echo attempts",
            ECHO_SYNC_ATTEMPTS
        )))
    }

    /// Turn command echo on or off
    pub fn set_echo(&mut self, on: bool) -> Result<()> {
        self.command_ok(if on { "A 1" } else { "A 0" })?;
        self.echo = on;
        Ok(())
    }

    /// Read the part identification number
    pub fn read_part_id(&mut self) -> Result<u32> {
        self.command_ok("J")?;
        let line = self.recv_line()?;
        Self::parse_u32("J", &line)
    }

    /// Identify the part and look it up in `db`
    pub fn identify<'a>(&mut self, db: &'a PartDatabase) -> Result<&'a LpcPart> {
        let id = self.read_part_id()?;
        let part = db.find_by_id(id).ok_or(IspError::UnknownDevice(id))?;
        log::info!("isp: Found {} (part ID 0x{:08X})", part.name, id);
        Ok(part)
    }

    /// Read the four 32-bit words of the device serial number
    pub fn read_serial_id(&mut self) -> Result<[u32; 4]> {
        self.command_ok("N")?;
        let mut words = [0u32; 4];
        for word in words.iter_mut() {
            let line = self.recv_line()?;
            *word = Self::parse_u32("N", &line)?;
        }
        Ok(words)
    }

    /// Unlock the flash write and erase commands
    pub fn unlock(&mut self) -> Result<()> {
        self.command_ok(&format!("U {}", UNLOCK_CODE))
    }

    /// Erase the whole flash
    pub fn erase_all(&mut self, part: &LpcPart) -> Result<()> {
        let last = part.sector_count() - 1;
        self.unlock()?;
        self.command_ok(&format!("P 0 {}", last))?;
        self.command_ok(&format!("E 0 {}", last))?;
        log::info!("isp: Erased sectors 0-{}", last);
        Ok(())
    }

    /// Blank check one sector
    ///
    /// A non-blank sector is reported as `Ok(false)` after consuming the
    /// offset and contents lines that follow the status.
    pub fn blank_check(&mut self, sector: usize) -> Result<bool> {
        let cmd = format!("I {} {}", sector, sector);
        match self.command(&cmd)? {
            CMD_SUCCESS => Ok(true),
            SECTOR_NOT_BLANK => {
                let offset = self.recv_line()?;
                let contents = self.recv_line()?;
                log::debug!(
                    "isp: sector {} not blank at offset {} (0x{})",
                    sector,
                    offset,
                    contents
                );
                Ok(false)
            }
            status => Err(IspError::Command {
                command: cmd,
                status,
            }),
        }
    }

    /// Write `data` to RAM at `addr`
    pub fn write_ram(&mut self, part: &LpcPart, addr: u32, data: &[u8]) -> Result<()> {
        self.command_ok(&format!("W {} {}", addr, data.len()))?;
        if part.uuencode {
            self.send_uuencoded(data)
        } else {
            self.transport.write(data)?;
            Ok(())
        }
    }

    fn send_uuencoded(&mut self, data: &[u8]) -> Result<()> {
        for (index, block) in encode_blocks(data).iter().enumerate() {
            let mut resends = 0;
            loop {
                for line in &block.lines {
                    self.transport.write(format!("{}{}", line, EOL).as_bytes())?;
                }
                self.send_line(&block.checksum.to_string())?;

                let answer = self.recv_line()?;
                match answer.as_str() {
                    OK => break,
                    RESEND if resends < UU_MAX_RESEND => {
                        resends += 1;
                        log::warn!("isp: block {} resend {} of {}", index, resends, UU_MAX_RESEND);
                    }
                    RESEND => {
                        return Err(IspError::Uuencode(format!(
                            "block {} rejected after {} resends",
                            index, UU_MAX_RESEND
                        )))
                    }
                    _ => {
                        return Err(IspError::BadResponse {
                            command: format!("uuencoded block {}", index),
                            response: answer,
                        })
                    }
                }
            }
        }
        Ok(())
    }

    /// Program the image, sector 0 last
    ///
    /// The flash must already be erased. `progress` receives the number of
    /// sectors done and the total after each sector.
    pub fn program(
        &mut self,
        part: &LpcPart,
        image: &FlashImage,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<()> {
        let total = image.sectors_used();
        for (done, sector) in (1..total).chain(std::iter::once(0)).enumerate() {
            self.program_sector(part, image, sector)?;
            progress(done + 1, total);
        }
        log::info!("isp: Programmed {} sectors", total);
        Ok(())
    }

    fn program_sector(&mut self, part: &LpcPart, image: &FlashImage, sector: usize) -> Result<()> {
        if !self.blank_check(sector)? {
            return Err(IspError::Command {
                command: format!("I {} {}", sector, sector),
                status: SECTOR_NOT_BLANK,
            });
        }

        let data = image.sector_data(part, sector);
        let offset = part.sector_offset(sector);

        self.write_ram(part, part.ram_addr, data)?;
        self.command_ok(&format!("P {} {}", sector, sector))?;
        self.command_ok(&format!("C {} {} {}", offset, part.ram_addr, data.len()))?;

        if !part.uuencode {
            self.verify_sector_crc(sector, offset, data)?;
        }

        log::debug!("isp: Sector {} written at 0x{:X}", sector, offset);
        Ok(())
    }

    fn verify_sector_crc(&mut self, sector: usize, offset: usize, data: &[u8]) -> Result<()> {
        let cmd = format!("S {} {}", offset, data.len());
        match self.command(&cmd)? {
            CMD_SUCCESS => {}
            INVALID_COMMAND => {
                log::debug!("isp: CRC command not supported, skipping verify");
                return Ok(());
            }
            status => {
                return Err(IspError::Command {
                    command: cmd,
                    status,
                })
            }
        }

        let line = self.recv_line()?;
        let actual = Self::parse_u32(&cmd, &line)?;
        let expected = crc32(data);
        if actual != expected {
            return Err(IspError::Verify {
                sector,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Read `len` bytes of memory starting at `addr`
    pub fn read_memory(&mut self, part: &LpcPart, addr: u32, len: usize) -> Result<Vec<u8>> {
        let cmd = format!("R {} {}", addr, len);
        self.command_ok(&cmd)?;

        if !part.uuencode {
            return Ok(self.transport.read_exact(len)?);
        }

        let mut out = Vec::with_capacity(len);
        let mut resends = 0;
        while out.len() < len {
            let mut block = Vec::new();
            let mut lines = 0;
            while lines < UU_LINES_PER_BLOCK && out.len() + block.len() < len {
                let line = self.transport.read_line()?;
                block.extend(decode_line(&line)?);
                lines += 1;
            }

            let line = self.recv_line()?;
            let sum = Self::parse_u32(&cmd, &line)?;
            if sum == checksum(&block) {
                self.send_line(OK)?;
                out.extend(block);
                resends = 0;
            } else if resends < UU_MAX_RESEND {
                resends += 1;
                log::warn!(
                    "isp: read checksum {} does not match data sum {}, resend {} of {}",
                    sum,
                    checksum(&block),
                    resends,
                    UU_MAX_RESEND
                );
                self.send_line(RESEND)?;
            } else {
                return Err(IspError::Uuencode(format!(
                    "read checksum mismatch after {} resends",
                    UU_MAX_RESEND
                )));
            }
        }

        out.truncate(len);
        Ok(out)
    }

    /// Read the whole image back and compare it byte for byte
    pub fn verify_read(&mut self, part: &LpcPart, image: &FlashImage) -> Result<()> {
        let data = self.read_memory(part, 0, image.len())?;
        let expected = image.data();
        if let Some(offset) = data.iter().zip(expected).position(|(a, b)| a != b) {
            return Err(IspError::ReadBack {
                offset,
                expected: expected[offset],
                actual: data[offset],
            });
        }
        log::info!("isp: Read-back verify of {} bytes passed", data.len());
        Ok(())
    }
}
