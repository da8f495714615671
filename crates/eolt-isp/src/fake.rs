//! In-memory LPC bootloader for tests
//!
//! Reacts to writes the way the ROM bootloader does: autobaud handshake,
//! per-line echo, the flash commands with prepare/unlock bookkeeping, and
//! uuencoded or raw data transfer. Faults can be injected per sector.

use crate::part::LpcPart;
use crate::protocol::status::*;
use crate::protocol::{crc32, UNLOCK_CODE, UU_BYTES_PER_LINE, UU_LINES_PER_BLOCK};
use crate::uuencode::{checksum, decode_line, encode_line};
use eolt_core::{Result, Transport};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handshake {
    Autobaud,
    SyncWord,
    Crystal,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Command,
    RawWrite {
        offset: usize,
        remaining: usize,
    },
    UuWrite {
        offset: usize,
        remaining: usize,
        lines: usize,
        block: Vec<u8>,
    },
    UuRead {
        data: Vec<u8>,
        pos: usize,
        block_len: usize,
    },
}

pub(crate) struct FakeLpc {
    part: LpcPart,
    flash: Vec<u8>,
    ram: Vec<u8>,
    handshake: Handshake,
    echo: bool,
    unlocked: bool,
    prepared: Option<(usize, usize)>,
    line: Vec<u8>,
    out: VecDeque<u8>,
    mode: Mode,
    crystal: Option<String>,
    commands: Vec<String>,
    resends: usize,
    corrupt_crc: Option<usize>,
    fail_copy: Option<usize>,
    crc_supported: bool,
    timeout: Duration,
}

impl FakeLpc {
    pub(crate) fn new(part: &LpcPart) -> Self {
        let ram_len = part.sectors.iter().copied().max().unwrap_or(0) as usize;
        Self {
            part: part.clone(),
            flash: vec![0xFF; part.flash_size()],
            ram: vec![0; ram_len],
            handshake: Handshake::Autobaud,
            echo: true,
            unlocked: false,
            prepared: None,
            line: Vec::new(),
            out: VecDeque::new(),
            mode: Mode::Command,
            crystal: None,
            commands: Vec::new(),
            resends: 0,
            corrupt_crc: None,
            fail_copy: None,
            crc_supported: !part.uuencode,
            timeout: Duration::from_millis(10),
        }
    }

    /// Start as if a previous session had already synchronised
    pub(crate) fn skip_handshake(&mut self) {
        self.handshake = Handshake::Ready;
    }

    pub(crate) fn crystal(&self) -> Option<String> {
        self.crystal.clone()
    }

    pub(crate) fn flash(&self) -> &[u8] {
        &self.flash
    }

    pub(crate) fn flash_mut(&mut self) -> &mut [u8] {
        &mut self.flash
    }

    pub(crate) fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Answer the next `n` uuencoded block checksums with RESEND
    pub(crate) fn set_resends(&mut self, n: usize) {
        self.resends = n;
    }

    pub(crate) fn corrupt_crc(&mut self, sector: usize) {
        self.corrupt_crc = Some(sector);
    }

    pub(crate) fn disable_crc(&mut self) {
        self.crc_supported = false;
    }

    pub(crate) fn fail_copy(&mut self, sector: usize) {
        self.fail_copy = Some(sector);
    }

    fn emit(&mut self, text: &str) {
        self.out.extend(text.as_bytes());
        self.out.extend(b"\r\n");
    }

    fn status(&mut self, code: u32) {
        self.emit(&code.to_string());
    }

    fn sector_of(&self, offset: usize) -> Option<usize> {
        (0..self.part.sector_count()).find(|&s| {
            let start = self.part.sector_offset(s);
            offset >= start && offset < start + self.part.sector_size(s)
        })
    }

    fn is_prepared(&self, first: usize, last: usize) -> bool {
        matches!(self.prepared, Some((a, b)) if a <= first && last <= b)
    }

    fn on_line(&mut self, line: String) {
        if self.echo {
            self.emit(&line);
        }
        match self.handshake {
            Handshake::Autobaud => {}
            Handshake::SyncWord => {
                if line == "Synchronized" {
                    self.handshake = Handshake::Crystal;
                    self.emit("OK");
                }
            }
            Handshake::Crystal => {
                self.crystal = Some(line);
                self.handshake = Handshake::Ready;
                self.emit("OK");
            }
            Handshake::Ready => self.on_command(line),
        }
    }

    fn on_command(&mut self, line: String) {
        self.commands.push(line.clone());
        let mut parts = line.split_whitespace();
        let cmd = parts.next().unwrap_or("");
        let args: Vec<usize> = parts.filter_map(|a| a.parse().ok()).collect();
        let arg = |i: usize| args.get(i).copied().unwrap_or(usize::MAX);

        match cmd {
            "A" if arg(0) <= 1 => {
                self.echo = arg(0) == 1;
                self.status(CMD_SUCCESS);
            }
            "J" => {
                self.status(CMD_SUCCESS);
                let id = self.part.ids[0];
                self.emit(&id.to_string());
            }
            "N" => {
                self.status(CMD_SUCCESS);
                for word in [1u32, 2, 3, 0x0A0B_0C0D] {
                    self.emit(&word.to_string());
                }
            }
            "U" => {
                if arg(0) == UNLOCK_CODE as usize {
                    self.unlocked = true;
                    self.status(CMD_SUCCESS);
                } else {
                    self.status(INVALID_CODE);
                }
            }
            "P" => {
                if arg(0) <= arg(1) && arg(1) < self.part.sector_count() {
                    self.prepared = Some((arg(0), arg(1)));
                    self.status(CMD_SUCCESS);
                } else {
                    self.status(INVALID_SECTOR);
                }
            }
            "E" => {
                if !self.unlocked {
                    self.status(CMD_LOCKED);
                } else if !self.is_prepared(arg(0), arg(1)) {
                    self.status(SECTOR_NOT_PREPARED);
                } else {
                    let start = self.part.sector_offset(arg(0));
                    let end = self.part.sector_offset(arg(1)) + self.part.sector_size(arg(1));
                    self.flash[start..end].fill(0xFF);
                    self.prepared = None;
                    self.status(CMD_SUCCESS);
                }
            }
            "I" => {
                if arg(1) >= self.part.sector_count() {
                    self.status(INVALID_SECTOR);
                    return;
                }
                let start = self.part.sector_offset(arg(0));
                let end = self.part.sector_offset(arg(1)) + self.part.sector_size(arg(1));
                match self.flash[start..end].iter().position(|&b| b != 0xFF) {
                    None => self.status(CMD_SUCCESS),
                    Some(pos) => {
                        let word_at = (start + pos) & !3;
                        let word = u32::from_le_bytes([
                            self.flash[word_at],
                            self.flash[word_at + 1],
                            self.flash[word_at + 2],
                            self.flash[word_at + 3],
                        ]);
                        self.status(SECTOR_NOT_BLANK);
                        self.emit(&word_at.to_string());
                        self.emit(&format!("{:08X}", word));
                    }
                }
            }
            "W" => {
                let base = self.part.ram_addr as usize;
                if arg(0) < base || arg(0).saturating_add(arg(1)) > base + self.ram.len() {
                    self.status(DST_ADDR_NOT_MAPPED);
                } else if arg(1) % 4 != 0 {
                    self.status(COUNT_ERROR);
                } else {
                    self.status(CMD_SUCCESS);
                    let offset = arg(0) - base;
                    self.mode = if self.part.uuencode {
                        Mode::UuWrite {
                            offset,
                            remaining: arg(1),
                            lines: 0,
                            block: Vec::new(),
                        }
                    } else {
                        Mode::RawWrite {
                            offset,
                            remaining: arg(1),
                        }
                    };
                }
            }
            "C" => {
                let (dst, src, len) = (arg(0), arg(1), arg(2));
                let base = self.part.ram_addr as usize;
                let sector = self.sector_of(dst);
                match sector {
                    Some(s) if self.unlocked && self.is_prepared(s, s) => {
                        if self.fail_copy == Some(s) {
                            self.status(BUSY);
                            return;
                        }
                        let ram = &self.ram[src - base..src - base + len];
                        for (f, r) in self.flash[dst..dst + len].iter_mut().zip(ram) {
                            *f &= *r;
                        }
                        self.prepared = None;
                        self.status(CMD_SUCCESS);
                    }
                    Some(_) => self.status(SECTOR_NOT_PREPARED),
                    None => self.status(DST_ADDR_NOT_MAPPED),
                }
            }
            "S" if self.crc_supported => {
                let (addr, len) = (arg(0), arg(1));
                let mut crc = crc32(&self.flash[addr..addr + len]);
                if self.corrupt_crc.is_some() && self.corrupt_crc == self.sector_of(addr) {
                    crc ^= 1;
                }
                self.status(CMD_SUCCESS);
                self.emit(&crc.to_string());
            }
            "R" => {
                let (addr, len) = (arg(0), arg(1));
                let data = self.flash[addr..addr + len].to_vec();
                self.status(CMD_SUCCESS);
                if self.part.uuencode {
                    self.mode = Mode::UuRead {
                        data,
                        pos: 0,
                        block_len: 0,
                    };
                    self.send_read_block();
                } else {
                    self.out.extend(data);
                }
            }
            _ => self.status(INVALID_COMMAND),
        }
    }

    fn send_read_block(&mut self) {
        if let Mode::UuRead {
            data,
            pos,
            block_len,
        } = &mut self.mode
        {
            let end = (*pos + UU_BYTES_PER_LINE * UU_LINES_PER_BLOCK).min(data.len());
            let block = data[*pos..end].to_vec();
            *block_len = block.len();
            for chunk in block.chunks(UU_BYTES_PER_LINE) {
                let line = encode_line(chunk);
                self.out.extend(line.as_bytes());
                self.out.extend(b"\r\n");
            }
            let sum = checksum(&block).to_string();
            self.out.extend(sum.as_bytes());
            self.out.extend(b"\r\n");
        }
    }

    fn on_read_ack(&mut self, line: &str) {
        let done = match &mut self.mode {
            Mode::UuRead {
                data,
                pos,
                block_len,
            } => {
                if line == "OK" {
                    *pos += *block_len;
                }
                *pos >= data.len()
            }
            _ => return,
        };
        if done {
            self.mode = Mode::Command;
        } else {
            self.send_read_block();
        }
    }

    fn on_data_line(&mut self, line: &str) {
        let Mode::UuWrite {
            offset,
            remaining,
            lines,
            block,
        } = &mut self.mode
        else {
            return;
        };

        let block_full = *lines == UU_LINES_PER_BLOCK || block.len() >= *remaining;
        if !block_full {
            if let Ok(bytes) = decode_line(line) {
                block.extend(bytes);
            }
            *lines += 1;
            return;
        }

        let sum: u32 = line.trim().parse().unwrap_or(u32::MAX);
        let answer = if self.resends > 0 {
            self.resends -= 1;
            "RESEND"
        } else if sum == checksum(block.as_slice()) {
            let n = block.len().min(*remaining);
            self.ram[*offset..*offset + n].copy_from_slice(&block[..n]);
            *offset += n;
            *remaining -= n;
            "OK"
        } else {
            "RESEND"
        };
        *lines = 0;
        block.clear();
        let finished = *remaining == 0;

        self.emit(answer);
        if finished {
            self.mode = Mode::Command;
        }
    }

    fn on_byte(&mut self, b: u8) {
        if let Mode::RawWrite { offset, remaining } = &mut self.mode {
            self.ram[*offset] = b;
            *offset += 1;
            *remaining -= 1;
            if *remaining == 0 {
                self.mode = Mode::Command;
            }
            return;
        }

        if self.handshake == Handshake::Autobaud {
            if b == b'?' {
                self.handshake = Handshake::SyncWord;
                self.emit("Synchronized");
            }
            return;
        }

        if b != b'\n' {
            self.line.push(b);
            return;
        }

        let raw = std::mem::take(&mut self.line);
        let line = String::from_utf8_lossy(&raw)
            .trim_end_matches('\r')
            .to_string();
        match self.mode {
            Mode::UuWrite { .. } => self.on_data_line(&line),
            Mode::UuRead { .. } => self.on_read_ack(&line),
            _ => self.on_line(line),
        }
    }
}

impl Transport for FakeLpc {
    fn name(&self) -> &str {
        "fake-lpc"
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        let k = n.min(self.out.len());
        Ok(self.out.drain(..k).collect())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        for &b in data {
            self.on_byte(b);
        }
        Ok(())
    }

    fn flush_input(&mut self) -> Result<()> {
        self.out.clear();
        Ok(())
    }

    fn reset_input_buffer(&mut self) -> Result<()> {
        self.out.clear();
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        Ok(())
    }
}
