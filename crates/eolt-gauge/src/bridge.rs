//! Bridge driver: one frame out, one frame back

use crate::error::{GaugeError, Result};
use crate::protocol::*;
use eolt_core::Transport;

/// Serial-to-SMBus bridge on a byte transport
pub struct Bridge<T: Transport> {
    transport: T,
    slave: Option<u8>,
}

impl<T: Transport> Bridge<T> {
    /// Wrap a transport; no slave is selected yet
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            slave: None,
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

    /// Consume the bridge and return the transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Currently selected slave address
    pub fn slave(&self) -> Option<u8> {
        self.slave
    }

    fn transact(&mut self, cmd: u8, sub: u8, word: u16) -> Result<[u8; FRAME_LEN]> {
        let sent = frame(cmd, sub, word);
        self.transport.write(&sent)?;
        let reply = self.transport.read_exact(FRAME_LEN)?;
        log::trace!("gauge: {:02X?} -> {:02X?}", sent, reply);
        if reply[0] != FRAME_START || reply[1] != cmd {
            return Err(GaugeError::Frame { sent, reply });
        }
        let mut out = [0u8; FRAME_LEN];
        out.copy_from_slice(&reply);
        Ok(out)
    }

    fn read(&mut self, cmd: u8, reg: u8) -> Result<u16> {
        let r = self.transact(cmd, reg, 0)?;
        let status = BridgeStatus::new(r[4], r[2]);
        if !status.is_ok() {
            return Err(GaugeError::Status {
                command: command_name(cmd),
                status,
            });
        }
        Ok(u16::from_le_bytes([r[2], r[3]]))
    }

    fn write(&mut self, cmd: u8, sub: u8, word: u16) -> Result<()> {
        let r = self.transact(cmd, sub, word)?;
        let status = BridgeStatus::new(r[2], r[3]);
        if !status.is_ok() {
            return Err(GaugeError::Status {
                command: command_name(cmd),
                status,
            });
        }
        Ok(())
    }

    /// Read a word register
    pub fn read_word(&mut self, reg: u8) -> Result<u16> {
        self.read(CMD_READ_WORD, reg)
    }

    /// Read a word register with packet error checking
    pub fn read_word_pec(&mut self, reg: u8) -> Result<u16> {
        self.read(CMD_READ_WORD_PEC, reg)
    }

    /// Write a word register
    pub fn write_word(&mut self, reg: u8, value: u16) -> Result<()> {
        self.write(CMD_WRITE_WORD, reg, value)
    }

    /// Write a word register with packet error checking
    pub fn write_word_pec(&mut self, reg: u8, value: u16) -> Result<()> {
        self.write(CMD_WRITE_WORD_PEC, reg, value)
    }

    /// Select the slave subsequent reads and writes go to
    pub fn set_slave(&mut self, address: u8) -> Result<()> {
        self.write(CMD_SET_SLAVE, address, 0)?;
        self.slave = Some(address);
        log::debug!("gauge: slave 0x{:02X}", address);
        Ok(())
    }

    /// Check the link: the bridge returns the payload unchanged
    pub fn echo(&mut self, sub: u8, word: u16) -> Result<()> {
        let sent = frame(CMD_ECHO, sub, word);
        let r = self.transact(CMD_ECHO, sub, word)?;
        if r != sent {
            return Err(GaugeError::Frame {
                sent,
                reply: r.to_vec(),
            });
        }
        Ok(())
    }

    /// Bridge status word and firmware version
    pub fn board_status(&mut self) -> Result<(BridgeStatus, u8)> {
        let r = self.transact(CMD_BOARD_STATUS, 0, 0)?;
        Ok((BridgeStatus::new(r[2], r[3]), r[4]))
    }
}
