//! Serial-to-SMBus bridge protocol
//!
//! Every transaction is a 5-byte frame `AA <CMD> <SUB> <LSB> <MSB>` answered
//! by a 5-byte frame `AA <CMD> <B0> <B1> <B2>`.
//!
//! For reads, `B2` is the error class and `B1:B0` the little-endian data
//! (or `B0` the sub-code when `B2` is non-zero). For writes, slave selection
//! and board status, `B0` is the error class and `B1` the sub-code.

use bitflags::bitflags;
use std::fmt;

/// Frame start byte, both directions
pub const FRAME_START: u8 = 0xAA;
/// Frame length, both directions
pub const FRAME_LEN: usize = 5;

/// Echo the three payload bytes
pub const CMD_ECHO: u8 = 0;
/// SMBus read word
pub const CMD_READ_WORD: u8 = 1;
/// SMBus read word with PEC
pub const CMD_READ_WORD_PEC: u8 = 2;
/// SMBus write word
pub const CMD_WRITE_WORD: u8 = 3;
/// SMBus write word with PEC
pub const CMD_WRITE_WORD_PEC: u8 = 4;
/// Select the 7-bit slave address
pub const CMD_SET_SLAVE: u8 = 5;
/// Bridge status and firmware version
pub const CMD_BOARD_STATUS: u8 = 6;

/// Name of an opcode, for messages
pub fn command_name(cmd: u8) -> &'static str {
    match cmd {
        CMD_ECHO => "Echo",
        CMD_READ_WORD => "ReadWord",
        CMD_READ_WORD_PEC => "ReadWordPEC",
        CMD_WRITE_WORD => "WriteWord",
        CMD_WRITE_WORD_PEC => "WriteWordPEC",
        CMD_SET_SLAVE => "SetSlave",
        CMD_BOARD_STATUS => "BoardStatus",
        _ => "Unknown",
    }
}

/// Build a host-to-bridge frame
pub fn frame(cmd: u8, sub: u8, word: u16) -> [u8; FRAME_LEN] {
    let [lsb, msb] = word.to_le_bytes();
    [FRAME_START, cmd, sub, lsb, msb]
}

bitflags! {
    /// Error class reported by the bridge, one bit per bus
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ErrorClass: u8 {
        /// Framing on the host link
        const RS232_SYNC = 1 << 0;
        /// I2C bus error
        const I2C        = 1 << 1;
        /// SMBus protocol error
        const SMBUS      = 1 << 2;
        /// HDQ single-wire error
        const HDQ        = 1 << 3;
    }
}

/// Decoded bridge status word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeStatus {
    /// Error class
    pub class: ErrorClass,
    /// Bits of the class byte with no defined meaning
    pub unknown: u8,
    /// Sub-code within the class
    pub code: u8,
}

impl BridgeStatus {
    /// Decode the class and sub-code bytes
    pub fn new(class: u8, code: u8) -> Self {
        Self {
            class: ErrorClass::from_bits_truncate(class),
            unknown: class & !ErrorClass::all().bits(),
            code,
        }
    }

    /// No error
    pub fn is_ok(&self) -> bool {
        self.class.is_empty() && self.unknown == 0
    }
}

impl fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return f.write_str("OK");
        }
        let mut names: Vec<&str> = self
            .class
            .iter_names()
            .map(|(name, _)| name)
            .collect();
        if self.unknown != 0 {
            names.push("UNKNOWN");
        }
        write!(f, "{} error, code {}", names.join("|"), self.code)
    }
}
