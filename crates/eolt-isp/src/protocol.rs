//! LPC ISP protocol constants
//!
//! Based on the ISP command handler chapter of the LPC11xx/LPC13xx/LPC15xx
//! user manuals.

/// Autobaud character that starts synchronisation
pub const SYNC_CHAR: &str = "?";
/// Synchronisation word exchanged with the bootloader
pub const SYNC_WORD: &str = "Synchronized";
/// Acknowledgement for sync steps and uuencode checksums
pub const OK: &str = "OK";
/// Negative acknowledgement for a uuencode block checksum
pub const RESEND: &str = "RESEND";
/// Line terminator for host commands
pub const EOL: &str = "\r\n";

/// Key for the unlock command
pub const UNLOCK_CODE: u32 = 23130;

/// Uuencoded blocks carry at most this many lines before a checksum
pub const UU_LINES_PER_BLOCK: usize = 20;
/// Data bytes per uuencoded line
pub const UU_BYTES_PER_LINE: usize = 45;
/// How many times a uuencoded block is resent before giving up
pub const UU_MAX_RESEND: usize = 3;

/// Attempts at `A 1` when recovering an already synchronised link
pub const ECHO_SYNC_ATTEMPTS: usize = 4;

/// Offset of the vector checksum word in the image
pub const VECTOR_CHECKSUM_OFFSET: usize = 0x1C;
/// Number of vectors covered by the checksum, including the checksum slot
pub const VECTOR_COUNT: usize = 8;

/// Bootloader return codes
pub mod status {
    /// Command is executed successfully
    pub const CMD_SUCCESS: u32 = 0;
    /// Invalid command
    pub const INVALID_COMMAND: u32 = 1;
    /// Source address is not on a word boundary
    pub const SRC_ADDR_ERROR: u32 = 2;
    /// Destination address is not on a correct boundary
    pub const DST_ADDR_ERROR: u32 = 3;
    /// Source address is not mapped in the memory map
    pub const SRC_ADDR_NOT_MAPPED: u32 = 4;
    /// Destination address is not mapped in the memory map
    pub const DST_ADDR_NOT_MAPPED: u32 = 5;
    /// Byte count is not a multiple of 4 or is not a permitted value
    pub const COUNT_ERROR: u32 = 6;
    /// Sector number is invalid
    pub const INVALID_SECTOR: u32 = 7;
    /// Sector is not blank
    pub const SECTOR_NOT_BLANK: u32 = 8;
    /// Command to prepare sector for write operation was not executed
    pub const SECTOR_NOT_PREPARED: u32 = 9;
    /// Source and destination data is not the same
    pub const COMPARE_ERROR: u32 = 10;
    /// Flash programming interface is busy
    pub const BUSY: u32 = 11;
    /// Insufficient number of parameters or invalid parameter
    pub const PARAM_ERROR: u32 = 12;
    /// Address is not on a word boundary
    pub const ADDR_ERROR: u32 = 13;
    /// Address is not mapped in the memory map
    pub const ADDR_NOT_MAPPED: u32 = 14;
    /// Command is locked
    pub const CMD_LOCKED: u32 = 15;
    /// Unlock code is invalid
    pub const INVALID_CODE: u32 = 16;
    /// Invalid baud rate setting
    pub const INVALID_BAUD_RATE: u32 = 17;
    /// Invalid stop bit setting
    pub const INVALID_STOP_BIT: u32 = 18;
    /// Code read protection enabled
    pub const CODE_READ_PROTECTION_ENABLED: u32 = 19;
}

/// Human-readable name of a bootloader return code
pub fn status_name(code: u32) -> &'static str {
    match code {
        status::CMD_SUCCESS => "CMD_SUCCESS",
        status::INVALID_COMMAND => "INVALID_COMMAND",
        status::SRC_ADDR_ERROR => "SRC_ADDR_ERROR",
        status::DST_ADDR_ERROR => "DST_ADDR_ERROR",
        status::SRC_ADDR_NOT_MAPPED => "SRC_ADDR_NOT_MAPPED",
        status::DST_ADDR_NOT_MAPPED => "DST_ADDR_NOT_MAPPED",
        status::COUNT_ERROR => "COUNT_ERROR",
        status::INVALID_SECTOR => "INVALID_SECTOR",
        status::SECTOR_NOT_BLANK => "SECTOR_NOT_BLANK",
        status::SECTOR_NOT_PREPARED => "SECTOR_NOT_PREPARED_FOR_WRITE_OPERATION",
        status::COMPARE_ERROR => "COMPARE_ERROR",
        status::BUSY => "BUSY",
        status::PARAM_ERROR => "PARAM_ERROR",
        status::ADDR_ERROR => "ADDR_ERROR",
        status::ADDR_NOT_MAPPED => "ADDR_NOT_MAPPED",
        status::CMD_LOCKED => "CMD_LOCKED",
        status::INVALID_CODE => "INVALID_CODE",
        status::INVALID_BAUD_RATE => "INVALID_BAUD_RATE",
        status::INVALID_STOP_BIT => "INVALID_STOP_BIT",
        status::CODE_READ_PROTECTION_ENABLED => "CODE_READ_PROTECTION_ENABLED",
        _ => "UNKNOWN",
    }
}

/// CRC32 as computed by the bootloader's `S` command
pub const CRC32: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

/// Host-side CRC32 of a flash range
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}
