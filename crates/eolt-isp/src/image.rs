//! Flash image preparation
//!
//! The bootloader only boots user code whose first eight vectors sum to
//! zero, so the image is patched before programming: padded with `0xFF`
//! to a sector boundary, given a valid vector checksum and, if asked, a
//! new Code Read Protection word.

use crate::error::{IspError, Result};
use crate::part::LpcPart;
use crate::protocol::{VECTOR_CHECKSUM_OFFSET, VECTOR_COUNT};
use std::fmt;
use std::str::FromStr;

/// What to do with the CRP word of the image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrpPolicy {
    /// Leave whatever the image contains
    #[default]
    Keep,
    /// Write the part's enable literal
    Enable,
    /// Write the part's disable literal
    Disable,
}

impl FromStr for CrpPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keep" => Ok(CrpPolicy::Keep),
            "enable" => Ok(CrpPolicy::Enable),
            "disable" => Ok(CrpPolicy::Disable),
            _ => Err(format!("unknown CRP policy '{}'", s)),
        }
    }
}

impl fmt::Display for CrpPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrpPolicy::Keep => write!(f, "keep"),
            CrpPolicy::Enable => write!(f, "enable"),
            CrpPolicy::Disable => write!(f, "disable"),
        }
    }
}

/// An image ready to be written to a particular part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashImage {
    data: Vec<u8>,
    sectors: usize,
}

fn read_word(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn write_word(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

impl FlashImage {
    /// Pad, checksum and apply the CRP policy to a raw binary
    pub fn prepare(part: &LpcPart, raw: &[u8], crp: CrpPolicy) -> Result<Self> {
        if raw.is_empty() {
            return Err(IspError::InvalidImage("image is empty".into()));
        }
        let sectors = part.sectors_for(raw.len()).ok_or_else(|| {
            IspError::InvalidImage(format!(
                "{} bytes do not fit the {} bytes of flash on {}",
                raw.len(),
                part.flash_size(),
                part.name
            ))
        })?;

        let padded_len = part.sector_offset(sectors);
        let mut data = raw.to_vec();
        data.resize(padded_len, 0xFF);

        let crp_end = part.crp_addr as usize + 4;
        if data.len() < crp_end.max(VECTOR_COUNT * 4) {
            return Err(IspError::InvalidImage(format!(
                "first sector of {} is too small for the vector table",
                part.name
            )));
        }

        match crp {
            CrpPolicy::Keep => {}
            CrpPolicy::Enable => write_word(&mut data, part.crp_addr as usize, part.crp_enable),
            CrpPolicy::Disable => write_word(&mut data, part.crp_addr as usize, part.crp_disable),
        }

        let sum = (0..VECTOR_COUNT - 1)
            .map(|i| read_word(&data, i * 4))
            .fold(0u32, u32::wrapping_add);
        write_word(&mut data, VECTOR_CHECKSUM_OFFSET, 0u32.wrapping_sub(sum));

        log::debug!(
            "Prepared image for {}: {} bytes raw, {} bytes padded over {} sectors, CRP {}",
            part.name,
            raw.len(),
            data.len(),
            sectors,
            crp
        );

        Ok(Self { data, sectors })
    }

    /// The padded image bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Padded length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false; an empty image is rejected by [`FlashImage::prepare`]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of sectors the image occupies
    pub fn sectors_used(&self) -> usize {
        self.sectors
    }

    /// Image bytes falling in sector `index`
    pub fn sector_data(&self, part: &LpcPart, index: usize) -> &[u8] {
        let start = part.sector_offset(index);
        &self.data[start..start + part.sector_size(index)]
    }

    /// Wrapping sum of the first eight vectors, zero for a bootable image
    pub fn vector_sum(&self) -> u32 {
        (0..VECTOR_COUNT)
            .map(|i| read_word(&self.data, i * 4))
            .fold(0u32, u32::wrapping_add)
    }

    /// The CRP word as it will be programmed
    pub fn crp_word(&self, part: &LpcPart) -> u32 {
        read_word(&self.data, part.crp_addr as usize)
    }
}
