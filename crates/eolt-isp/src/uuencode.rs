//! Uuencode codec used by the older LPC bootloaders
//!
//! Each line starts with a length character (`0x20 + n`) followed by groups
//! of four characters carrying three bytes each. Six-bit zero is sent as
//! the backtick (`0x60`) rather than a space. Lines are grouped into blocks
//! of at most [`UU_LINES_PER_BLOCK`] lines; every block is followed by the
//! decimal sum of its data bytes.

use crate::error::{IspError, Result};
use crate::protocol::{UU_BYTES_PER_LINE, UU_LINES_PER_BLOCK};

fn enc(bits: u8) -> char {
    if bits == 0 {
        '`'
    } else {
        (0x20 + bits) as char
    }
}

fn dec(c: u8) -> Result<u8> {
    match c {
        b'`' | b' ' => Ok(0),
        0x21..=0x5F => Ok(c - 0x20),
        _ => Err(IspError::Uuencode(format!(
            "invalid character 0x{:02X}",
            c
        ))),
    }
}

/// Number of characters a line carrying `n` bytes must have
pub fn line_len(n: usize) -> usize {
    1 + 4 * n.div_ceil(3)
}

/// Encode up to 45 bytes as one uuencoded line, without line ending
pub fn encode_line(data: &[u8]) -> String {
    debug_assert!(data.len() <= UU_BYTES_PER_LINE);

    let mut line = String::with_capacity(line_len(data.len()));
    line.push(enc(data.len() as u8));
    for group in data.chunks(3) {
        let b0 = group[0];
        let b1 = group.get(1).copied().unwrap_or(0);
        let b2 = group.get(2).copied().unwrap_or(0);
        line.push(enc(b0 >> 2));
        line.push(enc(((b0 & 0x03) << 4) | (b1 >> 4)));
        line.push(enc(((b1 & 0x0F) << 2) | (b2 >> 6)));
        line.push(enc(b2 & 0x3F));
    }
    line
}

/// Decode one uuencoded line
///
/// The line must have exactly the length its count character implies, and
/// re-encoding the result must reproduce it (with space read as backtick),
/// so stray bits in the padding of the last group are rejected.
pub fn decode_line(line: &str) -> Result<Vec<u8>> {
    let raw = line.trim_end_matches(['\r', '\n']).as_bytes();
    let (&count, body) = raw
        .split_first()
        .ok_or_else(|| IspError::Uuencode("empty line".into()))?;

    let n = dec(count)? as usize;
    if n > UU_BYTES_PER_LINE {
        return Err(IspError::Uuencode(format!("line count {} exceeds 45", n)));
    }
    if raw.len() != line_len(n) {
        return Err(IspError::Uuencode(format!(
            "line of {} characters cannot carry {} bytes",
            raw.len(),
            n
        )));
    }

    let mut out = Vec::with_capacity(n + 2);
    for quad in body.chunks(4) {
        let c0 = dec(quad[0])?;
        let c1 = dec(quad[1])?;
        let c2 = dec(quad[2])?;
        let c3 = dec(quad[3])?;
        out.push((c0 << 2) | (c1 >> 4));
        out.push((c1 << 4) | (c2 >> 2));
        out.push((c2 << 6) | c3);
    }
    out.truncate(n);

    let normalised: String = String::from_utf8_lossy(raw).replace(' ', "`");
    if encode_line(&out) != normalised {
        return Err(IspError::Uuencode(format!(
            "line {:?} does not survive re-encoding",
            line
        )));
    }

    Ok(out)
}

/// Sum of data bytes, as sent after each block
pub fn checksum(data: &[u8]) -> u32 {
    data.iter().map(|&b| b as u32).sum()
}

/// One block of uuencoded lines and its checksum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UuBlock {
    /// Encoded lines, without line endings
    pub lines: Vec<String>,
    /// Sum of the data bytes in this block
    pub checksum: u32,
}

/// Split data into checksummed blocks of uuencoded lines
pub fn encode_blocks(data: &[u8]) -> Vec<UuBlock> {
    data.chunks(UU_BYTES_PER_LINE * UU_LINES_PER_BLOCK)
        .map(|chunk| UuBlock {
            lines: chunk.chunks(UU_BYTES_PER_LINE).map(encode_line).collect(),
            checksum: checksum(chunk),
        })
        .collect()
}
