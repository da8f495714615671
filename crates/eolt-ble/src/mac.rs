//! 48-bit MAC addresses
//!
//! Radios and scanners disagree on the text form: `00:1E:C0:30:BC:15`,
//! `00-1E-C0-30-BC-15` and `001EC030BC15` all show up. [`MacAddr`] parses
//! all three and prints any of them.

use crate::error::{BleError, Result};
use std::fmt;
use std::str::FromStr;

/// A MAC address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// Wrap six octets
    pub const fn new(bytes: [u8; 6]) -> Self {
        MacAddr(bytes)
    }

    /// Parse `:`-separated, `-`-separated or unseparated hex
    pub fn loads(s: &str) -> Result<Self> {
        let invalid = || BleError::InvalidMac(s.to_string());
        let digits: String = match s.len() {
            12 => s.to_string(),
            17 => {
                let sep = s.as_bytes()[2];
                if sep != b':' && sep != b'-' {
                    return Err(invalid());
                }
                let mut digits = String::with_capacity(12);
                for (i, c) in s.bytes().enumerate() {
                    if i % 3 == 2 {
                        if c != sep {
                            return Err(invalid());
                        }
                    } else {
                        digits.push(c as char);
                    }
                }
                digits
            }
            _ => return Err(invalid()),
        };

        if !digits.bytes().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let mut bytes = [0u8; 6];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(MacAddr(bytes))
    }

    /// Uppercase hex octets joined by `sep`
    pub fn dumps(&self, sep: &str) -> String {
        self.0
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(sep)
    }

    /// The six octets
    pub fn bytes(&self) -> [u8; 6] {
        self.0
    }

    /// Organisationally unique identifier
    pub fn oui(&self) -> [u8; 3] {
        [self.0[0], self.0[1], self.0[2]]
    }

    /// Individual (not group) address
    pub fn is_unicast(&self) -> bool {
        self.0[0] & 0x01 == 0
    }

    /// Group address
    pub fn is_multicast(&self) -> bool {
        !self.is_unicast()
    }

    /// Globally administered address
    pub fn is_universal(&self) -> bool {
        self.0[0] & 0x02 == 0
    }

    /// Locally administered address
    pub fn is_local(&self) -> bool {
        !self.is_universal()
    }
}

impl FromStr for MacAddr {
    type Err = BleError;

    fn from_str(s: &str) -> Result<Self> {
        MacAddr::loads(s)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dumps(":"))
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(bytes: [u8; 6]) -> Self {
        MacAddr(bytes)
    }
}

impl TryFrom<&[u8]> for MacAddr {
    type Error = BleError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        <[u8; 6]>::try_from(bytes)
            .map(MacAddr)
            .map_err(|_| BleError::InvalidMac(format!("{:02X?}", bytes)))
    }
}
