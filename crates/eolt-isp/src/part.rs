//! LPC part descriptors and the part database
//!
//! A descriptor records what the programmer needs to know about a part:
//! where the bootloader lets us stage one sector in RAM, the sector map, the
//! data transfer encoding, and where and how Code Read Protection is set.
//! The built-in table covers the parts used on the production lines; more
//! can be loaded from RON files:
//!
//! ```ron
//! (
//!     parts: [
//!         (
//!             name: "LPC1115",
//!             ids: [0x00050080],
//!             ram_addr: 0x10000300,
//!             sectors: [(size: KiB(4), count: 16)],
//!             uuencode: true,
//!         ),
//!     ],
//! )
//! ```

use once_cell::sync::Lazy;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Default Code Read Protection word location
pub const DEFAULT_CRP_ADDR: u32 = 0x2FC;
/// CRP word value meaning "no protection"
pub const CRP_NONE: u32 = 0xFFFF_FFFF;
/// CRP1 word value
pub const CRP1: u32 = 0x1234_5678;

/// Error type for part database operations
#[derive(Debug, Error)]
pub enum PartDbError {
    /// I/O error reading files
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// RON parsing error
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// An LPC part as seen by the ISP programmer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LpcPart {
    /// Display name
    pub name: String,
    /// Part identification numbers reported by the `J` command
    pub ids: Vec<u32>,
    /// RAM address used to stage one sector before copying to flash
    pub ram_addr: u32,
    /// Size of each flash sector in order
    pub sectors: Vec<u32>,
    /// Whether the bootloader uuencodes `W`/`R` data
    pub uuencode: bool,
    /// Flash offset of the CRP word
    pub crp_addr: u32,
    /// CRP word written to disable protection
    pub crp_disable: u32,
    /// CRP word written to enable protection
    pub crp_enable: u32,
}

impl LpcPart {
    /// Build a part with uniform sectors and default CRP settings
    pub fn uniform(
        name: &str,
        ids: &[u32],
        ram_addr: u32,
        sector_size: u32,
        sector_count: usize,
        uuencode: bool,
    ) -> Self {
        Self {
            name: name.to_string(),
            ids: ids.to_vec(),
            ram_addr,
            sectors: vec![sector_size; sector_count],
            uuencode,
            crp_addr: DEFAULT_CRP_ADDR,
            crp_disable: CRP_NONE,
            crp_enable: CRP1,
        }
    }

    /// Total flash size in bytes
    pub fn flash_size(&self) -> usize {
        self.sectors.iter().map(|&s| s as usize).sum()
    }

    /// Number of flash sectors
    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    /// Size of sector `index`
    pub fn sector_size(&self, index: usize) -> usize {
        self.sectors[index] as usize
    }

    /// Flash offset of sector `index`
    pub fn sector_offset(&self, index: usize) -> usize {
        self.sectors[..index].iter().map(|&s| s as usize).sum()
    }

    /// Number of sectors needed to hold `len` bytes
    ///
    /// Returns `None` if `len` exceeds the flash.
    pub fn sectors_for(&self, len: usize) -> Option<usize> {
        let mut end = 0usize;
        for (i, &size) in self.sectors.iter().enumerate() {
            if end >= len {
                return Some(i);
            }
            end += size as usize;
        }
        (end >= len).then_some(self.sectors.len())
    }

    /// Check if the part answers to `id`
    pub fn matches_id(&self, id: u32) -> bool {
        self.ids.contains(&id)
    }
}

// ============================================================================
// RON deserialization types (intermediate format)
// ============================================================================

/// Size specification with human-readable units (for RON parsing)
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub enum Size {
    /// Size in bytes
    B(u32),
    /// Size in kibibytes (1024 bytes)
    KiB(u32),
}

impl Size {
    /// Convert to bytes
    pub fn to_bytes(self) -> u32 {
        match self {
            Size::B(n) => n,
            Size::KiB(n) => n * 1024,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
struct SectorRunDef {
    size: Size,
    count: usize,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct PartDef {
    name: String,
    ids: Vec<u32>,
    ram_addr: u32,
    sectors: Vec<SectorRunDef>,
    #[serde(default)]
    uuencode: bool,
    #[serde(default = "default_crp_addr")]
    crp_addr: u32,
    #[serde(default = "default_crp_disable")]
    crp_disable: u32,
    #[serde(default = "default_crp_enable")]
    crp_enable: u32,
}

fn default_crp_addr() -> u32 {
    DEFAULT_CRP_ADDR
}

fn default_crp_disable() -> u32 {
    CRP_NONE
}

fn default_crp_enable() -> u32 {
    CRP1
}

impl PartDef {
    fn into_part(self) -> Result<LpcPart, PartDbError> {
        let sectors: Vec<u32> = self
            .sectors
            .iter()
            .flat_map(|run| std::iter::repeat(run.size.to_bytes()).take(run.count))
            .collect();

        if sectors.is_empty() {
            return Err(PartDbError::Validation(format!(
                "part {} has no sectors",
                self.name
            )));
        }
        if self.ids.is_empty() {
            return Err(PartDbError::Validation(format!(
                "part {} has no part IDs",
                self.name
            )));
        }
        if (self.crp_addr as usize) + 4 > sectors[0] as usize {
            return Err(PartDbError::Validation(format!(
                "part {}: CRP word at 0x{:X} is outside sector 0",
                self.name, self.crp_addr
            )));
        }

        Ok(LpcPart {
            name: self.name,
            ids: self.ids,
            ram_addr: self.ram_addr,
            sectors,
            uuencode: self.uuencode,
            crp_addr: self.crp_addr,
            crp_disable: self.crp_disable,
            crp_enable: self.crp_enable,
        })
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
struct PartFileDef {
    parts: Vec<PartDef>,
}

// ============================================================================
// Part database
// ============================================================================

/// Collection of part descriptors, looked up by part ID
#[derive(Debug, Clone, Default)]
pub struct PartDatabase {
    parts: Vec<LpcPart>,
}

impl PartDatabase {
    /// Create an empty part database
    pub fn new() -> Self {
        Self { parts: Vec::new() }
    }

    /// Add a part
    pub fn insert(&mut self, part: LpcPart) {
        self.parts.push(part);
    }

    /// Load part definitions from a RON string
    ///
    /// Every definition is validated before any is added, so a bad file
    /// leaves the database untouched.
    pub fn load_ron(&mut self, content: &str) -> Result<usize, PartDbError> {
        let file: PartFileDef = ron::from_str(content)?;
        let parts = file
            .parts
            .into_iter()
            .map(PartDef::into_part)
            .collect::<Result<Vec<_>, _>>()?;

        let count = parts.len();
        self.parts.extend(parts);
        Ok(count)
    }

    /// Load part definitions from a single RON file
    pub fn load_file(&mut self, path: &Path) -> Result<usize, PartDbError> {
        let content = fs::read_to_string(path)?;
        self.load_ron(&content)
    }

    /// Find a part by the ID the `J` command reports
    pub fn find_by_id(&self, id: u32) -> Option<&LpcPart> {
        self.parts.iter().find(|p| p.matches_id(id))
    }

    /// Find a part by name (case-insensitive exact match)
    pub fn find_by_name(&self, name: &str) -> Option<&LpcPart> {
        self.parts.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Get the number of parts in the database
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Check if the database is empty
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Iterate over all parts
    pub fn iter(&self) -> impl Iterator<Item = &LpcPart> {
        self.parts.iter()
    }
}

static BUILTIN: Lazy<PartDatabase> = Lazy::new(|| {
    let mut db = PartDatabase::new();
    db.insert(LpcPart::uniform(
        "LPC1113",
        &[0x0434_502B, 0x0434_102B, 0x2532_102B],
        0x1000_0300,
        4096,
        6,
        true,
    ));
    db.insert(LpcPart::uniform(
        "LPC1114",
        &[0x0444_502B, 0x0444_102B, 0x2540_102B, 0x1440_102B],
        0x1000_0300,
        4096,
        8,
        true,
    ));
    db.insert(LpcPart::uniform(
        "LPC1115",
        &[0x0005_0080],
        0x1000_0300,
        4096,
        16,
        true,
    ));
    db.insert(LpcPart::uniform(
        "LPC1343",
        &[0x3D00_002B],
        0x1000_0300,
        4096,
        8,
        true,
    ));
    db.insert(LpcPart::uniform(
        "LPC812",
        &[0x0000_8122],
        0x1000_0300,
        1024,
        16,
        false,
    ));
    db.insert(LpcPart::uniform(
        "LPC1519",
        &[0x0000_1519],
        0x0200_0400,
        4096,
        16,
        false,
    ));
    db.insert(LpcPart::uniform(
        "LPC1549",
        &[0x0000_1549],
        0x0200_0400,
        4096,
        64,
        false,
    ));
    db
});

/// The built-in part table
pub fn builtin_parts() -> &'static PartDatabase {
    &BUILTIN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let part = builtin_parts().find_by_id(0x50080).unwrap();
        assert_eq!(part.name, "LPC1115");
        assert_eq!(part.flash_size(), 64 * 1024);
        assert!(builtin_parts().find_by_id(0xDEAD_BEEF).is_none());
        assert!(builtin_parts().find_by_name("lpc1549").is_some());
    }

    #[test]
    fn test_sector_geometry() {
        let part = LpcPart {
            sectors: vec![4096, 4096, 32768],
            ..LpcPart::uniform("mixed", &[1], 0, 4096, 1, false)
        };
        assert_eq!(part.flash_size(), 40960);
        assert_eq!(part.sector_offset(2), 8192);
        assert_eq!(part.sectors_for(0), Some(0));
        assert_eq!(part.sectors_for(1), Some(1));
        assert_eq!(part.sectors_for(4096), Some(1));
        assert_eq!(part.sectors_for(4097), Some(2));
        assert_eq!(part.sectors_for(8193), Some(3));
        assert_eq!(part.sectors_for(40961), None);
    }

    #[test]
    fn test_load_ron() {
        let ron = r#"
        (
            parts: [
                (
                    name: "LPC1114",
                    ids: [0x0444102B],
                    ram_addr: 0x10000300,
                    sectors: [(size: KiB(4), count: 8)],
                    uuencode: true,
                ),
                (
                    name: "Custom",
                    ids: [0x1234],
                    ram_addr: 0x02000000,
                    sectors: [(size: KiB(4), count: 2), (size: KiB(32), count: 1)],
                    crp_enable: 0x87654321,
                ),
            ],
        )
        "#;

        let mut db = PartDatabase::new();
        assert_eq!(db.load_ron(ron).unwrap(), 2);

        let part = db.find_by_id(0x0444_102B).unwrap();
        assert_eq!(part.name, "LPC1114");
        assert!(part.uuencode);
        assert_eq!(part.crp_addr, DEFAULT_CRP_ADDR);
        assert_eq!(part.crp_enable, CRP1);

        let custom = db.find_by_name("custom").unwrap();
        assert!(!custom.uuencode);
        assert_eq!(custom.sectors, vec![4096, 4096, 32768]);
        assert_eq!(custom.crp_enable, 0x8765_4321);
    }

    #[test]
    fn test_load_ron_rejects_empty_sectors() {
        let ron = r#"(parts: [(name: "Bad", ids: [1], ram_addr: 0, sectors: [])])"#;
        let mut db = PartDatabase::new();
        assert!(matches!(db.load_ron(ron), Err(PartDbError::Validation(_))));
    }

    #[test]
    fn test_load_ron_is_all_or_nothing() {
        let ron = r#"
        (
            parts: [
                (name: "Good", ids: [1], ram_addr: 0, sectors: [(size: KiB(4), count: 4)]),
                (name: "NoIds", ids: [], ram_addr: 0, sectors: [(size: KiB(4), count: 4)]),
            ],
        )
        "#;
        let mut db = PartDatabase::new();
        db.insert(LpcPart::uniform("Existing", &[7], 0, 4096, 1, false));

        assert!(matches!(db.load_ron(ron), Err(PartDbError::Validation(_))));
        assert_eq!(db.len(), 1);
        assert!(db.find_by_name("Good").is_none());
    }
}
