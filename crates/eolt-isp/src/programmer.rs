//! Complete programming job for one part

use crate::error::Result;
use crate::image::{CrpPolicy, FlashImage};
use crate::isp::LpcIsp;
use crate::part::PartDatabase;
use eolt_core::Transport;

/// Options for a programming job
#[derive(Debug, Clone, Default)]
pub struct ProgramOptions {
    /// CRP word handling
    pub crp: CrpPolicy,
    /// Read the whole image back after programming
    pub verify_read: bool,
}

/// What a successful job did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSummary {
    /// Part name from the database
    pub part: String,
    /// Part ID reported by the device
    pub part_id: u32,
    /// Sectors written
    pub sectors: usize,
    /// Padded image size in bytes
    pub bytes: usize,
    /// CRP word as programmed
    pub crp_word: u32,
}

/// Synchronise, identify, erase, program and optionally read back
///
/// The image is checked against the identified part before the flash is
/// touched, so an oversized image never erases the device.
pub fn program_device<T: Transport>(
    isp: &mut LpcIsp<T>,
    db: &PartDatabase,
    image: &[u8],
    options: &ProgramOptions,
    progress: &mut dyn FnMut(usize, usize),
) -> Result<ProgramSummary> {
    isp.synchronize()?;
    let part = isp.identify(db)?;
    let part_id = part.ids[0];
    let prepared = FlashImage::prepare(part, image, options.crp)?;

    isp.erase_all(part)?;
    isp.program(part, &prepared, progress)?;
    if options.verify_read {
        isp.verify_read(part, &prepared)?;
    }

    Ok(ProgramSummary {
        part: part.name.clone(),
        part_id,
        sectors: prepared.sectors_used(),
        bytes: prepared.len(),
        crp_word: prepared.crp_word(part),
    })
}
