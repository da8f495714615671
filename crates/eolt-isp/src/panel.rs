//! Parallel programming of a multi-up panel
//!
//! Each panel position has its own serial port and its own worker thread.
//! Workers send `(position, result)` through a channel; a failing position
//! never stops the others.

use crate::error::{IspError, Result};
use crate::isp::LpcIsp;
use crate::part::PartDatabase;
use crate::programmer::{program_device, ProgramOptions, ProgramSummary};
use eolt_core::Transport;
use std::sync::mpsc;
use std::thread;

/// Per-position outcome of a panel job, ordered by position
#[derive(Debug)]
pub struct PanelReport {
    results: Vec<(usize, Result<ProgramSummary>)>,
}

impl PanelReport {
    /// All results, by position
    pub fn results(&self) -> &[(usize, Result<ProgramSummary>)] {
        &self.results
    }

    /// Positions that failed, with their errors
    pub fn failures(&self) -> impl Iterator<Item = (usize, &IspError)> {
        self.results
            .iter()
            .filter_map(|(pos, r)| r.as_ref().err().map(|e| (*pos, e)))
    }

    /// Number of failed positions
    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    /// Whether every position programmed successfully
    pub fn is_pass(&self) -> bool {
        self.failure_count() == 0
    }
}

/// Program every position of a panel in parallel
///
/// `openers` produce the transport for each position, in position order;
/// each is called on its worker thread, which then owns the port.
pub fn program_panel<T, F>(
    openers: Vec<F>,
    db: &PartDatabase,
    image: &[u8],
    options: &ProgramOptions,
    crystal_khz: u32,
) -> PanelReport
where
    T: Transport,
    F: FnOnce() -> Result<T> + Send,
{
    let (tx, rx) = mpsc::channel();
    let positions = openers.len();

    thread::scope(|scope| {
        for (position, open) in openers.into_iter().enumerate() {
            let tx = tx.clone();
            scope.spawn(move || {
                let result = open().and_then(|transport| {
                    let mut isp = LpcIsp::new(transport, crystal_khz);
                    program_device(&mut isp, db, image, options, &mut |done, total| {
                        log::debug!("panel {}: sector {}/{}", position, done, total)
                    })
                });
                match &result {
                    Ok(summary) => log::info!("panel {}: programmed {}", position, summary.part),
                    Err(e) => log::error!("panel {}: {}", position, e),
                }
                // The receiver outlives the scope
                let _ = tx.send((position, result));
            });
        }
    });
    drop(tx);

    let mut results: Vec<_> = rx.iter().collect();
    results.sort_by_key(|(position, _)| *position);
    debug_assert_eq!(results.len(), positions);

    PanelReport { results }
}
