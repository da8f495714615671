//! BLE advertisement matching through an external scanner

use crate::error::Result;
use crate::mac::MacAddr;
use eolt_core::{Clock, InstrumentError};
use std::time::Duration;

/// Interval between scanner queries
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// One advert seen by the scanner
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Advertiser address
    pub mac: MacAddr,
    /// Received signal strength, dBm
    pub rssi: i16,
    /// Advertised name, if any
    pub name: Option<String>,
}

/// A BLE scanner owned by the test station
pub trait ScanService {
    /// Latest advert from `mac`, if one has been seen
    fn lookup(&mut self, mac: &MacAddr) -> std::result::Result<Option<Reading>, InstrumentError>;
}

/// Wait up to `timeout` for an advert from `mac`
///
/// Not finding the unit is not an error; the caller decides.
pub fn scan_advert_blemac(
    scanner: &mut dyn ScanService,
    clock: &dyn Clock,
    mac: &MacAddr,
    timeout: Duration,
) -> Result<Option<Reading>> {
    let start = clock.now();
    loop {
        if let Some(reading) = scanner.lookup(mac)? {
            log::info!("ble: {} advertising at {} dBm", mac, reading.rssi);
            return Ok(Some(reading));
        }
        if clock.now() - start >= timeout {
            log::info!("ble: No advert from {} within {:?}", mac, timeout);
            return Ok(None);
        }
        clock.sleep(POLL_INTERVAL);
    }
}
