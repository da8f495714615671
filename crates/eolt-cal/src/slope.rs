//! Pulse-counting slope calibration
//!
//! A battery gauge integrates current with a voltage-to-frequency
//! converter and bumps a monitor register on every VFC pulse. With a known
//! current flowing, timing a fixed number of register edges gives the VFC
//! gain; the ratio of actual to reported current gives the ADC gain.

use crate::error::{check_window, CalError, Result};
use eolt_core::{Clock, InstrumentError};
use std::time::Duration;

/// VFC gain per mA·s per pulse
pub const VFC_CONSTANT: f64 = 18.204444;

/// Accepted VFC gain, nominal 20480 +/- 10 %
pub const VFC_GAIN_WINDOW: (f64, f64) = (18432.0, 22528.0);

/// Accepted ADC gain change, relative to the old gain
pub const ADC_GAIN_TOLERANCE: f64 = 0.05;

/// Source of monitor register values
pub trait Monitor {
    /// Read the register
    fn read_monitor(&mut self) -> std::result::Result<u32, InstrumentError>;
}

impl<F> Monitor for F
where
    F: FnMut() -> std::result::Result<u32, InstrumentError>,
{
    fn read_monitor(&mut self) -> std::result::Result<u32, InstrumentError> {
        self()
    }
}

/// Edge counting parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlopeConfig {
    /// Edges timed after the first one
    pub edges: u32,
    /// Polls allowed while waiting for any one edge
    pub max_polls: u32,
    /// Wait between polls
    pub poll_interval: Duration,
}

impl Default for SlopeConfig {
    fn default() -> Self {
        Self {
            edges: 30,
            max_polls: 500,
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// A timed run of monitor edges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slope {
    /// Edges counted
    pub edges: u32,
    /// Time from the first edge to the last
    pub elapsed: Duration,
}

fn wait_edge(
    monitor: &mut dyn Monitor,
    clock: &dyn Clock,
    config: &SlopeConfig,
    last: &mut u32,
) -> Result<()> {
    for _ in 0..config.max_polls {
        clock.sleep(config.poll_interval);
        let value = monitor.read_monitor()?;
        if value != *last {
            *last = value;
            return Ok(());
        }
    }
    Err(CalError::MonitorTimeout {
        polls: config.max_polls,
    })
}

/// Sync to a monitor edge, then time `config.edges` further edges
pub fn measure_slope(
    monitor: &mut dyn Monitor,
    clock: &dyn Clock,
    config: &SlopeConfig,
) -> Result<Slope> {
    let mut last = monitor.read_monitor()?;
    wait_edge(monitor, clock, config, &mut last)?;
    let start = clock.now();
    for n in 0..config.edges {
        wait_edge(monitor, clock, config, &mut last)?;
        log::trace!("cal: edge {} at {:?}", n + 1, clock.now() - start);
    }
    let slope = Slope {
        edges: config.edges,
        elapsed: clock.now() - start,
    };
    log::debug!("cal: {} edges in {:?}", slope.edges, slope.elapsed);
    Ok(slope)
}

/// `|I| * elapsed_s * VFC_CONSTANT / N`, with `I` in amps converted to mA
pub fn vfc_gain(i_actual: f64, slope: &Slope) -> f64 {
    (i_actual * 1000.0).abs() * slope.elapsed.as_secs_f64() * VFC_CONSTANT / slope.edges as f64
}

/// `old * I_actual / I_read`
pub fn adc_gain(old: f64, i_actual: f64, i_read: f64) -> f64 {
    old * i_actual / i_read
}

/// New gains from a slope run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurrentGains {
    /// VFC gain
    pub vfc_gain: f64,
    /// ADC gain
    pub adc_gain: f64,
}

/// Measure the slope and compute both gains, rejecting any outside its
/// sanity window
pub fn calibrate_current(
    monitor: &mut dyn Monitor,
    clock: &dyn Clock,
    config: &SlopeConfig,
    i_actual: f64,
    i_read: f64,
    adc_gain_old: f64,
) -> Result<CurrentGains> {
    let slope = measure_slope(monitor, clock, config)?;
    let vfc = check_window(
        "VFC gain",
        vfc_gain(i_actual, &slope),
        VFC_GAIN_WINDOW.0,
        VFC_GAIN_WINDOW.1,
    )?;
    let span = adc_gain_old.abs() * ADC_GAIN_TOLERANCE;
    let adc = check_window(
        "ADC gain",
        adc_gain(adc_gain_old, i_actual, i_read),
        adc_gain_old - span,
        adc_gain_old + span,
    )?;
    log::info!("cal: VFC gain {:.1}, ADC gain {:.1}", vfc, adc);
    Ok(CurrentGains {
        vfc_gain: vfc,
        adc_gain: adc,
    })
}
