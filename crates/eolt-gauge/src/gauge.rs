//! Battery-gauge driver
//!
//! Reads measurements, calibrates the voltage ADC and the current
//! integrator, and stamps the manufacture date and serial number. RAM
//! registers live on the gauge itself; the persistent copies live in an
//! EEPROM behind the same bridge, reachable only after the gauge has been
//! told to power it.

use crate::bridge::Bridge;
use crate::error::{GaugeError, Result};
use chrono::{Datelike, NaiveDate};
use eolt_cal::{calibrate_current, check_window, Monitor, SlopeConfig};
use eolt_core::{Clock, InstrumentError, SystemClock, Transport};
use std::time::Duration;

/// Manufacturer access code that powers the EEPROM
pub const EEPROM_ACCESS_CODE: u16 = 0x0606;
/// Wait after the access code before the EEPROM answers
pub const EEPROM_POWER_UP: Duration = Duration::from_millis(900);
/// Write time per EEPROM byte
pub const EEPROM_BYTE_DELAY: Duration = Duration::from_millis(10);
/// Extra settle time at a page boundary
pub const EEPROM_PAGE_DELAY: Duration = Duration::from_millis(10);
/// EEPROM page size
pub const EEPROM_PAGE: usize = 8;

/// Gauge ADC conversion period
pub const ADC_CYCLE: Duration = Duration::from_secs(3);
/// Samples averaged by the voltage calibration
pub const CAL_SAMPLES: usize = 3;
/// Accepted ADC voltage gain
pub const VOLTAGE_GAIN_WINDOW: (f64, f64) = (19_000.0, 21_000.0);
/// Accepted ADC offset
pub const OFFSET_WINDOW: (f64, f64) = (-20.0, 20.0);

/// EEPROM locations of the persistent constants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EepromMap {
    /// Manufacture date word
    pub date: u8,
    /// Serial number word
    pub serial: u8,
    /// ADC offset, low byte of its word
    pub adc_offset: u8,
    /// ADC voltage gain word
    pub voltage_gain: u8,
    /// ADC current gain word
    pub current_gain: u8,
    /// VFC gain word
    pub vfc_gain: u8,
}

/// Slave addresses and register numbers of a gauge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaugeMap {
    /// Gauge slave address
    pub bms_slave: u8,
    /// EEPROM slave address
    pub eeprom_slave: u8,
    /// ManufacturerAccess
    pub manufacturer_access: u8,
    /// Temperature, 0.1 K
    pub temperature: u8,
    /// Voltage, mV
    pub voltage: u8,
    /// Current, mA, signed
    pub current: u8,
    /// ManufactureDate
    pub manufacture_date: u8,
    /// SerialNumber
    pub serial_number: u8,
    /// LightLoadEst
    pub light_load_est: u8,
    /// ADC offset, low byte
    pub adc_offset: u8,
    /// ADC voltage gain (full-scale voltage)
    pub voltage_gain: u8,
    /// Inversion offset, signed
    pub inversion_offset: u8,
    /// ADC current gain
    pub current_gain: u8,
    /// VFC gain
    pub vfc_gain: u8,
    /// VFC pulse monitor
    pub monitor: u8,
    /// EEPROM locations
    pub eeprom: EepromMap,
}

impl Default for GaugeMap {
    fn default() -> Self {
        Self {
            bms_slave: 0x0B,
            eeprom_slave: 0x50,
            manufacturer_access: 0x00,
            temperature: 0x08,
            voltage: 0x09,
            current: 0x0A,
            manufacture_date: 0x1B,
            serial_number: 0x1C,
            light_load_est: 0x3A,
            adc_offset: 0x3B,
            voltage_gain: 0x3C,
            inversion_offset: 0x3D,
            current_gain: 0x3E,
            vfc_gain: 0x3F,
            monitor: 0x40,
            eeprom: EepromMap {
                date: 0x0A,
                serial: 0x0E,
                adc_offset: 0x60,
                voltage_gain: 0x62,
                current_gain: 0x64,
                vfc_gain: 0x66,
            },
        }
    }
}

/// Voltage, current and temperature
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vit {
    /// Volts
    pub volts: f64,
    /// Amps, negative when discharging
    pub amps: f64,
    /// Temperature in the gauge's unit divided by ten
    pub temperature: f64,
}

/// Constants written by [`BatteryGauge::cal_v`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoltageConstants {
    /// ADC voltage gain
    pub gain: u16,
    /// ADC offset
    pub offset: i8,
}

/// Constants written by [`BatteryGauge::cal_i`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentConstants {
    /// VFC gain
    pub vfc_gain: u16,
    /// ADC current gain
    pub adc_gain: u16,
}

/// `((year - 1980) << 9) | (month << 5) | day`
pub fn encode_date(date: NaiveDate) -> Result<u16> {
    let years = date.year() - 1980;
    if !(0..=127).contains(&years) {
        return Err(GaugeError::InvalidDate(date.to_string()));
    }
    Ok(((years as u16) << 9) | ((date.month() as u16) << 5) | date.day() as u16)
}

struct RegisterMonitor<'a, T: Transport> {
    bridge: &'a mut Bridge<T>,
    reg: u8,
}

impl<T: Transport> Monitor for RegisterMonitor<'_, T> {
    fn read_monitor(&mut self) -> std::result::Result<u32, InstrumentError> {
        self.bridge
            .read_word(self.reg)
            .map(u32::from)
            .map_err(|e| InstrumentError::new(e.to_string()))
    }
}

/// Keep the first error of an operation and its cleanup
/// Round a computed constant into a register word
fn register_word(name: &str, value: f64) -> Result<u16> {
    Ok(check_window(name, value.round(), 0.0, u16::MAX as f64)? as u16)
}

fn first_error<R>(result: Result<R>, cleanup: Result<()>) -> Result<R> {
    let value = result?;
    cleanup?;
    Ok(value)
}

/// Battery gauge behind a bridge
pub struct BatteryGauge<T: Transport> {
    bridge: Bridge<T>,
    map: GaugeMap,
    clock: Box<dyn Clock>,
}

impl<T: Transport> BatteryGauge<T> {
    /// Wrap a transport with the default register map
    pub fn new(transport: T) -> Self {
        Self {
            bridge: Bridge::new(transport),
            map: GaugeMap::default(),
            clock: Box::new(SystemClock::new()),
        }
    }

    /// Use a different register map
    pub fn with_map(mut self, map: GaugeMap) -> Self {
        self.map = map;
        self
    }

    /// Use `clock` for every delay
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The bridge
    pub fn bridge(&self) -> &Bridge<T> {
        &self.bridge
    }

    /// The bridge, mutably
    pub fn bridge_mut(&mut self) -> &mut Bridge<T> {
        &mut self.bridge
    }

    /// The register map
    pub fn map(&self) -> &GaugeMap {
        &self.map
    }

    /// Select the gauge
    pub fn open(&mut self) -> Result<()> {
        self.bridge.set_slave(self.map.bms_slave)
    }

    /// Read voltage, current and temperature
    pub fn read_vit(&mut self) -> Result<Vit> {
        let volts = self.bridge.read_word(self.map.voltage)? as f64 / 1000.0;
        let amps = self.bridge.read_word(self.map.current)? as i16 as f64 / 1000.0;
        let temperature = self.bridge.read_word(self.map.temperature)? as f64 / 10.0;
        Ok(Vit {
            volts,
            amps,
            temperature,
        })
    }

    fn write_verified(&mut self, reg: u8, value: u16, location: String) -> Result<()> {
        self.bridge.write_word(reg, value)?;
        let actual = self.bridge.read_word(reg)?;
        if actual != value {
            return Err(GaugeError::Verify {
                location,
                expected: value,
                actual,
            });
        }
        Ok(())
    }

    fn write_ram(&mut self, reg: u8, value: u16) -> Result<()> {
        self.write_verified(reg, value, format!("register 0x{:02X}", reg))
    }

    /// Run `f` with the EEPROM selected, returning to the gauge afterwards
    /// whatever happens
    pub fn with_eeprom<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        self.bridge
            .write_word_pec(self.map.manufacturer_access, EEPROM_ACCESS_CODE)?;
        self.clock.sleep(EEPROM_POWER_UP);

        let result = match self.bridge.set_slave(self.map.eeprom_slave) {
            Ok(()) => f(self),
            Err(e) => Err(e),
        };
        let back = self.bridge.set_slave(self.map.bms_slave);
        first_error(result, back)
    }

    /// Write one EEPROM word with its programming delays, then read it back
    ///
    /// Only valid inside [`with_eeprom`](Self::with_eeprom).
    pub fn eeprom_write_word(&mut self, addr: u8, value: u16) -> Result<()> {
        self.bridge.write_word(addr, value)?;
        for i in 0..2u8 {
            self.clock.sleep(EEPROM_BYTE_DELAY);
            if (addr.wrapping_add(i) as usize + 1) % EEPROM_PAGE == 0 {
                self.clock.sleep(EEPROM_PAGE_DELAY);
            }
        }
        let actual = self.bridge.read_word(addr)?;
        if actual != value {
            return Err(GaugeError::Verify {
                location: format!("EEPROM 0x{:02X}", addr),
                expected: value,
                actual,
            });
        }
        log::debug!("gauge: EEPROM 0x{:02X} = 0x{:04X}", addr, value);
        Ok(())
    }

    fn eeprom_write_low_byte(&mut self, addr: u8, value: u8) -> Result<()> {
        let word = self.bridge.read_word(addr)?;
        self.eeprom_write_word(addr, (word & 0xFF00) | value as u16)
    }

    /// Calibrate the voltage ADC against `volts` applied to the pack
    ///
    /// LightLoadEst's high byte is cleared for the duration and restored
    /// afterwards, also on failure.
    pub fn cal_v(&mut self, volts: f64, eeprom: bool) -> Result<VoltageConstants> {
        let reg = self.map.light_load_est;
        let lle = self.bridge.read_word(reg)?;
        self.bridge.write_word(reg, lle & 0x00FF)?;

        let result = self.cal_v_inner(volts, eeprom);
        let restore = self.bridge.write_word(reg, lle);
        first_error(result, restore)
    }

    fn cal_v_inner(&mut self, volts: f64, eeprom: bool) -> Result<VoltageConstants> {
        let map = self.map.clone();
        let offset_word = self.bridge.read_word(map.adc_offset)?;
        let old_offset = offset_word as u8 as i8;
        let fsv = self.bridge.read_word(map.voltage_gain)? as f64;

        let mut v_sum = 0.0;
        let mut inv_sum = 0.0;
        for i in 0..CAL_SAMPLES {
            if i > 0 {
                self.clock.sleep(ADC_CYCLE);
            }
            v_sum += self.bridge.read_word(map.voltage)? as f64;
            inv_sum += self.bridge.read_word(map.inversion_offset)? as i16 as f64;
        }
        let v_read = v_sum / CAL_SAMPLES as f64;
        let inv_off = inv_sum / CAL_SAMPLES as f64;

        let gain = volts * 1000.0 / (v_read / fsv + (-inv_off / 32768.0));
        let gain = check_window(
            "ADC voltage gain",
            gain,
            VOLTAGE_GAIN_WINDOW.0,
            VOLTAGE_GAIN_WINDOW.1,
        )?;
        let gain = register_word("ADC voltage gain", gain)?;
        let offset = ((old_offset as i64 - inv_off.round() as i64) & 0xFF) as u8 as i8;
        check_window("ADC offset", offset as f64, OFFSET_WINDOW.0, OFFSET_WINDOW.1)?;
        log::info!(
            "gauge: V read {:.1} mV, inversion offset {:.1}: gain {} -> {}, offset {} -> {}",
            v_read,
            inv_off,
            fsv,
            gain,
            old_offset,
            offset
        );

        self.write_ram(map.voltage_gain, gain)?;
        self.write_ram(map.adc_offset, (offset_word & 0xFF00) | offset as u8 as u16)?;
        if eeprom {
            self.with_eeprom(|g| {
                g.eeprom_write_word(map.eeprom.voltage_gain, gain)?;
                g.eeprom_write_low_byte(map.eeprom.adc_offset, offset as u8)
            })?;
        }
        Ok(VoltageConstants { gain, offset })
    }

    /// Calibrate the current path with `amps` flowing
    pub fn cal_i(&mut self, amps: f64, config: &SlopeConfig, eeprom: bool) -> Result<CurrentConstants> {
        let map = self.map.clone();
        let i_read = self.bridge.read_word(map.current)? as i16 as f64 / 1000.0;
        let adc_old = self.bridge.read_word(map.current_gain)? as f64;

        let mut monitor = RegisterMonitor {
            bridge: &mut self.bridge,
            reg: map.monitor,
        };
        let gains = calibrate_current(
            &mut monitor,
            self.clock.as_ref(),
            config,
            amps,
            i_read,
            adc_old,
        )?;

        let constants = CurrentConstants {
            vfc_gain: register_word("VFC gain", gains.vfc_gain)?,
            adc_gain: register_word("ADC gain", gains.adc_gain)?,
        };
        self.write_ram(map.vfc_gain, constants.vfc_gain)?;
        self.write_ram(map.current_gain, constants.adc_gain)?;
        if eeprom {
            self.with_eeprom(|g| {
                g.eeprom_write_word(map.eeprom.vfc_gain, constants.vfc_gain)?;
                g.eeprom_write_word(map.eeprom.current_gain, constants.adc_gain)
            })?;
        }
        log::info!(
            "gauge: VFC gain {}, ADC current gain {}",
            constants.vfc_gain,
            constants.adc_gain
        );
        Ok(constants)
    }

    /// Stamp manufacture date (`YYYY-MM-DD`) and serial number into RAM and
    /// EEPROM; returns the date word and serial
    pub fn sn_date(&mut self, iso_date: &str, serial: &str) -> Result<(u16, u16)> {
        let date = NaiveDate::parse_from_str(iso_date.trim(), "%Y-%m-%d")
            .map_err(|_| GaugeError::InvalidDate(iso_date.to_string()))?;
        let date_word = encode_date(date)?;
        let serial_word: u16 = serial
            .trim()
            .parse()
            .map_err(|_| GaugeError::InvalidSerial(serial.to_string()))?;

        let map = self.map.clone();
        self.write_ram(map.manufacture_date, date_word)?;
        self.write_ram(map.serial_number, serial_word)?;
        self.with_eeprom(|g| {
            g.eeprom_write_word(map.eeprom.date, date_word)?;
            g.eeprom_write_word(map.eeprom.serial, serial_word)
        })?;
        log::info!(
            "gauge: Date {} (0x{:04X}), serial {}",
            date,
            date_word,
            serial_word
        );
        Ok((date_word, serial_word))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeBridge;
    use crate::protocol::ErrorClass;
    use eolt_cal::CalError;
    use eolt_core::ManualClock;
    use std::rc::Rc;

    fn gauge(fake: FakeBridge, clock: &Rc<ManualClock>) -> BatteryGauge<FakeBridge> {
        let mut g = BatteryGauge::new(fake).with_clock(Box::new(clock.clone()));
        g.open().unwrap();
        g
    }

    #[test]
    fn test_encode_date() {
        let d = NaiveDate::from_ymd_opt(2015, 4, 9).unwrap();
        assert_eq!(encode_date(d).unwrap(), 0x4689);
        let d = NaiveDate::from_ymd_opt(1979, 12, 31).unwrap();
        assert!(matches!(encode_date(d), Err(GaugeError::InvalidDate(_))));
    }

    #[test]
    fn test_read_vit() {
        let clock = Rc::new(ManualClock::new());
        let map = GaugeMap::default();
        let fake = FakeBridge::new()
            .with_reg(map.voltage, 16_000)
            .with_reg(map.current, (-1500i16) as u16)
            .with_reg(map.temperature, 2981);
        let mut g = gauge(fake, &clock);
        let vit = g.read_vit().unwrap();
        assert_eq!(vit.volts, 16.0);
        assert_eq!(vit.amps, -1.5);
        assert!((vit.temperature - 298.1).abs() < 1e-9);
    }

    #[test]
    fn test_sn_date_ram_and_eeprom() {
        let clock = Rc::new(ManualClock::new());
        let map = GaugeMap::default();
        let mut g = gauge(FakeBridge::new(), &clock);

        assert_eq!(g.sn_date("2015-04-09", "12345").unwrap(), (0x4689, 12345));

        let fake = g.bridge().transport();
        assert_eq!(fake.reg(map.manufacture_date), 0x4689);
        assert_eq!(fake.reg(map.serial_number), 12345);
        assert_eq!(fake.eeprom_word(map.eeprom.date), 0x4689);
        assert_eq!(fake.eeprom_word(map.eeprom.serial), 12345);
        assert_eq!(g.bridge().slave(), Some(map.bms_slave));
        // Power-up, two bytes per word, one page boundary at 0x10
        assert_eq!(clock.slept(), Duration::from_millis(900 + 20 + 30));
    }

    #[test]
    fn test_sn_date_rejects_bad_input() {
        let clock = Rc::new(ManualClock::new());
        let mut g = gauge(FakeBridge::new(), &clock);
        assert!(matches!(
            g.sn_date("2015-13-09", "1"),
            Err(GaugeError::InvalidDate(_))
        ));
        assert!(matches!(
            g.sn_date("2015-04-09", "65536"),
            Err(GaugeError::InvalidSerial(_))
        ));
        assert!(g.bridge().transport().frames().len() == 1);
    }

    #[test]
    fn test_eeprom_excursion_returns_to_gauge_on_error() {
        let clock = Rc::new(ManualClock::new());
        let map = GaugeMap::default();
        let mut g = gauge(FakeBridge::new().eeprom_locked(), &clock);
        match g.sn_date("2015-04-09", "12345") {
            Err(GaugeError::Status { status, .. }) => assert_eq!(status.class, ErrorClass::I2C),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(g.bridge().slave(), Some(map.bms_slave));
        assert_eq!(g.bridge().transport().slave(), map.bms_slave);
    }

    #[test]
    fn test_cal_v() {
        let clock = Rc::new(ManualClock::new());
        let map = GaugeMap::default();
        let fake = FakeBridge::new()
            .with_reg(map.light_load_est, 0x1234)
            .with_reg(map.adc_offset, 0xAB05)
            .with_reg(map.voltage_gain, 20_000)
            .with_reg(map.voltage, 16_000)
            .with_reg(map.inversion_offset, 3);
        let mut g = gauge(fake, &clock);

        // 16100 / (16000/20000 - 3/32768) = 20127.3
        let c = g.cal_v(16.1, true).unwrap();
        assert_eq!(c, VoltageConstants { gain: 20127, offset: 2 });

        let fake = g.bridge().transport();
        assert_eq!(fake.reg(map.voltage_gain), 20127);
        assert_eq!(fake.reg(map.adc_offset), 0xAB02);
        assert_eq!(fake.reg(map.light_load_est), 0x1234);
        assert!(fake.wrote(map.light_load_est, 0x0034));
        assert_eq!(fake.eeprom_word(map.eeprom.voltage_gain), 20127);
        assert_eq!(fake.eeprom_word(map.eeprom.adc_offset) & 0xFF, 2);
    }

    #[test]
    fn test_cal_v_out_of_window_restores() {
        let clock = Rc::new(ManualClock::new());
        let map = GaugeMap::default();
        let fake = FakeBridge::new()
            .with_reg(map.light_load_est, 0x1234)
            .with_reg(map.voltage_gain, 20_000)
            .with_reg(map.voltage, 16_000);
        let mut g = gauge(fake, &clock);

        assert!(matches!(
            g.cal_v(18.0, false),
            Err(GaugeError::Cal(CalError::OutOfRange { .. }))
        ));
        let fake = g.bridge().transport();
        assert_eq!(fake.reg(map.light_load_est), 0x1234);
        assert_eq!(fake.reg(map.voltage_gain), 20_000);
    }

    #[test]
    fn test_cal_i() {
        let clock = Rc::new(ManualClock::new());
        let map = GaugeMap::default();
        let fake = FakeBridge::new()
            .with_reg(map.current, 9_900)
            .with_reg(map.current_gain, 1000)
            .with_monitor(clock.clone(), Duration::from_micros(112_500));
        let mut g = gauge(fake, &clock);

        let config = SlopeConfig {
            poll_interval: Duration::from_micros(2500),
            ..Default::default()
        };
        let c = g.cal_i(10.0, &config, true).unwrap();
        assert_eq!(
            c,
            CurrentConstants {
                vfc_gain: 20480,
                adc_gain: 1010
            }
        );
        let fake = g.bridge().transport();
        assert_eq!(fake.reg(map.vfc_gain), 20480);
        assert_eq!(fake.eeprom_word(map.eeprom.current_gain), 1010);
    }

    #[test]
    fn test_cal_i_gain_past_register_range() {
        let clock = Rc::new(ManualClock::new());
        let map = GaugeMap::default();
        let fake = FakeBridge::new()
            .with_reg(map.current, 9_900)
            .with_reg(map.current_gain, 65_000)
            .with_reg(map.vfc_gain, 20_000)
            .with_monitor(clock.clone(), Duration::from_micros(112_500));
        let mut g = gauge(fake, &clock);

        let config = SlopeConfig {
            poll_interval: Duration::from_micros(2500),
            ..Default::default()
        };
        // 65000 * 10 / 9.9 = 65656.6, inside the tolerance but not a u16
        match g.cal_i(10.0, &config, false) {
            Err(GaugeError::Cal(CalError::OutOfRange { name, .. })) => assert_eq!(name, "ADC gain"),
            other => panic!("unexpected: {:?}", other),
        }
        let fake = g.bridge().transport();
        assert_eq!(fake.reg(map.current_gain), 65_000);
        assert_eq!(fake.reg(map.vfc_gain), 20_000);
    }
}
