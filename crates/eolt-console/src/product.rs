//! Product consoles
//!
//! A [`ProductConsole`] puts a product's command table on top of the
//! framing layer and adds the verbs test steps use: banner, unlock, brand,
//! test modes, non-volatile commit, bulk `STAT`/`CAL?` snapshots and the
//! on-unit calibrations.

use crate::error::{ConsoleError, Reclaim, Result};
use crate::framing::{Console, Executor, FramingConfig, Response};
use crate::parameter::Value;
use crate::table::{CommandTable, LineFormat, ReadingCache};
use eolt_core::{Clock, Transport};
use std::time::Duration;

/// Logical parameter names the product verbs rely on
pub mod names {
    /// Unlock token
    pub const UNLOCK: &str = "UNLOCK";
    /// Hardware version
    pub const HW_VERSION: &str = "HW_VERSION";
    /// Serial number string
    pub const SERIAL_ID: &str = "SERIAL_ID";
    /// Status word holding the test-mode bits
    pub const STATUS: &str = "STATUS";
    /// PFC bus voltage calibration entry
    pub const CAL_PFC: &str = "CAL_PFC";
    /// Output voltage set-point
    pub const SET_VOLTS: &str = "SET_VOLTS";
    /// Output current set-point
    pub const SET_CURRENT: &str = "SET_CURRENT";
    /// Output voltage PWM numerator
    pub const SET_VOLTS_MV_NUM: &str = "SET_VOLTS_MV_NUM";
    /// Current reading numerator
    pub const I_READ_NUM: &str = "I_READ_NUM";
    /// Over-current set-point numerator
    pub const OCP_NUM: &str = "OCP_NUM";
}

/// A command that prints many `key value` lines at once
#[derive(Debug, Clone)]
pub struct BulkCommand {
    /// Command to send
    pub command: String,
    /// Line format
    pub format: LineFormat,
    /// Fewest lines accepted
    pub min_lines: usize,
}

/// Keys of the `STAT`/`CAL?` snapshot used by the output calibrations
#[derive(Debug, Clone)]
pub struct CalKeys {
    /// Current PWM numerator
    pub pwm_num: String,
    /// PWM denominator, in millivolts
    pub mv_den: String,
    /// Current voltage set-point
    pub v_set: String,
    /// Current reading numerator
    pub i_num: String,
    /// Current reading
    pub i_read: String,
    /// Divisor turning the current reading into amps
    pub i_scale: f64,
    /// Current set-point
    pub i_set: String,
}

/// Everything that makes one product's console different from another's
#[derive(Debug, Clone)]
pub struct ProductProfile {
    /// Product name, for messages
    pub name: String,
    /// Framing settings
    pub framing: FramingConfig,
    /// Parameters
    pub table: CommandTable,
    /// Value written to [`names::UNLOCK`] to unlock protected verbs
    pub unlock_token: Option<Value>,
    /// Non-volatile commit command
    pub nv_write: String,
    /// Command restoring non-volatile defaults
    pub nv_defaults: Option<String>,
    /// Soft reset command
    pub reset: Option<String>,
    /// Status bit enabling hardware self-test signals
    pub test_mode_bit: Option<u32>,
    /// Status bit enabling CAN debug output
    pub can_test_mode_bit: Option<u32>,
    /// Status dump
    pub stat: Option<BulkCommand>,
    /// Calibration dump
    pub cal_query: Option<BulkCommand>,
    /// Snapshot keys for the output calibrations
    pub cal_keys: Option<CalKeys>,
}

impl ProductProfile {
    /// A profile with no verbs beyond reads and writes
    pub fn new(name: &str, framing: FramingConfig, table: CommandTable) -> Self {
        Self {
            name: name.to_string(),
            framing,
            table,
            unlock_token: None,
            nv_write: "NV-WRITE".to_string(),
            nv_defaults: None,
            reset: None,
            test_mode_bit: None,
            can_test_mode_bit: None,
            stat: None,
            cal_query: None,
            cal_keys: None,
        }
    }
}

/// Result of an output current calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentCal {
    /// New current reading numerator
    pub i_num: i64,
    /// New over-current numerator
    pub ocp_num: i64,
}

/// A product's firmware console
pub struct ProductConsole<T: Transport> {
    console: Console<T>,
    profile: ProductProfile,
    stat_data: ReadingCache,
    cal_data: ReadingCache,
}

impl<T: Transport> ProductConsole<T> {
    /// Wrap a transport
    pub fn new(transport: T, profile: ProductProfile) -> Self {
        let stat_format = profile
            .stat
            .as_ref()
            .map_or(LineFormat::KeyEquals, |b| b.format);
        let cal_format = profile
            .cal_query
            .as_ref()
            .map_or(LineFormat::KeySpace, |b| b.format);
        Self {
            console: Console::new(transport, profile.framing.clone()),
            profile,
            stat_data: ReadingCache::new(stat_format),
            cal_data: ReadingCache::new(cal_format),
        }
    }

    /// Use `clock` for every delay
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.console = self.console.with_clock(clock);
        self
    }

    /// Wait the post-open delay and drop stale input
    pub fn open(&mut self) -> Result<()> {
        self.console.open()
    }

    /// The framing layer
    pub fn console(&self) -> &Console<T> {
        &self.console
    }

    /// The framing layer, mutably
    pub fn console_mut(&mut self) -> &mut Console<T> {
        &mut self.console
    }

    /// The product profile
    pub fn profile(&self) -> &ProductProfile {
        &self.profile
    }

    /// Values from the last `STAT`
    pub fn stat_data(&self) -> &ReadingCache {
        &self.stat_data
    }

    /// Values from the last `CAL?`
    pub fn cal_data(&self) -> &ReadingCache {
        &self.cal_data
    }

    /// Consume the product console and return the transport
    pub fn into_transport(self) -> T {
        self.console.into_transport()
    }

    fn unsupported(&self, what: &str) -> ConsoleError {
        ConsoleError::Unsupported {
            product: self.profile.name.clone(),
            what: what.to_string(),
        }
    }

    /// Consume the product's banner lines
    pub fn banner(&mut self) -> Result<Vec<String>> {
        let n = self.profile.framing.banner_lines;
        self.console.banner(n)
    }

    /// Read a value by logical name
    ///
    /// The `STAT` snapshot is consulted first, then the `CAL?` snapshot,
    /// then the command table.
    pub fn read(&mut self, name: &str) -> Result<Value> {
        if let Some(raw) = self
            .stat_data
            .get(name)
            .or_else(|| self.cal_data.get(name))
        {
            return Ok(cached_value(raw));
        }
        let param = self.profile.table.lookup(name)?.clone();
        param.read(&mut self.console)
    }

    /// Write a value by logical name
    pub fn write(&mut self, name: &str, value: impl Into<Value>) -> Result<Response> {
        let param = self.profile.table.lookup(name)?.clone();
        param.write(&mut self.console, &value.into())
    }

    /// Write the unlock token, if the product has one
    pub fn unlock(&mut self) -> Result<()> {
        match self.profile.unlock_token.clone() {
            Some(token) => {
                self.write(names::UNLOCK, token)?;
                log::debug!("console: {} unlocked", self.profile.name);
            }
            None => log::debug!("console: {} has no unlock token", self.profile.name),
        }
        Ok(())
    }

    /// Commit RAM settings to non-volatile memory
    pub fn nv_write(&mut self) -> Result<()> {
        let cmd = self.profile.nv_write.clone();
        self.console.action(&cmd, 0, None)?;
        self.console.nv_pause();
        log::info!("console: {} settings committed", self.profile.name);
        Ok(())
    }

    /// Soft reset; returns what the firmware printed before the prompt
    pub fn reset(&mut self) -> Result<Vec<String>> {
        let cmd = self
            .profile
            .reset
            .clone()
            .ok_or_else(|| self.unsupported("reset"))?;
        self.stat_data.clear();
        self.cal_data.clear();
        Ok(self.console.action(&cmd, 0, None)?.into_lines())
    }

    /// Give the unit its identity
    ///
    /// Resets, unlocks, writes the hardware version (as
    /// `major minor revision`) and serial string, restores NV defaults and
    /// commits.
    pub fn brand(&mut self, hw_version: (u32, u32, u32), serial: &str) -> Result<()> {
        if self.profile.reset.is_some() {
            self.reset()?;
        }
        self.unlock()?;

        let (major, minor, revision) = hw_version;
        self.write(
            names::HW_VERSION,
            format!("{} {} {}", major, minor, revision),
        )?;
        self.console.nv_pause();
        self.write(names::SERIAL_ID, serial)?;
        self.console.nv_pause();

        if let Some(cmd) = self.profile.nv_defaults.clone() {
            self.console.action(&cmd, 0, None)?;
            self.console.nv_pause();
        }
        self.nv_write()?;
        log::info!(
            "console: Branded {} as {} (hardware {}.{}.{})",
            self.profile.name,
            serial,
            major,
            minor,
            revision
        );
        Ok(())
    }

    /// Brand, then apply first-time settings and commit again
    pub fn initialise(
        &mut self,
        hw_version: (u32, u32, u32),
        serial: &str,
        settings: &[(&str, Value)],
    ) -> Result<()> {
        self.brand(hw_version, serial)?;
        if settings.is_empty() {
            return Ok(());
        }
        for (name, value) in settings {
            self.write(name, value.clone())?;
        }
        self.nv_write()
    }

    fn status_word(&mut self) -> Result<u32> {
        match self.read(names::STATUS)? {
            Value::Hex(v) => Ok(v),
            other => other
                .as_i64()
                .map(|v| v as u32)
                .ok_or_else(|| ConsoleError::parameter(names::STATUS, format!("{} is not a status word", other))),
        }
    }

    fn set_status_bit(&mut self, bit: u32, on: bool) -> Result<u32> {
        let old = self.status_word()?;
        let new = if on { old | (1 << bit) } else { old & !(1 << bit) };
        self.write(names::STATUS, Value::Hex(new))?;
        Ok(old)
    }

    /// Set or clear the hardware self-test bit
    pub fn test_mode(&mut self, on: bool) -> Result<()> {
        let bit = self
            .profile
            .test_mode_bit
            .ok_or_else(|| self.unsupported("test mode"))?;
        self.set_status_bit(bit, on)?;
        log::info!("console: Test mode {}", if on { "on" } else { "off" });
        Ok(())
    }

    /// Enable CAN debug output
    ///
    /// The firmware then prints unsolicited lines, so commands can no
    /// longer be paired with replies. The console is handed over to a
    /// [`StreamingConsole`] until [`StreamingConsole::leave`] is called.
    ///
    /// On failure the console comes back inside the error, still in
    /// request/response mode.
    pub fn can_test_mode(mut self) -> std::result::Result<StreamingConsole<T>, Reclaim<Self>> {
        match self.enable_can_test_mode() {
            Ok((bit, status)) => {
                log::info!("console: CAN test mode on, console is streaming");
                Ok(StreamingConsole {
                    inner: self,
                    status: status & !(1 << bit),
                })
            }
            Err(error) => {
                log::warn!("console: CAN test mode not entered: {}", error);
                Err(Reclaim {
                    console: self,
                    error,
                })
            }
        }
    }

    fn enable_can_test_mode(&mut self) -> Result<(u32, u32)> {
        let bit = self
            .profile
            .can_test_mode_bit
            .ok_or_else(|| self.unsupported("CAN test mode"))?;
        let status = self.set_status_bit(bit, true)?;
        Ok((bit, status))
    }

    fn bulk(&mut self, which: Bulk) -> Result<usize> {
        let command = match which {
            Bulk::Stat => self.profile.stat.clone(),
            Bulk::Cal => self.profile.cal_query.clone(),
        }
        .ok_or_else(|| self.unsupported(which.name()))?;

        let cache = match which {
            Bulk::Stat => &mut self.stat_data,
            Bulk::Cal => &mut self.cal_data,
        };
        cache.clear();

        let lines = self
            .console
            .action(&command.command, command.min_lines, None)?
            .into_lines();
        let cache = match which {
            Bulk::Stat => &mut self.stat_data,
            Bulk::Cal => &mut self.cal_data,
        };
        let n = cache.load(&lines);
        if n < command.min_lines {
            return Err(ConsoleError::Response {
                command: command.command,
                reason: format!("{} of {} lines matched", n, lines.len()),
            });
        }
        log::debug!("console: {} captured {} values", which.name(), n);
        Ok(n)
    }

    /// Refresh the `STAT` snapshot; returns the number of values
    pub fn stat(&mut self) -> Result<usize> {
        self.bulk(Bulk::Stat)
    }

    /// Refresh the `CAL?` snapshot; returns the number of values
    pub fn cal_query(&mut self) -> Result<usize> {
        self.bulk(Bulk::Cal)
    }

    fn cached_f64(&self, key: &str) -> Result<f64> {
        self.stat_data
            .get_f64(key)
            .or_else(|| self.cal_data.get_f64(key))
            .ok_or_else(|| ConsoleError::parameter(key, "not in the STAT or CAL? snapshot"))
    }

    fn cal_keys(&self) -> Result<CalKeys> {
        self.profile
            .cal_keys
            .clone()
            .ok_or_else(|| self.unsupported("output calibration"))
    }

    /// Write the measured PFC bus voltage without committing
    pub fn write_pfc(&mut self, volts: f64) -> Result<()> {
        let reply = self.write(names::CAL_PFC, volts)?;
        match reply.first() {
            Some(line) if line.trim() != "0" => Err(ConsoleError::Response {
                command: names::CAL_PFC.to_string(),
                reason: format!("unit answered {:?}", line),
            }),
            _ => Ok(()),
        }
    }

    /// Write the measured PFC bus voltage and commit
    pub fn cal_pfc(&mut self, volts: f64) -> Result<()> {
        self.write_pfc(volts)?;
        self.nv_write()?;
        log::info!("console: PFC calibrated at {} V", volts);
        Ok(())
    }

    /// Recompute the output voltage PWM numerator from a measurement
    ///
    /// `new = round(pwm_old * mv_den / (v_meas * 1000))`. The numerator is
    /// committed and the voltage set-point written again so it takes effect.
    pub fn cal_vout(&mut self, v_meas: f64) -> Result<i64> {
        if v_meas <= 0.0 || !v_meas.is_finite() {
            return Err(ConsoleError::OutOfRange {
                name: "measured output voltage".into(),
                value: v_meas,
                min: 0.0,
                max: f64::INFINITY,
            });
        }
        let keys = self.cal_keys()?;
        self.stat()?;
        self.cal_query()?;

        let pwm_old = self.cached_f64(&keys.pwm_num)?;
        let mv_den = self.cached_f64(&keys.mv_den)?;
        let v_set = self.cached_f64(&keys.v_set)?;
        let new = ((pwm_old * mv_den) / (v_meas * 1000.0)).round() as i64;
        log::info!(
            "console: Vout numerator {} -> {} (measured {} V)",
            pwm_old,
            new,
            v_meas
        );

        self.write(names::SET_VOLTS_MV_NUM, Value::Int(new))?;
        self.nv_write()?;
        self.write(names::SET_VOLTS, v_set)?;
        Ok(new)
    }

    /// Recompute the current reading and over-current numerators
    ///
    /// Uses the last `STAT`/`CAL?` snapshots (taken now if there are none):
    /// `i_num = round(i_num_old * i_meas / i_read)` and
    /// `ocp_num = round(i_num * ocp_factor)`.
    pub fn cal_iout(&mut self, i_meas: f64, ocp_factor: f64) -> Result<CurrentCal> {
        let keys = self.cal_keys()?;
        if self.stat_data.is_empty() {
            self.stat()?;
        }
        if self.cal_data.is_empty() {
            self.cal_query()?;
        }

        let old = self.cached_f64(&keys.i_num)?;
        let i_read = self.cached_f64(&keys.i_read)? / keys.i_scale;
        let i_set = self.cached_f64(&keys.i_set)?;
        if i_read == 0.0 {
            return Err(ConsoleError::OutOfRange {
                name: keys.i_read,
                value: 0.0,
                min: f64::MIN_POSITIVE,
                max: f64::INFINITY,
            });
        }

        let i_num = (old * i_meas / i_read).round() as i64;
        let ocp_num = (i_num as f64 * ocp_factor).round() as i64;
        log::info!(
            "console: Iout numerator {} -> {}, OCP numerator {} (measured {} A, read {} A)",
            old,
            i_num,
            ocp_num,
            i_meas,
            i_read
        );

        self.write(names::I_READ_NUM, Value::Int(i_num))?;
        self.write(names::OCP_NUM, Value::Int(ocp_num))?;
        self.nv_write()?;
        self.write(names::SET_CURRENT, i_set)?;
        Ok(CurrentCal { i_num, ocp_num })
    }
}

impl<T: Transport> Executor for ProductConsole<T> {
    fn action(&mut self, cmd: &str, expected: usize, delay: Option<Duration>) -> Result<Response> {
        self.console.action(cmd, expected, delay)
    }
}

#[derive(Debug, Clone, Copy)]
enum Bulk {
    Stat,
    Cal,
}

impl Bulk {
    fn name(self) -> &'static str {
        match self {
            Bulk::Stat => "STAT",
            Bulk::Cal => "CAL?",
        }
    }
}

fn cached_value(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        Value::Float(f)
    } else {
        Value::Text(raw.to_string())
    }
}

/// A console in CAN test mode: lines only, no commands
pub struct StreamingConsole<T: Transport> {
    inner: ProductConsole<T>,
    status: u32,
}

impl<T: Transport> StreamingConsole<T> {
    /// Next unsolicited line, `None` if nothing arrived before the timeout
    pub fn read_line(&mut self) -> Result<Option<String>> {
        match self.inner.console.transport_mut().read_line() {
            Ok(line) => Ok(Some(line)),
            Err(e) if e.is_timeout() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Clear the CAN test bit and return to request/response operation
    ///
    /// The clearing write is sent blind, since its echo is interleaved
    /// with debug output; pending input is discarded afterwards.
    ///
    /// If the write cannot be sent the streaming console comes back inside
    /// the error.
    pub fn leave(mut self) -> std::result::Result<ProductConsole<T>, Reclaim<Self>> {
        match self.clear_can_test_mode() {
            Ok(()) => {
                log::info!("console: CAN test mode off");
                Ok(self.inner)
            }
            Err(error) => Err(Reclaim {
                console: self,
                error,
            }),
        }
    }

    fn clear_can_test_mode(&mut self) -> Result<()> {
        let param = self.inner.profile.table.lookup(names::STATUS)?.clone();
        let cmd = param.write_command(&Value::Hex(self.status))?;
        self.inner
            .console
            .transport_mut()
            .write(format!("{}\r", cmd).as_bytes())?;
        self.inner.console.nv_pause();
        self.inner.console.transport_mut().reset_input_buffer()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::Parameter;
    use eolt_core::SimTransport;

    fn profile() -> ProductProfile {
        let table = CommandTable::new()
            .with(names::UNLOCK, Parameter::string("UNLOCK").write_only())
            .with(names::HW_VERSION, Parameter::string("HW-VERSION"))
            .with(names::SERIAL_ID, Parameter::string("SERIAL"))
            .with(names::STATUS, Parameter::hex_prefixed(names::STATUS, 0xFFFF_FFFF))
            .with(
                names::CAL_PFC,
                Parameter::calibration(names::CAL_PFC, None)
                    .write_format("{verb} {value}")
                    .write_expect(1),
            )
            .with(names::SET_VOLTS, Parameter::float("SET-VOLTS", 1000.0))
            .with(names::SET_CURRENT, Parameter::float("SET-CURRENT", 1000.0))
            .with(names::SET_VOLTS_MV_NUM, Parameter::integer("SET-VOLTS-MV-NUM"))
            .with(names::I_READ_NUM, Parameter::integer("I-READ-NUM"))
            .with(names::OCP_NUM, Parameter::integer("OCP-NUM"));

        ProductProfile {
            unlock_token: Some(Value::from("C0DE")),
            reset: Some("RESET".into()),
            nv_defaults: Some("NV-DEFAULTS".into()),
            test_mode_bit: Some(31),
            can_test_mode_bit: Some(29),
            stat: Some(BulkCommand {
                command: "STAT".into(),
                format: LineFormat::KeyEquals,
                min_lines: 2,
            }),
            cal_query: Some(BulkCommand {
                command: "CAL?".into(),
                format: LineFormat::KeySpace,
                min_lines: 2,
            }),
            cal_keys: Some(CalKeys {
                pwm_num: "SET_VOLTS_MV_NUM".into(),
                mv_den: "SET_VOLTS_MV_DEN".into(),
                v_set: "VSET".into(),
                i_num: "I_READ_NUM".into(),
                i_read: "IOUT".into(),
                i_scale: 1000.0,
                i_set: "ISET".into(),
            }),
            ..ProductProfile::new("test", FramingConfig::default(), table)
        }
    }

    fn unit() -> ProductConsole<SimTransport> {
        ProductConsole::new(SimTransport::new("sim"), profile())
    }

    fn queue(c: &mut ProductConsole<SimTransport>, cmd: &str, payload: &str) {
        c.console_mut()
            .transport_mut()
            .push(format!("{}{}\r> ", cmd, payload).as_bytes());
    }

    fn written(c: &mut ProductConsole<SimTransport>) -> String {
        String::from_utf8(c.console_mut().transport_mut().take_written()).unwrap()
    }

    #[test]
    fn test_brand_sequence() {
        let mut c = unit();
        queue(&mut c, "RESET", "\rModel T\rv1.0");
        queue(&mut c, "C0DE UNLOCK!", "");
        queue(&mut c, "1 2 3 HW-VERSION!", "");
        queue(&mut c, "A1509020010 SERIAL!", "");
        queue(&mut c, "NV-DEFAULTS", "");
        queue(&mut c, "NV-WRITE", "");

        c.brand((1, 2, 3), "A1509020010").unwrap();
        assert_eq!(
            written(&mut c),
            "RESET\rC0DE UNLOCK!\r1 2 3 HW-VERSION!\rA1509020010 SERIAL!\rNV-DEFAULTS\rNV-WRITE\r"
        );
    }

    #[test]
    fn test_test_mode_sets_bit_31() {
        let mut c = unit();
        queue(&mut c, "STATUS?", " -> 0x00000004");
        queue(&mut c, "0x80000004 STATUS!", "");
        c.test_mode(true).unwrap();
        assert!(written(&mut c).ends_with("0x80000004 STATUS!\r"));
    }

    #[test]
    fn test_stat_and_cal_caches_take_precedence() {
        let mut c = unit();
        queue(&mut c, "STAT", "\rVSET=13800\rIOUT=2000\rjunk");
        assert_eq!(c.stat().unwrap(), 2);
        queue(&mut c, "CAL?", "\rI_READ_NUM 1000\rSET_VOLTS_MV_NUM 52000");
        assert_eq!(c.cal_query().unwrap(), 2);

        assert_eq!(c.read("VSET").unwrap(), Value::Int(13800));
        assert_eq!(c.read("SET_VOLTS_MV_NUM").unwrap(), Value::Int(52000));
        // No traffic: both answers came from the snapshots
        written(&mut c);
        assert_eq!(c.read("I_READ_NUM").unwrap(), Value::Int(1000));
        assert!(written(&mut c).is_empty());
    }

    #[test]
    fn test_stat_too_few_lines() {
        let mut c = unit();
        queue(&mut c, "STAT", "\rVSET=13800\rjunk");
        assert!(matches!(c.stat(), Err(ConsoleError::Response { .. })));
    }

    #[test]
    fn test_cal_pfc() {
        let mut c = unit();
        queue(&mut c, "CAL_PFC 430.02", " -> 0");
        queue(&mut c, "NV-WRITE", "");
        c.cal_pfc(430.02).unwrap();

        let mut c = unit();
        queue(&mut c, "CAL_PFC 430.02", " -> 9");
        assert!(matches!(c.cal_pfc(430.02), Err(ConsoleError::Response { .. })));
    }

    #[test]
    fn test_cal_vout() {
        let mut c = unit();
        queue(&mut c, "STAT", "\rVSET=13.8\rIOUT=2000");
        queue(&mut c, "CAL?", "\rSET_VOLTS_MV_NUM 52000\rSET_VOLTS_MV_DEN 13800");
        // 52000 * 13800 / 13900 = 51625.9
        queue(&mut c, "51626 SET-VOLTS-MV-NUM!", "");
        queue(&mut c, "NV-WRITE", "");
        queue(&mut c, "13800 SET-VOLTS!", "");

        assert_eq!(c.cal_vout(13.9).unwrap(), 51626);
        assert!(written(&mut c).ends_with("51626 SET-VOLTS-MV-NUM!\rNV-WRITE\r13800 SET-VOLTS!\r"));
    }

    #[test]
    fn test_cal_iout() {
        let mut c = unit();
        queue(&mut c, "STAT", "\rISET=5\rIOUT=2000");
        queue(&mut c, "CAL?", "\rI_READ_NUM 1000\rOCP_NUM 1200");
        c.stat().unwrap();
        c.cal_query().unwrap();

        queue(&mut c, "1050 I-READ-NUM!", "");
        queue(&mut c, "1155 OCP-NUM!", "");
        queue(&mut c, "NV-WRITE", "");
        queue(&mut c, "5000 SET-CURRENT!", "");
        let cal = c.cal_iout(2.1, 1.1).unwrap();
        assert_eq!(cal, CurrentCal { i_num: 1050, ocp_num: 1155 });
    }

    #[test]
    fn test_can_test_mode_is_a_state() {
        let mut c = unit();
        queue(&mut c, "STATUS?", " -> 0x00000004");
        queue(&mut c, "0x20000004 STATUS!", "");
        let mut streaming = c.can_test_mode().unwrap();
        streaming
            .inner
            .console
            .transport_mut()
            .push(b"CAN 123#01\r\nCAN 124#02\r\n");
        assert_eq!(streaming.read_line().unwrap().as_deref(), Some("CAN 123#01"));
        assert_eq!(streaming.read_line().unwrap().as_deref(), Some("CAN 124#02"));
        assert_eq!(streaming.read_line().unwrap(), None);

        let mut c = streaming.leave().unwrap();
        assert!(written(&mut c).ends_with("0x4 STATUS!\r"));
    }

    #[test]
    fn test_can_test_mode_failure_returns_console() {
        let mut c = unit();
        queue(&mut c, "STATUS?", " -> 0x00000004");
        // No echo for the status write
        let (mut c, error) = match c.can_test_mode() {
            Ok(_) => panic!("CAN test mode entered without a status write"),
            Err(r) => r.into_parts(),
        };
        assert!(matches!(error, ConsoleError::Command { .. }));

        queue(&mut c, "STATUS?", " -> 0x00000004");
        assert_eq!(c.read(names::STATUS).unwrap(), Value::Hex(4));
    }

    #[test]
    fn test_unsupported_verbs() {
        let mut c = ProductConsole::new(
            SimTransport::new("sim"),
            ProductProfile::new("bare", FramingConfig::default(), CommandTable::new()),
        );
        assert!(matches!(c.test_mode(true), Err(ConsoleError::Unsupported { .. })));
        assert!(matches!(c.stat(), Err(ConsoleError::Unsupported { .. })));
        assert!(matches!(c.read("X"), Err(ConsoleError::UnknownParameter(_))));
    }
}
