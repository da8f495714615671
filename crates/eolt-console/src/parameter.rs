//! Typed firmware parameters
//!
//! A [`Parameter`] describes one firmware variable reachable through the
//! console: the verb, how to format a read or a write, and how to coerce
//! the reply. Formats use `{verb}` and `{value}` placeholders.
//!
//! Limits, masks and the writeable flag are checked before anything is
//! sent, so a bad write never reaches the unit.

use crate::error::{ConsoleError, Result};
use crate::framing::{Executor, Response};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Default read format
pub const DEFAULT_READ_FORMAT: &str = "{verb}?";
/// Default write format
pub const DEFAULT_WRITE_FORMAT: &str = "{value} {verb}!";
/// Default write format of calibration parameters
pub const DEFAULT_CAL_FORMAT: &str = "{value} {verb} CAL";

/// Forced state of an output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum OverrideState {
    /// Firmware controls the output
    Normal = 0,
    /// Output forced on
    ForceOn = 1,
    /// Output forced off
    ForceOff = 2,
}

impl OverrideState {
    fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(OverrideState::Normal),
            1 => Some(OverrideState::ForceOn),
            2 => Some(OverrideState::ForceOff),
            _ => None,
        }
    }
}

/// A value read from or written to a parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean flag
    Bool(bool),
    /// Integer
    Int(i64),
    /// Scaled fixed-point or real value
    Float(f64),
    /// Masked register value
    Hex(u32),
    /// Free text
    Text(String),
    /// Override enumerant
    Override(OverrideState),
    /// No value
    None,
}

impl Value {
    /// Numeric view of the value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(*b as u8 as f64),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Hex(h) => Some(*h as f64),
            Value::Override(o) => Some(*o as u8 as f64),
            Value::Text(t) => t.trim().parse().ok(),
            Value::None => None,
        }
    }

    /// Integer view of the value, rounding reals
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Hex(h) => Some(*h as i64),
            Value::Text(t) => {
                let t = t.trim();
                match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
                    Some(hex) => i64::from_str_radix(hex, 16).ok(),
                    None => t.parse().ok(),
                }
            }
            other => other.as_f64().map(|f| f.round() as i64),
        }
    }

    /// Boolean view of the value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(0) => Some(false),
            Value::Int(1) => Some(true),
            Value::Text(t) => match t.trim().to_ascii_lowercase().as_str() {
                "0" | "false" | "off" => Some(false),
                "1" | "true" | "on" => Some(true),
                _ => None,
            },
            _ => None,
        }
    }

    /// Text view of the value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(t) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", *b as u8),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Hex(h) => write!(f, "0x{:X}", h),
            Value::Text(t) => write!(f, "{}", t),
            Value::Override(o) => write!(f, "{:?}", o),
            Value::None => write!(f, "None"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<OverrideState> for Value {
    fn from(v: OverrideState) -> Self {
        Value::Override(v)
    }
}

type RawHandler = dyn Fn(&mut dyn Executor, Option<&Value>) -> Result<Value> + Send + Sync;

/// Caller-supplied handler behind a raw parameter
///
/// Called with `None` for a read and `Some(value)` for a write.
#[derive(Clone)]
pub struct RawFn(Arc<RawHandler>);

impl RawFn {
    /// Wrap a handler
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut dyn Executor, Option<&Value>) -> Result<Value> + Send + Sync + 'static,
    {
        RawFn(Arc::new(f))
    }
}

impl fmt::Debug for RawFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawFn")
    }
}

/// Type and constraints of a parameter
#[derive(Debug, Clone, Deserialize)]
pub enum Kind {
    /// `0` is false, any positive integer is true
    Boolean,
    /// Text returned as-is after trimming
    String,
    /// Integer with optional limits
    Integer {
        /// Lower limit
        #[serde(default)]
        min: Option<f64>,
        /// Upper limit
        #[serde(default)]
        max: Option<f64>,
    },
    /// Fixed-point integer on the wire, divided by `scale` on read
    Float {
        /// Wire units per value unit
        scale: f64,
        /// Lower limit
        #[serde(default)]
        min: Option<f64>,
        /// Upper limit
        #[serde(default)]
        max: Option<f64>,
    },
    /// Hexadecimal register, masked on read and write
    Hex {
        /// Valid bits
        mask: u32,
        /// Whether the wire form carries `0x`
        #[serde(default)]
        prefix: bool,
    },
    /// Write-only calibration entry; real-valued unless `scale` is given
    Calibration {
        /// Wire units per value unit
        #[serde(default)]
        scale: Option<f64>,
        /// Lower limit
        #[serde(default)]
        min: Option<f64>,
        /// Upper limit
        #[serde(default)]
        max: Option<f64>,
    },
    /// Write-only override enumerant
    Override,
    /// Read-only raw CAN data
    Can,
    /// Delegates to a handler
    #[serde(skip)]
    Raw(RawFn),
}

fn yes() -> bool {
    true
}

fn one() -> usize {
    1
}

/// A firmware variable exposed through the console
#[derive(Debug, Clone, Deserialize)]
pub struct Parameter {
    /// Console verb
    pub verb: String,
    /// Type and constraints
    pub kind: Kind,
    /// Whether reads are allowed
    #[serde(default = "yes")]
    pub readable: bool,
    /// Whether writes are allowed
    #[serde(default = "yes")]
    pub writeable: bool,
    /// Read command format
    #[serde(default)]
    pub read_format: Option<String>,
    /// Write command format
    #[serde(default)]
    pub write_format: Option<String>,
    /// Lines expected in reply to a read
    #[serde(default = "one")]
    pub read_expected: usize,
    /// Lines expected in reply to a write
    #[serde(default)]
    pub write_expected: usize,
}

impl Parameter {
    fn with_kind(verb: &str, kind: Kind) -> Self {
        Self {
            verb: verb.to_string(),
            kind,
            readable: true,
            writeable: true,
            read_format: None,
            write_format: None,
            read_expected: 1,
            write_expected: 0,
        }
    }

    /// Boolean parameter
    pub fn boolean(verb: &str) -> Self {
        Self::with_kind(verb, Kind::Boolean)
    }

    /// Text parameter
    pub fn string(verb: &str) -> Self {
        Self::with_kind(verb, Kind::String)
    }

    /// Integer parameter
    pub fn integer(verb: &str) -> Self {
        Self::with_kind(verb, Kind::Integer { min: None, max: None })
    }

    /// Fixed-point parameter
    pub fn float(verb: &str, scale: f64) -> Self {
        Self::with_kind(
            verb,
            Kind::Float {
                scale,
                min: None,
                max: None,
            },
        )
    }

    /// Hex register without `0x` on the wire
    pub fn hex(verb: &str, mask: u32) -> Self {
        Self::with_kind(verb, Kind::Hex { mask, prefix: false })
    }

    /// Hex register with `0x` on the wire
    pub fn hex_prefixed(verb: &str, mask: u32) -> Self {
        Self::with_kind(verb, Kind::Hex { mask, prefix: true })
    }

    /// Write-only calibration entry, `value verb CAL`
    pub fn calibration(verb: &str, scale: Option<f64>) -> Self {
        Self {
            readable: false,
            ..Self::with_kind(
                verb,
                Kind::Calibration {
                    scale,
                    min: None,
                    max: None,
                },
            )
        }
    }

    /// Write-only override
    pub fn override_(verb: &str) -> Self {
        Self {
            readable: false,
            ..Self::with_kind(verb, Kind::Override)
        }
    }

    /// Read-only CAN data
    pub fn can(verb: &str) -> Self {
        Self {
            writeable: false,
            ..Self::with_kind(verb, Kind::Can)
        }
    }

    /// Parameter implemented by a handler
    pub fn raw(name: &str, f: RawFn) -> Self {
        Self::with_kind(name, Kind::Raw(f))
    }

    /// Forbid writes
    pub fn read_only(mut self) -> Self {
        self.writeable = false;
        self
    }

    /// Forbid reads
    pub fn write_only(mut self) -> Self {
        self.readable = false;
        self
    }

    /// Set numeric limits
    pub fn range(mut self, lo: f64, hi: f64) -> Self {
        match &mut self.kind {
            Kind::Integer { min, max }
            | Kind::Float { min, max, .. }
            | Kind::Calibration { min, max, .. } => {
                *min = Some(lo);
                *max = Some(hi);
            }
            _ => {}
        }
        self
    }

    /// Set the read format
    pub fn read_format(mut self, format: &str) -> Self {
        self.read_format = Some(format.to_string());
        self
    }

    /// Set the write format
    pub fn write_format(mut self, format: &str) -> Self {
        self.write_format = Some(format.to_string());
        self
    }

    /// Lines expected in reply to a read
    pub fn expect(mut self, n: usize) -> Self {
        self.read_expected = n;
        self
    }

    /// Lines expected in reply to a write
    pub fn write_expect(mut self, n: usize) -> Self {
        self.write_expected = n;
        self
    }

    fn format(template: &str, verb: &str, value: &str) -> String {
        template.replace("{verb}", verb).replace("{value}", value)
    }

    /// The command a read sends
    pub fn read_command(&self) -> String {
        let template = self.read_format.as_deref().unwrap_or(DEFAULT_READ_FORMAT);
        Self::format(template, &self.verb, "")
    }

    /// Read and coerce the parameter
    pub fn read(&self, console: &mut dyn Executor) -> Result<Value> {
        if !self.readable {
            return Err(ConsoleError::WriteOnly(self.verb.clone()));
        }
        if let Kind::Raw(f) = &self.kind {
            return (f.0)(console, None);
        }

        let cmd = self.read_command();
        let response = console.action(&cmd, self.read_expected, None)?;
        self.coerce(response)
    }

    fn coerce(&self, response: Response) -> Result<Value> {
        let reply = response.first().map(str::trim);
        let numeric = |text: Option<&str>| -> Result<i64> {
            match text {
                None | Some("") => Ok(0),
                Some(t) => t
                    .parse()
                    .map_err(|_| ConsoleError::parameter(&self.verb, format!("{:?} is not an integer", t))),
            }
        };

        match &self.kind {
            Kind::Boolean => match reply.and_then(|r| r.parse::<u64>().ok()) {
                Some(0) => Ok(Value::Bool(false)),
                Some(_) => Ok(Value::Bool(true)),
                None => Err(ConsoleError::parameter(
                    &self.verb,
                    format!("{:?} is not a boolean", reply),
                )),
            },
            Kind::String => Ok(Value::Text(reply.unwrap_or("").to_string())),
            Kind::Integer { .. } => Ok(Value::Int(numeric(reply)?)),
            Kind::Float { scale, .. } => Ok(Value::Float(numeric(reply)? as f64 / scale)),
            Kind::Hex { mask, .. } => {
                let text = reply.unwrap_or("0");
                let digits = text
                    .strip_prefix("0x")
                    .or_else(|| text.strip_prefix("0X"))
                    .unwrap_or(text);
                let v = u32::from_str_radix(digits, 16).map_err(|_| {
                    ConsoleError::parameter(&self.verb, format!("{:?} is not hex", text))
                })?;
                Ok(Value::Hex(v & mask))
            }
            Kind::Can => Ok(Value::Text(response.into_lines().join("\n"))),
            Kind::Calibration { .. } | Kind::Override => {
                Err(ConsoleError::WriteOnly(self.verb.clone()))
            }
            Kind::Raw(_) => Err(ConsoleError::parameter(
                &self.verb,
                "raw parameter has no wire form",
            )),
        }
    }

    fn check_range(&self, value: f64, min: Option<f64>, max: Option<f64>) -> Result<()> {
        let lo = min.unwrap_or(f64::NEG_INFINITY);
        let hi = max.unwrap_or(f64::INFINITY);
        if value < lo || value > hi || value.is_nan() {
            return Err(ConsoleError::OutOfRange {
                name: self.verb.clone(),
                value,
                min: lo,
                max: hi,
            });
        }
        Ok(())
    }

    fn number(&self, value: &Value) -> Result<f64> {
        value.as_f64().ok_or_else(|| {
            ConsoleError::parameter(&self.verb, format!("{} is not a number", value))
        })
    }

    /// Format the wire form of a value, validating it first
    pub fn encode(&self, value: &Value) -> Result<String> {
        if !self.writeable {
            return Err(ConsoleError::ReadOnly(self.verb.clone()));
        }

        match &self.kind {
            Kind::Boolean => value
                .as_bool()
                .map(|b| (b as u8).to_string())
                .ok_or_else(|| ConsoleError::parameter(&self.verb, format!("{} is not a boolean", value))),
            Kind::String => Ok(value.to_string()),
            Kind::Integer { min, max } => {
                let v = self.number(value)?;
                self.check_range(v, *min, *max)?;
                Ok((v.round() as i64).to_string())
            }
            Kind::Float { scale, min, max } => {
                let v = self.number(value)?;
                self.check_range(v, *min, *max)?;
                Ok(((v * scale).round() as i64).to_string())
            }
            Kind::Hex { mask, prefix } => {
                let v = value.as_i64().filter(|v| *v >= 0 && *v <= u32::MAX as i64).ok_or_else(|| {
                    ConsoleError::parameter(&self.verb, format!("{} is not a register value", value))
                })? as u32;
                if v & !mask != 0 {
                    return Err(ConsoleError::OutOfRange {
                        name: self.verb.clone(),
                        value: v as f64,
                        min: 0.0,
                        max: *mask as f64,
                    });
                }
                Ok(if *prefix {
                    format!("0x{:X}", v)
                } else {
                    format!("{:X}", v)
                })
            }
            Kind::Calibration { scale, min, max } => {
                let v = self.number(value)?;
                self.check_range(v, *min, *max)?;
                Ok(match scale {
                    Some(s) => ((v * s).round() as i64).to_string(),
                    None => v.to_string(),
                })
            }
            Kind::Override => {
                let state = match value {
                    Value::Override(o) => Some(*o),
                    other => other.as_i64().and_then(OverrideState::from_code),
                };
                state
                    .map(|s| (s as u8).to_string())
                    .ok_or_else(|| ConsoleError::parameter(&self.verb, format!("{} is not an override state", value)))
            }
            Kind::Can => Err(ConsoleError::ReadOnly(self.verb.clone())),
            Kind::Raw(_) => Ok(value.to_string()),
        }
    }

    /// The command a write of `value` sends
    pub fn write_command(&self, value: &Value) -> Result<String> {
        let wire = self.encode(value)?;
        let template = match (&self.write_format, &self.kind) {
            (Some(format), _) => format.as_str(),
            (None, Kind::Calibration { .. }) => DEFAULT_CAL_FORMAT,
            (None, _) => DEFAULT_WRITE_FORMAT,
        };
        Ok(Self::format(template, &self.verb, &wire))
    }

    /// Validate, format and send a write
    pub fn write(&self, console: &mut dyn Executor, value: &Value) -> Result<Response> {
        if let Kind::Raw(f) = &self.kind {
            if !self.writeable {
                return Err(ConsoleError::ReadOnly(self.verb.clone()));
            }
            return (f.0)(console, Some(value)).map(|_| Response::None);
        }
        let cmd = self.write_command(value)?;
        console.action(&cmd, self.write_expected, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{Console, FramingConfig};
    use eolt_core::SimTransport;

    fn console() -> Console<SimTransport> {
        Console::new(
            SimTransport::new("sim"),
            FramingConfig {
                ignore: vec!["mV".into(), " ".into()],
                ..Default::default()
            },
        )
    }

    fn reply(c: &mut Console<SimTransport>, cmd: &str, payload: &str) {
        c.transport_mut()
            .push(format!("{}{}\r> ", cmd, payload).as_bytes());
    }

    #[test]
    fn test_float_read_with_ignores() {
        let p = Parameter::float("X-BATTERY-VOLTS", 1000.0).read_format("\"{verb} XN?");
        let mut c = console();
        reply(&mut c, "\"X-BATTERY-VOLTS XN?", " 12000 mV");
        assert_eq!(p.read(&mut c).unwrap(), Value::Float(12.0));
    }

    #[test]
    fn test_float_missing_reply_is_zero() {
        let p = Parameter::float("I", 100.0).expect(0);
        let mut c = console();
        reply(&mut c, "I?", "");
        assert_eq!(p.read(&mut c).unwrap(), Value::Float(0.0));
    }

    #[test]
    fn test_boolean_round_trip() {
        let p = Parameter::boolean("FAN");
        let mut c = console();

        reply(&mut c, "1 FAN!", "");
        p.write(&mut c, &Value::Bool(true)).unwrap();
        reply(&mut c, "FAN?", " -> 1");
        assert_eq!(p.read(&mut c).unwrap(), Value::Bool(true));

        reply(&mut c, "0 FAN!", "");
        p.write(&mut c, &Value::Bool(false)).unwrap();
        reply(&mut c, "FAN?", " -> 0");
        assert_eq!(p.read(&mut c).unwrap(), Value::Bool(false));

        assert_eq!(c.transport().written(), b"1 FAN!\rFAN?\r0 FAN!\rFAN?\r");
    }

    #[test]
    fn test_boolean_rejects_garbage() {
        let p = Parameter::boolean("FAN");
        let mut c = console();
        reply(&mut c, "FAN?", " -> on");
        assert!(matches!(p.read(&mut c), Err(ConsoleError::Parameter { .. })));
    }

    #[test]
    fn test_hex_mask_and_prefix() {
        let p = Parameter::hex("STATUS", 0x00FF);
        let mut c = console();
        reply(&mut c, "STATUS?", " -> 1234");
        assert_eq!(p.read(&mut c).unwrap(), Value::Hex(0x34));

        let p = Parameter::hex_prefixed("FLAGS", 0xFFFF_FFFF);
        reply(&mut c, "FLAGS?", " -> 0x8000000A");
        assert_eq!(p.read(&mut c).unwrap(), Value::Hex(0x8000_000A));
        assert_eq!(
            p.write_command(&Value::Hex(0x8000_0000)).unwrap(),
            "0x80000000 FLAGS!"
        );
    }

    #[test]
    fn test_text_values_from_the_command_line() {
        let fan = Parameter::boolean("FAN");
        assert_eq!(fan.write_command(&Value::from("1")).unwrap(), "1 FAN!");
        assert_eq!(fan.write_command(&Value::from("off")).unwrap(), "0 FAN!");
        assert_eq!(fan.write_command(&Value::from(" True ")).unwrap(), "1 FAN!");
        assert!(matches!(
            fan.write_command(&Value::from("2")),
            Err(ConsoleError::Parameter { .. })
        ));

        let flags = Parameter::hex_prefixed("FLAGS", 0xFFFF);
        assert_eq!(flags.write_command(&Value::from("0x80")).unwrap(), "0x80 FLAGS!");
        assert_eq!(flags.write_command(&Value::from("128")).unwrap(), "0x80 FLAGS!");
        assert!(matches!(
            flags.write_command(&Value::from("0x10000")),
            Err(ConsoleError::OutOfRange { .. })
        ));
        assert_eq!(Value::from("0xZZ").as_i64(), None);
    }

    #[test]
    fn test_out_of_range_sends_nothing() {
        let p = Parameter::float("VSET", 1000.0).range(10.0, 14.4);
        let mut c = console();
        assert!(matches!(
            p.write(&mut c, &Value::Float(15.0)),
            Err(ConsoleError::OutOfRange { .. })
        ));
        let h = Parameter::hex("MASKED", 0x0F);
        assert!(matches!(
            h.write(&mut c, &Value::Hex(0x10)),
            Err(ConsoleError::OutOfRange { .. })
        ));
        assert!(c.transport().written().is_empty());
    }

    #[test]
    fn test_read_only_and_write_only() {
        let mut c = console();
        let can = Parameter::can("CANRX");
        assert!(matches!(
            can.write(&mut c, &Value::Int(1)),
            Err(ConsoleError::ReadOnly(_))
        ));
        let cal = Parameter::calibration("VOUT", Some(1000.0));
        assert!(matches!(cal.read(&mut c), Err(ConsoleError::WriteOnly(_))));
        assert!(c.transport().written().is_empty());
    }

    #[test]
    fn test_write_formats() {
        let p = Parameter::float("SET-VOLTS", 1000.0).write_format("{value} \"{verb} XN!");
        assert_eq!(
            p.write_command(&Value::Float(13.8)).unwrap(),
            "13800 \"SET-VOLTS XN!"
        );

        let cal = Parameter::calibration("VOUT", Some(1000.0));
        assert_eq!(cal.write_command(&Value::Float(12.01)).unwrap(), "12010 VOUT CAL");

        let pfc = Parameter::calibration("CAL_PFC", None).write_format("{verb} {value}");
        assert_eq!(pfc.write_command(&Value::Float(430.02)).unwrap(), "CAL_PFC 430.02");

        let ovr = Parameter::override_("FAN-OVR");
        assert_eq!(
            ovr.write_command(&OverrideState::ForceOff.into()).unwrap(),
            "2 FAN-OVR!"
        );
        assert!(ovr.write_command(&Value::Int(3)).is_err());
    }

    #[test]
    fn test_raw_parameter() {
        let p = Parameter::raw(
            "DOUBLE",
            RawFn::new(|console, value| match value {
                None => {
                    let r = console.action("N?", 1, None)?;
                    let n: i64 = r.first().unwrap_or("0").parse().unwrap_or(0);
                    Ok(Value::Int(n * 2))
                }
                Some(v) => Ok(v.clone()),
            }),
        );
        let mut c = console();
        reply(&mut c, "N?", " -> 21");
        assert_eq!(p.read(&mut c).unwrap(), Value::Int(42));
    }

    #[test]
    fn test_can_returns_raw_text() {
        let p = Parameter::can("CANRX").expect(0);
        let mut c = console();
        reply(&mut c, "CANRX?", " -> 123#DEAD\r124#BEEF");
        assert_eq!(
            p.read(&mut c).unwrap(),
            Value::Text("123#DEAD\n124#BEEF".into())
        );
    }
}
