//! AT command driver for the classic pairing radio
//!
//! The radio module sits on a serial port. It answers commands with `OK`
//! or `ROK`, reports scan results and pairing events as `+R...` lines, and
//! once a link is up switches to a transparent stream that carries
//! JSON-RPC lines to the peer.

use crate::error::{BleError, Result};
use crate::mac::MacAddr;
use crate::pin::pin4;
use crate::rpc::{Request, Response, SystemInfo};
use eolt_core::{Clock, SystemClock, Transport};
use serde_json::Value;
use std::time::Duration;

/// Reset command
pub const CMD_RESET: &str = "AT+JRES";
/// Security mode: SSP, PIN entry, 4-digit default PIN
pub const CMD_SECURITY: &str = "AT+JSEC=4,1,04,1111,2,1";
/// Start a discovery scan
pub const CMD_SCAN: &str = "AT+JDDS=0";
/// Enter streaming mode
pub const CMD_STREAM: &str = "AT+JSCR";
/// Drop the link
pub const CMD_DISCONNECT: &str = "AT+JSDR";

const ADVERT: &str = "+RDDSRES=";
const SCAN_DONE: &str = "+RDDSCNF=";
const PIN_REQUEST: &str = "+RPCI=";
const CONFIRM_REQUEST: &str = "+RUCE=";
const PAIRED: &str = "+RCCRCNF=";
const DISCONNECTED: &str = "+RDII";

/// Escape character that leaves streaming mode
pub const ESCAPE: u8 = b'^';
/// Silence required before and after the escape sequence
pub const ESCAPE_GUARD: Duration = Duration::from_secs(1);
/// Gap between escape characters
pub const ESCAPE_GAP: Duration = Duration::from_millis(200);

/// One `+RDDSRES` scan result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advert {
    /// Peer address
    pub mac: MacAddr,
    /// Advertised name
    pub name: String,
    /// Remaining fields, unparsed
    pub extra: String,
}

impl Advert {
    /// Parse the text after `+RDDSRES=`
    pub fn parse(fields: &str) -> Option<Self> {
        let mut parts = fields.splitn(3, ',');
        let mac = MacAddr::loads(parts.next()?.trim()).ok()?;
        let name = parts.next()?.trim().to_string();
        let extra = parts.next().unwrap_or("").to_string();
        Some(Self { mac, name, extra })
    }

    /// Whether the advertised name carries `serial` as a word
    pub fn matches(&self, serial: &str) -> bool {
        self.name.split_whitespace().any(|word| word == serial)
    }
}

/// A unit found by a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Peer address
    pub mac: MacAddr,
    /// Advertised name
    pub name: String,
    /// Pairing PIN derived from the serial number
    pub pin: String,
}

/// Classic AT radio on a byte transport
pub struct AtRadio<T: Transport> {
    transport: T,
    clock: Box<dyn Clock>,
    retries: usize,
    streaming: bool,
    next_id: u32,
}

impl<T: Transport> AtRadio<T> {
    /// Wrap a transport
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            clock: Box::new(SystemClock::new()),
            retries: 3,
            streaming: false,
            next_id: 1,
        }
    }

    /// Use `clock` for guard times
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attempts per command
    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries.max(1);
        self
    }

    /// Get a reference to the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the driver and return the transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Whether a streaming link is up
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn send(&mut self, line: &str) -> Result<()> {
        log::debug!("ble: >> {}", line);
        self.transport.write(format!("{}\r\n", line).as_bytes())?;
        Ok(())
    }

    fn recv(&mut self) -> Result<String> {
        let line = self.transport.read_line()?;
        log::debug!("ble: << {}", line);
        Ok(line)
    }

    /// Send a command and wait for `OK` or `ROK`, retrying on anything else
    pub fn command_ok(&mut self, cmd: &str) -> Result<()> {
        let mut last = None;
        for attempt in 1..=self.retries {
            self.transport.flush_input()?;
            self.send(cmd)?;
            loop {
                match self.transport.read_line() {
                    Ok(line) if line.is_empty() || line == cmd => continue,
                    Ok(line) if line == "OK" || line == "ROK" => return Ok(()),
                    Ok(line) => {
                        log::warn!("ble: {} attempt {}: {:?}", cmd, attempt, line);
                        last = Some(line);
                        break;
                    }
                    Err(e) if e.is_timeout() => {
                        log::warn!("ble: {} attempt {}: no reply", cmd, attempt);
                        break;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Err(match last {
            Some(reply) => BleError::Reply {
                command: cmd.to_string(),
                reply,
            },
            None => BleError::NoReply {
                command: cmd.to_string(),
                attempts: self.retries,
            },
        })
    }

    /// Reset the radio and select the pairing security mode
    pub fn setup(&mut self) -> Result<()> {
        self.command_ok(CMD_RESET)?;
        self.command_ok(CMD_SECURITY)?;
        log::info!("ble: Radio ready on {}", self.transport.name());
        Ok(())
    }

    /// Scan for a unit advertising `serial`
    ///
    /// Reads adverts until the scan-complete line. Malformed adverts are
    /// skipped with a warning; any line other than an advert, the
    /// completion, `OK`/`ROK` or a blank is a hard error. No match is not an
    /// error.
    pub fn scan(&mut self, serial: &str) -> Result<Option<Peer>> {
        self.transport.flush_input()?;
        self.send(CMD_SCAN)?;

        let mut found = None;
        loop {
            let line = self.recv()?;
            if line.is_empty() || line == "OK" || line == "ROK" || line == CMD_SCAN {
                continue;
            }
            if let Some(fields) = line.strip_prefix(ADVERT) {
                match Advert::parse(fields) {
                    Some(advert) if found.is_none() && advert.matches(serial) => {
                        log::info!("ble: Found {} at {}", advert.name, advert.mac);
                        found = Some(Peer {
                            mac: advert.mac,
                            name: advert.name,
                            pin: pin4(serial),
                        });
                    }
                    Some(advert) => log::trace!("ble: ignoring {} at {}", advert.name, advert.mac),
                    None => log::warn!("ble: malformed advert {:?}", line),
                }
                continue;
            }
            if let Some(status) = line.strip_prefix(SCAN_DONE) {
                if status.trim() != "0" {
                    return Err(BleError::Reply {
                        command: CMD_SCAN.to_string(),
                        reply: line.clone(),
                    });
                }
                if found.is_none() {
                    log::info!("ble: No unit advertising {}", serial);
                }
                return Ok(found);
            }
            return Err(BleError::Reply {
                command: CMD_SCAN.to_string(),
                reply: line,
            });
        }
    }

    /// Pair with `peer`, answering PIN and confirmation requests
    pub fn pair(&mut self, peer: &Peer) -> Result<()> {
        let cmd = format!("AT+JCCR={},01", peer.mac.dumps(""));
        self.transport.flush_input()?;
        self.send(&cmd)?;

        loop {
            let line = self.recv()?;
            if line.starts_with(PIN_REQUEST) {
                self.send(&format!("AT+JPCR=04,{}", peer.pin))?;
            } else if line.starts_with(CONFIRM_REQUEST) {
                self.send("AT+JUCR=1")?;
            } else if let Some(fields) = line.strip_prefix(PAIRED) {
                let fields: Vec<&str> = fields.split(',').map(str::trim).collect();
                return match fields.as_slice() {
                    [mtu, _handle, "0"] => {
                        log::info!("ble: Paired with {} (MTU {})", peer.mac, mtu);
                        Ok(())
                    }
                    [_, _, status] => Err(BleError::PairFailed(status.to_string())),
                    _ => Err(BleError::Reply {
                        command: cmd,
                        reply: line.clone(),
                    }),
                };
            } else if line == "ERROR" {
                return Err(BleError::Reply {
                    command: cmd,
                    reply: line,
                });
            } else {
                log::trace!("ble: ignoring {:?} while pairing", line);
            }
        }
    }

    /// Enter streaming mode on the paired link
    pub fn connect_streaming(&mut self) -> Result<()> {
        self.command_ok(CMD_STREAM)?;
        self.streaming = true;
        log::info!("ble: Streaming");
        Ok(())
    }

    /// Call a JSON-RPC method and return its result
    ///
    /// Lines that are not a response to this call are skipped.
    pub fn call(&mut self, method: &str, params: Value) -> Result<Value> {
        if !self.streaming {
            return Err(BleError::NotStreaming);
        }
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let request = Request::new(id, method, params);
        self.send(&serde_json::to_string(&request)?)?;

        loop {
            let line = self.recv()?;
            let response: Response = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(_) => {
                    log::trace!("ble: not a response: {:?}", line);
                    continue;
                }
            };
            if response.id != id {
                log::debug!("ble: stale response {} while waiting for {}", response.id, id);
                continue;
            }
            if let Some(error) = response.error {
                return Err(BleError::Rpc {
                    method: method.to_string(),
                    message: error.message,
                });
            }
            return Ok(response.result.unwrap_or(Value::Null));
        }
    }

    /// Hardware and software versions and serial number of the peer
    pub fn get_system_info(&mut self) -> Result<SystemInfo> {
        let result = self.call("GetSystemInfo", Value::Null)?;
        Ok(serde_json::from_value(result)?)
    }

    /// Leave streaming mode with the guarded escape sequence
    pub fn leave_streaming(&mut self) -> Result<()> {
        self.clock.sleep(ESCAPE_GUARD);
        for i in 0..3 {
            if i > 0 {
                self.clock.sleep(ESCAPE_GAP);
            }
            self.transport.write(&[ESCAPE])?;
        }
        self.clock.sleep(ESCAPE_GUARD);
        self.streaming = false;
        self.transport.flush_input()?;
        log::info!("ble: Left streaming mode");
        Ok(())
    }

    /// Drop the link and wait for the disconnect indication
    pub fn unpair(&mut self) -> Result<()> {
        if self.streaming {
            self.leave_streaming()?;
        }
        self.send(CMD_DISCONNECT)?;
        loop {
            let line = self.recv()?;
            if line.starts_with(DISCONNECTED) {
                log::info!("ble: Disconnected");
                return Ok(());
            }
            if line == "ERROR" {
                return Err(BleError::Reply {
                    command: CMD_DISCONNECT.to_string(),
                    reply: line,
                });
            }
        }
    }
}
