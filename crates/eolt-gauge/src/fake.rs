//! Simulated bridge with a gauge and its EEPROM behind it

use crate::protocol::*;
use eolt_core::{Clock, ManualClock, Result, Transport};
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

const BMS: u8 = 0x0B;
const EEPROM: u8 = 0x50;

pub(crate) struct FakeBridge {
    slave: u8,
    regs: BTreeMap<u8, u16>,
    eeprom: [u8; 256],
    eeprom_enabled: bool,
    locked: bool,
    monitor: Option<(u8, Rc<ManualClock>, Duration)>,
    frames: Vec<[u8; FRAME_LEN]>,
    writes: Vec<(u8, u8, u16)>,
    pending: Vec<u8>,
    out: VecDeque<u8>,
    timeout: Duration,
}

impl FakeBridge {
    pub(crate) fn new() -> Self {
        Self {
            slave: 0,
            regs: BTreeMap::new(),
            eeprom: [0; 256],
            eeprom_enabled: false,
            locked: false,
            monitor: None,
            frames: Vec::new(),
            writes: Vec::new(),
            pending: Vec::new(),
            out: VecDeque::new(),
            timeout: Duration::from_millis(100),
        }
    }

    pub(crate) fn with_reg(mut self, reg: u8, value: u16) -> Self {
        self.regs.insert(reg, value);
        self
    }

    /// Monitor register 0x40 ticks once per `period` of `clock`
    pub(crate) fn with_monitor(mut self, clock: Rc<ManualClock>, period: Duration) -> Self {
        self.monitor = Some((0x40, clock, period));
        self
    }

    /// Ignore the EEPROM access code
    pub(crate) fn eeprom_locked(mut self) -> Self {
        self.locked = true;
        self
    }

    pub(crate) fn reg(&self, reg: u8) -> u16 {
        self.regs.get(&reg).copied().unwrap_or(0)
    }

    pub(crate) fn eeprom_word(&self, addr: u8) -> u16 {
        u16::from_le_bytes([
            self.eeprom[addr as usize],
            self.eeprom[addr.wrapping_add(1) as usize],
        ])
    }

    pub(crate) fn slave(&self) -> u8 {
        self.slave
    }

    pub(crate) fn frames(&self) -> &[[u8; FRAME_LEN]] {
        &self.frames
    }

    /// Whether a gauge register write of `value` to `reg` was seen
    pub(crate) fn wrote(&self, reg: u8, value: u16) -> bool {
        self.writes.contains(&(BMS, reg, value))
    }

    fn reply(&mut self, bytes: [u8; 3], cmd: u8) {
        self.out.extend([FRAME_START, cmd]);
        self.out.extend(bytes);
    }

    fn read_word(&mut self, reg: u8) -> std::result::Result<u16, u8> {
        match self.slave {
            BMS => {
                if let Some((monitor, clock, period)) = &self.monitor {
                    if *monitor == reg {
                        return Ok((clock.now().as_nanos() / period.as_nanos()) as u16);
                    }
                }
                Ok(self.reg(reg))
            }
            EEPROM if self.eeprom_enabled => Ok(self.eeprom_word(reg)),
            _ => Err(ErrorClass::I2C.bits()),
        }
    }

    fn write_word(&mut self, reg: u8, value: u16) -> std::result::Result<(), u8> {
        self.writes.push((self.slave, reg, value));
        match self.slave {
            BMS => {
                self.regs.insert(reg, value);
                Ok(())
            }
            EEPROM if self.eeprom_enabled => {
                let [lsb, msb] = value.to_le_bytes();
                self.eeprom[reg as usize] = lsb;
                self.eeprom[reg.wrapping_add(1) as usize] = msb;
                Ok(())
            }
            _ => Err(ErrorClass::I2C.bits()),
        }
    }

    fn on_frame(&mut self, f: [u8; FRAME_LEN]) {
        self.frames.push(f);
        let [_, cmd, sub, lsb, msb] = f;
        let word = u16::from_le_bytes([lsb, msb]);
        match cmd {
            CMD_ECHO => self.reply([sub, lsb, msb], cmd),
            CMD_READ_WORD | CMD_READ_WORD_PEC => match self.read_word(sub) {
                Ok(v) => {
                    let [lo, hi] = v.to_le_bytes();
                    self.reply([lo, hi, 0], cmd);
                }
                Err(class) => self.reply([1, 0, class], cmd),
            },
            CMD_WRITE_WORD | CMD_WRITE_WORD_PEC => {
                if cmd == CMD_WRITE_WORD_PEC
                    && self.slave == BMS
                    && sub == 0x00
                    && word == 0x0606
                    && !self.locked
                {
                    self.eeprom_enabled = true;
                }
                match self.write_word(sub, word) {
                    Ok(()) => self.reply([0, 0, 0], cmd),
                    Err(class) => self.reply([class, 1, 0], cmd),
                }
            }
            CMD_SET_SLAVE => {
                self.slave = sub;
                self.reply([0, 0, 0], cmd);
            }
            CMD_BOARD_STATUS => self.reply([0, 0, 3], cmd),
            _ => self.reply([ErrorClass::RS232_SYNC.bits(), 0, 0], cmd),
        }
    }
}

impl Transport for FakeBridge {
    fn name(&self) -> &str {
        "fake-bridge"
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        let n = n.min(self.out.len());
        Ok(self.out.drain(..n).collect())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(data);
        while self.pending.len() >= FRAME_LEN {
            let mut f = [0u8; FRAME_LEN];
            f.copy_from_slice(&self.pending[..FRAME_LEN]);
            self.pending.drain(..FRAME_LEN);
            self.on_frame(f);
        }
        Ok(())
    }

    fn flush_input(&mut self) -> Result<()> {
        self.out.clear();
        Ok(())
    }

    fn reset_input_buffer(&mut self) -> Result<()> {
        self.out.clear();
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        Ok(())
    }
}
