//! Command/response framing over a byte transport
//!
//! The firmware echoes each command, prints its reply and finishes with a
//! prompt. [`Console::action`] sends one command, checks the echo, collects
//! everything up to the prompt and splits it into lines.
//!
//! Two echo disciplines are supported. [`UartMode::Normal`] writes the
//! whole command and reads the echo back in one go. [`UartMode::BadUart`]
//! is for firmware with a software UART that drops bytes under load: each
//! byte is written and its echo checked before the next one is sent.

use crate::error::{ConsoleError, Result};
use eolt_core::{Clock, SimTransport, SystemClock, Transport};
use serde::Deserialize;
use std::time::Duration;

/// Echo discipline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum UartMode {
    /// Hardware UART: write the command at once, then read the echo
    #[default]
    Normal,
    /// Lossy UART: write one byte, wait for its echo, repeat
    BadUart,
}

/// Per-product framing settings
#[derive(Debug, Clone)]
pub struct FramingConfig {
    /// Byte sequence that ends every reply
    pub prompt: String,
    /// Substrings removed from replies (units and the like)
    pub ignore: Vec<String>,
    /// Lines printed after power-up or reset
    pub banner_lines: usize,
    /// Wait after committing to non-volatile memory
    pub nv_delay: Duration,
    /// Wait after opening the port before the first command
    pub open_delay: Duration,
    /// Echo discipline
    pub mode: UartMode,
    /// Append the prompt to replies queued with [`Console::puts`]
    pub sim_prompt: bool,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            prompt: "\r> ".to_string(),
            ignore: Vec::new(),
            banner_lines: 0,
            nv_delay: Duration::ZERO,
            open_delay: Duration::ZERO,
            mode: UartMode::Normal,
            sim_prompt: false,
        }
    }
}

/// Lines returned by a command, exclusive of echo and prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Nothing before the prompt
    None,
    /// Exactly one line
    Line(String),
    /// Several lines
    Lines(Vec<String>),
}

impl Response {
    fn from_lines(mut lines: Vec<String>) -> Self {
        match lines.len() {
            0 => Response::None,
            1 => Response::Line(lines.remove(0)),
            _ => Response::Lines(lines),
        }
    }

    /// Number of lines
    pub fn len(&self) -> usize {
        match self {
            Response::None => 0,
            Response::Line(_) => 1,
            Response::Lines(lines) => lines.len(),
        }
    }

    /// Whether no line was returned
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First line, if any
    pub fn first(&self) -> Option<&str> {
        match self {
            Response::None => None,
            Response::Line(line) => Some(line),
            Response::Lines(lines) => lines.first().map(String::as_str),
        }
    }

    /// All lines as a vector
    pub fn into_lines(self) -> Vec<String> {
        match self {
            Response::None => Vec::new(),
            Response::Line(line) => vec![line],
            Response::Lines(lines) => lines,
        }
    }
}

/// Anything that can run a console command
///
/// Implemented by [`Console`]; parameter code and caller-supplied raw
/// handlers only need this much.
pub trait Executor {
    /// Send `cmd`, wait for the prompt and return the reply lines
    fn action(&mut self, cmd: &str, expected: usize, delay: Option<Duration>) -> Result<Response>;
}

/// A firmware console on a byte transport
pub struct Console<T: Transport> {
    transport: T,
    config: FramingConfig,
    clock: Box<dyn Clock>,
}

impl<T: Transport> Console<T> {
    /// Wrap a transport without touching it
    pub fn new(transport: T, config: FramingConfig) -> Self {
        Self {
            transport,
            config,
            clock: Box::new(SystemClock::new()),
        }
    }

    /// Use `clock` for every delay
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Wait the post-open delay and drop stale input
    pub fn open(&mut self) -> Result<()> {
        self.clock.sleep(self.config.open_delay);
        self.transport.flush_input()?;
        log::debug!("console: Opened on {}", self.transport.name());
        Ok(())
    }

    /// Framing settings
    pub fn config(&self) -> &FramingConfig {
        &self.config
    }

    /// The clock used for delays
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Get a reference to the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the console and return the transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Sleep for the configured post-NV-write delay
    pub fn nv_pause(&self) {
        self.clock.sleep(self.config.nv_delay);
    }

    /// Read one line with line endings removed
    pub fn read_line(&mut self) -> Result<String> {
        Ok(self.transport.read_line()?)
    }

    /// Consume `n` banner lines
    pub fn banner(&mut self, n: usize) -> Result<Vec<String>> {
        let mut lines = Vec::with_capacity(n);
        for i in 0..n {
            match self.transport.read_line() {
                Ok(line) => lines.push(line),
                Err(e) if e.is_timeout() => {
                    return Err(ConsoleError::Response {
                        command: "<banner>".into(),
                        reason: format!("only {} of {} banner lines", i, n),
                    })
                }
                Err(e) => return Err(e.into()),
            }
        }
        log::debug!("console: Banner {:?}", lines);
        Ok(lines)
    }

    fn send(&mut self, cmd: &str) -> Result<()> {
        match self.config.mode {
            UartMode::Normal => {
                self.transport.write(format!("{}\r", cmd).as_bytes())?;
                let echo = match self.transport.read_exact(cmd.len()) {
                    Ok(echo) => echo,
                    Err(e) if e.is_timeout() => {
                        return Err(ConsoleError::Command {
                            sent: cmd.to_string(),
                            echoed: e.to_string(),
                        })
                    }
                    Err(e) => return Err(e.into()),
                };
                if echo != cmd.as_bytes() {
                    return Err(ConsoleError::Command {
                        sent: cmd.to_string(),
                        echoed: String::from_utf8_lossy(&echo).into_owned(),
                    });
                }
            }
            UartMode::BadUart => {
                for (i, &b) in cmd.as_bytes().iter().enumerate() {
                    self.transport.write(&[b])?;
                    let echo = self.transport.read_byte()?;
                    if echo != Some(b) {
                        let mut echoed = String::from_utf8_lossy(&cmd.as_bytes()[..i]).into_owned();
                        if let Some(e) = echo {
                            echoed.push(e as char);
                        }
                        return Err(ConsoleError::Command {
                            sent: cmd.to_string(),
                            echoed,
                        });
                    }
                }
                self.transport.write(b"\r")?;
            }
        }
        Ok(())
    }

    fn read_to_prompt(&mut self, cmd: &str) -> Result<String> {
        let prompt = self.config.prompt.replace('\n', "");
        let mut buf = Vec::new();
        loop {
            match self.transport.read_byte()? {
                Some(b'\n') => {}
                Some(b) => {
                    buf.push(b);
                    if buf.ends_with(prompt.as_bytes()) {
                        buf.truncate(buf.len() - prompt.len());
                        return Ok(String::from_utf8_lossy(&buf).into_owned());
                    }
                }
                None => {
                    return Err(ConsoleError::Response {
                        command: cmd.to_string(),
                        reason: format!(
                            "timeout waiting for prompt after {:?}",
                            String::from_utf8_lossy(&buf)
                        ),
                    })
                }
            }
        }
    }

    /// Turn raw reply text into lines
    fn split_reply(&self, raw: &str) -> Vec<String> {
        let mut text = raw.trim_start_matches('\r');
        if let Some(rest) = text.strip_prefix(" -> ") {
            text = rest;
        }
        let mut text = text.to_string();
        for token in &self.config.ignore {
            text = text.replace(token.as_str(), "");
        }
        text.split('\r')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl<T: Transport> Executor for Console<T> {
    fn action(&mut self, cmd: &str, expected: usize, delay: Option<Duration>) -> Result<Response> {
        self.transport.flush_input()?;
        self.send(cmd)?;
        if let Some(delay) = delay {
            self.clock.sleep(delay);
        }

        let raw = self.read_to_prompt(cmd)?;
        let lines = self.split_reply(&raw);
        log::debug!("console: {:?} -> {:?}", cmd, lines);

        if lines.len() < expected {
            return Err(ConsoleError::Response {
                command: cmd.to_string(),
                reason: format!("expected {} lines, got {}", expected, lines.len()),
            });
        }
        Ok(Response::from_lines(lines))
    }
}

impl Console<SimTransport> {
    /// Queue a canned reply, adding the prompt if configured to
    pub fn puts(&mut self, reply: &str, preflush: usize, postflush: usize) {
        let mut data = reply.to_string();
        if self.config.sim_prompt {
            data.push_str(&self.config.prompt);
        }
        self.transport
            .puts(data.as_bytes(), preflush, postflush, false);
    }
}
