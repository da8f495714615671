//! Byte transport abstraction
//!
//! Every protocol in eolt (ISP bootloader, firmware console, AT radio module,
//! SMBus bridge) runs over a duplex octet stream. Reads are bounded by a
//! per-transport timeout: `read(n)` returns at most `n` bytes and an empty
//! buffer means the deadline expired.

use crate::error::{Result, TransportError};
use std::time::Duration;

pub use serial::SerialTransport;
pub use sim::SimTransport;

/// Transport trait for reading and writing bytes
pub trait Transport {
    /// Port name, for log messages
    fn name(&self) -> &str;

    /// Read up to `n` bytes, waiting at most the configured timeout
    ///
    /// Returns fewer bytes (possibly none) if the timeout expires first.
    fn read(&mut self, n: usize) -> Result<Vec<u8>>;

    /// Write all bytes to the transport
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Discard pending input
    ///
    /// Simulated transports only discard up to the next flush marker.
    fn flush_input(&mut self) -> Result<()>;

    /// Discard all pending input unconditionally
    fn reset_input_buffer(&mut self) -> Result<()>;

    /// Current read timeout
    fn timeout(&self) -> Duration;

    /// Change the read timeout
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Read a single byte, `None` on timeout
    fn read_byte(&mut self) -> Result<Option<u8>> {
        Ok(self.read(1)?.first().copied())
    }

    /// Read exactly `n` bytes or fail with a timeout
    fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(n);
        while buf.len() < n {
            let chunk = self.read(n - buf.len())?;
            if chunk.is_empty() {
                return Err(TransportError::timeout(&buf));
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }

    /// Read until the buffer ends with `terminator`
    ///
    /// Reads one byte at a time so nothing past the terminator is consumed.
    fn read_until(&mut self, terminator: &[u8]) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        loop {
            match self.read_byte()? {
                Some(b) => {
                    buf.push(b);
                    if buf.ends_with(terminator) {
                        return Ok(buf);
                    }
                }
                None => return Err(TransportError::timeout(&buf)),
            }
        }
    }

    /// Read one `\n`-terminated line, without its line ending
    fn read_line(&mut self) -> Result<String> {
        let raw = self.read_until(b"\n")?;
        let line = String::from_utf8_lossy(&raw);
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        (**self).read(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn flush_input(&mut self) -> Result<()> {
        (**self).flush_input()
    }

    fn reset_input_buffer(&mut self) -> Result<()> {
        (**self).reset_input_buffer()
    }

    fn timeout(&self) -> Duration {
        (**self).timeout()
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        (**self).set_timeout(timeout)
    }
}

pub mod serial {
    //! Serial port transport implementation

    use super::*;
    use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
    use std::io::{Read, Write};
    use std::time::Instant;

    /// Serial port transport
    pub struct SerialTransport {
        name: String,
        port: Box<dyn SerialPort>,
        timeout: Duration,
    }

    impl SerialTransport {
        /// Open a serial port at 8N1 with no flow control
        pub fn open(device: &str, baud: u32, timeout: Duration) -> Result<Self> {
            let port = serialport::new(device, baud)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(timeout)
                .open()
                .map_err(|e| TransportError::OpenFailed {
                    port: device.to_string(),
                    reason: e.to_string(),
                })?;

            log::info!("Opened serial port {} at {} baud", device, baud);

            Ok(Self {
                name: device.to_string(),
                port,
                timeout,
            })
        }

        /// Change the baud rate of an open port
        pub fn set_baud_rate(&mut self, baud: u32) -> Result<()> {
            self.port.set_baud_rate(baud)?;
            log::debug!("{}: baud rate set to {}", self.name, baud);
            Ok(())
        }

        /// Close the port
        pub fn close(self) {
            log::info!("Closed serial port {}", self.name);
        }
    }

    impl Transport for SerialTransport {
        fn name(&self) -> &str {
            &self.name
        }

        fn read(&mut self, n: usize) -> Result<Vec<u8>> {
            let mut buf = vec![0u8; n];
            let mut got = 0;
            let deadline = Instant::now() + self.timeout;

            while got < n {
                match self.port.read(&mut buf[got..]) {
                    Ok(0) => break,
                    Ok(k) => got += k,
                    Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                    Err(e) => return Err(e.into()),
                }
                if Instant::now() >= deadline {
                    break;
                }
            }

            buf.truncate(got);
            log::trace!("{} <- {:02X?}", self.name, buf);
            Ok(buf)
        }

        fn write(&mut self, data: &[u8]) -> Result<()> {
            log::trace!("{} -> {:02X?}", self.name, data);
            self.port.write_all(data)?;
            self.port.flush()?;
            Ok(())
        }

        fn flush_input(&mut self) -> Result<()> {
            self.port.clear(ClearBuffer::Input)?;
            Ok(())
        }

        fn reset_input_buffer(&mut self) -> Result<()> {
            self.port.clear(ClearBuffer::Input)?;
            Ok(())
        }

        fn timeout(&self) -> Duration {
            self.timeout
        }

        fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
            self.port.set_timeout(timeout)?;
            self.timeout = timeout;
            Ok(())
        }
    }
}

pub mod sim {
    //! Simulated transport for fixtures and tests
    //!
    //! Canned reply bytes are queued with [`SimTransport::puts`], optionally
    //! surrounded by flush markers. `flush_input()` discards input only up to
    //! and including the next marker, so a reply queued after a marker
    //! survives the flush a driver performs before sending its command.

    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Entry {
        Byte(u8),
        Flush,
    }

    /// In-memory transport with canned replies
    #[derive(Debug)]
    pub struct SimTransport {
        name: String,
        input: VecDeque<Entry>,
        written: Vec<u8>,
        timeout: Duration,
    }

    impl SimTransport {
        /// Create an empty simulated port
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                input: VecDeque::new(),
                written: Vec::new(),
                timeout: Duration::from_millis(100),
            }
        }

        /// Queue reply bytes
        ///
        /// `preflush` and `postflush` add flush markers before and after the
        /// data. With `priority` the whole chunk goes ahead of anything
        /// already queued.
        pub fn puts(&mut self, data: &[u8], preflush: usize, postflush: usize, priority: bool) {
            let mut chunk = Vec::with_capacity(preflush + data.len() + postflush);
            chunk.extend(std::iter::repeat(Entry::Flush).take(preflush));
            chunk.extend(data.iter().map(|&b| Entry::Byte(b)));
            chunk.extend(std::iter::repeat(Entry::Flush).take(postflush));

            if priority {
                for entry in chunk.into_iter().rev() {
                    self.input.push_front(entry);
                }
            } else {
                self.input.extend(chunk);
            }
        }

        /// Queue reply bytes with no flush markers
        pub fn push(&mut self, data: &[u8]) {
            self.puts(data, 0, 0, false);
        }

        /// Everything written to the port so far
        pub fn written(&self) -> &[u8] {
            &self.written
        }

        /// Take and clear the record of written bytes
        pub fn take_written(&mut self) -> Vec<u8> {
            std::mem::take(&mut self.written)
        }

        /// Number of queued reply bytes not yet read
        pub fn pending(&self) -> usize {
            self.input
                .iter()
                .filter(|e| matches!(e, Entry::Byte(_)))
                .count()
        }
    }

    impl Transport for SimTransport {
        fn name(&self) -> &str {
            &self.name
        }

        fn read(&mut self, n: usize) -> Result<Vec<u8>> {
            let mut buf = Vec::with_capacity(n);
            while buf.len() < n {
                match self.input.pop_front() {
                    Some(Entry::Byte(b)) => buf.push(b),
                    Some(Entry::Flush) => continue,
                    None => break,
                }
            }
            log::trace!("{} <- {:02X?}", self.name, buf);
            Ok(buf)
        }

        fn write(&mut self, data: &[u8]) -> Result<()> {
            log::trace!("{} -> {:02X?}", self.name, data);
            self.written.extend_from_slice(data);
            Ok(())
        }

        fn flush_input(&mut self) -> Result<()> {
            if let Some(pos) = self.input.iter().position(|e| *e == Entry::Flush) {
                self.input.drain(..=pos);
            }
            Ok(())
        }

        fn reset_input_buffer(&mut self) -> Result<()> {
            self.input.clear();
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
}
