// Byte transport between the link layer and the serial line.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};
use tracing::info;

use crate::error::FxError;

/// Blocking byte transport driven by the link layer.
///
/// `read_chunk` blocks until at least one byte arrives or the transport's
/// own timeout passes. A timeout is reported as `Ok(0)`, not an error, so
/// the caller can tell "nothing arrived yet" from a broken port and keep
/// accumulating until its deadline.
pub trait Transport: Send {
    /// Write a frame, returning how many bytes the port accepted.
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<usize>;

    /// Read available bytes into `buf`, blocking up to the timeout.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Discard any unread input left over from earlier traffic.
    fn flush_input(&mut self) -> io::Result<()>;

    /// Whether the underlying port is usable.
    fn is_open(&self) -> bool;
}

/// [`Transport`] over a real serial port.
///
/// The FX programming port always talks 7 data bits, odd parity, 1 stop
/// bit; only baud rate and timeout vary. A `SerialTransport` is open for as
/// long as it exists, and dropping it closes the port.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open `path` at `baud` with the given per-read timeout.
    pub fn open(path: &str, baud: u32, timeout: Duration) -> Result<Self, FxError> {
        let port = serialport::new(path, baud)
            .data_bits(DataBits::Seven)
            .parity(Parity::Odd)
            .stop_bits(StopBits::One)
            .timeout(timeout)
            .open()
            .map_err(|e| FxError::Connection {
                port: path.to_string(),
                message: e.to_string(),
            })?;
        info!(port = path, baud, "serial port open");
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<usize> {
        let written = self.port.write(frame)?;
        self.port.flush()?;
        Ok(written)
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn flush_input(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input).map_err(io::Error::from)
    }

    fn is_open(&self) -> bool {
        true
    }
}
