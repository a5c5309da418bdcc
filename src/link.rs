// Link orchestration: one open port, strict command/response round trips.

use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::codec::fmt_hex;
use crate::command::{bit_write_command, read_command, word_write_command};
use crate::constants::{ControlByte, DEFAULT_BAUD, MAX_RESPONSE_LEN};
use crate::error::FxError;
use crate::response::{parse_bit_response, parse_word_response};
use crate::transport::{SerialTransport, Transport};

fn default_baud() -> u32 {
    DEFAULT_BAUD
}

fn default_response_timeout_ms() -> u64 {
    1000
}

/// Serial-link settings, loadable from caller-held configuration files.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    /// Serial port path, e.g. `COM5` or `/dev/ttyUSB0`.
    pub port: String,
    /// Baud rate; the FX programming port defaults to 9600.
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Deadline for a complete response, in milliseconds.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

/// A serial link to one FX-series PLC station.
///
/// The link owns its transport and runs one transaction at a time; every
/// operation takes `&mut self`, so interleaved frames are ruled out by the
/// borrow checker rather than an internal lock. Operations never retry;
/// resend policy stays with the caller.
pub struct FxLink {
    transport: Box<dyn Transport>,
    response_timeout: Duration,
}

impl FxLink {
    /// Open `path` at `baud` with the default response timeout.
    pub fn connect(path: &str, baud: u32) -> Result<Self, FxError> {
        Self::connect_with(&LinkConfig {
            port: path.to_string(),
            baud,
            response_timeout_ms: default_response_timeout_ms(),
        })
    }

    /// Open the port described by `config`.
    pub fn connect_with(config: &LinkConfig) -> Result<Self, FxError> {
        let timeout = Duration::from_millis(config.response_timeout_ms);
        let transport = SerialTransport::open(&config.port, config.baud, timeout)?;
        Ok(Self::with_transport(Box::new(transport), timeout))
    }

    /// Wrap an already-open transport. Used by tests and custom carriers.
    pub fn with_transport(transport: Box<dyn Transport>, response_timeout: Duration) -> Self {
        Self {
            transport,
            response_timeout,
        }
    }

    /// Whether the underlying transport is still usable.
    pub fn is_connected(&self) -> bool {
        self.transport.is_open()
    }

    /// Batch read of `count` devices starting at `device`.
    ///
    /// Bit and word reads share one result shape: a bit read yields `0`/`1`
    /// words, so callers can treat any device window uniformly.
    pub fn read(
        &mut self,
        station: u8,
        pc: u8,
        device: &str,
        count: u8,
        bit_read: bool,
    ) -> Result<Vec<u16>, FxError> {
        let frame = read_command(station, pc, device, count, bit_read)?;
        let response = self.transact(&frame, true)?;
        if bit_read {
            let bits = parse_bit_response(&response)?;
            let pattern: String = bits.iter().map(|&b| if b { '1' } else { '0' }).collect();
            debug!(device, %pattern, "bit read");
            Ok(bits.into_iter().map(u16::from).collect())
        } else {
            let words = parse_word_response(&response)?;
            debug!(device, count = words.len(), "word read");
            Ok(words)
        }
    }

    /// Batch bit write setting one coil per element of `bits`.
    ///
    /// The PLC acknowledges writes with a short unframed echo; any non-empty
    /// reply counts as acceptance.
    pub fn bit_write(
        &mut self,
        station: u8,
        pc: u8,
        device: &str,
        bits: &[bool],
    ) -> Result<(), FxError> {
        let frame = bit_write_command(station, pc, device, bits)?;
        self.transact(&frame, false)?;
        debug!(device, count = bits.len(), "bit write");
        Ok(())
    }

    /// Batch word write storing one register value per element of `words`.
    pub fn word_write(
        &mut self,
        station: u8,
        pc: u8,
        device: &str,
        words: &[u16],
    ) -> Result<(), FxError> {
        let frame = word_write_command(station, pc, device, words)?;
        self.transact(&frame, false)?;
        debug!(device, count = words.len(), "word write");
        Ok(())
    }

    /// Run one command/response round trip.
    ///
    /// Stale input is flushed first so the reply can only belong to this
    /// request. A short write aborts before any read. With `expect_frame`
    /// the read loop accumulates chunks until ETX or the deadline; without
    /// it (write acknowledgements carry no ETX) the first non-empty chunk
    /// completes the exchange.
    fn transact(&mut self, frame: &[u8], expect_frame: bool) -> Result<Bytes, FxError> {
        if !self.transport.is_open() {
            return Err(FxError::NotConnected);
        }
        self.transport.flush_input()?;
        let written = self.transport.write_frame(frame)?;
        if written != frame.len() {
            return Err(FxError::ShortWrite {
                written,
                expected: frame.len(),
            });
        }
        trace!(tx = %fmt_hex(frame), "frame sent");

        let deadline = Instant::now() + self.response_timeout;
        let mut response = BytesMut::with_capacity(64);
        let mut chunk = [0u8; 64];
        let etx = u8::from(ControlByte::Etx);
        loop {
            let n = self.transport.read_chunk(&mut chunk)?;
            if n > 0 {
                response.extend_from_slice(&chunk[..n]);
                if !expect_frame || chunk[..n].contains(&etx) {
                    break;
                }
                if response.len() > MAX_RESPONSE_LEN {
                    return Err(FxError::Framing(format!(
                        "response exceeded {MAX_RESPONSE_LEN} bytes without ETX"
                    )));
                }
            }
            if Instant::now() >= deadline {
                break;
            }
        }

        if response.is_empty() {
            warn!(timeout = ?self.response_timeout, "no response from PLC");
            return Err(FxError::NoResponse {
                timeout: self.response_timeout,
            });
        }
        trace!(rx = %fmt_hex(&response), "frame received");
        Ok(response.freeze())
    }
}
