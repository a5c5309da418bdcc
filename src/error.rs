use std::io;
use std::time::Duration;
use thiserror::Error;

/// The primary error type for the `fxlink` library.
#[derive(Error, Debug)]
pub enum FxError {
    #[error("Failed to open {port}: {message}. Is the PLC cable connected?")]
    Connection { port: String, message: String },

    #[error("Serial port is not open")]
    NotConnected,

    #[error("Short write: {written} of {expected} bytes accepted by the port")]
    ShortWrite { written: usize, expected: usize },

    #[error("No response from the PLC within {timeout:?}")]
    NoResponse { timeout: Duration },

    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Payload error: {0}")]
    Payload(String),

    #[error("Invalid device address: {0:?}")]
    InvalidAddress(String),

    #[error("Device count {0} exceeds the 255 a single frame can carry")]
    CountOverflow(usize),

    #[error("Out of range: {name} = {value} (allowed {min} to {max})")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Motion timed out after {elapsed:?} at {position} mm")]
    Timeout { elapsed: Duration, position: f64 },

    #[error("Verify mismatch: wrote {wrote}, read back {read}")]
    Tolerance { wrote: f64, read: f64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serial error: {0}")]
    Serial(#[from] serialport::Error),
}
