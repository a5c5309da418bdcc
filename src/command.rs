// Request-frame assembly. Every request shares one header layout:
//
//   ENQ station(2 hex) pc(2 hex) code(2) wait('3') address(5) count(2 hex) [payload]
//
// Read requests stop after the count; write requests append one ASCII
// '0'/'1' per bit or four hex characters per word.

use strum_macros::Display;

use crate::codec::{byte_to_ascii_hex, pad_device_addr, word_to_ascii_hex};
use crate::constants::{ControlByte, MAX_DEVICES_PER_FRAME, WAIT_CHAR};
use crate::error::FxError;

/// Two-character command codes of the batch operations the link speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CommandCode {
    /// Batch word read
    #[strum(to_string = "WR")]
    WordRead,
    /// Batch bit read
    #[strum(to_string = "BR")]
    BitRead,
    /// Batch word write
    #[strum(to_string = "WW")]
    WordWrite,
    /// Batch bit write
    #[strum(to_string = "BW")]
    BitWrite,
}

/// Assemble the shared request header for `count` devices at `device`.
fn frame_header(
    code: CommandCode,
    station: u8,
    pc: u8,
    device: &str,
    count: usize,
) -> Result<Vec<u8>, FxError> {
    if count > MAX_DEVICES_PER_FRAME {
        return Err(FxError::CountOverflow(count));
    }
    let address = pad_device_addr(device)?;
    let mut frame = Vec::with_capacity(15 + count * 4);
    frame.push(ControlByte::Enq.into());
    frame.extend_from_slice(&byte_to_ascii_hex(station));
    frame.extend_from_slice(&byte_to_ascii_hex(pc));
    frame.extend_from_slice(code.to_string().as_bytes());
    frame.push(WAIT_CHAR);
    frame.extend_from_slice(address.as_bytes());
    frame.extend_from_slice(&byte_to_ascii_hex(count as u8));
    Ok(frame)
}

/// Build a batch read request, `BR` for bit devices or `WR` for word devices.
///
/// `count` is the number of devices to read; the one-byte count field keeps
/// it within a single frame by construction.
pub fn read_command(
    station: u8,
    pc: u8,
    device: &str,
    count: u8,
    bit_read: bool,
) -> Result<Vec<u8>, FxError> {
    let code = if bit_read {
        CommandCode::BitRead
    } else {
        CommandCode::WordRead
    };
    frame_header(code, station, pc, device, usize::from(count))
}

/// Build a batch bit write (`BW`) setting one coil per element of `bits`.
pub fn bit_write_command(
    station: u8,
    pc: u8,
    device: &str,
    bits: &[bool],
) -> Result<Vec<u8>, FxError> {
    let mut frame = frame_header(CommandCode::BitWrite, station, pc, device, bits.len())?;
    frame.extend(bits.iter().map(|&bit| if bit { b'1' } else { b'0' }));
    Ok(frame)
}

/// Build a batch word write (`WW`) storing one register per element of `words`.
pub fn word_write_command(
    station: u8,
    pc: u8,
    device: &str,
    words: &[u16],
) -> Result<Vec<u8>, FxError> {
    let mut frame = frame_header(CommandCode::WordWrite, station, pc, device, words.len())?;
    for &word in words {
        frame.extend_from_slice(&word_to_ascii_hex(word));
    }
    Ok(frame)
}
