// Response-frame validation and payload extraction. A response is
//
//   STX station(2 hex) pc(2 hex) payload ETX
//
// Both parsers are strict: a malformed frame or a single bad payload
// character rejects the whole response, never a partial result.

use crate::codec::parse_hex_word;
use crate::constants::{ControlByte, MIN_RESPONSE_LEN, RESPONSE_HEADER_LEN};
use crate::error::FxError;

/// Check the frame envelope and return the payload between header and ETX.
fn payload_window(frame: &[u8]) -> Result<&[u8], FxError> {
    if frame.len() < MIN_RESPONSE_LEN {
        return Err(FxError::Framing(format!(
            "response too short: {} bytes",
            frame.len()
        )));
    }
    if frame[0] != u8::from(ControlByte::Stx) {
        return Err(FxError::Framing(format!(
            "response does not start with STX (got 0x{:02X})",
            frame[0]
        )));
    }
    let last = frame[frame.len() - 1];
    if last != u8::from(ControlByte::Etx) {
        return Err(FxError::Framing(format!(
            "response does not end with ETX (got 0x{last:02X})"
        )));
    }
    Ok(&frame[RESPONSE_HEADER_LEN..frame.len() - 1])
}

/// Extract bit states from a bit-read response.
///
/// The payload carries one ASCII `'0'`/`'1'` per device. Any other payload
/// character fails the whole frame.
pub fn parse_bit_response(frame: &[u8]) -> Result<Vec<bool>, FxError> {
    let payload = payload_window(frame)?;
    let mut bits = Vec::with_capacity(payload.len());
    for (i, &c) in payload.iter().enumerate() {
        match c {
            b'0' => bits.push(false),
            b'1' => bits.push(true),
            other => {
                return Err(FxError::Payload(format!(
                    "bit payload byte {i} is 0x{other:02X}, expected '0' or '1'"
                )));
            }
        }
    }
    Ok(bits)
}

/// Extract 16-bit register values from a word-read response.
///
/// The payload carries four hex characters per device. A length that is not
/// a multiple of four, or any non-hex chunk, fails the whole frame.
pub fn parse_word_response(frame: &[u8]) -> Result<Vec<u16>, FxError> {
    let payload = payload_window(frame)?;
    if payload.len() % 4 != 0 {
        return Err(FxError::Payload(format!(
            "word payload length {} is not a multiple of 4",
            payload.len()
        )));
    }
    payload.chunks_exact(4).map(parse_hex_word).collect()
}
