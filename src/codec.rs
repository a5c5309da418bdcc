// ASCII-hex codec and device-address normalization for the wire format.
// The computer link is pure ASCII: every numeric field travels as uppercase
// hex characters and device addresses occupy a fixed five-character window.

use crate::constants::ADDRESS_LEN;
use crate::error::FxError;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Encode one byte as two uppercase hex characters: `0x1E` becomes `"1E"`.
pub fn byte_to_ascii_hex(value: u8) -> [u8; 2] {
    [
        HEX_DIGITS[usize::from(value >> 4)],
        HEX_DIGITS[usize::from(value & 0x0F)],
    ]
}

/// Encode one 16-bit word as four uppercase hex characters, zero padded.
pub fn word_to_ascii_hex(value: u16) -> [u8; 4] {
    [
        HEX_DIGITS[usize::from(value >> 12)],
        HEX_DIGITS[usize::from((value >> 8) & 0x0F)],
        HEX_DIGITS[usize::from((value >> 4) & 0x0F)],
        HEX_DIGITS[usize::from(value & 0x0F)],
    ]
}

/// Parse exactly four hex characters into a word: `"00A5"` becomes `0x00A5`.
pub fn parse_hex_word(chunk: &[u8]) -> Result<u16, FxError> {
    if chunk.len() != 4 {
        return Err(FxError::Payload(format!(
            "hex word must be 4 characters, got {}",
            chunk.len()
        )));
    }
    if !chunk.iter().all(u8::is_ascii_hexdigit) {
        return Err(FxError::Payload(format!(
            "non-hex characters in word {chunk:02X?}"
        )));
    }
    let text = std::str::from_utf8(chunk).map_err(|_| FxError::Payload("non-ASCII word".into()))?;
    u16::from_str_radix(text, 16)
        .map_err(|_| FxError::Payload(format!("invalid hex word {text:?}")))
}

/// Normalize a device token to its five-character wire form.
///
/// Short tokens have their numeric part zero padded to four digits, so
/// `"M100"` becomes `"M0100"` and `"D8"` becomes `"D0008"`. Tokens already
/// five or more characters long are passed through truncated to five,
/// assumed pre-canonical. The characters after the device-type letter are
/// not validated; the PLC rejects nonsense addresses itself.
pub fn pad_device_addr(token: &str) -> Result<String, FxError> {
    if token.len() >= ADDRESS_LEN {
        return Ok(token.chars().take(ADDRESS_LEN).collect());
    }
    let mut chars = token.chars();
    let kind = chars
        .next()
        .ok_or_else(|| FxError::InvalidAddress(token.to_string()))?;
    let digits: String = chars.collect();
    Ok(format!("{kind}{digits:0>4}"))
}

/// Render bytes as space-separated uppercase hex for trace output.
pub fn fmt_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push(HEX_DIGITS[usize::from(b >> 4)] as char);
        out.push(HEX_DIGITS[usize::from(b & 0x0F)] as char);
    }
    out
}
