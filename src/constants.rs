// Protocol constants for the FX computer link

use num_enum::IntoPrimitive;

/// ASCII control bytes that delimit computer-link frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum ControlByte {
    /// Start of header
    Soh = 0x01,
    /// Start of text; opens every response frame
    Stx = 0x02,
    /// End of text; closes every response frame
    Etx = 0x03,
    /// End of transmission
    Eot = 0x04,
    /// Enquiry; opens every request frame
    Enq = 0x05,
    /// Acknowledge
    Ack = 0x06,
}

/// Message-wait modifier sent after the command code in every request
pub const WAIT_CHAR: u8 = b'3';

/// Device address field width on the wire (5 ASCII characters)
pub const ADDRESS_LEN: usize = 5;

/// Shortest valid response: STX + station(2) + PC(2) + ETX with no payload
pub const MIN_RESPONSE_LEN: usize = 6;

/// Bytes preceding the payload in a response: STX + station(2) + PC(2)
pub const RESPONSE_HEADER_LEN: usize = 5;

/// Largest device count a single frame can address (count field is one hex byte)
pub const MAX_DEVICES_PER_FRAME: usize = 255;

/// Accumulation cap for a response: header + 255 words of 4 hex chars + ETX
pub const MAX_RESPONSE_LEN: usize = RESPONSE_HEADER_LEN + MAX_DEVICES_PER_FRAME * 4 + 1;

/// Default station number on the multidrop line
pub const DEFAULT_STATION: u8 = 0x00;

/// Default PC (CPU) number; 0xFF addresses the connected CPU directly
pub const DEFAULT_PC: u8 = 0xFF;

/// Default baud rate of the FX programming port
pub const DEFAULT_BAUD: u32 = 9600;

/// Position scale: one register tick is 0.005 mm, so 200 ticks per mm
pub const TICKS_PER_MM: f64 = 200.0;

/// Axis position feedback, 32-bit tick count across D140/D141
pub const POSITION_REGISTER: &str = "D140";

/// Commanded axis speed, 32-bit tick count across D128/D129
pub const SPEED_REGISTER: &str = "D128";

/// Commanded axis acceleration, 32-bit tick count across D144/D145
pub const ACCEL_REGISTER: &str = "D144";

/// Relative move distance, 32-bit tick count across D142/D143
pub const MOVE_DISTANCE_REGISTER: &str = "D142";

/// Coil that starts a relative move using the distance in D142
pub const MOVE_TRIGGER_COIL: &str = "M32";

/// Coil that starts the homing cycle; the ladder program clears it itself
pub const HOME_TRIGGER_COIL: &str = "M20";
