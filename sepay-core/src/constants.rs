//! Protocol constants

/// Start of text, first byte of every frame
pub const STX: u8 = 0x02;

/// End of text, precedes the LRC byte
pub const ETX: u8 = 0x03;

/// Fixed separator following the command byte (`|`)
pub const SEPARATOR: u8 = 0x7C;

/// STX + length (2) + command + separator + ETX + LRC
pub const MIN_FRAME_SIZE: usize = 7;

/// Bytes outside the length-covered region: STX + length (2) + ETX + LRC
pub const ENVELOPE_OVERHEAD: usize = 5;

/// Largest value the length field can carry
pub const MAX_LENGTH: usize = u16::MAX as usize;

/// Largest payload that fits (length covers command + separator)
pub const MAX_PAYLOAD_SIZE: usize = MAX_LENGTH - 2;

/// Largest complete frame on the wire
pub const MAX_FRAME_SIZE: usize = MAX_LENGTH + ENVELOPE_OVERHEAD;

/// Default terminal TCP port
pub const DEFAULT_PORT: u16 = 1234;

/// Default connection timeout (seconds)
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 5;

/// Default per-request response timeout (seconds)
pub const DEFAULT_TIMEOUT: u64 = 5;

/// Default resends after a NACK
pub const MAX_RETRIES: usize = 3;

/// Default pause before resending a NACKed frame (milliseconds)
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 100;
