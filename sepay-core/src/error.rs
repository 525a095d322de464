//! Error types for sepay-core

/// Result type alias for sepay-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
///
/// Codec errors are always detected locally and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Payload does not fit the two-byte length field
    #[error("Frame too large: payload of {size} bytes (max: {max} bytes)")]
    FrameTooLarge {
        size: usize,
        max: usize,
    },

    /// Frame structure is broken (short, missing markers, bad length field)
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Declared length disagrees with the received frame size
    #[error("Length mismatch: declared {declared}, actual {actual}")]
    LengthMismatch {
        declared: usize,
        actual: usize,
    },

    /// LRC verification failed
    #[error("Checksum mismatch: expected 0x{expected:02X}, received 0x{received:02X}")]
    ChecksumMismatch {
        expected: u8,
        received: u8,
    },

    /// Invalid session state
    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),
}

impl Error {
    /// Check if the error was caused by bytes on the wire rather than by the caller
    pub fn is_wire_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedFrame(_)
                | Self::LengthMismatch { .. }
                | Self::ChecksumMismatch { .. }
        )
    }
}
