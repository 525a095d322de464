//! Out-of-band session events

use bytes::Bytes;
use sepay_core::Frame;

/// Anomalies and lifecycle changes observed by the inbound listener
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A valid frame arrived that no pending request was waiting for
    Unsolicited(Frame),

    /// Inbound bytes could not be decoded
    DecodeError {
        error: sepay_core::Error,
        raw: Bytes,
    },

    /// The terminal closed the connection or the read side failed
    Disconnected,
}
