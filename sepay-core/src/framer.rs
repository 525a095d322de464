//! Frame reassembly for byte-stream transports.
//!
//! A TCP stream has no message boundaries: one read can carry half a frame,
//! or three frames and the start of a fourth. `FrameDecoder` buffers bytes
//! and uses the declared length to cut out one structurally complete frame
//! at a time before handing it to [`Frame::decode_bytes`].
//!
//! Bytes that cannot belong to a frame are never dropped silently; each
//! skipped region comes back as a [`Rejected`] item so the caller can report
//! it.

use byteorder::{BigEndian, ByteOrder};
use bytes::{Buf, Bytes, BytesMut};
use tracing::{trace, warn};

use crate::{
    command::Command,
    constants::{ENVELOPE_OVERHEAD, ETX, MAX_FRAME_SIZE, STX},
    error::Error,
    frame::Frame,
};

/// Bytes that could not be turned into a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    /// Why the bytes were rejected
    pub error: Error,

    /// Command byte, when the frame was structurally complete
    pub command: Option<Command>,

    /// The discarded bytes
    pub raw: Bytes,
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_frame_size: usize,
}

impl FrameDecoder {
    /// Create a decoder accepting frames up to the protocol maximum.
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Create a decoder with a custom upper bound on frame size.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4 * 1024),
            max_frame_size,
        }
    }

    /// Append received bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract the next frame or rejected region.
    ///
    /// Returns `None` when more bytes are needed.
    pub fn next_frame(&mut self) -> Option<Result<Frame, Rejected>> {
        let garbage = self
            .buffer
            .iter()
            .position(|&b| b == STX)
            .unwrap_or(self.buffer.len());

        if garbage > 0 {
            let raw = self.buffer.split_to(garbage).freeze();
            warn!(len = raw.len(), "Discarding bytes before start marker");
            return Some(Err(Rejected {
                error: Error::MalformedFrame(format!(
                    "{} bytes before start marker",
                    raw.len()
                )),
                command: None,
                raw,
            }));
        }

        if self.buffer.len() < 3 {
            return None;
        }

        let declared = BigEndian::read_u16(&self.buffer[1..3]) as usize;
        let total = declared + ENVELOPE_OVERHEAD;

        if declared < 2 || total > self.max_frame_size {
            return Some(Err(self.resync(format!(
                "implausible length field {}",
                declared
            ))));
        }

        if self.buffer.len() < total {
            trace!(
                buffered = self.buffer.len(),
                needed = total,
                "Waiting for rest of frame"
            );
            return None;
        }

        if self.buffer[total - 2] != ETX {
            return Some(Err(self.resync(format!(
                "no end marker at offset {} for length {}",
                total - 2,
                declared
            ))));
        }

        let raw = self.buffer.split_to(total).freeze();
        let command = Command::from(raw[3]);

        Some(Frame::decode_bytes(raw.clone()).map_err(|error| Rejected {
            error,
            command: Some(command),
            raw,
        }))
    }

    /// Drop the start byte so scanning resumes at the next candidate.
    fn resync(&mut self, reason: String) -> Rejected {
        let raw = Bytes::copy_from_slice(&self.buffer[..1]);
        self.buffer.advance(1);

        warn!(reason = %reason, "Resynchronising frame stream");

        Rejected {
            error: Error::MalformedFrame(reason),
            command: None,
            raw,
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
