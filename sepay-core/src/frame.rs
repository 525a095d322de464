//! Sepay protocol frame structure and encoding/decoding

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use tracing::trace;

use crate::{
    checksum,
    command::Command,
    constants::{ENVELOPE_OVERHEAD, ETX, MAX_PAYLOAD_SIZE, MIN_FRAME_SIZE, SEPARATOR, STX},
    error::{Error, Result},
};

/// Sepay protocol frame
///
/// # Frame Structure
///
/// ```text
/// ┌───────┬──────────┬─────────┬───────────┬───────────┬───────┬───────┐
/// │  STX  │  Length  │ Command │ Separator │  Payload  │  ETX  │  LRC  │
/// │ 0x02  │ 2 bytes  │ 1 byte  │   0x7C    │  N bytes  │ 0x03  │ 1 byte│
/// │       │ (BE u16) │         │           │           │       │       │
/// └───────┴──────────┴─────────┴───────────┴───────────┴───────┴───────┘
/// ```
///
/// `Length` is `2 + N` (command + separator + payload). `LRC` is the XOR of
/// every byte from the first length byte through ETX.
///
/// # Examples
///
/// ```
/// use sepay_core::{Command, Frame};
///
/// let frame = Frame::with_payload(Command::TRANSACTION_STATUS, "AAA-123");
/// let encoded = frame.encode().unwrap();
///
/// let decoded = Frame::decode(&encoded).unwrap();
/// assert_eq!(frame, decoded);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command code
    pub command: Command,

    /// Opaque payload (usually `|`-delimited text)
    pub payload: Bytes,
}

impl Frame {
    /// Maximum payload size
    pub const MAX_PAYLOAD_SIZE: usize = MAX_PAYLOAD_SIZE;

    /// Create a new frame with empty payload
    pub fn new(command: Command) -> Self {
        Self {
            command,
            payload: Bytes::new(),
        }
    }

    /// Create a frame with payload
    ///
    /// # Examples
    ///
    /// ```
    /// use sepay_core::{Command, Frame};
    ///
    /// let frame = Frame::with_payload(Command::START_TRANSACTION, "000000001234|AAA-123|MRCHT45|0");
    /// assert_eq!(frame.length(), 32);
    /// ```
    pub fn with_payload(command: Command, payload: impl Into<Bytes>) -> Self {
        Self {
            command,
            payload: payload.into(),
        }
    }

    /// Value of the length field: command + separator + payload
    pub fn length(&self) -> usize {
        2 + self.payload.len()
    }

    /// Get total frame size on the wire
    pub fn size(&self) -> usize {
        self.length() + ENVELOPE_OVERHEAD
    }

    /// Check if this is an ACK frame
    pub fn is_ack(&self) -> bool {
        self.command == Command::ACK
    }

    /// Check if this is a NACK frame
    pub fn is_nack(&self) -> bool {
        self.command == Command::NACK
    }

    /// Encode frame to bytes
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`] if the payload does not fit the
    /// two-byte length field.
    pub fn encode(&self) -> Result<BytesMut> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::FrameTooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(self.size());

        buf.put_u8(STX);
        buf.put_u16(self.length() as u16);
        buf.put_u8(self.command.code());
        buf.put_u8(SEPARATOR);
        buf.put_slice(&self.payload);
        buf.put_u8(ETX);

        let lrc = checksum::calculate(&buf[1..]);
        buf.put_u8(lrc);

        trace!(
            command = %self.command,
            payload_len = self.payload.len(),
            lrc = format!("0x{:02X}", lrc),
            "Encoded frame"
        );

        Ok(buf)
    }

    /// Decode frame from bytes
    ///
    /// The buffer must hold exactly one frame.
    ///
    /// # Errors
    ///
    /// Checked in this order:
    /// - [`Error::MalformedFrame`] if the buffer is shorter than the minimal frame
    /// - [`Error::MalformedFrame`] if STX or ETX is not where it belongs
    /// - [`Error::LengthMismatch`] if the length field disagrees with the buffer size
    /// - [`Error::ChecksumMismatch`] if the LRC does not verify
    /// - [`Error::MalformedFrame`] if the separator byte is wrong
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let command = validate(buf)?;

        Ok(Self {
            command,
            payload: Bytes::copy_from_slice(&buf[5..buf.len() - 2]),
        })
    }

    /// Decode frame from an owned buffer without copying the payload
    pub fn decode_bytes(buf: Bytes) -> Result<Self> {
        let command = validate(&buf)?;
        let end = buf.len() - 2;

        Ok(Self {
            command,
            payload: buf.slice(5..end),
        })
    }
}

fn validate(buf: &[u8]) -> Result<Command> {
    if buf.len() < MIN_FRAME_SIZE {
        return Err(Error::MalformedFrame(format!(
            "expected at least {} bytes, got {}",
            MIN_FRAME_SIZE,
            buf.len()
        )));
    }

    let len = buf.len();

    if buf[0] != STX {
        return Err(Error::MalformedFrame(format!(
            "expected start marker 0x{:02X}, got 0x{:02X}",
            STX, buf[0]
        )));
    }

    if buf[len - 2] != ETX {
        return Err(Error::MalformedFrame(format!(
            "expected end marker 0x{:02X}, got 0x{:02X}",
            ETX,
            buf[len - 2]
        )));
    }

    let declared = BigEndian::read_u16(&buf[1..3]) as usize;
    let actual = len - ENVELOPE_OVERHEAD;
    if declared != actual {
        return Err(Error::LengthMismatch { declared, actual });
    }

    let received = buf[len - 1];
    let expected = checksum::calculate(&buf[1..len - 1]);
    if expected != received {
        return Err(Error::ChecksumMismatch { expected, received });
    }

    if buf[4] != SEPARATOR {
        return Err(Error::MalformedFrame(format!(
            "expected separator 0x{:02X}, got 0x{:02X}",
            SEPARATOR, buf[4]
        )));
    }

    Ok(Command::from(buf[3]))
}

/// Encode a `(command, payload)` pair into a wire frame
pub fn encode(command: Command, payload: &[u8]) -> Result<BytesMut> {
    Frame::with_payload(command, Bytes::copy_from_slice(payload)).encode()
}

/// Decode exactly one wire frame into its `(command, payload)` pair
pub fn decode(buf: &[u8]) -> Result<(Command, Bytes)> {
    let frame = Frame::decode(buf)?;
    Ok((frame.command, frame.payload))
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("command", &self.command)
            .field("length", &self.length())
            .field("payload", &hex::encode(&self.payload))
            .finish()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame[{}](len={})", self.command, self.payload.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const TRANSACTION_PAYLOAD: &str = "000000001234|AAA-123|MRCHT45|0";

    #[test]
    fn test_frame_new() {
        let frame = Frame::new(Command::ENQUIRY);
        assert_eq!(frame.command, Command::ENQUIRY);
        assert_eq!(frame.payload.len(), 0);
        assert_eq!(frame.length(), 2);
        assert_eq!(frame.size(), 7);
    }

    #[test]
    fn test_encode_enquiry_matches_wire_capture() {
        let encoded = Frame::new(Command::ENQUIRY).encode().unwrap();
        assert_eq!(&encoded[..], &[0x02, 0x00, 0x02, 0x05, 0x7C, 0x03, 0x78]);
    }

    #[test]
    fn test_encode_transaction_frame() {
        let encoded = encode(Command::START_TRANSACTION, TRANSACTION_PAYLOAD.as_bytes()).unwrap();

        assert_eq!(encoded.len(), TRANSACTION_PAYLOAD.len() + 7);
        assert_eq!(encoded[0], STX);
        // 30-byte payload + command + separator
        assert_eq!(&encoded[1..3], &[0x00, 0x20]);
        assert_eq!(encoded[3], 0x01);
        assert_eq!(encoded[4], SEPARATOR);
        assert_eq!(&encoded[5..35], TRANSACTION_PAYLOAD.as_bytes());
        assert_eq!(encoded[35], ETX);
        assert_eq!(encoded[36], 0x0B);
    }

    #[test]
    fn test_decode_transaction_frame() {
        let encoded = encode(Command::START_TRANSACTION, TRANSACTION_PAYLOAD.as_bytes()).unwrap();
        let (command, payload) = decode(&encoded).unwrap();

        assert_eq!(command, Command::START_TRANSACTION);
        assert_eq!(payload.as_ref(), TRANSACTION_PAYLOAD.as_bytes());
    }

    #[test]
    fn test_decode_bytes_shares_buffer() {
        let encoded = Frame::with_payload(Command::TRANSACTION_STATUS, "AAA-123")
            .encode()
            .unwrap()
            .freeze();
        let frame = Frame::decode_bytes(encoded).unwrap();

        assert_eq!(frame.payload.as_ref(), b"AAA-123");
    }

    #[test]
    fn test_decode_too_short() {
        let result = Frame::decode(&[0x02, 0x00, 0x02, 0x05, 0x03, 0x00]);
        assert!(matches!(result, Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn test_decode_missing_start_marker() {
        let mut encoded = Frame::new(Command::ENQUIRY).encode().unwrap();
        encoded[0] = 0xFF;

        assert!(matches!(Frame::decode(&encoded), Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn test_decode_missing_end_marker() {
        let mut encoded = Frame::with_payload(Command::ENQUIRY, "x").encode().unwrap();
        let etx = encoded.len() - 2;
        encoded[etx] = b'y';

        assert!(matches!(Frame::decode(&encoded), Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn test_decode_length_mismatch() {
        // Declares a 1-byte length like the legacy extended-mode request
        let frame = [0x02, 0x00, 0x01, 0x95, 0x7C, 0x03, 0xEB];

        assert_eq!(
            Frame::decode(&frame),
            Err(Error::LengthMismatch { declared: 1, actual: 2 })
        );
    }

    #[test]
    fn test_decode_checksum_mismatch() {
        let mut encoded = Frame::with_payload(Command::TRANSACTION_STATUS, "AAA-123")
            .encode()
            .unwrap();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;

        let result = Frame::decode(&encoded);
        if let Err(Error::ChecksumMismatch { expected, received }) = result {
            assert_ne!(expected, received);
        } else {
            panic!("Expected ChecksumMismatch error");
        }
    }

    #[test]
    fn test_decode_bad_separator() {
        // Valid LRC over a body whose separator is '/' instead of '|'
        let body = [0x00, 0x02, 0x05, b'/', 0x03];
        let mut frame = vec![0x02];
        frame.extend_from_slice(&body);
        frame.push(checksum::calculate(&body));

        assert!(matches!(Frame::decode(&frame), Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn test_encode_too_large() {
        let frame = Frame::with_payload(Command::START_TRANSACTION, vec![b'0'; MAX_PAYLOAD_SIZE + 1]);

        assert_eq!(
            frame.encode(),
            Err(Error::FrameTooLarge {
                size: MAX_PAYLOAD_SIZE + 1,
                max: MAX_PAYLOAD_SIZE,
            })
        );
    }

    #[test]
    fn test_encode_largest_payload() {
        let frame = Frame::with_payload(Command::START_TRANSACTION, vec![b'0'; MAX_PAYLOAD_SIZE]);
        let encoded = frame.encode().unwrap();

        assert_eq!(&encoded[1..3], &[0xFF, 0xFF]);
        assert_eq!(Frame::decode(&encoded).unwrap(), frame);
    }

    #[test]
    fn test_ack_nack() {
        assert!(Frame::new(Command::ACK).is_ack());
        assert!(Frame::new(Command::NACK).is_nack());
        assert!(!Frame::new(Command::ENQUIRY).is_ack());
    }

    proptest! {
        #[test]
        fn prop_encode_decode(command in any::<u8>(), payload in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let encoded = encode(Command(command), &payload).unwrap();
            let (decoded_command, decoded_payload) = decode(&encoded).unwrap();

            prop_assert_eq!(decoded_command, Command(command));
            prop_assert_eq!(decoded_payload.as_ref(), payload.as_slice());
        }

        #[test]
        fn prop_single_bit_flip_is_detected(
            command in any::<u8>(),
            payload in proptest::collection::vec(any::<u8>(), 0..256),
            position in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let mut encoded = encode(Command(command), &payload).unwrap();
            // Never touch the start marker
            let index = 1 + position.index(encoded.len() - 1);
            encoded[index] ^= 1 << bit;

            let err = Frame::decode(&encoded).unwrap_err();
            prop_assert!(err.is_wire_error(), "unexpected error {:?}", err);
        }
    }
}
