//! Sepay LRC (longitudinal redundancy check)
//!
//! The checksum is the running exclusive-or of every byte from the first
//! length byte through ETX inclusive. The leading STX is never part of it.

use tracing::trace;

/// Calculate the LRC of a byte range
///
/// # Examples
///
/// ```
/// use sepay_core::checksum;
///
/// // LEN_HI, LEN_LO, CMD (ENQ), separator, ETX
/// let lrc = checksum::calculate(&[0x00, 0x02, 0x05, 0x7C, 0x03]);
/// assert_eq!(lrc, 0x78);
/// ```
pub fn calculate(data: &[u8]) -> u8 {
    let lrc = data.iter().fold(0u8, |acc, byte| acc ^ byte);

    trace!(
        len = data.len(),
        lrc = format!("0x{:02X}", lrc),
        "Calculated LRC"
    );

    lrc
}

/// Verify an LRC
pub fn verify(data: &[u8], expected: u8) -> bool {
    calculate(data) == expected
}
