//! Sepay protocol command (opcode) definitions

use std::fmt;

/// Protocol command code
///
/// The wire carries a single opcode byte. The terminal's catalog is defined by
/// the terminal firmware, so any byte is a valid command; the constants below
/// name the opcodes this library knows about.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Command(pub u8);

impl Command {
    /// Start a payment transaction
    pub const START_TRANSACTION: Self = Self(0x01);

    /// Query the status of a transaction by reference
    pub const TRANSACTION_STATUS: Self = Self(0x03);

    /// Enquiry (terminal status check)
    pub const ENQUIRY: Self = Self(0x05);

    /// Positive acknowledgment (extended mode)
    pub const ACK: Self = Self(0x06);

    /// Negative acknowledgment (extended mode)
    pub const NACK: Self = Self(0x15);

    /// Switch the terminal into extended (acknowledged) mode
    pub const ENABLE_EXTENDED_MODE: Self = Self(0x95);

    /// Raw opcode byte
    pub const fn code(self) -> u8 {
        self.0
    }

    /// Check if this is one of the reserved handshake opcodes
    pub fn is_control(self) -> bool {
        matches!(self, Self::ACK | Self::NACK)
    }

    /// Get command name
    pub fn name(self) -> &'static str {
        match self {
            Self::START_TRANSACTION => "START_TRANSACTION",
            Self::TRANSACTION_STATUS => "TRANSACTION_STATUS",
            Self::ENQUIRY => "ENQ",
            Self::ACK => "ACK",
            Self::NACK => "NACK",
            Self::ENABLE_EXTENDED_MODE => "ENABLE_EXTENDED_MODE",
            _ => "CMD_UNKNOWN",
        }
    }
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> u8 {
        cmd.0
    }
}

impl From<u8> for Command {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), self.0)
    }
}
