//! High-level error types

use std::io;
use std::time::Duration;

use sepay_core::Command;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] sepay_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] sepay_transport::Error),

    #[error("Type error: {0}")]
    Types(#[from] sepay_types::Error),

    #[error("Terminal not connected")]
    NotConnected,

    #[error("Terminal already connected")]
    AlreadyConnected,

    /// Correlation is by command byte, so only one request per command may be outstanding
    #[error("A {0} request is already awaiting its response")]
    DuplicateInFlightCommand(Command),

    #[error("Failed to write frame: {0}")]
    TransportWriteError(#[source] io::Error),

    #[error("No response to {command} within {timeout:?}")]
    ResponseTimeout { command: Command, timeout: Duration },

    #[error("{command} rejected by terminal after {attempts} attempts")]
    NegativeAcknowledged { command: Command, attempts: usize },

    #[error("Session closed while request was pending")]
    SessionClosed,

    #[error("Terminal refused extended mode: {0}")]
    ExtendedModeRejected(String),
}

impl Error {
    /// Check if error is recoverable (retry might succeed)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ResponseTimeout { .. }
                | Self::NegativeAcknowledged { .. }
                | Self::TransportWriteError(_)
        )
    }

    /// Check if error requires reconnection
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::SessionClosed
                | Self::TransportWriteError(_)
                | Self::Transport(_)
        )
    }
}
