//! Session state for the Sepay protocol
//!
//! A session represents one connection to a terminal and tracks:
//! - Whether a transport is attached
//! - Whether extended (acknowledged) mode has been negotiated

use std::sync::Arc;

use crate::error::{Error, Result};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected
    Disconnected,

    /// Connected, commands are answered directly
    Connected,

    /// Connected and extended mode negotiated: non-simple commands are ACKed first
    Extended,
}

/// Session manager
///
/// Thread-safe and can be cloned cheaply (Arc internally).
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<parking_lot::RwLock<SessionState>>,
}

impl Session {
    /// Create a new disconnected session
    pub fn new() -> Self {
        Self {
            inner: Arc::new(parking_lot::RwLock::new(SessionState::Disconnected)),
        }
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        *self.inner.read()
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        !matches!(self.state(), SessionState::Disconnected)
    }

    /// Check if extended mode is active
    pub fn is_extended(&self) -> bool {
        matches!(self.state(), SessionState::Extended)
    }

    /// Mark the session connected
    pub fn initialize(&self) -> Result<()> {
        let mut state = self.inner.write();

        if *state != SessionState::Disconnected {
            return Err(Error::InvalidSessionState(format!(
                "Cannot initialize from state: {:?}",
                *state
            )));
        }

        *state = SessionState::Connected;
        Ok(())
    }

    /// Mark extended mode as negotiated
    pub fn enable_extended(&self) -> Result<()> {
        let mut state = self.inner.write();

        match *state {
            SessionState::Connected | SessionState::Extended => {
                *state = SessionState::Extended;
                Ok(())
            }
            SessionState::Disconnected => Err(Error::InvalidSessionState(
                "Cannot enable extended mode while disconnected".into(),
            )),
        }
    }

    /// Close session
    ///
    /// Returns `true` if the session was connected.
    pub fn close(&self) -> bool {
        let mut state = self.inner.write();
        let was_connected = *state != SessionState::Disconnected;
        *state = SessionState::Disconnected;
        was_connected
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_new() {
        let session = Session::new();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.is_connected());
        assert!(!session.is_extended());
    }

    #[test]
    fn test_session_initialize() {
        let session = Session::new();
        session.initialize().unwrap();

        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.is_connected());
        assert!(!session.is_extended());
    }

    #[test]
    fn test_session_enable_extended() {
        let session = Session::new();
        session.initialize().unwrap();
        session.enable_extended().unwrap();

        assert!(session.is_extended());
        assert!(session.is_connected());

        // Renegotiating is harmless
        session.enable_extended().unwrap();
        assert!(session.is_extended());
    }

    #[test]
    fn test_session_close() {
        let session = Session::new();
        session.initialize().unwrap();
        session.enable_extended().unwrap();

        assert!(session.close());
        assert_eq!(session.state(), SessionState::Disconnected);

        // Closing twice is a no-op
        assert!(!session.close());
    }

    #[test]
    fn test_invalid_state_transitions() {
        let session = Session::new();

        // Cannot enter extended mode without connecting
        assert!(session.enable_extended().is_err());

        // Cannot initialize twice
        session.initialize().unwrap();
        assert!(session.initialize().is_err());
    }

    #[test]
    fn test_session_clone() {
        let session1 = Session::new();
        session1.initialize().unwrap();

        let session2 = session1.clone();
        session1.enable_extended().unwrap();

        // Both share same state
        assert!(session2.is_extended());
    }
}
