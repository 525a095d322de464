//! Session configuration

use std::collections::HashSet;
use std::time::Duration;

use sepay_core::Command;
use sepay_core::constants::{DEFAULT_RETRY_BACKOFF_MS, DEFAULT_TIMEOUT, MAX_FRAME_SIZE, MAX_RETRIES};

/// Tunables for a [`Terminal`](crate::Terminal) session
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use sepay::Config;
///
/// let config = Config::default()
///     .with_timeout(Duration::from_secs(30))
///     .with_nack_retries(1)
///     .with_extended_mode(true);
/// assert_eq!(config.nack_retries, 1);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Deadline for a request, from first write to response
    pub timeout: Duration,

    /// Resends after a NACK before giving up
    pub nack_retries: usize,

    /// Pause before each resend
    pub retry_backoff: Duration,

    /// Commands that skip the ACK stage even in extended mode
    pub simple_commands: HashSet<Command>,

    /// Negotiate extended mode during `connect`
    pub negotiate_extended_mode: bool,

    /// Upper bound on an inbound frame
    pub max_frame_size: usize,
}

impl Config {
    /// Set response timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set NACK retry bound
    pub fn with_nack_retries(mut self, retries: usize) -> Self {
        self.nack_retries = retries;
        self
    }

    /// Set pause before resending a NACKed frame
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Replace the simple command set
    pub fn with_simple_commands(mut self, commands: impl IntoIterator<Item = Command>) -> Self {
        self.simple_commands = commands.into_iter().collect();
        self
    }

    /// Negotiate extended mode on connect
    pub fn with_extended_mode(mut self, enabled: bool) -> Self {
        self.negotiate_extended_mode = enabled;
        self
    }

    /// Set inbound frame size limit
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Check if a command bypasses the ACK stage
    pub fn is_simple(&self, command: Command) -> bool {
        self.simple_commands.contains(&command)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT),
            nack_retries: MAX_RETRIES,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            simple_commands: [
                Command::ENQUIRY,
                Command::TRANSACTION_STATUS,
                Command::ENABLE_EXTENDED_MODE,
            ]
            .into_iter()
            .collect(),
            negotiate_extended_mode: false,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}
