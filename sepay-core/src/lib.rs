//! # sepay-core
//!
//! Core protocol implementation for Sepay point-of-sale terminals.
//!
//! This crate provides the low-level protocol primitives:
//! - Frame structure and encoding/decoding
//! - LRC checksum calculation
//! - Stream reassembly (framer)
//! - Command (opcode) definitions
//! - Protocol constants
//! - Session state

pub mod checksum;
pub mod command;
pub mod constants;
pub mod error;
pub mod frame;
pub mod framer;
pub mod session;

pub use command::Command;
pub use error::{Error, Result};
pub use frame::{Frame, decode, encode};
pub use framer::{FrameDecoder, Rejected};
pub use session::{Session, SessionState};

/// Default terminal port
pub const DEFAULT_PORT: u16 = constants::DEFAULT_PORT;
