//! # sepay
//!
//! Rust client for Sepay point-of-sale payment terminals.
//!
//! ## Features
//!
//! - Length-prefixed, LRC-checked frame codec
//! - Async/await API using Tokio
//! - Request/response correlation with per-request deadlines
//! - Extended mode ACK/NACK handshake with bounded resends
//!
//! ## Quick Start
//!
//! ```no_run
//! use sepay::{Terminal, TransactionRequest};
//!
//! #[tokio::main]
//! async fn main() -> sepay::Result<()> {
//!     let terminal = Terminal::new("192.168.0.105", 1234);
//!     terminal.connect().await?;
//!
//!     let status = terminal.enquiry().await?;
//!     println!("Terminal status: {}", status);
//!
//!     let request = TransactionRequest::new(1234, "AAA-123").with_merchant_reference("MRCHT45");
//!     let reply = terminal.start_transaction(&request).await?;
//!     println!("Transaction: {}", reply);
//!
//!     terminal.close().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod event;
mod pending;
pub mod terminal;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use event::SessionEvent;
pub use terminal::Terminal;

// Re-export types
pub use sepay_core::{Command, DEFAULT_PORT, Frame, SessionState};
pub use sepay_transport::{StreamTransport, TcpTransport, Transport};
pub use sepay_types::{Fields, TransactionRequest};
