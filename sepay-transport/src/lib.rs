//! Transport layer for the Sepay protocol
//!
//! A transport only opens an ordered, reliable, bidirectional byte stream.
//! Framing, correlation and timeouts belong to the session on top of it.

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Error, Result};
pub use stream::StreamTransport;
pub use tcp::TcpTransport;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Byte stream handed from a transport to a session
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ByteStream for T {}

/// Boxed byte stream
pub type BoxStream = Box<dyn ByteStream>;

/// Transport trait for different communication methods
///
/// Only `Send` is required; a session keeps its transport behind an async
/// mutex.
#[async_trait]
pub trait Transport: Send {
    /// Open a connection to the terminal
    ///
    /// The returned stream is owned exclusively by the caller; dropping it
    /// closes the connection.
    async fn connect(&mut self) -> Result<BoxStream>;

    /// Get remote address
    fn remote_addr(&self) -> String;
}
