//! Transport over an already-open byte stream
//!
//! Useful for serial adapters and for driving a session against an
//! in-memory peer.

use async_trait::async_trait;
use tracing::debug;

use crate::{BoxStream, ByteStream, Transport, error::*};

/// Hands out a pre-connected stream exactly once
pub struct StreamTransport {
    label: String,
    stream: Option<BoxStream>,
}

impl StreamTransport {
    /// Wrap a connected stream
    pub fn new(stream: impl ByteStream + 'static) -> Self {
        Self::with_label(stream, "stream")
    }

    /// Wrap a connected stream with a name used in logs
    pub fn with_label(stream: impl ByteStream + 'static, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            stream: Some(Box::new(stream)),
        }
    }

    /// Check if the stream has not been handed out yet
    pub fn is_available(&self) -> bool {
        self.stream.is_some()
    }
}

#[async_trait]
impl Transport for StreamTransport {
    async fn connect(&mut self) -> Result<BoxStream> {
        // A wrapped stream cannot be reopened once consumed
        let stream = self.stream.take().ok_or(Error::AlreadyConnected)?;
        debug!("Attached to {}", self.label);
        Ok(stream)
    }

    fn remote_addr(&self) -> String {
        self.label.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_stream_transport_hands_out_once() {
        let (client, mut peer) = tokio::io::duplex(64);
        let mut transport = StreamTransport::with_label(client, "duplex");

        assert!(transport.is_available());
        let mut stream = transport.connect().await.unwrap();
        assert!(!transport.is_available());

        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        assert!(matches!(transport.connect().await, Err(Error::AlreadyConnected)));
        assert_eq!(transport.remote_addr(), "duplex");
    }

    #[tokio::test]
    async fn test_boxed_as_dyn_transport() {
        let (client, _peer) = tokio::io::duplex(64);
        let mut transport: Box<dyn Transport> = Box::new(StreamTransport::new(client));

        assert!(transport.connect().await.is_ok());
        assert_eq!(transport.remote_addr(), "stream");
    }
}
