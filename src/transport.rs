//! TCP transport with length-delimited framing
//!
//! One frame carries one JSON payload; the four-byte length prefix keeps
//! record boundaries intact regardless of how the stream is segmented.

use crate::channel::{Channel, ChannelError, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// Connects length-delimited TCP channels to a fixed receiver address
#[derive(Debug, Clone)]
pub struct TcpTransport {
    addr: String,
}

impl TcpTransport {
    /// Create a transport for `host:port`
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// The receiver address this transport dials
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self) -> Result<Box<dyn Channel>, ChannelError> {
        let stream = TcpStream::connect(&self.addr).await?;
        tracing::debug!(addr = %self.addr, "connected to receiver");
        Ok(Box::new(TcpChannel {
            framed: Framed::new(stream, LengthDelimitedCodec::new()),
        }))
    }
}

/// One framed TCP connection
pub struct TcpChannel {
    framed: Framed<TcpStream, LengthDelimitedCodec>,
}

#[async_trait]
impl Channel for TcpChannel {
    async fn send(&mut self, payload: &[u8]) -> Result<(), ChannelError> {
        self.framed
            .send(Bytes::copy_from_slice(payload))
            .await
            .map_err(ChannelError::Io)
    }

    async fn recv(&mut self, timeout: Duration) -> Result<Vec<u8>, ChannelError> {
        match tokio::time::timeout(timeout, self.framed.next()).await {
            Err(_) => Err(ChannelError::Timeout(timeout)),
            Ok(None) => Err(ChannelError::Closed),
            Ok(Some(Ok(frame))) => Ok(frame.to_vec()),
            Ok(Some(Err(e))) => Err(ChannelError::Io(e)),
        }
    }
}
