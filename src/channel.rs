//! Channel capability and the lock-step discipline guard
//!
//! A channel is a bare request/reply message pipe: send a payload, then
//! receive exactly one reply before sending again. [`LockStepLink`] makes
//! that alternation a runtime invariant, so a double send is a detectable
//! programming error instead of a silent hang that poisons the channel.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Channel-level failures
#[derive(Debug, Error)]
pub enum ChannelError {
    /// No reply arrived within the per-attempt timeout (recoverable; drives
    /// the retry schedule)
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// Peer closed the connection
    #[error("channel closed by peer")]
    Closed,

    /// Transport-level I/O failure
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Request/reply alternation was violated
    #[error("lock-step violation: {0}")]
    LockStep(&'static str),

    /// The reply answers a different request than the one in flight
    #[error("protocol desync: awaiting reply for {expected}, got {got}")]
    Desync {
        /// Request id the session is awaiting
        expected: String,
        /// Request id the reply actually echoed
        got: String,
    },

    /// The reply could not be decoded
    #[error("malformed reply: {0}")]
    Malformed(String),
}

impl ChannelError {
    /// Everything except a per-attempt timeout is fatal for the session
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ChannelError::Timeout(_))
    }
}

/// A raw request/reply message channel
///
/// Implementations only move bytes; framing, alternation, and payload
/// semantics live above this trait.
#[async_trait]
pub trait Channel: Send {
    /// Send one payload
    async fn send(&mut self, payload: &[u8]) -> Result<(), ChannelError>;

    /// Receive one payload, waiting at most `timeout`
    async fn recv(&mut self, timeout: Duration) -> Result<Vec<u8>, ChannelError>;
}

/// Connects channels for sessions
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a fresh channel to the receiver
    async fn connect(&self) -> Result<Box<dyn Channel>, ChannelError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    /// A request may be sent
    Ready,
    /// A reply to the previous send is outstanding
    AwaitingReply,
}

/// Runtime guard enforcing strict send/receive alternation on a channel
///
/// A timed-out receive abandons the outstanding reply and returns the link
/// to the sendable state, which is what makes an idempotent resend of the
/// same logical request legal.
pub struct LockStepLink {
    inner: Box<dyn Channel>,
    state: LinkState,
}

impl LockStepLink {
    /// Wrap a channel in the alternation guard
    pub fn new(channel: Box<dyn Channel>) -> Self {
        Self {
            inner: channel,
            state: LinkState::Ready,
        }
    }

    /// Send one request payload
    ///
    /// Fails with [`ChannelError::LockStep`] if a reply is still outstanding.
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), ChannelError> {
        if self.state == LinkState::AwaitingReply {
            return Err(ChannelError::LockStep(
                "send while a reply is outstanding",
            ));
        }
        self.inner.send(payload).await?;
        self.state = LinkState::AwaitingReply;
        Ok(())
    }

    /// Receive the reply to the previous send
    ///
    /// Fails with [`ChannelError::LockStep`] if nothing is in flight.
    pub async fn recv(&mut self, timeout: Duration) -> Result<Vec<u8>, ChannelError> {
        if self.state == LinkState::Ready {
            return Err(ChannelError::LockStep("recv with no request in flight"));
        }
        match self.inner.recv(timeout).await {
            Ok(payload) => {
                self.state = LinkState::Ready;
                Ok(payload)
            }
            Err(e @ ChannelError::Timeout(_)) => {
                // The outstanding reply is considered lost; the caller may
                // resend the same logical request.
                self.state = LinkState::Ready;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Recover the underlying channel (for serial reuse across sessions)
    pub fn into_inner(self) -> Box<dyn Channel> {
        self.inner
    }
}

impl std::fmt::Debug for LockStepLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockStepLink")
            .field("state", &self.state)
            .finish()
    }
}
