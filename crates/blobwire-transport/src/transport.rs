//! Message channel trait abstraction.
//!
//! This module defines the `MessageChannel` trait that abstracts over an open,
//! ordered, message-oriented channel (a WebRTC data channel, a WebSocket, an
//! in-process queue). The chunk pump only needs to hand it whole messages and
//! ask how many bytes are still waiting to go out.

use async_trait::async_trait;

/// Transport layer errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Channel is closed
    #[error("Channel is closed")]
    Closed,

    /// Message rejected by the channel
    #[error("Message rejected: {0}")]
    Rejected(String),

    /// Transport-specific error
    #[error("Transport error: {0}")]
    Other(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Outbound half of a message-oriented channel.
///
/// Implementations deliver each `send` as one discrete message, in order.
/// `buffered_amount` reports the bytes accepted by `send` that have not yet
/// left the local send buffer; it drives sender backpressure.
///
/// # Examples
///
/// ```no_run
/// use blobwire_transport::{MessageChannel, MessageSource, memory_channel};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (channel, mut receiver) = memory_channel("image");
///
/// channel.send(b"hello").await?;
/// assert_eq!(channel.buffered_amount().await, 5);
///
/// let message = receiver.recv().await;
/// assert_eq!(message.as_deref(), Some(&b"hello"[..]));
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Send one message.
    ///
    /// # Errors
    /// Returns `TransportError` if the channel is closed or rejects the message
    async fn send(&self, message: &[u8]) -> TransportResult<()>;

    /// Number of bytes queued locally and not yet transmitted.
    async fn buffered_amount(&self) -> usize;

    /// Channel label (for example `"image"` or `"video"`).
    fn label(&self) -> &str;

    /// Check if the channel is closed.
    fn is_closed(&self) -> bool;

    /// Close the channel.
    ///
    /// After calling this method, all subsequent sends return
    /// `TransportError::Closed`.
    ///
    /// # Errors
    /// Returns `TransportError` if closing fails
    async fn close(&self) -> TransportResult<()>;

    /// Get channel statistics (optional).
    fn stats(&self) -> TransportStats {
        TransportStats::default()
    }
}

/// Inbound half of a message-oriented channel.
#[async_trait]
pub trait MessageSource: Send {
    /// Receive the next message, or `None` once the channel has closed and
    /// every queued message has been drained.
    async fn recv(&mut self) -> Option<Vec<u8>>;
}

/// Transport statistics
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Total messages sent
    pub messages_sent: u64,
    /// Total messages received
    pub messages_received: u64,
    /// Send errors
    pub send_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Closed;
        assert_eq!(err.to_string(), "Channel is closed");

        let err = TransportError::Rejected("too big".to_string());
        assert!(err.to_string().contains("rejected"));

        let err = TransportError::Other("test error".to_string());
        assert_eq!(err.to_string(), "Transport error: test error");
    }
}
