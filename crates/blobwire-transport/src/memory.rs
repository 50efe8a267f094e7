//! In-process message channel.
//!
//! A `MemoryChannel`/`MemoryReceiver` pair behaves like an open, ordered,
//! message-oriented data channel whose send buffer is the unbounded queue
//! between the two halves. Bytes count as buffered from the moment `send`
//! accepts them until the receiver takes the message, so a slow consumer
//! produces real backpressure on the sender.

use crate::transport::{
    MessageChannel, MessageSource, TransportError, TransportResult, TransportStats,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc};

#[derive(Debug, Default)]
struct Shared {
    closed: AtomicBool,
    buffered: AtomicUsize,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    send_errors: AtomicU64,
}

/// Sending half of an in-process channel.
pub struct MemoryChannel {
    label: String,
    tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    shared: Arc<Shared>,
    max_message_size: Option<usize>,
}

/// Receiving half of an in-process channel.
pub struct MemoryReceiver {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    shared: Arc<Shared>,
}

/// Create a connected channel pair with no message size limit.
#[must_use]
pub fn memory_channel(label: impl Into<String>) -> (MemoryChannel, MemoryReceiver) {
    build(label.into(), None)
}

/// Create a connected channel pair that rejects messages larger than
/// `max_message_size` bytes, like an SCTP association would.
#[must_use]
pub fn memory_channel_with_limit(
    label: impl Into<String>,
    max_message_size: usize,
) -> (MemoryChannel, MemoryReceiver) {
    build(label.into(), Some(max_message_size))
}

fn build(label: String, max_message_size: Option<usize>) -> (MemoryChannel, MemoryReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared::default());

    let channel = MemoryChannel {
        label,
        tx: Mutex::new(Some(tx)),
        shared: Arc::clone(&shared),
        max_message_size,
    };
    let receiver = MemoryReceiver { rx, shared };

    (channel, receiver)
}

impl MemoryChannel {
    fn fail(&self, err: TransportError) -> TransportError {
        self.shared.send_errors.fetch_add(1, Ordering::Relaxed);
        err
    }
}

#[async_trait]
impl MessageChannel for MemoryChannel {
    async fn send(&self, message: &[u8]) -> TransportResult<()> {
        if self.is_closed() {
            return Err(self.fail(TransportError::Closed));
        }

        if let Some(max) = self.max_message_size {
            if message.len() > max {
                return Err(self.fail(TransportError::Rejected(format!(
                    "message of {} bytes exceeds limit of {} bytes",
                    message.len(),
                    max
                ))));
            }
        }

        let guard = self.tx.lock().await;
        let Some(tx) = guard.as_ref() else {
            return Err(self.fail(TransportError::Closed));
        };

        // Count before handing off so the receiver never observes an underflow.
        self.shared
            .buffered
            .fetch_add(message.len(), Ordering::AcqRel);
        if tx.send(message.to_vec()).is_err() {
            self.shared
                .buffered
                .fetch_sub(message.len(), Ordering::AcqRel);
            self.shared.closed.store(true, Ordering::Release);
            return Err(self.fail(TransportError::Closed));
        }

        self.shared
            .bytes_sent
            .fetch_add(message.len() as u64, Ordering::Relaxed);
        self.shared.messages_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn buffered_amount(&self) -> usize {
        self.shared.buffered.load(Ordering::Acquire)
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    async fn close(&self) -> TransportResult<()> {
        self.shared.closed.store(true, Ordering::Release);
        // Dropping the sender lets the receiver drain what is queued, then end.
        self.tx.lock().await.take();
        tracing::debug!(channel = %self.label, "memory channel closed");
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        TransportStats {
            bytes_sent: self.shared.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.shared.bytes_received.load(Ordering::Relaxed),
            messages_sent: self.shared.messages_sent.load(Ordering::Relaxed),
            messages_received: self.shared.messages_received.load(Ordering::Relaxed),
            send_errors: self.shared.send_errors.load(Ordering::Relaxed),
        }
    }
}

impl MemoryReceiver {
    fn account(&self, message: &[u8]) {
        self.shared
            .buffered
            .fetch_sub(message.len(), Ordering::AcqRel);
        self.shared
            .bytes_received
            .fetch_add(message.len() as u64, Ordering::Relaxed);
        self.shared.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Take the next queued message without waiting.
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        let message = self.rx.try_recv().ok()?;
        self.account(&message);
        Some(message)
    }
}

#[async_trait]
impl MessageSource for MemoryReceiver {
    async fn recv(&mut self) -> Option<Vec<u8>> {
        let message = self.rx.recv().await?;
        self.account(&message);
        Some(message)
    }
}

impl Drop for MemoryReceiver {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_buffered_amount_tracks_queue() {
        let (channel, mut receiver) = memory_channel("image");

        channel.send(&[0u8; 100]).await.unwrap();
        channel.send(&[0u8; 50]).await.unwrap();
        assert_eq!(channel.buffered_amount().await, 150);

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.len(), 100);
        assert_eq!(channel.buffered_amount().await, 50);

        receiver.try_recv().unwrap();
        assert_eq!(channel.buffered_amount().await, 0);
    }

    #[tokio::test]
    async fn test_messages_arrive_in_order() {
        let (channel, mut receiver) = memory_channel("video");

        for i in 0u8..10 {
            channel.send(&[i]).await.unwrap();
        }

        for i in 0u8..10 {
            assert_eq!(receiver.recv().await.unwrap(), vec![i]);
        }
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let (channel, mut receiver) = memory_channel("image");

        channel.send(b"last").await.unwrap();
        channel.close().await.unwrap();

        assert!(channel.is_closed());
        assert!(matches!(
            channel.send(b"late").await,
            Err(TransportError::Closed)
        ));

        assert_eq!(receiver.recv().await.unwrap(), b"last".to_vec());
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_receiver_closes_channel() {
        let (channel, receiver) = memory_channel("image");
        drop(receiver);

        assert!(channel.is_closed());
        assert!(matches!(
            channel.send(b"x").await,
            Err(TransportError::Closed)
        ));
        assert_eq!(channel.stats().send_errors, 1);
    }

    #[tokio::test]
    async fn test_message_limit() {
        let (channel, _receiver) = memory_channel_with_limit("image", 8);

        channel.send(&[1u8; 8]).await.unwrap();
        let err = channel.send(&[1u8; 9]).await.unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));
        assert_eq!(channel.buffered_amount().await, 8);
    }

    #[tokio::test]
    async fn test_stats() {
        let (channel, mut receiver) = memory_channel("image");

        channel.send(&[0u8; 10]).await.unwrap();
        channel.send(&[0u8; 20]).await.unwrap();
        receiver.recv().await.unwrap();

        let stats = channel.stats();
        assert_eq!(stats.bytes_sent, 30);
        assert_eq!(stats.messages_sent, 2);
        assert_eq!(stats.bytes_received, 10);
        assert_eq!(stats.messages_received, 1);
        assert_eq!(channel.label(), "image");
    }
}
