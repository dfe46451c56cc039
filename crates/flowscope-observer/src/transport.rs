//! Response transport seam.
//!
//! The observer core does not know how responses reach clients; endpoints
//! deliver into a [`ResponseStream`]. A send may block on backpressure; a
//! send failure ends the current query without affecting others.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors raised while delivering a response item.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The client went away.
    #[error("client disconnected")]
    Disconnected,

    /// The transport failed to carry the item.
    #[error("send failed: {0}")]
    Send(String),
}

/// A sink for one query's response stream.
#[async_trait]
pub trait ResponseStream<T: Send>: Send {
    /// Deliver one response item. May block on backpressure.
    async fn send(&mut self, item: T) -> Result<(), TransportError>;
}

/// Channel-backed response stream, bridging responses onto an in-process
/// consumer.
#[derive(Debug)]
pub struct ChannelStream<T> {
    sender: mpsc::Sender<T>,
}

impl<T> ChannelStream<T> {
    /// Wrap a channel sender.
    pub fn new(sender: mpsc::Sender<T>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl<T: Send> ResponseStream<T> for ChannelStream<T> {
    async fn send(&mut self, item: T) -> Result<(), TransportError> {
        self.sender
            .send(item)
            .await
            .map_err(|_| TransportError::Disconnected)
    }
}
