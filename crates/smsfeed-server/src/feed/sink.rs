//! Delivery seam between the broadcaster and a viewer's transport.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Why a payload did not reach a viewer. Always handled by pruning the viewer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("viewer transport closed")]
    Closed,
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
}

/// One viewer's outbound side.
#[async_trait]
pub trait ViewerSink: Send + Sync {
    /// Hand `payload` to the viewer's transport. May wait on backpressure.
    async fn deliver(&self, payload: Arc<str>) -> Result<(), DeliveryError>;
}

/// Sink backed by a bounded channel drained by the viewer's socket writer.
///
/// A full queue suspends `deliver` until the writer catches up; the
/// broadcaster's timeout turns a stalled viewer into a failure.
pub struct ChannelSink {
    tx: mpsc::Sender<Arc<str>>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Arc<str>>) -> Self {
        Self { tx }
    }

    /// Create a sink plus the receiver its socket writer should drain.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl ViewerSink for ChannelSink {
    async fn deliver(&self, payload: Arc<str>) -> Result<(), DeliveryError> {
        self.tx.send(payload).await.map_err(|_| DeliveryError::Closed)
    }
}
