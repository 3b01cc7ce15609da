//! Fan-out of one payload to every live viewer.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use smsfeed_core::{FeedEvent, Message};

use super::registry::{ConnectionRegistry, ViewerHandle};
use super::sink::DeliveryError;

/// Outcome of one `publish` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Viewers in the snapshot; each was attempted exactly once.
    pub attempted: usize,
    pub delivered: usize,
    /// Viewers this pass removed from the registry. Can be lower than the
    /// failure count when a viewer disconnected on its own mid-pass.
    pub pruned: usize,
}

impl PublishReport {
    pub fn failed(&self) -> usize {
        self.attempted - self.delivered
    }
}

/// Delivers payloads to a snapshot of the registry and drops viewers that fail.
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    delivery_timeout: Duration,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>, delivery_timeout: Duration) -> Self {
        Self {
            registry,
            delivery_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Deliver `payload` to every viewer registered at the moment of the call.
    ///
    /// Deliveries run concurrently, each bounded by the delivery timeout, so a
    /// stalled viewer costs at most one timeout for the whole pass. Viewers that
    /// fail are removed after every delivery has finished. Never retries.
    pub async fn publish(&self, payload: Arc<str>) -> PublishReport {
        let viewers = self.registry.snapshot();
        let attempted = viewers.len();

        let outcomes = join_all(
            viewers
                .iter()
                .map(|viewer| self.deliver_one(viewer, Arc::clone(&payload))),
        )
        .await;

        let mut report = PublishReport {
            attempted,
            ..PublishReport::default()
        };
        for (viewer, outcome) in viewers.iter().zip(outcomes) {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    if self.registry.remove(viewer.id()) {
                        report.pruned += 1;
                    }
                    match e {
                        DeliveryError::Closed => {
                            debug!(conn_id = %viewer.id(), "viewer gone, pruned")
                        }
                        other => {
                            warn!(conn_id = %viewer.id(), error = %other, "delivery failed, viewer pruned")
                        }
                    }
                }
            }
        }

        debug!(
            attempted = report.attempted,
            delivered = report.delivered,
            pruned = report.pruned,
            "broadcast pass complete"
        );
        report
    }

    /// Publish a `message.created` event carrying `message` and its rendered row.
    pub async fn publish_message(&self, message: &Message, html: String) -> PublishReport {
        let event = FeedEvent::MessageCreated { message, html };
        match event.to_json() {
            Ok(json) => self.publish(Arc::from(json)).await,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "failed to serialize feed event");
                PublishReport::default()
            }
        }
    }

    async fn deliver_one(
        &self,
        viewer: &ViewerHandle,
        payload: Arc<str>,
    ) -> Result<(), DeliveryError> {
        match tokio::time::timeout(self.delivery_timeout, viewer.sink().deliver(payload)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(self.delivery_timeout)),
        }
    }
}
