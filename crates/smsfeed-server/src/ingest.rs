//! Authenticated write path: persist, then fan out.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use smsfeed_core::Message;
use smsfeed_store::{MessageStore, StoreError};

use crate::feed::{Broadcaster, PublishReport};
use crate::history::HistoryRenderer;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid or missing API key")]
    Unauthorized,

    #[error("message store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

pub struct IngestService {
    store: Arc<dyn MessageStore>,
    broadcaster: Arc<Broadcaster>,
    renderer: Arc<HistoryRenderer>,
    api_key: SecretString,
}

impl IngestService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        broadcaster: Arc<Broadcaster>,
        renderer: Arc<HistoryRenderer>,
        api_key: SecretString,
    ) -> Self {
        Self {
            store,
            broadcaster,
            renderer,
            api_key,
        }
    }

    /// Check the credential, persist the message, then broadcast it.
    ///
    /// A rejected credential touches neither the store nor the viewers. Once
    /// the insert succeeds the call succeeds, whatever the broadcast outcome.
    pub async fn submit(
        &self,
        sender: &str,
        text: &str,
        credential: Option<&str>,
    ) -> Result<Message, IngestError> {
        if !self.authorize(credential) {
            warn!(has_credential = credential.is_some(), "rejected publish with bad API key");
            return Err(IngestError::Unauthorized);
        }

        let message = self.store.insert(sender, text).await?;
        info!(message_id = %message.id, sender = %message.sender, "message stored");

        let report = self.broadcast(&message).await;
        debug!(
            message_id = %message.id,
            delivered = report.delivered,
            pruned = report.pruned,
            "message broadcast"
        );
        Ok(message)
    }

    async fn broadcast(&self, message: &Message) -> PublishReport {
        self.broadcaster
            .publish_message(message, self.renderer.row(message))
            .await
    }

    fn authorize(&self, credential: Option<&str>) -> bool {
        credential.is_some_and(|given| {
            constant_time_eq(given.as_bytes(), self.api_key.expose_secret().as_bytes())
        })
    }
}

/// Length-revealing but otherwise timing-independent byte comparison.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
