use serde::Serialize;

use crate::message::Message;

/// Envelope pushed to live viewers.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum FeedEvent<'a> {
    /// A message was persisted. `html` is the pre-rendered history row.
    #[serde(rename = "message.created")]
    MessageCreated { message: &'a Message, html: String },
}

impl FeedEvent<'_> {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
