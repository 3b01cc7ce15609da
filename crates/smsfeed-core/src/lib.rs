//! Shared domain types for the smsfeed workspace.

pub mod events;
pub mod ids;
pub mod message;

pub use events::FeedEvent;
pub use ids::{ConnectionId, MessageId};
pub use message::Message;
