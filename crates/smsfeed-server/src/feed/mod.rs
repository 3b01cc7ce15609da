//! Live fan-out to connected viewers.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `sink` | `ViewerSink` delivery seam + channel-backed implementation |
//! | `registry` | Concurrent set of live viewers with copy-on-read snapshots |
//! | `broadcast` | Snapshot, deliver to every viewer with a timeout, prune failures |
//! | `socket` | Per-viewer WebSocket session: writer, reader, heartbeat |
//!
//! ## Data Flow
//!
//! ingest → `Broadcaster::publish` → `ConnectionRegistry::snapshot` →
//! `ViewerSink::deliver` → viewer's channel → `socket` writer → client.

pub mod broadcast;
pub mod registry;
pub mod sink;
pub mod socket;

pub use broadcast::{Broadcaster, PublishReport};
pub use registry::{ConnectionRegistry, ViewerHandle};
pub use sink::{ChannelSink, DeliveryError, ViewerSink};
