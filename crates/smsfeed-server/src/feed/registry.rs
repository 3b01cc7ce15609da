//! Registry of live viewers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use smsfeed_core::ConnectionId;

use super::sink::ViewerSink;

/// A registered viewer: identity plus its delivery sink. Cheap to clone.
#[derive(Clone)]
pub struct ViewerHandle {
    id: ConnectionId,
    sink: Arc<dyn ViewerSink>,
}

impl ViewerHandle {
    /// Wrap `sink` under a freshly generated connection id.
    pub fn new(sink: Arc<dyn ViewerSink>) -> Self {
        Self {
            id: ConnectionId::new(),
            sink,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn sink(&self) -> &Arc<dyn ViewerSink> {
        &self.sink
    }
}

impl std::fmt::Debug for ViewerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerHandle").field("id", &self.id).finish()
    }
}

struct Entry {
    seq: u64,
    handle: ViewerHandle,
}

/// Concurrent set of live viewers.
///
/// Shard locks are held only while copying entries out, so a snapshot can be
/// iterated (and awaited on) while viewers connect and disconnect.
pub struct ConnectionRegistry {
    viewers: DashMap<ConnectionId, Entry>,
    next_seq: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            viewers: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Register a viewer. Ids are unique at creation, so a handle is added
    /// at most once.
    pub fn add(&self, handle: ViewerHandle) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let replaced = self
            .viewers
            .insert(handle.id.clone(), Entry { seq, handle });
        debug_assert!(replaced.is_none(), "viewer registered twice");
    }

    /// Remove a viewer. Removing an absent id is a no-op; returns whether
    /// this call did the removal.
    pub fn remove(&self, id: &ConnectionId) -> bool {
        self.viewers.remove(id).is_some()
    }

    /// Point-in-time copy of the membership, in registration order.
    pub fn snapshot(&self) -> Vec<ViewerHandle> {
        let mut entries: Vec<(u64, ViewerHandle)> = self
            .viewers
            .iter()
            .map(|e| (e.seq, e.handle.clone()))
            .collect();
        entries.sort_unstable_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, handle)| handle).collect()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.viewers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
