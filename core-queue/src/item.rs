//! Queue items and play-order identity.

use bridge_traits::catalog::Track;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one appearance of a track in the queue.
///
/// A track can appear in the queue more than once; the order id tells the
/// appearances apart. Reorders regenerate order ids, so holding one across a
/// reorder is invalid by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A track's appearance in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub track: Track,
    /// Unique per appearance; regenerated on reorder.
    pub order_id: OrderId,
    /// Set for tracks the user enqueued explicitly rather than via a list
    /// query. Feeds the overwrite-confirmation guard.
    pub manually_added: bool,
    /// Index of the fetch page this item arrived in.
    pub page_index: usize,
}

impl QueueItem {
    pub fn new(track: Track, page_index: usize) -> Self {
        Self {
            track,
            order_id: OrderId::new(),
            manually_added: false,
            page_index,
        }
    }

    pub fn manually_added(track: Track, page_index: usize) -> Self {
        Self {
            manually_added: true,
            ..Self::new(track, page_index)
        }
    }
}
