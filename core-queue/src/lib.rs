//! # Track Queue
//!
//! The queue state machine for the playback core: an ordered, paged list of
//! tracks with a current position, shuffle and repeat semantics, and a
//! persistable descriptor (the "reviver") that can rebuild the queue from the
//! server after a restart.
//!
//! ## Overview
//!
//! - [`item`] - Queue items and their per-appearance play-order identity
//! - [`pages`] - The paged backing store and its flatten/re-split operations
//! - [`reviver`] - The serializable query descriptor and its page requests
//! - [`queue`] - The [`TrackQueue`](queue::TrackQueue) state machine itself
//!
//! The queue is pure state: it never performs I/O. Fetching pages, resolving
//! sources, and persisting settings happen in `core-service`, driven by the
//! outcomes the queue returns.

pub mod error;
pub mod item;
pub mod pages;
pub mod queue;
pub mod reviver;

pub use error::{QueueError, Result};
pub use item::{OrderId, QueueItem};
pub use pages::PagedTracks;
pub use queue::{
    AdvanceOutcome, Direction, Repeat, ReplaceOutcome, ReplaceRequest, ShuffleOutcome, TrackQueue,
};
pub use reviver::ReviverDescriptor;
