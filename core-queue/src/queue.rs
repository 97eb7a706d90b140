//! The track queue state machine.
//!
//! Pure state: all I/O (page fetches, persistence, playback) is driven from
//! above, steered by the outcome values returned here. The invariants:
//!
//! - The current index is `-1` (nothing selected) or a valid flat index.
//! - Advancing past the loaded end asks for at most one page fetch before
//!   settling on wrap or stop.
//! - Shuffle never reorders already-played items; manual shuffle is applied
//!   at most once per queue identity.

use bridge_traits::catalog::Track;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::error::{QueueError, Result};
use crate::item::QueueItem;
use crate::pages::PagedTracks;
use crate::reviver::ReviverDescriptor;

/// Direction of an advance request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Repeat behavior the advance decision honors.
///
/// Callers holding a persisted repeat setting convert it to this at the
/// call site; the queue itself stays free of settings concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Repeat {
    #[default]
    Off,
    All,
    One,
}

/// What the caller must do after asking the queue to advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The position moved; play the item at this index.
    Moved(usize),
    /// Replay the current item from the start.
    Replay,
    /// The loaded end was reached but more pages may exist: fetch exactly
    /// one page, append it, and advance again.
    NeedsPage,
    /// Repeat-all wrapped; play the item at this index.
    Wrapped(usize),
    /// The definite end was reached. The position is kept.
    Stop,
}

/// A request to replace the whole queue.
#[derive(Debug, Clone)]
pub struct ReplaceRequest {
    /// First page of the new queue.
    pub tracks: Vec<Track>,
    pub title: Option<String>,
    /// Bookmark URL of the page the queue came from.
    pub source_url: Option<String>,
    /// Descriptor for fetching further pages and reviving after restart.
    pub reviver: Option<ReviverDescriptor>,
    /// Position to select in the new queue.
    pub start_index: usize,
    /// Set on re-issue after the caller confirmed discarding unplayed
    /// manual additions.
    pub confirmed: bool,
}

/// Result of a replace request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced,
    /// The queue still holds this many unplayed manually added tracks and
    /// the request was not confirmed. Nothing was changed; re-issue with
    /// `confirmed: true` to proceed.
    ConfirmationRequired { unplayed_manual: usize },
}

/// Result of toggling shuffle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShuffleOutcome {
    /// Shuffle turned off. The current order is kept as-is.
    Disabled,
    /// The query shuffles server-side: refetch the first page in random
    /// order and feed it to [`TrackQueue::apply_native_shuffle`].
    NativeRefetch,
    /// The unplayed suffix was reshuffled in place.
    ManualApplied,
    /// Manual shuffle was already applied to this queue identity; the order
    /// stands.
    AlreadyApplied,
    /// Nothing loaded; only the flag changed.
    Empty,
}

/// The queue itself: paged tracks, a current position, and shuffle state.
#[derive(Debug, Default)]
pub struct TrackQueue {
    pages: PagedTracks,
    /// Flat index of the active item; `-1` means nothing selected.
    current_index: i64,
    title: Option<String>,
    source_url: Option<String>,
    reviver: Option<ReviverDescriptor>,
    shuffle: bool,
    /// Manual shuffle happens at most once per queue identity; replacing the
    /// queue resets this.
    manual_shuffle_applied: bool,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn exhausted(&self) -> bool {
        self.pages.exhausted()
    }

    /// Current flat index, `-1` when nothing is selected.
    pub fn index(&self) -> i64 {
        self.current_index
    }

    pub fn current(&self) -> Option<&QueueItem> {
        usize::try_from(self.current_index)
            .ok()
            .and_then(|idx| self.pages.get(idx))
    }

    pub fn item_at(&self, index: usize) -> Option<&QueueItem> {
        self.pages.get(index)
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    pub fn reviver(&self) -> Option<&ReviverDescriptor> {
        self.reviver.as_ref()
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    /// Flat snapshot of all loaded items.
    pub fn items(&self) -> Vec<QueueItem> {
        self.pages.flatten()
    }

    /// Zero-based index of the next page to fetch.
    pub fn next_page(&self) -> u32 {
        self.pages.page_count() as u32
    }

    /// Number of manually added items after the current position.
    pub fn unplayed_manual_count(&self) -> usize {
        self.pages
            .iter()
            .enumerate()
            .filter(|(idx, item)| (*idx as i64) > self.current_index && item.manually_added)
            .count()
    }

    /// Whether the position is close enough to the loaded end that the next
    /// page should be prefetched.
    pub fn near_end(&self, threshold: usize) -> bool {
        if self.pages.exhausted() || self.current_index < 0 {
            return false;
        }
        let len = self.pages.len();
        let current = self.current_index as usize;
        len > 0 && current < len && len - 1 - current < threshold
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Replace the whole queue.
    ///
    /// When `warn` is set and the queue still holds unplayed manually added
    /// tracks, an unconfirmed request is refused without touching any state.
    pub fn replace(&mut self, request: ReplaceRequest, warn: bool) -> ReplaceOutcome {
        if warn && !request.confirmed {
            let unplayed_manual = self.unplayed_manual_count();
            if unplayed_manual > 0 {
                debug!(unplayed_manual, "Refusing queue replace pending confirmation");
                return ReplaceOutcome::ConfirmationRequired { unplayed_manual };
            }
        }

        let items: Vec<QueueItem> = request
            .tracks
            .into_iter()
            .map(|track| QueueItem::new(track, 0))
            .collect();

        self.pages = PagedTracks::new();
        let track_count = items.len();
        self.pages.push_page(items);
        self.current_index = if track_count == 0 {
            -1
        } else {
            request.start_index.min(track_count - 1) as i64
        };
        self.title = request.title;
        self.source_url = request.source_url;
        self.reviver = request.reviver;
        // A new queue always starts unshuffled; any pending manual-shuffle
        // latch belongs to the old queue identity.
        self.shuffle = false;
        self.manual_shuffle_applied = false;

        ReplaceOutcome::Replaced
    }

    /// Append one fetched page. An empty page marks the queue exhausted.
    pub fn append_page(&mut self, tracks: Vec<Track>) {
        let page_index = self.pages.page_count();
        let items: Vec<QueueItem> = tracks
            .into_iter()
            .map(|track| QueueItem::new(track, page_index))
            .collect();
        debug!(page_index, count = items.len(), "Appending queue page");
        self.pages.push_page(items);
    }

    /// Set the current position. `-1` deselects.
    pub fn set_index(&mut self, index: i64) -> Result<()> {
        if index < -1 || index >= self.pages.len() as i64 {
            return Err(QueueError::IndexOutOfRange {
                index: index.max(0) as usize,
                len: self.pages.len(),
            });
        }
        self.current_index = index;
        Ok(())
    }

    /// Decide the next position without moving yet.
    ///
    /// Repeat-one replays the current position for either direction. The
    /// caller moves the position via [`set_index`](Self::set_index) once it
    /// has a playable target.
    pub fn advance(&self, direction: Direction, repeat: Repeat) -> AdvanceOutcome {
        let len = self.pages.len();
        if len == 0 {
            return AdvanceOutcome::Stop;
        }
        if repeat == Repeat::One && self.current_index >= 0 {
            return AdvanceOutcome::Replay;
        }

        match direction {
            Direction::Forward => {
                let next = self.current_index + 1;
                if next < len as i64 {
                    return AdvanceOutcome::Moved(next as usize);
                }
                if !self.pages.exhausted() {
                    return AdvanceOutcome::NeedsPage;
                }
                if repeat == Repeat::All {
                    return AdvanceOutcome::Wrapped(0);
                }
                AdvanceOutcome::Stop
            }
            Direction::Backward => {
                if self.current_index > 0 {
                    AdvanceOutcome::Moved(self.current_index as usize - 1)
                } else if repeat == Repeat::All {
                    AdvanceOutcome::Wrapped(len - 1)
                } else {
                    AdvanceOutcome::Replay
                }
            }
        }
    }

    /// Restore a persisted shuffle flag without reordering or refetching.
    ///
    /// Used when reviving a queue: the fetched order already reflects the
    /// persisted shuffle state, so only the flag needs carrying over.
    pub fn restore_shuffle(&mut self, enabled: bool) {
        self.shuffle = enabled;
    }

    /// Toggle shuffle using the thread-local RNG.
    pub fn set_shuffle(&mut self, enabled: bool) -> ShuffleOutcome {
        self.set_shuffle_with_rng(enabled, &mut rand::thread_rng())
    }

    /// Toggle shuffle with an explicit RNG (for deterministic tests).
    pub fn set_shuffle_with_rng<R: Rng>(&mut self, enabled: bool, rng: &mut R) -> ShuffleOutcome {
        self.shuffle = enabled;

        if !enabled {
            return ShuffleOutcome::Disabled;
        }
        if self.pages.is_empty() {
            return ShuffleOutcome::Empty;
        }
        if self
            .reviver
            .as_ref()
            .is_some_and(|reviver| reviver.supports_native_shuffle())
        {
            return ShuffleOutcome::NativeRefetch;
        }
        if self.manual_shuffle_applied {
            return ShuffleOutcome::AlreadyApplied;
        }

        // Played items (everything up to and including the current position)
        // keep their order; only the unplayed suffix is reshuffled.
        let pin_end = (self.current_index + 1).max(0) as usize;
        self.pages.reorder_flat(|flat| {
            if pin_end < flat.len() {
                flat[pin_end..].shuffle(rng);
            }
        });
        self.manual_shuffle_applied = true;
        ShuffleOutcome::ManualApplied
    }

    /// Install a randomly ordered first page fetched after
    /// [`ShuffleOutcome::NativeRefetch`], pinning the previously current item
    /// at the front so playback continues uninterrupted.
    pub fn apply_native_shuffle(&mut self, first_page: Vec<Track>) {
        let pinned = self.current().cloned();

        self.pages = PagedTracks::new();
        let mut items: Vec<QueueItem> = Vec::with_capacity(first_page.len() + 1);
        if let Some(pinned) = pinned {
            items.push(pinned);
        }
        let has_pin = !items.is_empty();
        items.extend(
            first_page
                .into_iter()
                .map(|track| QueueItem::new(track, 0)),
        );
        self.pages.push_page(items);
        self.current_index = if has_pin { 0 } else { -1 };
        self.manual_shuffle_applied = false;
    }

    /// Move an item to a new flat position, following the current item if it
    /// was the one moved.
    pub fn move_item(&mut self, from: usize, to: usize) -> Result<()> {
        self.pages.move_item(from, to)?;

        let current = self.current_index;
        if current >= 0 {
            let current = current as usize;
            self.current_index = if from == current {
                to as i64
            } else if from < current && to >= current {
                current as i64 - 1
            } else if from > current && to <= current {
                current as i64 + 1
            } else {
                current as i64
            };
        }
        Ok(())
    }

    /// Flag an item as manually added, feeding the overwrite guard.
    pub fn mark_manually_added(&mut self, index: usize) -> Result<()> {
        let len = self.pages.len();
        let item = self
            .pages
            .get_mut(index)
            .ok_or(QueueError::IndexOutOfRange { index, len })?;
        item.manually_added = true;
        Ok(())
    }

    /// Drop all queue state, keeping nothing selected.
    pub fn clear(&mut self) {
        *self = TrackQueue::new();
    }
}
