//! Paged backing store for the queue.
//!
//! The queue keeps tracks in the pages they were fetched in; consumers see a
//! single flat ordering via global indices. Reorders flatten, edit, and
//! re-split back to the original page sizes so page boundaries stay stable
//! for later fetches.

use crate::error::{QueueError, Result};
use crate::item::QueueItem;

/// Pages of queue items plus an end-of-list marker.
#[derive(Debug, Clone, Default)]
pub struct PagedTracks {
    pages: Vec<Vec<QueueItem>>,
    /// Set once a fetch returned an empty page; no further pages exist.
    exhausted: bool,
}

impl PagedTracks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of items across all pages.
    pub fn len(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(Vec::is_empty)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn set_exhausted(&mut self, exhausted: bool) {
        self.exhausted = exhausted;
    }

    /// Append a fetched page. An empty page marks the list exhausted.
    pub fn push_page(&mut self, page: Vec<QueueItem>) {
        if page.is_empty() {
            self.exhausted = true;
            return;
        }
        self.pages.push(page);
    }

    /// Item at a global (flat) index.
    pub fn get(&self, index: usize) -> Option<&QueueItem> {
        let (page, offset) = self.locate(index)?;
        self.pages[page].get(offset)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut QueueItem> {
        let (page, offset) = self.locate(index)?;
        self.pages[page].get_mut(offset)
    }

    /// Iterate all items in flat order.
    pub fn iter(&self) -> impl Iterator<Item = &QueueItem> {
        self.pages.iter().flatten()
    }

    /// Clone all items into a flat list.
    pub fn flatten(&self) -> Vec<QueueItem> {
        self.iter().cloned().collect()
    }

    /// Map a global index to `(page, offset)`.
    fn locate(&self, index: usize) -> Option<(usize, usize)> {
        let mut remaining = index;
        for (page_idx, page) in self.pages.iter().enumerate() {
            if remaining < page.len() {
                return Some((page_idx, remaining));
            }
            remaining -= page.len();
        }
        None
    }

    /// Flatten, let `edit` rewrite the flat order, and re-split to the
    /// original page sizes.
    ///
    /// `edit` must preserve the item count; page boundaries are positional,
    /// so every item ends up in the page whose slot range covers its new
    /// position.
    pub fn reorder_flat<F>(&mut self, edit: F)
    where
        F: FnOnce(&mut Vec<QueueItem>),
    {
        let sizes: Vec<usize> = self.pages.iter().map(Vec::len).collect();
        let mut flat: Vec<QueueItem> = self.pages.drain(..).flatten().collect();
        let expected = flat.len();
        edit(&mut flat);
        debug_assert_eq!(flat.len(), expected, "reorder must preserve item count");

        let mut iter = flat.into_iter();
        self.pages = sizes
            .into_iter()
            .map(|size| iter.by_ref().take(size).collect())
            .collect();
    }

    /// Move the item at `from` so it sits at `to` in the flat order.
    ///
    /// Every item receives a fresh order id: a reorder invalidates all
    /// previously observed play-order identities, not just the moved one.
    pub fn move_item(&mut self, from: usize, to: usize) -> Result<()> {
        let len = self.len();
        if from >= len {
            return Err(QueueError::IndexOutOfRange { index: from, len });
        }
        if to >= len {
            return Err(QueueError::IndexOutOfRange { index: to, len });
        }
        if from == to {
            return Ok(());
        }

        self.reorder_flat(|flat| {
            let item = flat.remove(from);
            flat.insert(to, item);
            for item in flat.iter_mut() {
                item.order_id = crate::item::OrderId::new();
            }
        });
        Ok(())
    }
}
