//! The queue descriptor ("reviver").
//!
//! A small serializable description of the query that produced the queue.
//! It is persisted in settings and replayed on restart and on every page
//! fetch, with the page offset (and under native shuffle, the sort order)
//! substituted at request time.
//!
//! Queries come from a closed registry of [`QueryKind`]s rather than named
//! functions, so a stale persisted descriptor fails validation instead of
//! dispatching into nothing.

use bridge_traits::catalog::{ListRequest, QueryKind};
use serde::{Deserialize, Serialize};

use crate::error::{QueueError, Result};

/// Sort-order token the server interprets as "random order".
pub const RANDOM_SORT_ORDER: &str = "Random";

/// Persistable description of the query behind the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviverDescriptor {
    /// Stable cache-key components identifying the query.
    pub key: Vec<String>,
    pub kind: QueryKind,
    /// Page size used for every fetch of this queue.
    pub page_size: u32,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    /// Kind-specific argument: genre name, playlist id, album id, or search
    /// term.
    pub term: Option<String>,
}

impl ReviverDescriptor {
    /// Check the descriptor is complete for its kind.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(QueueError::InvalidDescriptor(
                "page size must be positive".to_string(),
            ));
        }
        if self.kind.requires_term() && self.term.as_deref().unwrap_or("").is_empty() {
            return Err(QueueError::InvalidDescriptor(format!(
                "{:?} requires a term argument",
                self.kind
            )));
        }
        Ok(())
    }

    /// Whether the server can shuffle this query itself.
    pub fn supports_native_shuffle(&self) -> bool {
        self.kind.supports_server_shuffle()
    }

    /// Build the request for one page.
    ///
    /// Under native shuffle the stored sort order is replaced by the random
    /// token; everything else is carried verbatim.
    pub fn list_request(&self, page: u32, native_shuffle: bool) -> ListRequest {
        let sort_order = if native_shuffle {
            Some(RANDOM_SORT_ORDER.to_string())
        } else {
            self.sort_order.clone()
        };
        ListRequest {
            kind: self.kind,
            start_index: page.saturating_mul(self.page_size),
            limit: self.page_size,
            sort_by: self.sort_by.clone(),
            sort_order,
            term: self.term.clone(),
        }
    }

    /// Serialize for the settings store.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a persisted descriptor and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let descriptor: Self = serde_json::from_str(json)?;
        descriptor.validate()?;
        Ok(descriptor)
    }
}
