//! Login-scoped play counter.
//!
//! Counts tracks started during the current login session, persisted so the
//! count survives restarts and cleared on logout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bridge_traits::storage::SettingsStore;
use tracing::debug;

use crate::error::Result;

/// Settings key the counter persists under.
pub const PLAY_COUNT_KEY: &str = "session_play_count";

pub struct SessionCounter {
    store: Arc<dyn SettingsStore>,
    count: AtomicU64,
}

impl SessionCounter {
    /// Load the persisted count, defaulting to zero.
    pub async fn load(store: Arc<dyn SettingsStore>) -> Result<Self> {
        let count = store
            .get_i64(PLAY_COUNT_KEY)
            .await?
            .and_then(|value| u64::try_from(value).ok())
            .unwrap_or(0);
        Ok(Self {
            store,
            count: AtomicU64::new(count),
        })
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Bump the counter and persist the new value.
    pub async fn increment(&self) -> Result<u64> {
        let new = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        self.store.set_i64(PLAY_COUNT_KEY, new as i64).await?;
        debug!(count = new, "Session play count incremented");
        Ok(new)
    }

    /// Zero the counter and remove the persisted key. Called on logout.
    pub async fn reset(&self) -> Result<()> {
        self.count.store(0, Ordering::Release);
        self.store.delete(PLAY_COUNT_KEY).await?;
        debug!("Session play count reset");
        Ok(())
    }
}
