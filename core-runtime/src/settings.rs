//! # Persisted Player Settings
//!
//! One explicit settings struct owned by the player, loaded once at startup
//! and written through to the [`SettingsStore`] on every change. Components
//! read the in-memory copy; nothing reads storage keys ad hoc.
//!
//! The queue descriptor (the serialized query that rebuilds the queue after a
//! restart) is stored here as opaque JSON; its schema belongs to the queue
//! layer.

use std::sync::Arc;

use bridge_traits::storage::SettingsStore;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::Result;

/// Storage keys for the persisted settings.
mod keys {
    pub const VOLUME: &str = "volume";
    pub const SHUFFLE: &str = "shuffle";
    pub const REPEAT_MODE: &str = "repeat_mode";
    pub const CROSSFADE_ENABLED: &str = "crossfade_enabled";
    pub const CROSSFADE_SECS: &str = "crossfade_secs";
    pub const PRELOAD_ENABLED: &str = "preload_enabled";
    pub const PRELOAD_SECS: &str = "preload_secs";
    pub const BITRATE: &str = "bitrate";
    pub const MAX_ARTWORK_WIDTH: &str = "max_artwork_width";
    pub const CURRENT_TRACK_INDEX: &str = "current_track_index";
    pub const QUEUE_TITLE: &str = "queue_title";
    pub const QUEUE_URL: &str = "queue_url";
    pub const REVIVER: &str = "reviver";
    pub const REVIVER_PAGE: &str = "reviver_page";
    pub const WARN_BEFORE_QUEUE_OVERWRITE: &str = "warn_before_queue_overwrite";
}

/// Repeat behavior at track and queue boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    /// Wrap to the first track after the last.
    All,
    /// Replay the current track indefinitely.
    One,
}

impl RepeatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::Off => "off",
            RepeatMode::All => "all",
            RepeatMode::One => "one",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "off" => Some(RepeatMode::Off),
            "all" => Some(RepeatMode::All),
            "one" => Some(RepeatMode::One),
            _ => None,
        }
    }

    /// The order the repeat button cycles through.
    pub fn next(&self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::All,
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::Off,
        }
    }
}

/// The full persisted player state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSettings {
    /// Output volume in `[0.0, 1.0]`.
    pub volume: f64,
    pub shuffle: bool,
    pub repeat: RepeatMode,
    pub crossfade_enabled: bool,
    /// Crossfade window in seconds before track end.
    pub crossfade_secs: f64,
    pub preload_enabled: bool,
    /// How many seconds before track end the next source is prepared.
    pub preload_secs: f64,
    /// Requested stream bitrate in bits/s; `None` means source quality.
    pub bitrate: Option<u32>,
    /// Width cap for artwork requests, in pixels.
    pub max_artwork_width: u32,
    /// Active queue position; `-1` means nothing selected.
    pub current_track_index: i64,
    /// Display title of the persisted queue.
    pub queue_title: Option<String>,
    /// Bookmark URL of the page the queue came from.
    pub queue_url: Option<String>,
    /// Serialized queue descriptor (JSON), owned by the queue layer.
    pub reviver_json: Option<String>,
    /// Page offset to replay when reviving the queue.
    pub reviver_page: u32,
    /// Ask before replacing a queue containing unplayed manual additions.
    pub warn_before_queue_overwrite: bool,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            shuffle: false,
            repeat: RepeatMode::Off,
            crossfade_enabled: false,
            crossfade_secs: 1.0,
            preload_enabled: true,
            preload_secs: 6.0,
            bitrate: None,
            max_artwork_width: 800,
            current_track_index: -1,
            queue_title: None,
            queue_url: None,
            reviver_json: None,
            reviver_page: 0,
            warn_before_queue_overwrite: true,
        }
    }
}

/// Write-through handle around [`PlayerSettings`].
///
/// Every setter updates the in-memory copy first and then persists the
/// changed key, so a crash between the two at worst loses the very last
/// change.
pub struct SettingsHandle {
    store: Arc<dyn SettingsStore>,
    state: RwLock<PlayerSettings>,
}

impl SettingsHandle {
    /// Load settings from the store, falling back to defaults for missing or
    /// unparsable keys.
    pub async fn load(store: Arc<dyn SettingsStore>) -> Result<Self> {
        let defaults = PlayerSettings::default();

        let repeat = match store.get_string(keys::REPEAT_MODE).await? {
            Some(raw) => RepeatMode::parse(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "Unknown repeat mode in settings, using default");
                defaults.repeat
            }),
            None => defaults.repeat,
        };

        let bitrate = store
            .get_i64(keys::BITRATE)
            .await?
            .and_then(|v| u32::try_from(v).ok());

        let settings = PlayerSettings {
            volume: store
                .get_f64(keys::VOLUME)
                .await?
                .unwrap_or(defaults.volume)
                .clamp(0.0, 1.0),
            shuffle: store
                .get_bool(keys::SHUFFLE)
                .await?
                .unwrap_or(defaults.shuffle),
            repeat,
            crossfade_enabled: store
                .get_bool(keys::CROSSFADE_ENABLED)
                .await?
                .unwrap_or(defaults.crossfade_enabled),
            crossfade_secs: store
                .get_f64(keys::CROSSFADE_SECS)
                .await?
                .unwrap_or(defaults.crossfade_secs),
            preload_enabled: store
                .get_bool(keys::PRELOAD_ENABLED)
                .await?
                .unwrap_or(defaults.preload_enabled),
            preload_secs: store
                .get_f64(keys::PRELOAD_SECS)
                .await?
                .unwrap_or(defaults.preload_secs),
            bitrate,
            max_artwork_width: store
                .get_i64(keys::MAX_ARTWORK_WIDTH)
                .await?
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(defaults.max_artwork_width),
            current_track_index: store
                .get_i64(keys::CURRENT_TRACK_INDEX)
                .await?
                .unwrap_or(defaults.current_track_index),
            queue_title: store.get_string(keys::QUEUE_TITLE).await?,
            queue_url: store.get_string(keys::QUEUE_URL).await?,
            reviver_json: store.get_string(keys::REVIVER).await?,
            reviver_page: store
                .get_i64(keys::REVIVER_PAGE)
                .await?
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(defaults.reviver_page),
            warn_before_queue_overwrite: store
                .get_bool(keys::WARN_BEFORE_QUEUE_OVERWRITE)
                .await?
                .unwrap_or(defaults.warn_before_queue_overwrite),
        };

        Ok(Self {
            store,
            state: RwLock::new(settings),
        })
    }

    /// Current settings snapshot.
    pub async fn snapshot(&self) -> PlayerSettings {
        self.state.read().await.clone()
    }

    pub async fn volume(&self) -> f64 {
        self.state.read().await.volume
    }

    pub async fn set_volume(&self, volume: f64) -> Result<()> {
        let volume = volume.clamp(0.0, 1.0);
        self.state.write().await.volume = volume;
        self.store.set_f64(keys::VOLUME, volume).await?;
        Ok(())
    }

    pub async fn shuffle(&self) -> bool {
        self.state.read().await.shuffle
    }

    pub async fn set_shuffle(&self, shuffle: bool) -> Result<()> {
        self.state.write().await.shuffle = shuffle;
        self.store.set_bool(keys::SHUFFLE, shuffle).await?;
        Ok(())
    }

    pub async fn repeat(&self) -> RepeatMode {
        self.state.read().await.repeat
    }

    pub async fn set_repeat(&self, repeat: RepeatMode) -> Result<()> {
        self.state.write().await.repeat = repeat;
        self.store
            .set_string(keys::REPEAT_MODE, repeat.as_str())
            .await?;
        Ok(())
    }

    pub async fn set_crossfade(&self, enabled: bool, secs: f64) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.crossfade_enabled = enabled;
            state.crossfade_secs = secs;
        }
        self.store.set_bool(keys::CROSSFADE_ENABLED, enabled).await?;
        self.store.set_f64(keys::CROSSFADE_SECS, secs).await?;
        Ok(())
    }

    pub async fn set_preload(&self, enabled: bool, secs: f64) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.preload_enabled = enabled;
            state.preload_secs = secs;
        }
        self.store.set_bool(keys::PRELOAD_ENABLED, enabled).await?;
        self.store.set_f64(keys::PRELOAD_SECS, secs).await?;
        Ok(())
    }

    pub async fn set_bitrate(&self, bitrate: Option<u32>) -> Result<()> {
        self.state.write().await.bitrate = bitrate;
        match bitrate {
            Some(rate) => self.store.set_i64(keys::BITRATE, rate as i64).await?,
            None => self.store.delete(keys::BITRATE).await?,
        }
        Ok(())
    }

    pub async fn set_max_artwork_width(&self, width: u32) -> Result<()> {
        self.state.write().await.max_artwork_width = width;
        self.store
            .set_i64(keys::MAX_ARTWORK_WIDTH, width as i64)
            .await?;
        Ok(())
    }

    pub async fn current_track_index(&self) -> i64 {
        self.state.read().await.current_track_index
    }

    pub async fn set_current_track_index(&self, index: i64) -> Result<()> {
        self.state.write().await.current_track_index = index;
        self.store.set_i64(keys::CURRENT_TRACK_INDEX, index).await?;
        Ok(())
    }

    pub async fn set_reviver_page(&self, page: u32) -> Result<()> {
        self.state.write().await.reviver_page = page;
        self.store.set_i64(keys::REVIVER_PAGE, page as i64).await?;
        Ok(())
    }

    pub async fn set_warn_before_queue_overwrite(&self, warn: bool) -> Result<()> {
        self.state.write().await.warn_before_queue_overwrite = warn;
        self.store
            .set_bool(keys::WARN_BEFORE_QUEUE_OVERWRITE, warn)
            .await?;
        Ok(())
    }

    /// Replace the persisted queue identity atomically: title, bookmark URL,
    /// descriptor, page offset, and position all change together.
    pub async fn replace_queue_descriptor(
        &self,
        title: Option<&str>,
        url: Option<&str>,
        reviver_json: Option<&str>,
        current_index: i64,
    ) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.queue_title = title.map(str::to_string);
            state.queue_url = url.map(str::to_string);
            state.reviver_json = reviver_json.map(str::to_string);
            state.reviver_page = 0;
            state.current_track_index = current_index;
        }

        let mut tx = self.store.begin_transaction().await?;
        match title {
            Some(title) => tx.set_string(keys::QUEUE_TITLE, title).await?,
            None => tx.delete(keys::QUEUE_TITLE).await?,
        }
        match url {
            Some(url) => tx.set_string(keys::QUEUE_URL, url).await?,
            None => tx.delete(keys::QUEUE_URL).await?,
        }
        match reviver_json {
            Some(json) => tx.set_string(keys::REVIVER, json).await?,
            None => tx.delete(keys::REVIVER).await?,
        }
        tx.set_string(keys::REVIVER_PAGE, "0").await?;
        tx.set_string(keys::CURRENT_TRACK_INDEX, &current_index.to_string())
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

impl std::fmt::Debug for SettingsHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::storage::SettingsTransaction;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory store for exercising the write-through behavior.
    #[derive(Default)]
    struct MemoryStore {
        values: Mutex<HashMap<String, String>>,
    }

    impl MemoryStore {
        fn set(&self, key: &str, value: String) {
            self.values.lock().unwrap().insert(key.to_string(), value);
        }

        fn get(&self, key: &str) -> Option<String> {
            self.values.lock().unwrap().get(key).cloned()
        }
    }

    #[async_trait]
    impl SettingsStore for MemoryStore {
        async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
            self.set(key, value.to_string());
            Ok(())
        }

        async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
            Ok(self.get(key))
        }

        async fn set_bool(&self, key: &str, value: bool) -> BridgeResult<()> {
            self.set(key, value.to_string());
            Ok(())
        }

        async fn get_bool(&self, key: &str) -> BridgeResult<Option<bool>> {
            Ok(self.get(key).and_then(|v| v.parse().ok()))
        }

        async fn set_i64(&self, key: &str, value: i64) -> BridgeResult<()> {
            self.set(key, value.to_string());
            Ok(())
        }

        async fn get_i64(&self, key: &str) -> BridgeResult<Option<i64>> {
            Ok(self.get(key).and_then(|v| v.parse().ok()))
        }

        async fn set_f64(&self, key: &str, value: f64) -> BridgeResult<()> {
            self.set(key, value.to_string());
            Ok(())
        }

        async fn get_f64(&self, key: &str) -> BridgeResult<Option<f64>> {
            Ok(self.get(key).and_then(|v| v.parse().ok()))
        }

        async fn delete(&self, key: &str) -> BridgeResult<()> {
            self.values.lock().unwrap().remove(key);
            Ok(())
        }

        async fn has_key(&self, key: &str) -> BridgeResult<bool> {
            Ok(self.values.lock().unwrap().contains_key(key))
        }

        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(self.values.lock().unwrap().keys().cloned().collect())
        }

        async fn clear_all(&self) -> BridgeResult<()> {
            self.values.lock().unwrap().clear();
            Ok(())
        }

        async fn begin_transaction(
            &self,
        ) -> BridgeResult<Box<dyn SettingsTransaction + Send>> {
            Ok(Box::new(MemoryTransaction {
                pending: Vec::new(),
                target: self.values.lock().unwrap().clone(),
            }))
        }
    }

    struct MemoryTransaction {
        pending: Vec<(String, Option<String>)>,
        target: HashMap<String, String>,
    }

    #[async_trait]
    impl SettingsTransaction for MemoryTransaction {
        async fn set_string(&mut self, key: &str, value: &str) -> BridgeResult<()> {
            self.pending.push((key.to_string(), Some(value.to_string())));
            Ok(())
        }

        async fn delete(&mut self, key: &str) -> BridgeResult<()> {
            self.pending.push((key.to_string(), None));
            Ok(())
        }

        async fn commit(self: Box<Self>) -> BridgeResult<()> {
            // The simple memory transaction drops its buffered writes; the
            // handle tests below assert through the in-memory state instead.
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> BridgeResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn load_uses_defaults_for_missing_keys() {
        let store = Arc::new(MemoryStore::default());
        let handle = SettingsHandle::load(store).await.unwrap();
        let settings = handle.snapshot().await;

        assert_eq!(settings, PlayerSettings::default());
        assert_eq!(settings.crossfade_secs, 1.0);
        assert_eq!(settings.preload_secs, 6.0);
        assert_eq!(settings.max_artwork_width, 800);
        assert_eq!(settings.current_track_index, -1);
    }

    #[tokio::test]
    async fn setters_write_through_to_store() {
        let store = Arc::new(MemoryStore::default());
        let handle = SettingsHandle::load(Arc::clone(&store) as Arc<dyn SettingsStore>)
            .await
            .unwrap();

        handle.set_volume(0.4).await.unwrap();
        handle.set_shuffle(true).await.unwrap();
        handle.set_repeat(RepeatMode::All).await.unwrap();
        handle.set_current_track_index(5).await.unwrap();

        assert_eq!(store.get("volume"), Some("0.4".to_string()));
        assert_eq!(store.get("shuffle"), Some("true".to_string()));
        assert_eq!(store.get("repeat_mode"), Some("all".to_string()));
        assert_eq!(store.get("current_track_index"), Some("5".to_string()));
    }

    #[tokio::test]
    async fn volume_is_clamped() {
        let store = Arc::new(MemoryStore::default());
        let handle = SettingsHandle::load(store).await.unwrap();

        handle.set_volume(1.7).await.unwrap();
        assert_eq!(handle.volume().await, 1.0);

        handle.set_volume(-0.3).await.unwrap();
        assert_eq!(handle.volume().await, 0.0);
    }

    #[tokio::test]
    async fn clearing_bitrate_deletes_the_key() {
        let store = Arc::new(MemoryStore::default());
        let handle = SettingsHandle::load(Arc::clone(&store) as Arc<dyn SettingsStore>)
            .await
            .unwrap();

        handle.set_bitrate(Some(192_000)).await.unwrap();
        assert_eq!(store.get("bitrate"), Some("192000".to_string()));

        handle.set_bitrate(None).await.unwrap();
        assert_eq!(store.get("bitrate"), None);
    }

    #[tokio::test]
    async fn unknown_repeat_mode_falls_back_to_default() {
        let store = Arc::new(MemoryStore::default());
        store.set("repeat_mode", "sideways".to_string());

        let handle = SettingsHandle::load(store).await.unwrap();
        assert_eq!(handle.repeat().await, RepeatMode::Off);
    }

    #[tokio::test]
    async fn replace_queue_descriptor_updates_memory_state() {
        let store = Arc::new(MemoryStore::default());
        let handle = SettingsHandle::load(store).await.unwrap();

        handle
            .replace_queue_descriptor(
                Some("Favorites"),
                Some("/favorites"),
                Some(r#"{"kind":"FavoriteTracks"}"#),
                0,
            )
            .await
            .unwrap();

        let settings = handle.snapshot().await;
        assert_eq!(settings.queue_title.as_deref(), Some("Favorites"));
        assert_eq!(settings.reviver_page, 0);
        assert_eq!(settings.current_track_index, 0);
    }

    #[test]
    fn repeat_mode_cycle_order() {
        assert_eq!(RepeatMode::Off.next(), RepeatMode::All);
        assert_eq!(RepeatMode::All.next(), RepeatMode::One);
        assert_eq!(RepeatMode::One.next(), RepeatMode::Off);
    }

    #[test]
    fn repeat_mode_serde_uses_lowercase() {
        let json = serde_json::to_string(&RepeatMode::All).unwrap();
        assert_eq!(json, "\"all\"");
        let back: RepeatMode = serde_json::from_str("\"one\"").unwrap();
        assert_eq!(back, RepeatMode::One);
    }
}
