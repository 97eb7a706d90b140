//! Shared test doubles for the service tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bridge_traits::{
    catalog::{CatalogClient, ListRequest, StreamSelection, Track, TrackPage},
    error::{BridgeError, Result as BridgeResult},
    offline::{OfflinePlayable, OfflineStore, StoredSegments},
    output::{AudioOutput, OutputEvent, ReadyState},
    storage::{SettingsStore, SettingsTransaction},
};
use tokio::sync::broadcast;

use crate::deps::PlayerDependencies;
use crate::service::PlayerService;

pub fn track(id: &str, secs: f64) -> Track {
    Track {
        id: id.to_string(),
        title: format!("Track {id}"),
        artists: vec!["Artist".to_string()],
        album: Some("Album".to_string()),
        album_artist: None,
        run_length_secs: secs,
        favorite: false,
        container: Some("flac".to_string()),
        codec: None,
        artwork_item_id: None,
    }
}

// ============================================================================
// Audio output
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum OutputCall {
    SetSource(String),
    ClearSource,
    Play,
    Pause,
    Seek(f64),
    SetVolume(f64),
}

pub struct MockOutput {
    calls: Mutex<Vec<OutputCall>>,
    position: Mutex<f64>,
    duration: Mutex<Option<f64>>,
    has_source: AtomicBool,
    events: broadcast::Sender<OutputEvent>,
}

impl MockOutput {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            position: Mutex::new(0.0),
            duration: Mutex::new(Some(180.0)),
            has_source: AtomicBool::new(false),
            events,
        })
    }

    pub fn calls(&self) -> Vec<OutputCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sources(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                OutputCall::SetSource(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn set_position(&self, secs: f64) {
        *self.position.lock().unwrap() = secs;
    }

    pub fn set_duration(&self, secs: Option<f64>) {
        *self.duration.lock().unwrap() = secs;
    }

    pub fn emit(&self, event: OutputEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl AudioOutput for MockOutput {
    async fn set_source(&self, url: &str) -> BridgeResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(OutputCall::SetSource(url.to_string()));
        self.has_source.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn clear_source(&self) -> BridgeResult<()> {
        self.calls.lock().unwrap().push(OutputCall::ClearSource);
        self.has_source.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn play(&self) -> BridgeResult<()> {
        self.calls.lock().unwrap().push(OutputCall::Play);
        Ok(())
    }

    async fn pause(&self) -> BridgeResult<()> {
        self.calls.lock().unwrap().push(OutputCall::Pause);
        Ok(())
    }

    async fn position(&self) -> f64 {
        *self.position.lock().unwrap()
    }

    async fn duration(&self) -> Option<f64> {
        *self.duration.lock().unwrap()
    }

    async fn seek(&self, position_secs: f64) -> BridgeResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(OutputCall::Seek(position_secs));
        *self.position.lock().unwrap() = position_secs;
        Ok(())
    }

    async fn set_volume(&self, volume: f64) -> BridgeResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(OutputCall::SetVolume(volume));
        Ok(())
    }

    async fn ready_state(&self) -> ReadyState {
        if self.has_source.load(Ordering::SeqCst) {
            ReadyState::Ready
        } else {
            ReadyState::Empty
        }
    }

    async fn has_source(&self) -> bool {
        self.has_source.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<OutputEvent> {
        self.events.subscribe()
    }
}

// ============================================================================
// Catalog
// ============================================================================

pub struct MockCatalog {
    /// Pages keyed by start index.
    pages: Mutex<HashMap<u32, Vec<Track>>>,
    pub fetch_requests: Mutex<Vec<ListRequest>>,
    pub fetch_count: AtomicUsize,
    pub fail_fetch: AtomicBool,
    pub start_reports: Mutex<Vec<String>>,
    pub progress_reports: Mutex<Vec<(String, f64, bool)>>,
    pub stop_reports: Mutex<Vec<(String, f64)>>,
    pub stream_requests: AtomicUsize,
    /// When set, stop reports never complete.
    pub hang_stop_reports: AtomicBool,
}

impl MockCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(HashMap::new()),
            fetch_requests: Mutex::new(Vec::new()),
            fetch_count: AtomicUsize::new(0),
            fail_fetch: AtomicBool::new(false),
            start_reports: Mutex::new(Vec::new()),
            progress_reports: Mutex::new(Vec::new()),
            stop_reports: Mutex::new(Vec::new()),
            stream_requests: AtomicUsize::new(0),
            hang_stop_reports: AtomicBool::new(false),
        })
    }

    pub fn stage_page(&self, start_index: u32, tracks: Vec<Track>) {
        self.pages.lock().unwrap().insert(start_index, tracks);
    }

    pub fn start_reports(&self) -> Vec<String> {
        self.start_reports.lock().unwrap().clone()
    }

    pub fn stop_reports(&self) -> Vec<(String, f64)> {
        self.stop_reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogClient for MockCatalog {
    async fn fetch_list(&self, request: &ListRequest) -> BridgeResult<TrackPage> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.fetch_requests.lock().unwrap().push(request.clone());
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(BridgeError::RequestFailed("staged failure".to_string()));
        }
        let tracks = self
            .pages
            .lock()
            .unwrap()
            .get(&request.start_index)
            .cloned()
            .unwrap_or_default();
        Ok(TrackPage {
            tracks,
            total_count: None,
        })
    }

    async fn stream_url(&self, track_id: &str, selection: StreamSelection) -> BridgeResult<String> {
        self.stream_requests.fetch_add(1, Ordering::SeqCst);
        Ok(match selection {
            StreamSelection::Direct => format!("https://media.test/{track_id}/direct"),
            StreamSelection::Segmented { bitrate } => {
                format!("https://media.test/{track_id}/hls/{bitrate}")
            }
        })
    }

    fn artwork_url(&self, track: &Track, max_width: u32) -> Option<String> {
        track
            .artwork_item_id
            .as_ref()
            .map(|id| format!("https://media.test/art/{id}?w={max_width}"))
    }

    async fn report_playback_start(&self, track_id: &str) -> BridgeResult<()> {
        self.start_reports
            .lock()
            .unwrap()
            .push(track_id.to_string());
        Ok(())
    }

    async fn report_playback_progress(
        &self,
        track_id: &str,
        position_secs: f64,
        paused: bool,
    ) -> BridgeResult<()> {
        self.progress_reports
            .lock()
            .unwrap()
            .push((track_id.to_string(), position_secs, paused));
        Ok(())
    }

    async fn report_playback_stopped(
        &self,
        track_id: &str,
        position_secs: f64,
    ) -> BridgeResult<()> {
        if self.hang_stop_reports.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.stop_reports
            .lock()
            .unwrap()
            .push((track_id.to_string(), position_secs));
        Ok(())
    }
}

// ============================================================================
// Offline store
// ============================================================================

/// An offline store with nothing downloaded.
pub struct NullOffline;

#[async_trait]
impl OfflineStore for NullOffline {
    async fn playable_source(&self, _track_id: &str) -> BridgeResult<Option<OfflinePlayable>> {
        Ok(None)
    }

    async fn stored_segments(&self, _track_id: &str) -> BridgeResult<Option<StoredSegments>> {
        Ok(None)
    }
}

// ============================================================================
// Settings store
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    S(String),
    B(bool),
    I(i64),
    F(f64),
}

pub struct MemorySettings {
    values: Arc<Mutex<HashMap<String, StoredValue>>>,
}

impl MemorySettings {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            values: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn get(&self, key: &str) -> Option<StoredValue> {
        self.values.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), StoredValue::S(value.to_string()));
        Ok(())
    }

    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(match self.get(key) {
            Some(StoredValue::S(value)) => Some(value),
            _ => None,
        })
    }

    async fn set_bool(&self, key: &str, value: bool) -> BridgeResult<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), StoredValue::B(value));
        Ok(())
    }

    async fn get_bool(&self, key: &str) -> BridgeResult<Option<bool>> {
        Ok(match self.get(key) {
            Some(StoredValue::B(value)) => Some(value),
            _ => None,
        })
    }

    async fn set_i64(&self, key: &str, value: i64) -> BridgeResult<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), StoredValue::I(value));
        Ok(())
    }

    async fn get_i64(&self, key: &str) -> BridgeResult<Option<i64>> {
        Ok(match self.get(key) {
            Some(StoredValue::I(value)) => Some(value),
            _ => None,
        })
    }

    async fn set_f64(&self, key: &str, value: f64) -> BridgeResult<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), StoredValue::F(value));
        Ok(())
    }

    async fn get_f64(&self, key: &str) -> BridgeResult<Option<f64>> {
        Ok(match self.get(key) {
            Some(StoredValue::F(value)) => Some(value),
            _ => None,
        })
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }

    async fn has_key(&self, key: &str) -> BridgeResult<bool> {
        Ok(self.values.lock().unwrap().contains_key(key))
    }

    async fn list_keys(&self) -> BridgeResult<Vec<String>> {
        let mut keys: Vec<String> = self.values.lock().unwrap().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn clear_all(&self) -> BridgeResult<()> {
        self.values.lock().unwrap().clear();
        Ok(())
    }

    async fn begin_transaction(&self) -> BridgeResult<Box<dyn SettingsTransaction + Send>> {
        Ok(Box::new(MemoryTransaction {
            values: Arc::clone(&self.values),
            staged: Vec::new(),
        }))
    }
}

struct MemoryTransaction {
    values: Arc<Mutex<HashMap<String, StoredValue>>>,
    /// `None` stages a delete.
    staged: Vec<(String, Option<String>)>,
}

#[async_trait]
impl SettingsTransaction for MemoryTransaction {
    async fn set_string(&mut self, key: &str, value: &str) -> BridgeResult<()> {
        self.staged.push((key.to_string(), Some(value.to_string())));
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> BridgeResult<()> {
        self.staged.push((key.to_string(), None));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> BridgeResult<()> {
        let mut values = self.values.lock().unwrap();
        for (key, value) in self.staged {
            match value {
                Some(value) => {
                    values.insert(key, StoredValue::S(value));
                }
                None => {
                    values.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> BridgeResult<()> {
        Ok(())
    }
}

// ============================================================================
// Service assembly
// ============================================================================

pub struct TestPlayer {
    pub service: PlayerService,
    pub catalog: Arc<MockCatalog>,
    pub outputs: [Arc<MockOutput>; 2],
    pub settings: Arc<MemorySettings>,
}

pub async fn build_player() -> TestPlayer {
    build_player_with(MockCatalog::new()).await
}

pub async fn build_player_with(catalog: Arc<MockCatalog>) -> TestPlayer {
    let outputs = [MockOutput::new(), MockOutput::new()];
    let settings = MemorySettings::new();
    let deps = PlayerDependencies::new(
        Arc::clone(&catalog) as Arc<dyn CatalogClient>,
        Arc::new(NullOffline),
        [
            Arc::clone(&outputs[0]) as Arc<dyn AudioOutput>,
            Arc::clone(&outputs[1]) as Arc<dyn AudioOutput>,
        ],
        Arc::clone(&settings) as Arc<dyn SettingsStore>,
    );
    let service = PlayerService::new(deps).await.unwrap();
    TestPlayer {
        service,
        catalog,
        outputs,
        settings,
    }
}
