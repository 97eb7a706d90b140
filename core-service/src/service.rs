//! # Player Service
//!
//! The command surface exposed to hosts. One [`PlayerService`] owns the
//! dual-buffer engine, the track queue, persisted settings, and session
//! reporting; UI commands are async methods on the service and state changes
//! flow back through the event bus.
//!
//! ## Concurrency
//!
//! The service is `Clone` and shares one inner state behind an `Arc`. Queue
//! state lives in a `tokio::sync::RwLock`; no lock is held across an await on
//! a bridge call. Each track-changing command opens a new cancellation epoch,
//! cancelling the previous one so stale resolutions never load and in-flight
//! session reports are abandoned instead of delaying the switch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use bridge_traits::{
    catalog::{CatalogClient, Track},
    offline::OfflineStore,
    session::{NowPlaying, TransportState},
};
use core_playback::{
    resolve_source, DecoderConfig, DualBufferEngine, PreparedSource, SegmentedDecoder, SourceMode,
};
use core_queue::{
    AdvanceOutcome, Direction, QueueError, Repeat, ReplaceOutcome, ReplaceRequest,
    ReviverDescriptor, ShuffleOutcome, TrackQueue,
};
use core_runtime::{
    events::{EventBus, EventStream, PlaybackEvent, PlayerEvent, QueueEvent, SessionEvent},
    RepeatMode, SettingsHandle,
};
use core_session::{MediaSessionAdapter, PauseGuard, SessionCounter, SessionReporter};

use crate::deps::PlayerDependencies;
use crate::error::Result;
use crate::format::format_time;

/// How close to the loaded end (in items) the next page is fetched
/// proactively.
pub const NEAR_END_PREFETCH_ITEMS: usize = 5;

// ============================================================================
// Snapshot
// ============================================================================

/// Point-in-time view of the player, for UI rendering.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerSnapshot {
    pub playing: bool,
    pub position_secs: f64,
    pub duration_secs: Option<f64>,
    /// `position_secs` rendered as `m:ss` / `h:mm:ss`.
    pub position_display: String,
    /// Active queue position; `-1` means nothing selected.
    pub current_index: i64,
    pub current_track: Option<Track>,
    pub queue_len: usize,
    pub queue_title: Option<String>,
    pub shuffle: bool,
    pub repeat: RepeatMode,
    pub volume: f64,
    pub play_count: u64,
}

// ============================================================================
// Service
// ============================================================================

pub(crate) struct PlayerInner {
    pub(crate) engine: DualBufferEngine,
    pub(crate) queue: RwLock<TrackQueue>,
    pub(crate) settings: SettingsHandle,
    pub(crate) reporter: SessionReporter,
    pub(crate) counter: SessionCounter,
    pub(crate) media: Option<MediaSessionAdapter>,
    pub(crate) pause_guard: Arc<PauseGuard>,
    pub(crate) events: EventBus,
    pub(crate) catalog: Arc<dyn CatalogClient>,
    pub(crate) offline: Arc<dyn OfflineStore>,
    /// Track-selection epoch; replaced (and the old one cancelled) on every
    /// track-changing command.
    epoch: Mutex<CancellationToken>,
    pub(crate) playing: AtomicBool,
    pub(crate) started: AtomicBool,
    pub(crate) preloading: AtomicBool,
    page_fetching: AtomicBool,
    /// Queue index the standby slot was prepared for, if any.
    pub(crate) preloaded_index: Mutex<Option<usize>>,
}

/// Playback engine façade exposed to host applications.
#[derive(Clone)]
pub struct PlayerService {
    pub(crate) inner: Arc<PlayerInner>,
}

impl PlayerService {
    /// Create a service from the provided dependencies, loading persisted
    /// settings and the session counter.
    pub async fn new(deps: PlayerDependencies) -> Result<Self> {
        let settings = SettingsHandle::load(Arc::clone(&deps.settings_store)).await?;
        let counter = SessionCounter::load(Arc::clone(&deps.settings_store)).await?;
        let reporter = SessionReporter::new(Arc::clone(&deps.catalog));
        let media = deps
            .media_session
            .as_ref()
            .map(|host| MediaSessionAdapter::new(Arc::clone(host)));
        let pause_guard = Arc::new(PauseGuard::new(Arc::clone(&deps.clock)));

        let engine = DualBufferEngine::new(deps.outputs);
        engine.set_volume(settings.volume().await).await?;

        Ok(Self {
            inner: Arc::new(PlayerInner {
                engine,
                queue: RwLock::new(TrackQueue::new()),
                settings,
                reporter,
                counter,
                media,
                pause_guard,
                events: EventBus::default(),
                catalog: deps.catalog,
                offline: deps.offline,
                epoch: Mutex::new(CancellationToken::new()),
                playing: AtomicBool::new(false),
                started: AtomicBool::new(false),
                preloading: AtomicBool::new(false),
                page_fetching: AtomicBool::new(false),
                preloaded_index: Mutex::new(None),
            }),
        })
    }

    /// Spawn the background tasks (slot watchers, progress reporting) and
    /// attach the media-session adapter. Safe to call more than once; only
    /// the first call has an effect.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return;
        }
        for slot in 0..2 {
            let service = self.clone();
            let receiver = self.inner.engine.subscribe_slot(slot);
            tokio::spawn(async move { service.run_slot_watcher(slot, receiver).await });
        }
        let service = self.clone();
        tokio::spawn(async move { service.run_progress_ticker().await });

        if let Some(media) = &self.inner.media {
            media.attach(Arc::new(self.clone()), Arc::clone(&self.inner.pause_guard));
        }
    }

    /// Detach the media session and release both output slots.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.epoch.lock().cancel();
        if let Some(media) = &self.inner.media {
            media.detach()?;
        }
        self.inner.engine.stop_all().await?;
        self.inner.playing.store(false, Ordering::Release);
        Ok(())
    }

    /// Subscribe to player events.
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.inner.events.subscribe())
    }

    pub fn is_playing(&self) -> bool {
        self.inner.playing.load(Ordering::Acquire)
    }

    pub fn play_count(&self) -> u64 {
        self.inner.counter.count()
    }

    pub async fn position(&self) -> f64 {
        self.inner.engine.position().await
    }

    /// Point-in-time view of the player for UI rendering.
    pub async fn snapshot(&self) -> PlayerSnapshot {
        let settings = self.inner.settings.snapshot().await;
        let (current_index, current_track, queue_len, queue_title) = {
            let queue = self.inner.queue.read().await;
            (
                queue.index(),
                queue.current().map(|item| item.track.clone()),
                queue.len(),
                queue.title().map(str::to_string),
            )
        };
        let position_secs = self.inner.engine.position().await;
        PlayerSnapshot {
            playing: self.is_playing(),
            position_secs,
            duration_secs: self.inner.engine.duration().await,
            position_display: format_time(position_secs),
            current_index,
            current_track,
            queue_len,
            queue_title,
            shuffle: settings.shuffle,
            repeat: settings.repeat,
            volume: settings.volume,
            play_count: self.inner.counter.count(),
        }
    }

    // ========================================================================
    // Transport commands
    // ========================================================================

    /// Select a queue position and start playing it.
    pub async fn select_and_play(&self, index: usize) -> Result<()> {
        self.inner.engine.note_user_interaction();
        self.play_at(index).await
    }

    /// Toggle between playing and paused.
    ///
    /// Resuming a track marked for reload re-resolves its source and restores
    /// the prior position first.
    pub async fn toggle_play_pause(&self) -> Result<()> {
        self.inner.engine.note_user_interaction();
        let track_id = self.current_track_id().await;

        if self.is_playing() {
            self.inner.pause_guard.note_user_pause();
            let position = self.inner.engine.position().await;
            self.pause_playback().await?;
            if let Some(track_id) = track_id {
                self.inner
                    .reporter
                    .report_progress(&track_id, position, true, &self.current_epoch())
                    .await;
                self.publish(PlayerEvent::Playback(PlaybackEvent::Paused {
                    track_id,
                    position_secs: position,
                }));
            }
        } else {
            if self.inner.engine.needs_reload() {
                self.resume_with_reload().await?;
            } else {
                self.inner.engine.play().await?;
            }
            self.inner.playing.store(true, Ordering::Release);
            self.set_transport(TransportState::Playing);
            if let Some(track_id) = track_id {
                self.publish(PlayerEvent::Playback(PlaybackEvent::Resumed {
                    track_id,
                    position_secs: self.inner.engine.position().await,
                }));
            }
        }
        Ok(())
    }

    /// Skip forward. Unlike natural track end, a manual skip moves even under
    /// repeat-one.
    pub async fn next_track(&self) -> Result<()> {
        self.inner.engine.note_user_interaction();
        let repeat = self.skip_repeat().await;
        self.advance_and_play(Direction::Forward, repeat).await
    }

    /// Skip backward; at the first track this restarts it unless repeat-all
    /// wraps to the end.
    pub async fn previous_track(&self) -> Result<()> {
        self.inner.engine.note_user_interaction();
        let repeat = self.skip_repeat().await;
        self.advance_and_play(Direction::Backward, repeat).await
    }

    pub async fn seek(&self, position_secs: f64) -> Result<()> {
        self.inner.engine.seek(position_secs).await?;
        Ok(())
    }

    pub async fn set_volume(&self, volume: f64) -> Result<()> {
        let volume = volume.clamp(0.0, 1.0);
        self.inner.engine.set_volume(volume).await?;
        self.inner.settings.set_volume(volume).await?;
        Ok(())
    }

    // ========================================================================
    // Queue commands
    // ========================================================================

    /// Replace the whole queue.
    ///
    /// When the outgoing queue still holds unplayed manually added tracks and
    /// the overwrite warning is enabled, an unconfirmed request returns
    /// [`ReplaceOutcome::ConfirmationRequired`] without touching anything.
    pub async fn replace_queue(&self, request: ReplaceRequest) -> Result<ReplaceOutcome> {
        self.inner.engine.note_user_interaction();
        let warn = self
            .inner
            .settings
            .snapshot()
            .await
            .warn_before_queue_overwrite;

        let (outcome, title, source_url, reviver_json, index, queue_len) = {
            let mut queue = self.inner.queue.write().await;
            let outcome = queue.replace(request, warn);
            if matches!(outcome, ReplaceOutcome::ConfirmationRequired { .. }) {
                return Ok(outcome);
            }
            let reviver_json = match queue.reviver() {
                Some(reviver) => Some(reviver.to_json()?),
                None => None,
            };
            (
                outcome,
                queue.title().map(str::to_string),
                queue.source_url().map(str::to_string),
                reviver_json,
                queue.index(),
                queue.len(),
            )
        };

        self.inner
            .settings
            .replace_queue_descriptor(
                title.as_deref(),
                source_url.as_deref(),
                reviver_json.as_deref(),
                index,
            )
            .await?;
        // A fresh queue always starts unshuffled.
        self.inner.settings.set_shuffle(false).await?;
        self.publish(PlayerEvent::Queue(QueueEvent::Replaced {
            title,
            track_count: queue_len,
        }));

        if index >= 0 {
            self.play_at(index as usize).await?;
        }
        Ok(outcome)
    }

    /// Literal track-list variant of [`replace_queue`](Self::replace_queue):
    /// a single page with no reviver, so the queue cannot grow.
    pub async fn replace_queue_simple(
        &self,
        tracks: Vec<Track>,
        title: Option<String>,
        start_index: usize,
        confirmed: bool,
    ) -> Result<ReplaceOutcome> {
        self.replace_queue(ReplaceRequest {
            tracks,
            title,
            source_url: None,
            reviver: None,
            start_index,
            confirmed,
        })
        .await
    }

    /// Toggle shuffle, refetching in server-random order when the queue's
    /// query supports it and reshuffling the unplayed suffix locally when it
    /// does not.
    pub async fn toggle_shuffle(&self) -> Result<bool> {
        let enabled = !self.inner.settings.shuffle().await;
        let (outcome, reviver) = {
            let mut queue = self.inner.queue.write().await;
            let outcome = queue.set_shuffle(enabled);
            (outcome, queue.reviver().cloned())
        };

        if outcome == ShuffleOutcome::NativeRefetch {
            if let Some(reviver) = reviver {
                let request = reviver.list_request(0, true);
                let tracks = match self.inner.catalog.fetch_list(&request).await {
                    Ok(page) => page.tracks,
                    Err(error) => {
                        warn!(%error, "Shuffled refetch failed; keeping only the current track");
                        Vec::new()
                    }
                };
                let (index, len, title) = {
                    let mut queue = self.inner.queue.write().await;
                    queue.apply_native_shuffle(tracks);
                    (
                        queue.index(),
                        queue.len(),
                        queue.title().map(str::to_string),
                    )
                };
                self.inner.settings.set_reviver_page(0).await?;
                self.inner.settings.set_current_track_index(index).await?;
                self.publish(PlayerEvent::Queue(QueueEvent::Replaced {
                    title,
                    track_count: len,
                }));
            }
        }

        self.inner.settings.set_shuffle(enabled).await?;
        self.publish(PlayerEvent::Queue(QueueEvent::ShuffleChanged { enabled }));
        Ok(enabled)
    }

    /// Cycle repeat off → all → one.
    pub async fn toggle_repeat(&self) -> Result<RepeatMode> {
        let mode = self.inner.settings.repeat().await.next();
        self.inner.settings.set_repeat(mode).await?;
        self.publish(PlayerEvent::Queue(QueueEvent::RepeatChanged {
            mode: mode.as_str().to_string(),
        }));
        Ok(mode)
    }

    /// Move a queue item to a new flat position.
    pub async fn move_item(&self, from: usize, to: usize) -> Result<()> {
        let index = {
            let mut queue = self.inner.queue.write().await;
            queue.move_item(from, to)?;
            queue.index()
        };
        self.inner.settings.set_current_track_index(index).await?;
        self.publish(PlayerEvent::Queue(QueueEvent::ItemMoved { from, to }));
        Ok(())
    }

    /// Flag an item as manually added, feeding the overwrite guard.
    pub async fn mark_manually_added(&self, index: usize) -> Result<()> {
        self.inner.queue.write().await.mark_manually_added(index)?;
        Ok(())
    }

    /// Fetch and append the next page of the queue's query.
    ///
    /// A transient fetch failure appends an empty page, which marks the queue
    /// exhausted; playback is never interrupted by pagination errors.
    pub async fn load_next_page(&self) -> Result<usize> {
        let (reviver, page, native) = {
            let queue = self.inner.queue.read().await;
            if queue.exhausted() {
                return Ok(0);
            }
            let native = queue.shuffle()
                && queue
                    .reviver()
                    .is_some_and(|reviver| reviver.supports_native_shuffle());
            (queue.reviver().cloned(), queue.next_page(), native)
        };

        let tracks = match reviver {
            Some(reviver) => {
                let request = reviver.list_request(page, native);
                match self.inner.catalog.fetch_list(&request).await {
                    Ok(fetched) => fetched.tracks,
                    Err(error) => {
                        warn!(%error, page, "Page fetch failed; treating the queue as exhausted");
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        };

        let count = tracks.len();
        self.inner.queue.write().await.append_page(tracks);
        if count > 0 {
            self.inner.settings.set_reviver_page(page).await?;
        }
        self.publish(PlayerEvent::Queue(QueueEvent::PageAppended {
            page_index: page as usize,
            track_count: count,
        }));
        Ok(count)
    }

    // ========================================================================
    // Lifecycle commands
    // ========================================================================

    /// Rebuild the queue from the persisted reviver and load the last track
    /// into the primary slot without playing it.
    ///
    /// Returns `false` when nothing was persisted.
    pub async fn restore(&self) -> Result<bool> {
        let snapshot = self.inner.settings.snapshot().await;
        let Some(reviver_json) = snapshot.reviver_json.as_deref() else {
            return Ok(false);
        };
        let reviver = ReviverDescriptor::from_json(reviver_json)?;
        let native = snapshot.shuffle && reviver.supports_native_shuffle();

        // Refetch every page up to the persisted offset so the stored index
        // lands inside the loaded range.
        let mut pages: Vec<Vec<Track>> = Vec::new();
        for page in 0..=snapshot.reviver_page {
            let request = reviver.list_request(page, native);
            let tracks = self.inner.catalog.fetch_list(&request).await?.tracks;
            let last = tracks.is_empty();
            pages.push(tracks);
            if last {
                break;
            }
        }

        let (index, track, len, title) = {
            let mut queue = self.inner.queue.write().await;
            let mut iter = pages.into_iter();
            queue.replace(
                ReplaceRequest {
                    tracks: iter.next().unwrap_or_default(),
                    title: snapshot.queue_title.clone(),
                    source_url: snapshot.queue_url.clone(),
                    reviver: Some(reviver),
                    start_index: 0,
                    confirmed: true,
                },
                false,
            );
            for tracks in iter {
                queue.append_page(tracks);
            }
            queue.restore_shuffle(snapshot.shuffle);

            let len = queue.len();
            let index = if len == 0 {
                -1
            } else {
                snapshot.current_track_index.clamp(-1, len as i64 - 1)
            };
            queue.set_index(index)?;
            (
                index,
                queue.current().map(|item| item.track.clone()),
                len,
                queue.title().map(str::to_string),
            )
        };

        if let Some(track) = track {
            let prepared = self.prepare_source(&track).await?;
            self.inner.engine.load_paused(&prepared).await?;
            self.push_metadata(&track).await;
            self.set_transport(TransportState::Paused);
        }

        self.publish(PlayerEvent::Queue(QueueEvent::Replaced {
            title,
            track_count: len,
        }));
        self.publish(PlayerEvent::Queue(QueueEvent::IndexChanged { index }));
        debug!(index, len, "Queue restored from persisted descriptor");
        Ok(true)
    }

    /// Clear all playback state on logout: report the active track stopped,
    /// release the outputs, forget the position, and zero the play counter.
    pub async fn logout_clear(&self) -> Result<()> {
        if let Some(track_id) = self.current_track_id().await {
            let position = self.inner.engine.position().await;
            let epoch = self.current_epoch();
            if self
                .inner
                .reporter
                .report_stopped(&track_id, position, &epoch)
                .await
            {
                self.publish(PlayerEvent::Session(SessionEvent::StopReported {
                    track_id,
                }));
            }
        }
        self.inner.engine.stop_all().await?;
        self.inner.playing.store(false, Ordering::Release);
        self.inner.queue.write().await.clear();
        self.inner.settings.set_current_track_index(-1).await?;
        self.inner.counter.reset().await?;
        self.set_transport(TransportState::None);
        self.publish(PlayerEvent::Queue(QueueEvent::IndexChanged { index: -1 }));
        self.publish(PlayerEvent::Session(SessionEvent::PlayCountChanged {
            count: 0,
        }));
        Ok(())
    }

    // ========================================================================
    // Settings passthroughs
    // ========================================================================

    pub async fn set_crossfade(&self, enabled: bool, secs: f64) -> Result<()> {
        self.inner.settings.set_crossfade(enabled, secs).await?;
        Ok(())
    }

    pub async fn set_preload(&self, enabled: bool, secs: f64) -> Result<()> {
        self.inner.settings.set_preload(enabled, secs).await?;
        Ok(())
    }

    /// Set the requested stream bitrate; `None` means source quality. Takes
    /// effect on the next source resolution.
    pub async fn set_bitrate(&self, bitrate: Option<u32>) -> Result<()> {
        self.inner.settings.set_bitrate(bitrate).await?;
        Ok(())
    }

    pub async fn set_max_artwork_width(&self, width: u32) -> Result<()> {
        self.inner.settings.set_max_artwork_width(width).await?;
        Ok(())
    }

    pub async fn set_warn_before_queue_overwrite(&self, warn: bool) -> Result<()> {
        self.inner
            .settings
            .set_warn_before_queue_overwrite(warn)
            .await?;
        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Manual skips move even under repeat-one.
    async fn skip_repeat(&self) -> Repeat {
        match self.inner.settings.repeat().await {
            RepeatMode::All => Repeat::All,
            RepeatMode::Off | RepeatMode::One => Repeat::Off,
        }
    }

    pub(crate) fn repeat_of(mode: RepeatMode) -> Repeat {
        match mode {
            RepeatMode::Off => Repeat::Off,
            RepeatMode::All => Repeat::All,
            RepeatMode::One => Repeat::One,
        }
    }

    pub(crate) async fn current_track_id(&self) -> Option<String> {
        self.inner
            .queue
            .read()
            .await
            .current()
            .map(|item| item.track.id.clone())
    }

    fn new_epoch(&self) -> CancellationToken {
        let mut epoch = self.inner.epoch.lock();
        epoch.cancel();
        *epoch = CancellationToken::new();
        epoch.clone()
    }

    pub(crate) fn current_epoch(&self) -> CancellationToken {
        self.inner.epoch.lock().clone()
    }

    pub(crate) fn publish(&self, event: PlayerEvent) {
        // No subscribers is not an error.
        let _ = self.inner.events.emit(event);
    }

    pub(crate) fn set_transport(&self, state: TransportState) {
        if let Some(media) = &self.inner.media {
            if let Err(error) = media.update_transport_state(state) {
                warn!(%error, "Failed to mirror transport state to the host");
            }
        }
    }

    pub(crate) async fn push_metadata(&self, track: &Track) {
        let Some(media) = &self.inner.media else {
            return;
        };
        let width = self.inner.settings.snapshot().await.max_artwork_width;
        let now_playing = NowPlaying {
            title: track.title.clone(),
            artist: track.artist_line(),
            album: track.album.clone(),
            artwork_url: self.inner.catalog.artwork_url(track, width),
        };
        if let Err(error) = media.update_metadata(&now_playing) {
            warn!(%error, "Failed to push now-playing metadata");
        }
    }

    /// Resolve and prepare a track's source, wiring stored segments in when
    /// the offline copy is segmented.
    pub(crate) async fn prepare_source(&self, track: &Track) -> Result<PreparedSource> {
        let bitrate = self.inner.settings.snapshot().await.bitrate;
        let resolved = resolve_source(
            track,
            bitrate,
            self.inner.offline.as_ref(),
            self.inner.catalog.as_ref(),
        )
        .await?;
        let config = DecoderConfig::default();

        if resolved.from_offline && resolved.mode == SourceMode::Segmented {
            if let Some(stored) = self.inner.offline.stored_segments(&track.id).await? {
                let decoder =
                    SegmentedDecoder::new(resolved.url.clone(), config).with_stored_segments(stored);
                return Ok(PreparedSource::new(&resolved, config).with_decoder(decoder));
            }
        }
        Ok(PreparedSource::new(&resolved, config))
    }

    /// Switch to `index` and load it into the primary slot.
    pub(crate) async fn play_at(&self, index: usize) -> Result<()> {
        let epoch = self.new_epoch();

        let (previous, track) = {
            let mut queue = self.inner.queue.write().await;
            let previous = queue.current().map(|item| item.track.id.clone());
            queue.set_index(index as i64)?;
            (previous, queue.current().map(|item| item.track.clone()))
        };
        let track = track.ok_or(QueueError::EmptyQueue)?;

        if let Some(previous) = previous.filter(|id| *id != track.id) {
            let position = self.inner.engine.position().await;
            if self
                .inner
                .reporter
                .report_stopped(&previous, position, &epoch)
                .await
            {
                self.publish(PlayerEvent::Session(SessionEvent::StopReported {
                    track_id: previous,
                }));
            }
        }

        let prepared = self.prepare_source(&track).await?;
        if epoch.is_cancelled() {
            debug!(index, track_id = %track.id, "Track selection superseded; dropping load");
            return Ok(());
        }

        *self.inner.preloaded_index.lock() = None;
        self.inner.engine.load_and_play(&prepared).await?;
        self.inner
            .playing
            .store(self.inner.engine.user_interacted(), Ordering::Release);

        self.after_track_started(&track, index as i64, &epoch).await;
        self.maybe_prefetch_page().await;
        Ok(())
    }

    /// Bookkeeping shared by every path that (re)starts a track: persist the
    /// position, report to the server, bump the counter, publish events, and
    /// refresh the host metadata.
    pub(crate) async fn after_track_started(
        &self,
        track: &Track,
        index: i64,
        epoch: &CancellationToken,
    ) {
        if let Err(error) = self.inner.settings.set_current_track_index(index).await {
            warn!(%error, "Failed to persist queue position");
        }

        if self.inner.reporter.report_started(&track.id, epoch).await {
            self.publish(PlayerEvent::Session(SessionEvent::StartReported {
                track_id: track.id.clone(),
            }));
        } else {
            self.publish(PlayerEvent::Session(SessionEvent::ReportFailed {
                track_id: track.id.clone(),
                message: "playback start report failed".to_string(),
            }));
        }

        match self.inner.counter.increment().await {
            Ok(count) => {
                self.publish(PlayerEvent::Session(SessionEvent::PlayCountChanged {
                    count,
                }));
            }
            Err(error) => warn!(%error, "Failed to persist session play count"),
        }

        self.publish(PlayerEvent::Playback(PlaybackEvent::TrackStarted {
            track_id: track.id.clone(),
            title: track.title.clone(),
        }));
        self.publish(PlayerEvent::Queue(QueueEvent::IndexChanged { index }));

        self.push_metadata(track).await;
        self.set_transport(if self.is_playing() {
            TransportState::Playing
        } else {
            TransportState::Paused
        });
    }

    /// Advance the queue and act on the outcome. Attempts exactly one page
    /// fetch when the cursor runs past the loaded end.
    pub(crate) async fn advance_and_play(&self, direction: Direction, repeat: Repeat) -> Result<()> {
        let outcome = self.inner.queue.read().await.advance(direction, repeat);
        match outcome {
            AdvanceOutcome::Moved(index) | AdvanceOutcome::Wrapped(index) => {
                self.play_at(index).await
            }
            AdvanceOutcome::Replay => self.replay_current().await,
            AdvanceOutcome::NeedsPage => {
                self.load_next_page().await?;
                let outcome = self.inner.queue.read().await.advance(direction, repeat);
                match outcome {
                    AdvanceOutcome::Moved(index) | AdvanceOutcome::Wrapped(index) => {
                        self.play_at(index).await
                    }
                    _ => self.stop_at_end().await,
                }
            }
            AdvanceOutcome::Stop => self.stop_at_end().await,
        }
    }

    /// Restart the current track from the top (repeat-one, or previous at the
    /// first track).
    async fn replay_current(&self) -> Result<()> {
        let (index, track) = {
            let queue = self.inner.queue.read().await;
            (queue.index(), queue.current().map(|item| item.track.clone()))
        };
        let track = track.ok_or(QueueError::EmptyQueue)?;

        self.inner.engine.seek(0.0).await?;
        self.inner.engine.play().await?;
        self.inner.playing.store(true, Ordering::Release);
        self.after_track_started(&track, index, &self.current_epoch())
            .await;
        Ok(())
    }

    /// The queue ran out: pause in place, keeping the position for resume.
    async fn stop_at_end(&self) -> Result<()> {
        debug!("Queue end reached; pausing in place");
        self.pause_playback().await
    }

    pub(crate) async fn pause_playback(&self) -> Result<()> {
        self.inner.engine.pause().await?;
        self.inner.playing.store(false, Ordering::Release);
        self.set_transport(TransportState::Paused);
        Ok(())
    }

    /// Resume a track whose source was marked for reload: re-resolve, load,
    /// and restore the prior position.
    async fn resume_with_reload(&self) -> Result<()> {
        let track = {
            self.inner
                .queue
                .read()
                .await
                .current()
                .map(|item| item.track.clone())
        };
        let track = track.ok_or(QueueError::EmptyQueue)?;
        let position = self.inner.engine.position().await;

        let prepared = self.prepare_source(&track).await?;
        self.inner.engine.load_and_play(&prepared).await?;
        if position > 0.0 {
            self.inner.engine.seek(position).await?;
        }
        self.inner.reporter.mark_active(&track.id);
        debug!(track_id = %track.id, position, "Source reloaded after fatal error");
        Ok(())
    }

    /// Fetch the next page proactively when the cursor nears the loaded end.
    pub(crate) async fn maybe_prefetch_page(&self) {
        let should = {
            let queue = self.inner.queue.read().await;
            queue.near_end(NEAR_END_PREFETCH_ITEMS) && !queue.exhausted()
        };
        if !should || self.inner.page_fetching.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(error) = self.load_next_page().await {
            warn!(%error, "Page prefetch failed");
        }
        self.inner.page_fetching.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for PlayerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerService")
            .field("playing", &self.is_playing())
            .finish_non_exhaustive()
    }
}
