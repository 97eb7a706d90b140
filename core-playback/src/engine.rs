//! # Dual-Buffer Audio Engine
//!
//! Two audio outputs alternate between primary (audible) and standby
//! (preload target) roles. The outputs themselves live for the engine's
//! whole lifetime; only the primary designation moves.
//!
//! ## Rotation protocol
//!
//! Track handoff is two-phase. `prepare_standby` loads the upcoming source
//! into the standby slot without touching the primary; `commit_rotation`
//! atomically swaps the primary designation once the caller decides to
//! advance. Event consumers must check [`DualBufferEngine::is_primary`] at
//! event-receipt time so events from a slot that has since been demoted are
//! ignored.
//!
//! ## Start gating
//!
//! Audible playback only starts after the host reported a user interaction
//! (`note_user_interaction`); until then loads leave the engine paused.
//! Start failures are logged and leave the engine paused rather than
//! propagating.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bridge_traits::output::{AudioOutput, OutputEvent};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::decoder::{DecoderConfig, SegmentedDecoder};
use crate::error::{PlaybackError, Result};
use crate::resolver::{ResolvedSource, SourceMode};

/// A resolved source made loadable: the URL plus, for segmented streams,
/// the decoder that will drive it.
#[derive(Debug, Clone)]
pub struct PreparedSource {
    pub url: String,
    pub decoder: Option<SegmentedDecoder>,
}

impl PreparedSource {
    /// Prepare a resolved source with the given buffering windows.
    pub fn new(source: &ResolvedSource, config: DecoderConfig) -> Self {
        let decoder = match source.mode {
            SourceMode::Segmented => Some(SegmentedDecoder::new(source.url.clone(), config)),
            SourceMode::Direct => None,
        };
        Self {
            url: source.url.clone(),
            decoder,
        }
    }

    /// Prepare a direct source with no segmented decoder.
    pub fn direct(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            decoder: None,
        }
    }

    /// Replace the decoder, e.g. to add a stored-segment loader.
    pub fn with_decoder(mut self, decoder: SegmentedDecoder) -> Self {
        self.decoder = Some(decoder);
        self
    }
}

/// One output plus its per-slot load state.
///
/// The decoder mutex is only ever locked for short synchronous accesses;
/// it is never held across an await.
struct EngineSlot {
    output: Arc<dyn AudioOutput>,
    decoder: Mutex<Option<SegmentedDecoder>>,
    preloaded: AtomicBool,
}

impl EngineSlot {
    fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self {
            output,
            decoder: Mutex::new(None),
            preloaded: AtomicBool::new(false),
        }
    }
}

/// The two-slot playback engine.
pub struct DualBufferEngine {
    slots: [EngineSlot; 2],
    /// Index of the audible slot.
    primary: AtomicUsize,
    /// Set after a fatal network error; the next resume re-resolves.
    needs_reload: AtomicBool,
    /// Hosts with autoplay restrictions refuse playback before the first
    /// user gesture; loads before then stay paused.
    user_interacted: AtomicBool,
}

impl DualBufferEngine {
    pub fn new(outputs: [Arc<dyn AudioOutput>; 2]) -> Self {
        let [a, b] = outputs;
        Self {
            slots: [EngineSlot::new(a), EngineSlot::new(b)],
            primary: AtomicUsize::new(0),
            needs_reload: AtomicBool::new(false),
            user_interacted: AtomicBool::new(false),
        }
    }

    // ========================================================================
    // Slot designation
    // ========================================================================

    pub fn primary_index(&self) -> usize {
        self.primary.load(Ordering::Acquire)
    }

    pub fn standby_index(&self) -> usize {
        1 - self.primary_index()
    }

    /// Whether a slot index is the primary right now. Event consumers call
    /// this at receipt time.
    pub fn is_primary(&self, index: usize) -> bool {
        self.primary_index() == index
    }

    pub fn primary_output(&self) -> Arc<dyn AudioOutput> {
        Arc::clone(&self.slots[self.primary_index()].output)
    }

    /// Subscribe to one slot's output events.
    pub fn subscribe_slot(&self, index: usize) -> broadcast::Receiver<OutputEvent> {
        self.slots[index].output.subscribe()
    }

    /// Raw primary swap. [`commit_rotation`](Self::commit_rotation) is the
    /// checked entry point; this is the underlying involution.
    pub fn rotate(&self) -> usize {
        let new_primary = self.standby_index();
        self.primary.store(new_primary, Ordering::Release);
        new_primary
    }

    // ========================================================================
    // Flags
    // ========================================================================

    pub fn note_user_interaction(&self) {
        self.user_interacted.store(true, Ordering::Release);
    }

    pub fn user_interacted(&self) -> bool {
        self.user_interacted.load(Ordering::Acquire)
    }

    pub fn mark_needs_reload(&self) {
        self.needs_reload.store(true, Ordering::Release);
    }

    pub fn clear_needs_reload(&self) {
        self.needs_reload.store(false, Ordering::Release);
    }

    pub fn needs_reload(&self) -> bool {
        self.needs_reload.load(Ordering::Acquire)
    }

    pub fn standby_preloaded(&self) -> bool {
        self.slots[self.standby_index()]
            .preloaded
            .load(Ordering::Acquire)
    }

    /// Decoder currently attached to the primary slot, if segmented.
    pub fn primary_decoder(&self) -> Option<SegmentedDecoder> {
        self.slots[self.primary_index()].decoder.lock().clone()
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Load a source into the primary slot and start playback.
    ///
    /// Any standby preload is invalidated: it was prepared relative to the
    /// track this call replaces. Playback start is gated on the
    /// user-interaction flag; a refused start is logged and the engine stays
    /// paused with the source loaded.
    pub async fn load_and_play(&self, source: &PreparedSource) -> Result<()> {
        let primary = self.primary_index();
        self.attach_to_slot(primary, source).await?;
        self.clear_needs_reload();
        self.slots[self.standby_index()]
            .preloaded
            .store(false, Ordering::Release);

        self.start_primary().await;
        Ok(())
    }

    /// Load a source into the primary slot without starting playback.
    pub async fn load_paused(&self, source: &PreparedSource) -> Result<()> {
        let primary = self.primary_index();
        self.attach_to_slot(primary, source).await?;
        self.clear_needs_reload();
        self.slots[self.standby_index()]
            .preloaded
            .store(false, Ordering::Release);
        Ok(())
    }

    /// Phase one of a handoff: load the upcoming source into the standby
    /// slot. Never changes the primary designation.
    pub async fn prepare_standby(&self, source: &PreparedSource) -> Result<()> {
        let standby = self.standby_index();
        let slot = &self.slots[standby];
        slot.preloaded.store(false, Ordering::Release);

        self.attach_to_slot(standby, source).await?;
        slot.preloaded.store(true, Ordering::Release);
        debug!(slot = standby, url = %source.url, "Standby prepared");
        Ok(())
    }

    /// Phase two of a handoff: promote the preloaded standby to primary.
    ///
    /// Fails without side effects when no preload is pending. Returns the
    /// new primary index.
    pub fn commit_rotation(&self) -> Result<usize> {
        let standby = self.standby_index();
        let slot = &self.slots[standby];
        if !slot.preloaded.swap(false, Ordering::AcqRel) {
            return Err(PlaybackError::NoSource);
        }
        let new_primary = self.rotate();
        info!(new_primary, "Rotated playback slots");
        Ok(new_primary)
    }

    async fn attach_to_slot(&self, index: usize, source: &PreparedSource) -> Result<()> {
        let slot = &self.slots[index];
        match &source.decoder {
            Some(decoder) => decoder.attach(slot.output.as_ref()).await?,
            None => slot.output.set_source(&source.url).await?,
        }
        *slot.decoder.lock() = source.decoder.clone();
        Ok(())
    }

    /// Start the primary output if the user-interaction gate allows it.
    /// Start failures leave the engine paused.
    async fn start_primary(&self) {
        let output = self.primary_output();
        if !self.user_interacted() {
            debug!("Playback start deferred until first user interaction");
            return;
        }
        if let Err(e) = output.play().await {
            warn!(error = %e, "Playback start refused, staying paused");
            if let Err(pause_err) = output.pause().await {
                debug!(error = %pause_err, "Pause after refused start failed");
            }
        }
    }

    // ========================================================================
    // Transport
    // ========================================================================

    pub async fn play(&self) -> Result<()> {
        self.primary_output().play().await?;
        Ok(())
    }

    pub async fn pause(&self) -> Result<()> {
        self.primary_output().pause().await?;
        Ok(())
    }

    pub async fn seek(&self, position_secs: f64) -> Result<()> {
        self.primary_output().seek(position_secs).await?;
        Ok(())
    }

    pub async fn position(&self) -> f64 {
        self.primary_output().position().await
    }

    pub async fn duration(&self) -> Option<f64> {
        self.primary_output().duration().await
    }

    /// Volume applies to both slots so a rotation does not jump in level.
    pub async fn set_volume(&self, volume: f64) -> Result<()> {
        for slot in &self.slots {
            slot.output.set_volume(volume).await?;
        }
        Ok(())
    }

    /// Pause and detach both slots.
    pub async fn stop_all(&self) -> Result<()> {
        for slot in &self.slots {
            slot.output.pause().await?;
            slot.output.clear_source().await?;
            *slot.decoder.lock() = None;
            slot.preloaded.store(false, Ordering::Release);
        }
        Ok(())
    }
}

impl std::fmt::Debug for DualBufferEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualBufferEngine")
            .field("primary", &self.primary_index())
            .field("needs_reload", &self.needs_reload())
            .field("user_interacted", &self.user_interacted())
            .field("standby_preloaded", &self.standby_preloaded())
            .finish()
    }
}
