//! Engine event handling
//!
//! Background halves of the service: per-slot output watchers, the periodic
//! progress reporter, and the transport-control hooks the media-session
//! adapter dispatches into.
//!
//! Slot events are filtered against the primary designation at receipt time,
//! so events from a demoted slot (the tail of a crossfade, a discarded
//! preload) never steer playback.

use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use bridge_traits::{
    output::{OutputErrorKind, OutputEvent},
    session::TransportState,
};
use core_playback::{classify_error, RecoveryAction};
use core_queue::{AdvanceOutcome, Direction};
use core_runtime::events::{PlaybackEvent, PlayerEvent, SessionEvent};
use core_session::{TransportControl, PROGRESS_REPORT_INTERVAL_SECS};

use crate::service::PlayerService;

impl PlayerService {
    pub(crate) async fn run_slot_watcher(
        &self,
        slot: usize,
        mut receiver: broadcast::Receiver<OutputEvent>,
    ) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    // Stale standby events carry no authority.
                    if !self.inner.engine.is_primary(slot) {
                        continue;
                    }
                    self.handle_output_event(event).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(slot, skipped, "Output event watcher lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!(slot, "Output event watcher stopped");
    }

    async fn handle_output_event(&self, event: OutputEvent) {
        match event {
            OutputEvent::MetadataLoaded { duration_secs } => {
                debug!(?duration_secs, "Source metadata loaded");
            }
            OutputEvent::TimeUpdate {
                position_secs,
                duration_secs,
            } => self.on_time_update(position_secs, duration_secs).await,
            OutputEvent::Playing => {
                self.inner.playing.store(true, Ordering::Release);
                self.set_transport(TransportState::Playing);
            }
            OutputEvent::Paused => {
                self.inner.playing.store(false, Ordering::Release);
                self.set_transport(TransportState::Paused);
            }
            OutputEvent::Ended => self.on_track_ended().await,
            OutputEvent::Error {
                kind,
                fatal,
                message,
            } => self.on_output_error(kind, fatal, message).await,
        }
    }

    /// React to a position tick on the primary slot: publish the position,
    /// then run the near-end machinery (crossfade commit, standby preload,
    /// page prefetch) in priority order.
    pub(crate) async fn on_time_update(&self, position_secs: f64, duration_secs: Option<f64>) {
        let Some(track_id) = self.current_track_id().await else {
            return;
        };
        self.publish(PlayerEvent::Playback(PlaybackEvent::PositionChanged {
            track_id,
            position_secs,
            duration_secs,
        }));

        let settings = self.inner.settings.snapshot().await;
        if let Some(duration) = duration_secs {
            let remaining = duration - position_secs;
            if settings.crossfade_enabled && remaining <= settings.crossfade_secs {
                // The rotation takes whatever is in the standby slot; when no
                // preload landed (preload disabled, or it did not finish in
                // time) the standby is loaded fresh here.
                if !self.inner.engine.standby_preloaded() {
                    self.maybe_preload().await;
                }
                if self.inner.engine.standby_preloaded() {
                    if let Err(error) = self.crossfade_advance().await {
                        warn!(%error, "Crossfade advance failed");
                    }
                }
            } else if settings.preload_enabled
                && remaining <= settings.preload_secs
                && !self.inner.engine.standby_preloaded()
            {
                self.maybe_preload().await;
            }
        }

        self.maybe_prefetch_page().await;
    }

    /// Prepare the next track in the standby slot. Single-flight; a second
    /// tick while a preload is running is a no-op.
    pub(crate) async fn maybe_preload(&self) {
        if self.inner.preloading.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(error) = self.preload_next().await {
            debug!(%error, "Standby preload skipped");
        }
        self.inner.preloading.store(false, Ordering::Release);
    }

    async fn preload_next(&self) -> crate::error::Result<()> {
        let repeat = Self::repeat_of(self.inner.settings.repeat().await);
        let (outcome, track) = {
            let queue = self.inner.queue.read().await;
            let outcome = queue.advance(Direction::Forward, repeat);
            let track = match outcome {
                AdvanceOutcome::Moved(index) | AdvanceOutcome::Wrapped(index) => {
                    queue.item_at(index).map(|item| item.track.clone())
                }
                _ => None,
            };
            (outcome, track)
        };
        let target = match outcome {
            AdvanceOutcome::Moved(index) | AdvanceOutcome::Wrapped(index) => index,
            // Replays reuse the primary buffer; page fetches are handled by
            // the prefetch path.
            _ => return Ok(()),
        };
        let Some(track) = track else {
            return Ok(());
        };

        let prepared = self.prepare_source(&track).await?;
        self.inner.engine.prepare_standby(&prepared).await?;
        *self.inner.preloaded_index.lock() = Some(target);
        debug!(target, track_id = %track.id, "Standby slot preloaded");
        Ok(())
    }

    /// Promote the preloaded standby to primary inside the crossfade window.
    ///
    /// The demoted slot keeps playing its tail; its remaining events are
    /// filtered out by the primary check at receipt.
    pub(crate) async fn crossfade_advance(&self) -> crate::error::Result<()> {
        let Some(target) = self.inner.preloaded_index.lock().take() else {
            return Ok(());
        };

        let previous = self.current_track_id().await;
        let position = self.inner.engine.position().await;

        let new_primary = self.inner.engine.commit_rotation()?;
        self.inner.engine.play().await?;
        self.inner.playing.store(true, Ordering::Release);
        debug!(new_primary, target, "Crossfade rotation committed");

        let track = {
            let mut queue = self.inner.queue.write().await;
            queue.set_index(target as i64)?;
            queue.current().map(|item| item.track.clone())
        };

        let epoch = self.current_epoch();
        if let Some(previous) = previous {
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

        if let Some(track) = track {
            self.after_track_started(&track, target as i64, &epoch).await;
        }
        Ok(())
    }

    /// Natural end of the primary source: report, then advance honoring the
    /// configured repeat mode.
    pub(crate) async fn on_track_ended(&self) {
        self.inner.playing.store(false, Ordering::Release);

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
                    track_id: track_id.clone(),
                }));
            }
            self.publish(PlayerEvent::Playback(PlaybackEvent::Ended { track_id }));
        }

        let repeat = Self::repeat_of(self.inner.settings.repeat().await);
        if let Err(error) = self.advance_and_play(Direction::Forward, repeat).await {
            warn!(%error, "Auto-advance after track end failed");
        }
    }

    pub(crate) async fn on_output_error(
        &self,
        kind: OutputErrorKind,
        fatal: bool,
        message: String,
    ) {
        let track_id = self.current_track_id().await;
        match classify_error(kind, fatal) {
            RecoveryAction::Reload => {
                warn!(?kind, %message, "Fatal source error; marking for reload");
                self.inner.engine.mark_needs_reload();
                if let Err(error) = self.pause_playback().await {
                    warn!(%error, "Pause after fatal error failed");
                }
                if let Some(track_id) = track_id.clone() {
                    self.publish(PlayerEvent::Playback(PlaybackEvent::NeedsReload {
                        track_id,
                    }));
                }
                self.publish(PlayerEvent::Playback(PlaybackEvent::Error {
                    track_id,
                    message,
                    recoverable: true,
                }));
            }
            RecoveryAction::RecoverInPlace => {
                warn!(?kind, %message, "Media error; retrying playback in place");
                if let Err(error) = self.inner.engine.play().await {
                    warn!(%error, "In-place recovery failed");
                }
                self.publish(PlayerEvent::Playback(PlaybackEvent::Error {
                    track_id,
                    message,
                    recoverable: true,
                }));
            }
            RecoveryAction::LogOnly => {
                debug!(?kind, %message, "Non-fatal output error");
            }
        }
    }

    /// Report playback progress to the server every ten seconds while
    /// playing. Failures are logged inside the reporter and never surface.
    pub(crate) async fn run_progress_ticker(&self) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(PROGRESS_REPORT_INTERVAL_SECS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if !self.is_playing() {
                continue;
            }
            let Some(track_id) = self.current_track_id().await else {
                continue;
            };
            let position = self.inner.engine.position().await;
            self.inner
                .reporter
                .report_progress(&track_id, position, false, &self.current_epoch())
                .await;
        }
    }
}

// ============================================================================
// Media-session transport hooks
// ============================================================================

/// Host transport commands land on the same handlers the UI uses. The
/// adapter has already applied the user-pause grace window before calling
/// `play`; `pause` is also invoked directly on audio device changes, so it
/// must not count as a user pause.
#[async_trait]
impl TransportControl for PlayerService {
    async fn play(&self) {
        if self.is_playing() {
            return;
        }
        if let Err(error) = self.toggle_play_pause().await {
            warn!(%error, "Media session play failed");
        }
    }

    async fn pause(&self) {
        if !self.is_playing() {
            return;
        }
        if let Err(error) = self.pause_playback().await {
            warn!(%error, "Media session pause failed");
        }
    }

    async fn next_track(&self) {
        if let Err(error) = PlayerService::next_track(self).await {
            warn!(%error, "Media session next failed");
        }
    }

    async fn previous_track(&self) {
        if let Err(error) = PlayerService::previous_track(self).await {
            warn!(%error, "Media session previous failed");
        }
    }

    async fn seek_to(&self, position_secs: f64) {
        if let Err(error) = PlayerService::seek(self, position_secs).await {
            warn!(%error, "Media session seek failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{build_player, track, OutputCall, TestPlayer};

    async fn playing_pair() -> TestPlayer {
        let player = build_player().await;
        player
            .service
            .replace_queue_simple(vec![track("a", 180.0), track("b", 200.0)], None, 0, true)
            .await
            .unwrap();
        player
    }

    #[tokio::test]
    async fn preload_then_crossfade_keeps_the_new_primary_loaded() {
        let player = playing_pair().await;
        player.service.set_crossfade(true, 5.0).await.unwrap();

        // Inside the preload window (but not yet the crossfade window) the
        // next track lands in the standby slot without starting it.
        player.outputs[0].set_position(174.0);
        player.service.on_time_update(174.0, Some(180.0)).await;
        assert!(player.service.inner.engine.standby_preloaded());
        assert_eq!(
            player.outputs[1].sources(),
            vec!["https://media.test/b/direct".to_string()]
        );
        assert!(!player.outputs[1].calls().contains(&OutputCall::Play));

        // Inside the crossfade window the standby is promoted and started.
        player.outputs[0].set_position(176.0);
        player.service.on_time_update(176.0, Some(180.0)).await;
        assert_eq!(player.service.inner.engine.primary_index(), 1);
        assert!(player.outputs[1].calls().contains(&OutputCall::Play));
        // Continuity: the promoted slot kept its preloaded source.
        assert_eq!(player.outputs[1].sources().len(), 1);

        let snapshot = player.service.snapshot().await;
        assert_eq!(snapshot.current_index, 1);
        assert_eq!(snapshot.current_track.unwrap().id, "b");
        assert_eq!(player.catalog.stop_reports(), vec![("a".to_string(), 176.0)]);
        assert!(player.catalog.start_reports().contains(&"b".to_string()));
    }

    #[tokio::test]
    async fn crossfade_without_preload_loads_the_standby_fresh() {
        let player = playing_pair().await;
        player.service.set_crossfade(true, 5.0).await.unwrap();
        player.service.set_preload(false, 6.0).await.unwrap();

        // No preload landed, so the crossfade window loads the standby fresh
        // and rotates in the same tick.
        player.outputs[0].set_position(176.0);
        player.service.on_time_update(176.0, Some(180.0)).await;

        assert_eq!(player.service.inner.engine.primary_index(), 1);
        assert_eq!(
            player.outputs[1].sources(),
            vec!["https://media.test/b/direct".to_string()]
        );
        assert!(player.outputs[1].calls().contains(&OutputCall::Play));

        let snapshot = player.service.snapshot().await;
        assert_eq!(snapshot.current_index, 1);
        assert_eq!(snapshot.current_track.unwrap().id, "b");
        assert_eq!(player.catalog.stop_reports(), vec![("a".to_string(), 176.0)]);
    }

    #[tokio::test]
    async fn natural_end_advances_and_reports() {
        let player = playing_pair().await;
        player.outputs[0].set_position(180.0);

        player.service.on_track_ended().await;
        assert_eq!(player.catalog.stop_reports(), vec![("a".to_string(), 180.0)]);
        let snapshot = player.service.snapshot().await;
        assert_eq!(snapshot.current_index, 1);
        assert!(snapshot.playing);
        assert_eq!(
            player.outputs[0].sources(),
            vec![
                "https://media.test/a/direct".to_string(),
                "https://media.test/b/direct".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn repeat_one_replays_without_reattaching_the_source() {
        let player = playing_pair().await;
        player.service.toggle_repeat().await.unwrap(); // all
        player.service.toggle_repeat().await.unwrap(); // one
        player.outputs[0].clear_calls();

        player.service.on_track_ended().await;
        let calls = player.outputs[0].calls();
        assert!(calls.contains(&OutputCall::Seek(0.0)));
        assert!(calls.contains(&OutputCall::Play));
        assert!(player.outputs[0].sources().is_empty());
        assert_eq!(player.service.snapshot().await.current_index, 0);
        assert_eq!(
            player.catalog.start_reports(),
            vec!["a".to_string(), "a".to_string()]
        );
    }

    #[tokio::test]
    async fn fatal_network_error_marks_reload_and_pauses() {
        let player = playing_pair().await;
        player
            .service
            .on_output_error(OutputErrorKind::Network, true, "socket closed".to_string())
            .await;

        assert!(player.service.inner.engine.needs_reload());
        assert!(!player.service.is_playing());
        assert!(player.outputs[0].calls().contains(&OutputCall::Pause));
    }

    #[tokio::test]
    async fn fatal_media_error_retries_in_place() {
        let player = playing_pair().await;
        player.outputs[0].clear_calls();
        player
            .service
            .on_output_error(OutputErrorKind::Media, true, "decode stall".to_string())
            .await;

        assert!(!player.service.inner.engine.needs_reload());
        assert!(player.outputs[0].calls().contains(&OutputCall::Play));
    }

    #[tokio::test]
    async fn non_fatal_errors_are_log_only() {
        let player = playing_pair().await;
        player.outputs[0].clear_calls();
        player
            .service
            .on_output_error(OutputErrorKind::Network, false, "blip".to_string())
            .await;

        assert!(!player.service.inner.engine.needs_reload());
        assert!(player.service.is_playing());
        assert!(player.outputs[0].calls().is_empty());
    }

    #[tokio::test]
    async fn transport_pause_does_not_arm_the_user_pause_guard() {
        let player = playing_pair().await;
        TransportControl::pause(&player.service).await;

        assert!(!player.service.is_playing());
        assert!(!player.service.inner.pause_guard.should_ignore_resume());
    }

    #[tokio::test]
    async fn watcher_ignores_stale_standby_events() {
        let player = playing_pair().await;
        player.service.start();

        // Ended on the standby output carries no authority.
        player.outputs[1].emit(OutputEvent::Ended);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(player.service.snapshot().await.current_index, 0);

        // The same event on the primary advances the queue.
        player.outputs[0].emit(OutputEvent::Ended);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(player.service.snapshot().await.current_index, 1);
    }
}
