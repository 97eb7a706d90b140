//! Media-session integration.
//!
//! [`MediaSessionAdapter`] owns the attach/detach lifecycle against the
//! host's media-session surface: it pushes now-playing metadata and
//! transport state out, and translates incoming transport commands onto the
//! same [`TransportControl`] handlers the UI uses. An output-device change
//! pauses playback.
//!
//! [`PauseGuard`] implements the short grace window after an explicit user
//! pause during which programmatic resume attempts (device reconnects,
//! recovery paths) are ignored.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::session::{MediaSessionHost, NowPlaying, TransportCommand, TransportState};
use bridge_traits::time::Clock;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;

/// How long after a user-initiated pause programmatic resumes are ignored.
pub const USER_PAUSE_GRACE_MS: i64 = 2000;

/// The transport handlers media-session commands dispatch onto. The service
/// façade implements this with the same methods its UI surface uses.
#[async_trait]
pub trait TransportControl: Send + Sync {
    async fn play(&self);
    async fn pause(&self);
    async fn next_track(&self);
    async fn previous_track(&self);
    async fn seek_to(&self, position_secs: f64);
}

/// Grace window against programmatic resume shortly after a user pause.
pub struct PauseGuard {
    clock: Arc<dyn Clock>,
    /// Unix millis of the last user-initiated pause; `i64::MIN` = never.
    last_user_pause_ms: AtomicI64,
}

impl PauseGuard {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last_user_pause_ms: AtomicI64::new(i64::MIN),
        }
    }

    /// Record that the user paused explicitly.
    pub fn note_user_pause(&self) {
        self.last_user_pause_ms
            .store(self.clock.unix_timestamp_millis(), Ordering::Release);
    }

    /// Whether a programmatic resume should be ignored right now.
    pub fn should_ignore_resume(&self) -> bool {
        let last = self.last_user_pause_ms.load(Ordering::Acquire);
        if last == i64::MIN {
            return false;
        }
        self.clock.unix_timestamp_millis() - last < USER_PAUSE_GRACE_MS
    }
}

/// Owns the media-session lifecycle.
pub struct MediaSessionAdapter {
    host: Arc<dyn MediaSessionHost>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MediaSessionAdapter {
    pub fn new(host: Arc<dyn MediaSessionHost>) -> Self {
        Self {
            host,
            task: Mutex::new(None),
        }
    }

    /// Start dispatching host transport commands onto `control`.
    ///
    /// Re-attaching replaces the previous dispatch task.
    pub fn attach(&self, control: Arc<dyn TransportControl>, pause_guard: Arc<PauseGuard>) {
        let mut commands = self.host.commands();
        let mut device_changes = self.host.device_changes();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    command = commands.recv() => match command {
                        Ok(command) => {
                            dispatch(command, control.as_ref(), &pause_guard).await;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "Media-session command stream lagged");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                    change = device_changes.recv() => match change {
                        Ok(()) => {
                            debug!("Output device changed, pausing");
                            control.pause().await;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop dispatching and clear the host surface.
    pub fn detach(&self) -> Result<()> {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.host.clear()?;
        Ok(())
    }

    pub fn update_metadata(&self, now_playing: &NowPlaying) -> Result<()> {
        self.host.set_metadata(now_playing)?;
        Ok(())
    }

    pub fn update_transport_state(&self, state: TransportState) -> Result<()> {
        self.host.set_transport_state(state)?;
        Ok(())
    }
}

impl Drop for MediaSessionAdapter {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

async fn dispatch(command: TransportCommand, control: &dyn TransportControl, guard: &PauseGuard) {
    debug!(?command, "Media-session transport command");
    match command {
        TransportCommand::Play => {
            if guard.should_ignore_resume() {
                debug!("Resume ignored inside user-pause grace window");
                return;
            }
            control.play().await;
        }
        TransportCommand::Pause => {
            guard.note_user_pause();
            control.pause().await;
        }
        TransportCommand::NextTrack => control.next_track().await,
        TransportCommand::PreviousTrack => control.previous_track().await,
        TransportCommand::SeekTo(position_secs) => control.seek_to(position_secs).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::BridgeError;
    use chrono::{DateTime, TimeZone, Utc};
    use std::time::Duration;
    use tokio::sync::broadcast;

    struct MockClock {
        now_ms: AtomicI64,
    }

    impl MockClock {
        fn new(start_ms: i64) -> Arc<Self> {
            Arc::new(Self {
                now_ms: AtomicI64::new(start_ms),
            })
        }

        fn advance(&self, ms: i64) {
            self.now_ms.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> DateTime<Utc> {
            Utc.timestamp_millis_opt(self.now_ms.load(Ordering::SeqCst))
                .single()
                .unwrap_or_default()
        }

        fn unix_timestamp(&self) -> i64 {
            self.now_ms.load(Ordering::SeqCst) / 1000
        }

        fn unix_timestamp_millis(&self) -> i64 {
            self.now_ms.load(Ordering::SeqCst)
        }
    }

    struct MockHost {
        commands: broadcast::Sender<TransportCommand>,
        devices: broadcast::Sender<()>,
        cleared: std::sync::atomic::AtomicBool,
    }

    impl MockHost {
        fn new() -> Arc<Self> {
            let (commands, _) = broadcast::channel(8);
            let (devices, _) = broadcast::channel(8);
            Arc::new(Self {
                commands,
                devices,
                cleared: std::sync::atomic::AtomicBool::new(false),
            })
        }
    }

    impl MediaSessionHost for MockHost {
        fn set_metadata(&self, _now_playing: &NowPlaying) -> bridge_traits::error::Result<()> {
            Ok(())
        }

        fn set_transport_state(
            &self,
            _state: TransportState,
        ) -> bridge_traits::error::Result<()> {
            Ok(())
        }

        fn clear(&self) -> bridge_traits::error::Result<()> {
            self.cleared.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn commands(&self) -> broadcast::Receiver<TransportCommand> {
            self.commands.subscribe()
        }

        fn device_changes(&self) -> broadcast::Receiver<()> {
            self.devices.subscribe()
        }
    }

    #[derive(Default)]
    struct RecordingControl {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TransportControl for RecordingControl {
        async fn play(&self) {
            self.calls.lock().push("play".to_string());
        }
        async fn pause(&self) {
            self.calls.lock().push("pause".to_string());
        }
        async fn next_track(&self) {
            self.calls.lock().push("next".to_string());
        }
        async fn previous_track(&self) {
            self.calls.lock().push("previous".to_string());
        }
        async fn seek_to(&self, position_secs: f64) {
            self.calls.lock().push(format!("seek:{position_secs}"));
        }
    }

    #[test]
    fn pause_guard_window() {
        let clock = MockClock::new(1_000_000);
        let guard = PauseGuard::new(clock.clone());

        assert!(!guard.should_ignore_resume());
        guard.note_user_pause();
        assert!(guard.should_ignore_resume());

        clock.advance(USER_PAUSE_GRACE_MS - 1);
        assert!(guard.should_ignore_resume());

        clock.advance(2);
        assert!(!guard.should_ignore_resume());
    }

    #[tokio::test]
    async fn commands_dispatch_to_control() {
        let host = MockHost::new();
        let adapter = MediaSessionAdapter::new(host.clone());
        let control = Arc::new(RecordingControl::default());
        let guard = Arc::new(PauseGuard::new(MockClock::new(0)));

        adapter.attach(control.clone(), guard);

        host.commands.send(TransportCommand::NextTrack).unwrap();
        host.commands.send(TransportCommand::SeekTo(12.5)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let calls = control.calls.lock().clone();
        assert_eq!(calls, vec!["next", "seek:12.5"]);
    }

    #[tokio::test]
    async fn resume_inside_grace_window_is_ignored() {
        let host = MockHost::new();
        let adapter = MediaSessionAdapter::new(host.clone());
        let control = Arc::new(RecordingControl::default());
        let clock = MockClock::new(0);
        let guard = Arc::new(PauseGuard::new(clock.clone()));

        adapter.attach(control.clone(), guard);

        host.commands.send(TransportCommand::Pause).unwrap();
        host.commands.send(TransportCommand::Play).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The pause landed, the immediate resume did not
        assert_eq!(control.calls.lock().clone(), vec!["pause"]);

        clock.advance(USER_PAUSE_GRACE_MS + 1);
        host.commands.send(TransportCommand::Play).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(control.calls.lock().clone(), vec!["pause", "play"]);
    }

    #[tokio::test]
    async fn device_change_pauses() {
        let host = MockHost::new();
        let adapter = MediaSessionAdapter::new(host.clone());
        let control = Arc::new(RecordingControl::default());
        let guard = Arc::new(PauseGuard::new(MockClock::new(0)));

        adapter.attach(control.clone(), guard);

        host.devices.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(control.calls.lock().clone(), vec!["pause"]);
    }

    #[tokio::test]
    async fn detach_stops_dispatch_and_clears_host() {
        let host = MockHost::new();
        let adapter = MediaSessionAdapter::new(host.clone());
        let control = Arc::new(RecordingControl::default());
        let guard = Arc::new(PauseGuard::new(MockClock::new(0)));

        adapter.attach(control.clone(), guard);
        adapter.detach().unwrap();
        assert!(host.cleared.load(Ordering::SeqCst));

        let _ = host.commands.send(TransportCommand::NextTrack);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(control.calls.lock().is_empty());
    }

    #[test]
    fn media_session_error_classification() {
        let err = crate::error::SessionError::Bridge(BridgeError::RequestFailed(
            "timeout".to_string(),
        ));
        assert!(err.is_network_error());
        let err = crate::error::SessionError::MediaSession("no session".to_string());
        assert!(!err.is_network_error());
    }
}
