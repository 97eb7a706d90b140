//! Playback session reporting.
//!
//! The server tracks playback sessions from three report kinds: started,
//! periodic progress, and stopped. Reporting is best-effort; a lost report
//! never interrupts playback. Stop reports are de-duplicated per track id so
//! a track that becomes inactive through several paths (ended, skipped,
//! replaced) is reported stopped exactly once.
//!
//! Every report call takes the track-selection epoch token and abandons the
//! in-flight request when a newer selection cancels the epoch, so a slow
//! server never delays the next track switch.

use std::sync::Arc;

use bridge_traits::catalog::CatalogClient;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Interval between progress reports while a track is playing.
pub const PROGRESS_REPORT_INTERVAL_SECS: u64 = 10;

pub struct SessionReporter {
    catalog: Arc<dyn CatalogClient>,
    /// Track id of the last stop report; suppresses duplicates until the
    /// track becomes active again.
    last_stopped: Mutex<Option<String>>,
}

impl SessionReporter {
    pub fn new(catalog: Arc<dyn CatalogClient>) -> Self {
        Self {
            catalog,
            last_stopped: Mutex::new(None),
        }
    }

    /// Re-arm stop reporting for a track that became active.
    pub fn mark_active(&self, track_id: &str) {
        let mut last = self.last_stopped.lock();
        if last.as_deref() == Some(track_id) {
            *last = None;
        }
    }

    /// Report that playback of a track started. Also re-arms stop
    /// de-duplication for it.
    ///
    /// Returns whether the report was delivered.
    pub async fn report_started(&self, track_id: &str, epoch: &CancellationToken) -> bool {
        self.mark_active(track_id);
        tokio::select! {
            _ = epoch.cancelled() => {
                debug!(track_id, "Start report abandoned; selection superseded");
                false
            }
            result = self.catalog.report_playback_start(track_id) => match result {
                Ok(()) => {
                    debug!(track_id, "Reported playback start");
                    true
                }
                Err(e) => {
                    warn!(track_id, error = %e, "Start report failed");
                    false
                }
            }
        }
    }

    /// Report playback progress. Failures are logged and swallowed; the
    /// next tick retries naturally.
    pub async fn report_progress(
        &self,
        track_id: &str,
        position_secs: f64,
        paused: bool,
        epoch: &CancellationToken,
    ) {
        tokio::select! {
            _ = epoch.cancelled() => {
                debug!(track_id, "Progress report abandoned; selection superseded");
            }
            result = self
                .catalog
                .report_playback_progress(track_id, position_secs, paused) =>
            {
                if let Err(e) = result {
                    warn!(track_id, error = %e, "Progress report failed");
                }
            }
        }
    }

    /// Report that playback of a track stopped, at most once per active
    /// phase of that track.
    ///
    /// Returns whether a report was delivered (`false` means it was
    /// suppressed as a duplicate or abandoned by a superseding selection).
    pub async fn report_stopped(
        &self,
        track_id: &str,
        position_secs: f64,
        epoch: &CancellationToken,
    ) -> bool {
        {
            let mut last = self.last_stopped.lock();
            if last.as_deref() == Some(track_id) {
                debug!(track_id, "Stop report suppressed (already reported)");
                return false;
            }
            // De-duplication is by intent: a failed delivery is not retried
            // until the track becomes active again.
            *last = Some(track_id.to_string());
        }

        tokio::select! {
            _ = epoch.cancelled() => {
                debug!(track_id, "Stop report abandoned; selection superseded");
                false
            }
            result = self
                .catalog
                .report_playback_stopped(track_id, position_secs) =>
            {
                match result {
                    Ok(()) => debug!(track_id, position_secs, "Reported playback stop"),
                    Err(e) => warn!(track_id, error = %e, "Stop report failed"),
                }
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::catalog::{ListRequest, StreamSelection, Track, TrackPage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingCatalog {
        starts: AtomicUsize,
        stops: AtomicUsize,
        progress: AtomicUsize,
        fail_stop: std::sync::atomic::AtomicBool,
        hang_stop: std::sync::atomic::AtomicBool,
        hang_start: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl CatalogClient for CountingCatalog {
        async fn fetch_list(
            &self,
            _request: &ListRequest,
        ) -> bridge_traits::error::Result<TrackPage> {
            Ok(TrackPage::empty())
        }

        async fn stream_url(
            &self,
            _track_id: &str,
            _selection: StreamSelection,
        ) -> bridge_traits::error::Result<String> {
            Ok(String::new())
        }

        fn artwork_url(&self, _track: &Track, _max_width: u32) -> Option<String> {
            None
        }

        async fn report_playback_start(&self, _track_id: &str) -> bridge_traits::error::Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.hang_start.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        async fn report_playback_progress(
            &self,
            _track_id: &str,
            _position_secs: f64,
            _paused: bool,
        ) -> bridge_traits::error::Result<()> {
            self.progress.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn report_playback_stopped(
            &self,
            _track_id: &str,
            _position_secs: f64,
        ) -> bridge_traits::error::Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if self.hang_stop.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.fail_stop.load(Ordering::SeqCst) {
                return Err(bridge_traits::BridgeError::RequestFailed(
                    "offline".to_string(),
                ));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn stop_report_is_deduplicated_per_track() {
        let catalog = Arc::new(CountingCatalog::default());
        let reporter = SessionReporter::new(catalog.clone());
        let epoch = CancellationToken::new();

        assert!(reporter.report_stopped("t1", 42.0, &epoch).await);
        assert!(!reporter.report_stopped("t1", 42.0, &epoch).await);
        assert_eq!(catalog.stops.load(Ordering::SeqCst), 1);

        // A different track is not suppressed
        assert!(reporter.report_stopped("t2", 1.0, &epoch).await);
        assert_eq!(catalog.stops.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn becoming_active_rearms_stop_reporting() {
        let catalog = Arc::new(CountingCatalog::default());
        let reporter = SessionReporter::new(catalog.clone());
        let epoch = CancellationToken::new();

        reporter.report_stopped("t1", 10.0, &epoch).await;
        reporter.report_started("t1", &epoch).await;
        assert!(reporter.report_stopped("t1", 20.0, &epoch).await);
        assert_eq!(catalog.stops.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_stop_report_is_not_retried_until_reactivation() {
        let catalog = Arc::new(CountingCatalog::default());
        catalog.fail_stop.store(true, Ordering::SeqCst);
        let reporter = SessionReporter::new(catalog.clone());
        let epoch = CancellationToken::new();

        assert!(reporter.report_stopped("t1", 5.0, &epoch).await);
        assert!(!reporter.report_stopped("t1", 5.0, &epoch).await);
        assert_eq!(catalog.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn progress_failures_are_swallowed() {
        let catalog = Arc::new(CountingCatalog::default());
        let reporter = SessionReporter::new(catalog.clone());

        reporter
            .report_progress("t1", 3.0, false, &CancellationToken::new())
            .await;
        assert_eq!(catalog.progress.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_epoch_abandons_an_in_flight_stop_report() {
        let catalog = Arc::new(CountingCatalog::default());
        catalog.hang_stop.store(true, Ordering::SeqCst);
        let reporter = Arc::new(SessionReporter::new(catalog.clone()));
        let epoch = CancellationToken::new();

        let report = tokio::spawn({
            let reporter = Arc::clone(&reporter);
            let epoch = epoch.clone();
            async move { reporter.report_stopped("t1", 5.0, &epoch).await }
        });
        tokio::task::yield_now().await;
        assert_eq!(catalog.stops.load(Ordering::SeqCst), 1);

        epoch.cancel();
        assert!(!report.await.unwrap());
    }

    #[tokio::test]
    async fn abandoned_start_report_still_rearms_stop_reporting() {
        let catalog = Arc::new(CountingCatalog::default());
        catalog.hang_start.store(true, Ordering::SeqCst);
        let reporter = SessionReporter::new(catalog.clone());
        let epoch = CancellationToken::new();

        reporter.report_stopped("t1", 9.0, &epoch).await;
        epoch.cancel();
        assert!(!reporter.report_started("t1", &epoch).await);

        // Re-activation happened before the abandoned delivery, so the next
        // stop is not suppressed as a duplicate.
        assert!(reporter
            .report_stopped("t1", 12.0, &CancellationToken::new())
            .await);
        assert_eq!(catalog.stops.load(Ordering::SeqCst), 2);
    }
}
